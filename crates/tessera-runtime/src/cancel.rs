//! Cooperative cancellation.
//!
//! A [`CancellationToken`] is a shared flag plus a wake-up channel. Child
//! tokens are cancelled with their parent but can also be cancelled alone;
//! every call runs under a child of the caller's token so that dropping the
//! calling future cancels just that call.

use std::sync::{Arc, Mutex, PoisonError, Weak};

use tokio::sync::watch;

use crate::error::RuntimeError;

#[derive(Debug, Clone)]
pub struct CancellationToken {
    inner: Arc<TokenInner>,
}

#[derive(Debug)]
struct TokenInner {
    flag: watch::Sender<bool>,
    children: Mutex<Vec<Weak<TokenInner>>>,
}

impl TokenInner {
    fn cancel(&self) {
        if self.flag.send_replace(true) {
            return;
        }
        let children = std::mem::take(&mut *self.children.lock().unwrap_or_else(PoisonError::into_inner));
        for child in children.iter().filter_map(Weak::upgrade) {
            child.cancel();
        }
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        CancellationToken::new()
    }
}

impl CancellationToken {
    pub fn new() -> Self {
        CancellationToken {
            inner: Arc::new(TokenInner {
                flag: watch::Sender::new(false),
                children: Mutex::new(Vec::new()),
            }),
        }
    }

    /// A token cancelled whenever `self` is.
    pub fn child(&self) -> CancellationToken {
        let child = CancellationToken::new();
        {
            let mut children = self.inner.children.lock().unwrap_or_else(PoisonError::into_inner);
            children.retain(|c| c.strong_count() > 0);
            children.push(Arc::downgrade(&child.inner));
        }
        // Parent may have been cancelled before the child was registered.
        if self.is_cancelled() {
            child.cancel();
        }
        child
    }

    pub fn cancel(&self) {
        self.inner.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        *self.inner.flag.borrow()
    }

    /// `Err(Cancelled)` once cancelled.
    pub fn check(&self) -> Result<(), RuntimeError> {
        if self.is_cancelled() {
            Err(RuntimeError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Completes when the token is cancelled.
    pub async fn cancelled(&self) {
        let mut rx = self.inner.flag.subscribe();
        // The sender lives as long as `self`, so this only returns once set.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

/// Cancels its token when dropped unless disarmed first.
pub(crate) struct CancelOnDrop {
    token: Option<CancellationToken>,
}

impl CancelOnDrop {
    pub(crate) fn new(token: CancellationToken) -> Self {
        CancelOnDrop { token: Some(token) }
    }

    pub(crate) fn disarm(mut self) {
        self.token = None;
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if let Some(token) = self.token.take() {
            tracing::debug!("call dropped before completion; cancelling");
            token.cancel();
        }
    }
}

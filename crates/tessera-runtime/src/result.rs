//! Call results and their typed unwrapping.

use tessera_core::error::ConversionError;
use tessera_core::record::Record;
use tessera_core::value::DomainValue;

use crate::error::RuntimeError;
use crate::stream::RowStream;

/// The outcome of one operation call, shaped by its declared return.
#[derive(Debug)]
pub enum CallResult {
    Unit,
    RowCount(u64),
    Key(i64),
    Keys(Vec<i64>),
    /// Single-entity lookup; `None` is the not-found signal.
    Entity(Option<Record>),
    Stream(RowStream),
    /// Single scalar; `None` when no row matched or the value was NULL.
    Scalar(Option<DomainValue>),
    Scalars(Vec<DomainValue>),
}

impl CallResult {
    fn shape(&self) -> &'static str {
        match self {
            CallResult::Unit => "unit",
            CallResult::RowCount(_) => "a row count",
            CallResult::Key(_) => "a generated key",
            CallResult::Keys(_) => "generated keys",
            CallResult::Entity(_) => "an entity",
            CallResult::Stream(_) => "a row stream",
            CallResult::Scalar(_) => "a scalar",
            CallResult::Scalars(_) => "a scalar list",
        }
    }

    fn mismatch(&self, expected: &'static str) -> RuntimeError {
        RuntimeError::ResultShape {
            expected,
            found: self.shape(),
        }
    }

    pub fn into_unit(self) -> Result<(), RuntimeError> {
        match self {
            CallResult::Unit => Ok(()),
            other => Err(other.mismatch("unit")),
        }
    }

    pub fn into_row_count(self) -> Result<u64, RuntimeError> {
        match self {
            CallResult::RowCount(n) => Ok(n),
            other => Err(other.mismatch("a row count")),
        }
    }

    pub fn into_key(self) -> Result<i64, RuntimeError> {
        match self {
            CallResult::Key(k) => Ok(k),
            other => Err(other.mismatch("a generated key")),
        }
    }

    pub fn into_keys(self) -> Result<Vec<i64>, RuntimeError> {
        match self {
            CallResult::Keys(ks) => Ok(ks),
            other => Err(other.mismatch("generated keys")),
        }
    }

    pub fn into_entity(self) -> Result<Option<Record>, RuntimeError> {
        match self {
            CallResult::Entity(e) => Ok(e),
            other => Err(other.mismatch("an entity")),
        }
    }

    pub fn into_stream(self) -> Result<RowStream, RuntimeError> {
        match self {
            CallResult::Stream(s) => Ok(s),
            other => Err(other.mismatch("a row stream")),
        }
    }

    pub fn into_scalar<T>(self) -> Result<Option<T>, RuntimeError>
    where
        T: TryFrom<DomainValue, Error = ConversionError>,
    {
        match self {
            CallResult::Scalar(None) => Ok(None),
            CallResult::Scalar(Some(v)) => Ok(Some(T::try_from(v)?)),
            other => Err(other.mismatch("a scalar")),
        }
    }

    pub fn into_scalars<T>(self) -> Result<Vec<T>, RuntimeError>
    where
        T: TryFrom<DomainValue, Error = ConversionError>,
    {
        match self {
            CallResult::Scalars(vs) => Ok(vs.into_iter().map(T::try_from).collect::<Result<_, _>>()?),
            other => Err(other.mismatch("a scalar list")),
        }
    }
}

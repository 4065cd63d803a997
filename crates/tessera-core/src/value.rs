//! Runtime values on both sides of a conversion.
//!
//! [`DomainValue`] is what application code hands to and receives from
//! generated operations. [`StorageValue`] is exactly what the store persists.
//! Custom domain types carry their payload as JSON so converters can be
//! written without the core knowing the concrete Rust type.

use serde::{Deserialize, Serialize};

use crate::error::ConversionError;
use crate::types::StorageType;

/// A value as seen by application code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DomainValue {
    Null,
    Bool(bool),
    Integer(i64),
    Real(f64),
    Text(String),
    Bytes(Vec<u8>),
    /// Payload of a custom domain type.
    Custom(serde_json::Value),
}

impl DomainValue {
    pub fn is_null(&self) -> bool {
        matches!(self, DomainValue::Null)
    }

    /// Short kind name used in conversion diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            DomainValue::Null => "null",
            DomainValue::Bool(_) => "bool",
            DomainValue::Integer(_) => "integer",
            DomainValue::Real(_) => "real",
            DomainValue::Text(_) => "text",
            DomainValue::Bytes(_) => "bytes",
            DomainValue::Custom(_) => "custom",
        }
    }
}

/// A value as persisted by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StorageValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl StorageValue {
    /// The affinity of this value, or `None` for NULL.
    pub fn storage_type(&self) -> Option<StorageType> {
        match self {
            StorageValue::Null => None,
            StorageValue::Integer(_) => Some(StorageType::Integer),
            StorageValue::Real(_) => Some(StorageType::Real),
            StorageValue::Text(_) => Some(StorageType::Text),
            StorageValue::Blob(_) => Some(StorageType::Blob),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, StorageValue::Null)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            StorageValue::Null => "NULL",
            StorageValue::Integer(_) => "INTEGER",
            StorageValue::Real(_) => "REAL",
            StorageValue::Text(_) => "TEXT",
            StorageValue::Blob(_) => "BLOB",
        }
    }
}

// ---------------------------------------------------------------------------
// Rust -> DomainValue
// ---------------------------------------------------------------------------

macro_rules! domain_from_int {
    ($($ty:ty),*) => {
        $(impl From<$ty> for DomainValue {
            fn from(v: $ty) -> Self {
                DomainValue::Integer(v as i64)
            }
        })*
    };
}

domain_from_int!(i8, i16, i32, i64, u8, u16, u32);

impl From<bool> for DomainValue {
    fn from(v: bool) -> Self {
        DomainValue::Bool(v)
    }
}

impl From<f32> for DomainValue {
    fn from(v: f32) -> Self {
        DomainValue::Real(v as f64)
    }
}

impl From<f64> for DomainValue {
    fn from(v: f64) -> Self {
        DomainValue::Real(v)
    }
}

impl From<String> for DomainValue {
    fn from(v: String) -> Self {
        DomainValue::Text(v)
    }
}

impl From<&str> for DomainValue {
    fn from(v: &str) -> Self {
        DomainValue::Text(v.to_string())
    }
}

impl From<Vec<u8>> for DomainValue {
    fn from(v: Vec<u8>) -> Self {
        DomainValue::Bytes(v)
    }
}

impl From<serde_json::Value> for DomainValue {
    fn from(v: serde_json::Value) -> Self {
        DomainValue::Custom(v)
    }
}

impl<T: Into<DomainValue>> From<Option<T>> for DomainValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(DomainValue::Null, Into::into)
    }
}

// ---------------------------------------------------------------------------
// DomainValue -> Rust
// ---------------------------------------------------------------------------

fn mismatch(expected: &str, actual: &DomainValue) -> ConversionError {
    ConversionError::ValueMismatch {
        expected: expected.to_string(),
        actual: actual.kind().to_string(),
    }
}

macro_rules! int_from_domain {
    ($($ty:ty),*) => {
        $(impl TryFrom<DomainValue> for $ty {
            type Error = ConversionError;

            fn try_from(v: DomainValue) -> Result<Self, Self::Error> {
                match v {
                    DomainValue::Integer(i) => <$ty>::try_from(i).map_err(|_| {
                        ConversionError::OutOfRange {
                            value: i,
                            target: stringify!($ty).to_string(),
                        }
                    }),
                    other => Err(mismatch(stringify!($ty), &other)),
                }
            }
        })*
    };
}

int_from_domain!(i8, i16, i32, i64, u8, u16, u32);

impl TryFrom<DomainValue> for bool {
    type Error = ConversionError;

    fn try_from(v: DomainValue) -> Result<Self, Self::Error> {
        match v {
            DomainValue::Bool(b) => Ok(b),
            DomainValue::Integer(i) => Ok(i != 0),
            other => Err(mismatch("bool", &other)),
        }
    }
}

impl TryFrom<DomainValue> for f64 {
    type Error = ConversionError;

    fn try_from(v: DomainValue) -> Result<Self, Self::Error> {
        match v {
            DomainValue::Real(r) => Ok(r),
            DomainValue::Integer(i) => Ok(i as f64),
            other => Err(mismatch("f64", &other)),
        }
    }
}

impl TryFrom<DomainValue> for f32 {
    type Error = ConversionError;

    fn try_from(v: DomainValue) -> Result<Self, Self::Error> {
        f64::try_from(v).map(|r| r as f32)
    }
}

impl TryFrom<DomainValue> for String {
    type Error = ConversionError;

    fn try_from(v: DomainValue) -> Result<Self, Self::Error> {
        match v {
            DomainValue::Text(s) => Ok(s),
            other => Err(mismatch("string", &other)),
        }
    }
}

impl TryFrom<DomainValue> for Vec<u8> {
    type Error = ConversionError;

    fn try_from(v: DomainValue) -> Result<Self, Self::Error> {
        match v {
            DomainValue::Bytes(b) => Ok(b),
            other => Err(mismatch("bytes", &other)),
        }
    }
}

impl TryFrom<DomainValue> for serde_json::Value {
    type Error = ConversionError;

    fn try_from(v: DomainValue) -> Result<Self, Self::Error> {
        match v {
            DomainValue::Custom(json) => Ok(json),
            DomainValue::Null => Ok(serde_json::Value::Null),
            other => Err(mismatch("custom", &other)),
        }
    }
}

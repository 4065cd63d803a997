//! Domain and storage type vocabularies.
//!
//! [`DomainType`] names the types that entity fields and operation parameters
//! are declared with. [`StorageType`] is the small set of column affinities the
//! embedded store actually persists. The bridge between the two is the
//! [`ConverterRegistry`](crate::convert::ConverterRegistry).
//!
//! Domain types serialize as their lowercase names (`"i64"`, `"string"`), and
//! any unrecognized name is a custom type that must be resolved through a
//! registered converter.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A type as declared on an entity field or operation parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DomainType {
    Bool,
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
    String,
    Bytes,
    /// A user-named type with no native storage mapping (e.g. `Timestamp`).
    Custom(String),
}

impl DomainType {
    /// Returns the storage type the engine supports this domain type with
    /// natively, or `None` for custom types.
    pub fn native_storage(&self) -> Option<StorageType> {
        match self {
            DomainType::Bool
            | DomainType::I8
            | DomainType::I16
            | DomainType::I32
            | DomainType::I64 => Some(StorageType::Integer),
            DomainType::F32 | DomainType::F64 => Some(StorageType::Real),
            DomainType::String => Some(StorageType::Text),
            DomainType::Bytes => Some(StorageType::Blob),
            DomainType::Custom(_) => None,
        }
    }

    /// Returns `true` for the fixed-width integer domain types.
    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            DomainType::I8 | DomainType::I16 | DomainType::I32 | DomainType::I64
        )
    }

    /// Inclusive value range for integer domain types.
    pub fn integer_range(&self) -> Option<(i64, i64)> {
        match self {
            DomainType::I8 => Some((i8::MIN as i64, i8::MAX as i64)),
            DomainType::I16 => Some((i16::MIN as i64, i16::MAX as i64)),
            DomainType::I32 => Some((i32::MIN as i64, i32::MAX as i64)),
            DomainType::I64 => Some((i64::MIN, i64::MAX)),
            _ => None,
        }
    }

    /// The canonical name used in descriptors and diagnostics.
    pub fn name(&self) -> &str {
        match self {
            DomainType::Bool => "bool",
            DomainType::I8 => "i8",
            DomainType::I16 => "i16",
            DomainType::I32 => "i32",
            DomainType::I64 => "i64",
            DomainType::F32 => "f32",
            DomainType::F64 => "f64",
            DomainType::String => "string",
            DomainType::Bytes => "bytes",
            DomainType::Custom(name) => name,
        }
    }
}

impl fmt::Display for DomainType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DomainType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err("empty type name".to_string());
        }
        Ok(match trimmed {
            "bool" => DomainType::Bool,
            "i8" => DomainType::I8,
            "i16" => DomainType::I16,
            "i32" => DomainType::I32,
            "i64" => DomainType::I64,
            "f32" => DomainType::F32,
            "f64" => DomainType::F64,
            "string" => DomainType::String,
            "bytes" => DomainType::Bytes,
            other => DomainType::Custom(other.to_string()),
        })
    }
}

impl TryFrom<String> for DomainType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DomainType> for String {
    fn from(ty: DomainType) -> Self {
        ty.name().to_string()
    }
}

/// Column affinity persisted by the embedded store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StorageType {
    Integer,
    Real,
    Text,
    Blob,
}

impl StorageType {
    /// The SQL type name written into `CREATE TABLE`.
    pub fn sql_name(self) -> &'static str {
        match self {
            StorageType::Integer => "INTEGER",
            StorageType::Real => "REAL",
            StorageType::Text => "TEXT",
            StorageType::Blob => "BLOB",
        }
    }

    /// Parses a declared column type the way SQLite assigns affinity.
    ///
    /// Returns `None` for NUMERIC-affinity declarations, which have no exact
    /// counterpart here.
    pub fn from_declared(declared: &str) -> Option<StorageType> {
        let upper = declared.to_ascii_uppercase();
        if upper.contains("INT") {
            Some(StorageType::Integer)
        } else if upper.contains("CHAR") || upper.contains("CLOB") || upper.contains("TEXT") {
            Some(StorageType::Text)
        } else if upper.contains("BLOB") || upper.is_empty() {
            Some(StorageType::Blob)
        } else if upper.contains("REAL") || upper.contains("FLOA") || upper.contains("DOUB") {
            Some(StorageType::Real)
        } else {
            None
        }
    }
}

impl fmt::Display for StorageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.sql_name())
    }
}

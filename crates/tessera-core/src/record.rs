//! [`Record`]: one materialized entity instance or projection row.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::ConversionError;
use crate::value::DomainValue;

/// Field values in declaration order, keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    fields: IndexMap<String, DomainValue>,
}

impl Record {
    pub fn new() -> Self {
        Record::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<DomainValue>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    pub fn set(&mut self, field: impl Into<String>, value: impl Into<DomainValue>) {
        self.fields.insert(field.into(), value.into());
    }

    pub fn get(&self, field: &str) -> Option<&DomainValue> {
        self.fields.get(field)
    }

    /// Converts a field into a Rust value. A missing field reads as null.
    pub fn get_as<T>(&self, field: &str) -> Result<T, ConversionError>
    where
        T: TryFrom<DomainValue, Error = ConversionError>,
    {
        T::try_from(self.fields.get(field).cloned().unwrap_or(DomainValue::Null))
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &DomainValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl FromIterator<(String, DomainValue)> for Record {
    fn from_iter<T: IntoIterator<Item = (String, DomainValue)>>(iter: T) -> Self {
        Record {
            fields: iter.into_iter().collect(),
        }
    }
}

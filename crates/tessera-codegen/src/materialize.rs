//! Result materialization: storage rows to records and scalars.
//!
//! Readers are prepared once per result set: [`EntityReader::locate`] maps
//! each field to its column index by name, after which every row is a plain
//! indexed read through the field's converter.

use tessera_core::convert::Converter;
use tessera_core::error::ConversionError;
use tessera_core::record::Record;
use tessera_core::value::{DomainValue, StorageValue};

/// How an operation's result is produced.
#[derive(Debug, Clone)]
pub enum ResultPlan {
    Unit,
    RowCount,
    InsertedKey,
    InsertedKeys,
    /// One entity (`many == false`, absence is not an error) or a lazy
    /// sequence of them.
    Entity { reader: EntityReader, many: bool },
    Scalar { converter: Converter, many: bool },
    Rows,
}

impl ResultPlan {
    pub fn reads_rows(&self) -> bool {
        matches!(
            self,
            ResultPlan::Entity { .. } | ResultPlan::Scalar { .. } | ResultPlan::Rows
        )
    }

    pub fn is_many(&self) -> bool {
        match self {
            ResultPlan::Entity { many, .. } | ResultPlan::Scalar { many, .. } => *many,
            ResultPlan::Rows => true,
            _ => false,
        }
    }
}

/// Reads one entity field from a named result column.
#[derive(Debug, Clone)]
pub struct FieldReader {
    pub field: String,
    pub column: String,
    pub nullable: bool,
    pub converter: Converter,
}

#[derive(Debug, Clone)]
pub struct EntityReader {
    pub entity: String,
    pub fields: Vec<FieldReader>,
}

/// An [`EntityReader`] bound to the column layout of one result set.
#[derive(Debug, Clone)]
pub struct LocatedReader<'r> {
    reader: &'r EntityReader,
    /// Column index per field; `None` when the result lacks the column.
    indices: Vec<Option<usize>>,
}

impl EntityReader {
    /// Resolves field positions against the result's column names.
    pub fn locate(&self, columns: &[String]) -> LocatedReader<'_> {
        let indices = self
            .fields
            .iter()
            .map(|f| columns.iter().position(|c| c.eq_ignore_ascii_case(&f.column)))
            .collect();
        LocatedReader {
            reader: self,
            indices,
        }
    }
}

impl LocatedReader<'_> {
    pub fn read(&self, row: &[StorageValue]) -> Result<Record, ConversionError> {
        let mut record = Record::new();
        for (field, index) in self.reader.fields.iter().zip(&self.indices) {
            let stored = index.and_then(|i| row.get(i)).unwrap_or(&StorageValue::Null);
            if stored.is_null() && !field.nullable {
                return Err(ConversionError::UnexpectedNull {
                    slot: format!("field '{}.{}'", self.reader.entity, field.field),
                });
            }
            record.set(field.field.clone(), field.converter.from_storage(stored)?);
        }
        Ok(record)
    }
}

/// Reads the first column of a row as a scalar. NULL reads as
/// [`DomainValue::Null`].
pub fn read_scalar(converter: &Converter, row: &[StorageValue]) -> Result<DomainValue, ConversionError> {
    converter.from_storage(row.first().unwrap_or(&StorageValue::Null))
}

/// Untyped projection: storage values keyed by column name.
pub fn read_untyped(columns: &[String], row: Vec<StorageValue>) -> Record {
    columns
        .iter()
        .cloned()
        .zip(row.into_iter().map(|v| match v {
            StorageValue::Null => DomainValue::Null,
            StorageValue::Integer(i) => DomainValue::Integer(i),
            StorageValue::Real(r) => DomainValue::Real(r),
            StorageValue::Text(s) => DomainValue::Text(s),
            StorageValue::Blob(b) => DomainValue::Bytes(b),
        }))
        .collect()
}

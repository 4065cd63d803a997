//! Parameter binding: call arguments to storage values, in placeholder order.
//!
//! Binding is synchronous and does no I/O. Every domain value passes through
//! the converter resolved for its parameter or column at generation time.

use tessera_core::convert::Converter;
use tessera_core::error::ConversionError;
use tessera_core::record::Record;
use tessera_core::value::{DomainValue, StorageValue};

use tessera_check::{CompiledQuery, ParamBinding};

use crate::error::BindError;
use crate::structured::StructuredStatement;

/// One call argument.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Value(DomainValue),
    /// Elements of a collection parameter.
    List(Vec<DomainValue>),
    Entity(Record),
    Entities(Vec<Record>),
}

impl Arg {
    pub fn value(v: impl Into<DomainValue>) -> Self {
        Arg::Value(v.into())
    }

    pub fn list<I, T>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<DomainValue>,
    {
        Arg::List(items.into_iter().map(Into::into).collect())
    }
}

impl From<DomainValue> for Arg {
    fn from(v: DomainValue) -> Self {
        Arg::Value(v)
    }
}

impl From<Record> for Arg {
    fn from(r: Record) -> Self {
        Arg::Entity(r)
    }
}

impl From<Vec<Record>> for Arg {
    fn from(rs: Vec<Record>) -> Self {
        Arg::Entities(rs)
    }
}

/// SQL text plus the values for its `?` slots, ready to execute.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundStatement {
    pub sql: String,
    pub values: Vec<StorageValue>,
}

/// A raw query with the converter for each declared parameter.
#[derive(Debug, Clone)]
pub struct QueryBinder {
    pub query: CompiledQuery,
    /// Parallel to `query.parameters`.
    pub converters: Vec<Converter>,
}

impl QueryBinder {
    /// Converts `args` (declaration order) and lays them out in placeholder
    /// order, expanding collection parameters.
    pub fn bind(&self, args: &[Arg]) -> Result<BoundStatement, BindError> {
        let params = &self.query.parameters;
        if args.len() != params.len() {
            return Err(BindError::ArgumentCount {
                expected: params.len(),
                found: args.len(),
            });
        }

        let mut converted: Vec<Vec<StorageValue>> = Vec::with_capacity(params.len());
        for ((param, converter), arg) in params.iter().zip(&self.converters).zip(args) {
            let values = match (param.collection, arg) {
                (false, Arg::Value(v)) => vec![convert_param(param, converter, v)?],
                (true, Arg::List(vs)) => vs
                    .iter()
                    .map(|v| convert_param(param, converter, v))
                    .collect::<Result<_, _>>()?,
                (collection, _) => {
                    return Err(BindError::ArgumentKind {
                        param: param.name.clone(),
                        expected: if collection { "a list of values" } else { "a single value" },
                    })
                }
            };
            converted.push(values);
        }

        let lengths: Vec<usize> = converted.iter().map(Vec::len).collect();
        let expanded = self.query.expand(&lengths);
        let values = expanded
            .slots
            .iter()
            .filter_map(|slot| converted.get(slot.param)?.get(slot.element.unwrap_or(0)).cloned())
            .collect();
        Ok(BoundStatement {
            sql: expanded.sql,
            values,
        })
    }
}

fn convert_param(param: &ParamBinding, converter: &Converter, value: &DomainValue) -> Result<StorageValue, BindError> {
    if value.is_null() && !param.nullable {
        return Err(ConversionError::UnexpectedNull {
            slot: format!("parameter '{}'", param.name),
        }
        .into());
    }
    Ok(converter.to_storage(value)?)
}

impl StructuredStatement {
    /// Values for one execution of the statement against `entity`.
    ///
    /// A field absent from the record binds NULL when the column is
    /// nullable and is an error otherwise.
    pub fn bind(&self, entity: &Record) -> Result<Vec<StorageValue>, BindError> {
        self.columns
            .iter()
            .map(|col| match entity.get(&col.field) {
                None | Some(DomainValue::Null) if col.nullable => Ok(StorageValue::Null),
                None => Err(BindError::MissingField {
                    field: col.field.clone(),
                }),
                Some(DomainValue::Null) => Err(ConversionError::UnexpectedNull {
                    slot: format!("field '{}.{}'", self.entity, col.field),
                }
                .into()),
                Some(value) => Ok(col.converter.to_storage(value)?),
            })
            .collect()
    }

    /// The entity records carried by `args`, checked against the
    /// single/batch form of the statement.
    pub fn entities<'a>(&self, args: &'a [Arg]) -> Result<Vec<&'a Record>, BindError> {
        match args {
            [Arg::Entity(record)] if !self.batch => Ok(vec![record]),
            [Arg::Entities(records)] if self.batch => Ok(records.iter().collect()),
            [_] => Err(BindError::ArgumentKind {
                param: self.entity.clone(),
                expected: if self.batch { "a list of entities" } else { "an entity" },
            }),
            _ => Err(BindError::ArgumentCount {
                expected: 1,
                found: args.len(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_check::QueryCompiler;
    use tessera_core::contract::{OperationDescriptor, ParamDescriptor, ReturnShape};
    use tessera_core::convert::ConverterRegistry;
    use tessera_core::descriptor::{EntityDescriptor, FieldDescriptor};
    use tessera_core::schema::SchemaModel;
    use tessera_core::types::{DomainType, StorageType};

    fn schema() -> SchemaModel {
        let item = EntityDescriptor::new("Item")
            .table("items")
            .field(FieldDescriptor::new("id", DomainType::I64))
            .field(FieldDescriptor::new("name", DomainType::String))
            .field(FieldDescriptor::new("note", DomainType::String).nullable())
            .field(FieldDescriptor::new("tier", DomainType::I8))
            .auto_key("id");
        SchemaModel::build(&[item], 1, &ConverterRegistry::new()).unwrap()
    }

    fn binder(sql: &str, params: Vec<ParamDescriptor>) -> QueryBinder {
        let schema = schema();
        let query = QueryCompiler::new(&schema)
            .compile_sql("ItemDao", "q", sql, &params, &ReturnShape::EntityList("Item".into()))
            .unwrap();
        let converters = query
            .parameters
            .iter()
            .map(|p| Converter::native(&p.domain_type).unwrap())
            .collect();
        QueryBinder { query, converters }
    }

    #[test]
    fn binds_in_placeholder_order() {
        let b = binder(
            "SELECT * FROM items WHERE tier BETWEEN :low AND :high OR name = :name",
            vec![
                ParamDescriptor::value("name", DomainType::String),
                ParamDescriptor::value("high", DomainType::I8),
                ParamDescriptor::value("low", DomainType::I8),
            ],
        );
        let bound = b
            .bind(&[Arg::value("x"), Arg::value(9i8), Arg::value(1i8)])
            .unwrap();
        assert_eq!(bound.sql, "SELECT * FROM items WHERE tier BETWEEN ? AND ? OR name = ?");
        assert_eq!(
            bound.values,
            vec![
                StorageValue::Integer(1),
                StorageValue::Integer(9),
                StorageValue::Text("x".into())
            ]
        );
    }

    #[test]
    fn expands_collections() {
        let b = binder(
            "SELECT * FROM items WHERE id IN (:ids) AND tier > :min",
            vec![
                ParamDescriptor::value("ids", DomainType::I64).collection(),
                ParamDescriptor::value("min", DomainType::I8),
            ],
        );
        let bound = b.bind(&[Arg::list([4i64, 5, 6]), Arg::value(0i8)]).unwrap();
        assert_eq!(bound.sql, "SELECT * FROM items WHERE id IN (?, ?, ?) AND tier > ?");
        assert_eq!(bound.values.len(), 4);
        assert_eq!(bound.values[3], StorageValue::Integer(0));
    }

    #[test]
    fn rejects_wrong_arguments() {
        let b = binder(
            "SELECT * FROM items WHERE tier > ?",
            vec![ParamDescriptor::value("min", DomainType::I8)],
        );
        assert_eq!(
            b.bind(&[]).unwrap_err(),
            BindError::ArgumentCount { expected: 1, found: 0 }
        );
        assert!(matches!(
            b.bind(&[Arg::list([1i8])]).unwrap_err(),
            BindError::ArgumentKind { .. }
        ));
        assert!(matches!(
            b.bind(&[Arg::Value(DomainValue::Null)]).unwrap_err(),
            BindError::Conversion(ConversionError::UnexpectedNull { .. })
        ));
        assert!(matches!(
            b.bind(&[Arg::value(1000i64)]).unwrap_err(),
            BindError::Conversion(ConversionError::OutOfRange { .. })
        ));
    }

    #[test]
    fn entity_binding_follows_columns() {
        let stmt = StructuredStatement::derive(
            &schema(),
            &ConverterRegistry::new(),
            "ItemDao",
            &OperationDescriptor::insert("add", "Item", ReturnShape::InsertedKey)
                .param(ParamDescriptor::entity("item", "Item")),
        )
        .unwrap();
        let record = Record::new().with("tier", 3i8).with("name", "bolt");
        let values = stmt.bind(&record).unwrap();
        assert_eq!(
            values,
            vec![
                StorageValue::Text("bolt".into()),
                StorageValue::Null,
                StorageValue::Integer(3)
            ]
        );

        let missing = Record::new().with("tier", 3i8);
        assert_eq!(
            stmt.bind(&missing).unwrap_err(),
            BindError::MissingField { field: "name".into() }
        );
        assert!(stmt.entities(&[Arg::Entities(vec![record])]).is_err());
    }

    #[test]
    fn custom_types_use_registered_converter() {
        let mut registry = ConverterRegistry::new();
        registry
            .register(
                DomainType::Custom("Money".into()),
                StorageType::Integer,
                |v| match v {
                    DomainValue::Custom(serde_json::Value::Number(n)) => {
                        Ok(StorageValue::Integer((n.as_f64().unwrap_or(0.0) * 100.0).round() as i64))
                    }
                    other => Err(ConversionError::ValueMismatch {
                        expected: "Money".into(),
                        actual: other.kind().into(),
                    }),
                },
                |s| match s {
                    StorageValue::Integer(c) => Ok(DomainValue::Custom(serde_json::json!(*c as f64 / 100.0))),
                    other => Err(ConversionError::ValueMismatch {
                        expected: "INTEGER".into(),
                        actual: other.kind().into(),
                    }),
                },
            )
            .unwrap();
        let converter = registry
            .converter_for(&DomainType::Custom("Money".into()), &[])
            .unwrap();
        let stored = converter
            .to_storage(&DomainValue::Custom(serde_json::json!(12.5)))
            .unwrap();
        assert_eq!(stored, StorageValue::Integer(1250));
    }
}

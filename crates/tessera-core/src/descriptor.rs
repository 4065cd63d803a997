//! Entity descriptors: the pre-parsed shape of each declared data entity.
//!
//! Descriptors are plain data handed over by the metadata front end. They
//! carry no validation of their own; [`SchemaModel::build`] is the single
//! place where their invariants are checked.
//!
//! [`SchemaModel::build`]: crate::schema::SchemaModel::build

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::DomainType;

/// A declared data entity, mapped to one table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDescriptor {
    pub name: String,
    /// Table name override; defaults to `name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_name: Option<String>,
    pub fields: Vec<FieldDescriptor>,
    pub primary_key: PrimaryKeyDescriptor,
    #[serde(default)]
    pub indices: Vec<IndexDescriptor>,
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKeyDescriptor>,
}

impl EntityDescriptor {
    /// Starts a descriptor with no fields and an empty primary key.
    pub fn new(name: impl Into<String>) -> Self {
        EntityDescriptor {
            name: name.into(),
            table_name: None,
            fields: Vec::new(),
            primary_key: PrimaryKeyDescriptor::default(),
            indices: Vec::new(),
            foreign_keys: Vec::new(),
        }
    }

    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table_name = Some(table.into());
        self
    }

    pub fn field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    /// Declares a single-field auto-generated primary key.
    pub fn auto_key(mut self, field: impl Into<String>) -> Self {
        self.primary_key = PrimaryKeyDescriptor {
            fields: vec![field.into()],
            auto_generate: true,
        };
        self
    }

    /// Declares a (possibly composite) caller-assigned primary key.
    pub fn key<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary_key = PrimaryKeyDescriptor {
            fields: fields.into_iter().map(Into::into).collect(),
            auto_generate: false,
        };
        self
    }

    pub fn index(mut self, index: IndexDescriptor) -> Self {
        self.indices.push(index);
        self
    }

    pub fn foreign_key(mut self, fk: ForeignKeyDescriptor) -> Self {
        self.foreign_keys.push(fk);
        self
    }

    /// The table this entity maps to.
    pub fn effective_table_name(&self) -> &str {
        self.table_name.as_deref().unwrap_or(&self.name)
    }

    pub fn find_field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// One declared field of an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub domain_type: DomainType,
    #[serde(default)]
    pub nullable: bool,
    /// Column name override; defaults to `name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column_name: Option<String>,
    /// SQL default expression, written verbatim into DDL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, domain_type: DomainType) -> Self {
        FieldDescriptor {
            name: name.into(),
            domain_type,
            nullable: false,
            column_name: None,
            default: None,
        }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.column_name = Some(column.into());
        self
    }

    pub fn default_value(mut self, expr: impl Into<String>) -> Self {
        self.default = Some(expr.into());
        self
    }

    pub fn effective_column_name(&self) -> &str {
        self.column_name.as_deref().unwrap_or(&self.name)
    }
}

/// Primary key declaration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimaryKeyDescriptor {
    pub fields: Vec<String>,
    #[serde(default)]
    pub auto_generate: bool,
}

/// An indexed group of fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub fields: Vec<String>,
    #[serde(default)]
    pub unique: bool,
}

impl IndexDescriptor {
    pub fn on<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        IndexDescriptor {
            name: None,
            fields: fields.into_iter().map(Into::into).collect(),
            unique: false,
        }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Reference from some fields of this entity to fields of a parent entity.
///
/// The parent is named, not held: it is resolved by lookup in the schema
/// model so descriptors never form reference cycles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyDescriptor {
    pub parent_entity: String,
    pub parent_fields: Vec<String>,
    pub child_fields: Vec<String>,
    #[serde(default)]
    pub on_delete: ForeignKeyAction,
    #[serde(default)]
    pub on_update: ForeignKeyAction,
    #[serde(default)]
    pub deferred: bool,
}

impl ForeignKeyDescriptor {
    pub fn new<I, S, J, T>(parent_entity: impl Into<String>, parent_fields: I, child_fields: J) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        J: IntoIterator<Item = T>,
        T: Into<String>,
    {
        ForeignKeyDescriptor {
            parent_entity: parent_entity.into(),
            parent_fields: parent_fields.into_iter().map(Into::into).collect(),
            child_fields: child_fields.into_iter().map(Into::into).collect(),
            on_delete: ForeignKeyAction::NoAction,
            on_update: ForeignKeyAction::NoAction,
            deferred: false,
        }
    }

    pub fn on_delete(mut self, action: ForeignKeyAction) -> Self {
        self.on_delete = action;
        self
    }
}

/// Referential action for foreign keys.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForeignKeyAction {
    #[default]
    NoAction,
    Restrict,
    SetNull,
    SetDefault,
    Cascade,
}

impl ForeignKeyAction {
    pub fn sql(self) -> &'static str {
        match self {
            ForeignKeyAction::NoAction => "NO ACTION",
            ForeignKeyAction::Restrict => "RESTRICT",
            ForeignKeyAction::SetNull => "SET NULL",
            ForeignKeyAction::SetDefault => "SET DEFAULT",
            ForeignKeyAction::Cascade => "CASCADE",
        }
    }

    /// Parses the spelling SQLite reports in `PRAGMA foreign_key_list`.
    pub fn from_sql(s: &str) -> Option<ForeignKeyAction> {
        match s.to_ascii_uppercase().as_str() {
            "NO ACTION" => Some(ForeignKeyAction::NoAction),
            "RESTRICT" => Some(ForeignKeyAction::Restrict),
            "SET NULL" => Some(ForeignKeyAction::SetNull),
            "SET DEFAULT" => Some(ForeignKeyAction::SetDefault),
            "CASCADE" => Some(ForeignKeyAction::Cascade),
            _ => None,
        }
    }
}

impl fmt::Display for ForeignKeyAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.sql())
    }
}

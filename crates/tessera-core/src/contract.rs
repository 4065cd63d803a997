//! Access-object contracts: declared data-access operations without an
//! execution implementation.
//!
//! Each [`OperationDescriptor`] is either a raw query (free-form SQL text that
//! the query compiler validates) or a structured insert/update/delete whose
//! statement is derived from an entity's table definition.

use serde::{Deserialize, Serialize};

use crate::types::DomainType;

/// A named set of declared operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessObjectContract {
    pub name: String,
    pub operations: Vec<OperationDescriptor>,
}

impl AccessObjectContract {
    pub fn new(name: impl Into<String>) -> Self {
        AccessObjectContract {
            name: name.into(),
            operations: Vec::new(),
        }
    }

    pub fn operation(mut self, op: OperationDescriptor) -> Self {
        self.operations.push(op);
        self
    }

    pub fn find(&self, name: &str) -> Option<&OperationDescriptor> {
        self.operations.iter().find(|op| op.name == name)
    }
}

/// One declared method of a contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationDescriptor {
    pub name: String,
    pub kind: OperationKind,
    #[serde(default)]
    pub params: Vec<ParamDescriptor>,
    pub returns: ReturnShape,
}

impl OperationDescriptor {
    pub fn query(name: impl Into<String>, sql: impl Into<String>, returns: ReturnShape) -> Self {
        OperationDescriptor {
            name: name.into(),
            kind: OperationKind::RawQuery { sql: sql.into() },
            params: Vec::new(),
            returns,
        }
    }

    pub fn insert(name: impl Into<String>, entity: impl Into<String>, returns: ReturnShape) -> Self {
        OperationDescriptor {
            name: name.into(),
            kind: OperationKind::Insert {
                entity: entity.into(),
                on_conflict: ConflictStrategy::Abort,
            },
            params: Vec::new(),
            returns,
        }
    }

    pub fn update(name: impl Into<String>, entity: impl Into<String>, returns: ReturnShape) -> Self {
        OperationDescriptor {
            name: name.into(),
            kind: OperationKind::Update {
                entity: entity.into(),
                on_conflict: ConflictStrategy::Abort,
            },
            params: Vec::new(),
            returns,
        }
    }

    pub fn delete(name: impl Into<String>, entity: impl Into<String>, returns: ReturnShape) -> Self {
        OperationDescriptor {
            name: name.into(),
            kind: OperationKind::Delete {
                entity: entity.into(),
            },
            params: Vec::new(),
            returns,
        }
    }

    pub fn param(mut self, param: ParamDescriptor) -> Self {
        self.params.push(param);
        self
    }

    /// Replaces the conflict strategy of a structured insert or update.
    pub fn on_conflict(mut self, strategy: ConflictStrategy) -> Self {
        match &mut self.kind {
            OperationKind::Insert { on_conflict, .. } | OperationKind::Update { on_conflict, .. } => {
                *on_conflict = strategy;
            }
            OperationKind::RawQuery { .. } | OperationKind::Delete { .. } => {}
        }
        self
    }

    /// The entity a structured operation targets.
    pub fn target_entity(&self) -> Option<&str> {
        match &self.kind {
            OperationKind::Insert { entity, .. }
            | OperationKind::Update { entity, .. }
            | OperationKind::Delete { entity } => Some(entity),
            OperationKind::RawQuery { .. } => None,
        }
    }
}

/// What an operation does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    RawQuery {
        sql: String,
    },
    Insert {
        entity: String,
        #[serde(default)]
        on_conflict: ConflictStrategy,
    },
    Update {
        entity: String,
        #[serde(default)]
        on_conflict: ConflictStrategy,
    },
    Delete {
        entity: String,
    },
}

/// SQLite conflict resolution clause for structured writes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStrategy {
    #[default]
    Abort,
    Replace,
    Ignore,
    Rollback,
    Fail,
}

impl ConflictStrategy {
    pub fn sql(self) -> &'static str {
        match self {
            ConflictStrategy::Abort => "ABORT",
            ConflictStrategy::Replace => "REPLACE",
            ConflictStrategy::Ignore => "IGNORE",
            ConflictStrategy::Rollback => "ROLLBACK",
            ConflictStrategy::Fail => "FAIL",
        }
    }
}

/// A declared method parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: ParamType,
    #[serde(default)]
    pub nullable: bool,
    /// The argument is a sequence of `ty`.
    #[serde(default)]
    pub collection: bool,
}

impl ParamDescriptor {
    pub fn value(name: impl Into<String>, ty: DomainType) -> Self {
        ParamDescriptor {
            name: name.into(),
            ty: ParamType::Value(ty),
            nullable: false,
            collection: false,
        }
    }

    pub fn entity(name: impl Into<String>, entity: impl Into<String>) -> Self {
        ParamDescriptor {
            name: name.into(),
            ty: ParamType::Entity(entity.into()),
            nullable: false,
            collection: false,
        }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn collection(mut self) -> Self {
        self.collection = true;
        self
    }
}

/// The declared type of a parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamType {
    Value(DomainType),
    Entity(String),
}

/// Declared result of an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnShape {
    Void,
    RowCount,
    InsertedKey,
    InsertedKeys,
    /// At most one entity; absence is a not-found signal, not an error.
    Entity(String),
    /// A lazy, single-pass sequence of entities.
    EntityList(String),
    Scalar(DomainType),
    ScalarList(DomainType),
    /// Untyped projection records keyed by result column name.
    Rows,
}

impl ReturnShape {
    /// Returns `true` if the shape consumes a result set.
    pub fn reads_rows(&self) -> bool {
        matches!(
            self,
            ReturnShape::Entity(_)
                | ReturnShape::EntityList(_)
                | ReturnShape::Scalar(_)
                | ReturnShape::ScalarList(_)
                | ReturnShape::Rows
        )
    }
}

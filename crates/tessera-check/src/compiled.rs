//! The immutable output of query compilation.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tessera_core::types::DomainType;

/// A validated raw query bound to its declaring operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledQuery {
    pub contract: String,
    pub operation: String,
    /// Normalized SQL: placeholders rewritten to `?NNN`, where `NNN` is the
    /// 1-based index of the declared parameter.
    pub sql: String,
    pub(crate) pieces: Vec<SqlPiece>,
    /// Declared parameters, in declaration order.
    pub parameters: Vec<ParamBinding>,
    pub kind: StatementKind,
    /// Schema tables the statement references.
    pub tables: BTreeSet<String>,
    /// The table a write statement modifies.
    pub written_table: Option<String>,
    /// Inferred result column names; empty for writes without `RETURNING`.
    pub result_columns: Vec<String>,
    pub mapping: ResultMapping,
}

/// A segment of normalized SQL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) enum SqlPiece {
    Text(String),
    /// One placeholder occurrence bound to the parameter at this index.
    Slot(usize),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamBinding {
    pub name: String,
    pub domain_type: DomainType,
    pub nullable: bool,
    /// Expanded into one placeholder per element at execution time.
    pub collection: bool,
    /// How many placeholders in the text bind this parameter.
    pub occurrences: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementKind {
    Read,
    Insert,
    Update,
    Delete,
}

impl StatementKind {
    pub fn is_write(self) -> bool {
        !matches!(self, StatementKind::Read)
    }
}

/// How result rows (or the absence of them) map onto the declared return.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultMapping {
    /// Nothing is returned.
    None,
    RowCount,
    InsertedKey,
    Entity {
        entity: String,
        fields: Vec<FieldMapping>,
        many: bool,
    },
    Scalar {
        domain_type: DomainType,
        many: bool,
    },
    /// Untyped records keyed by result column name.
    Rows,
}

/// Reads entity field `field` from the result column named `column`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMapping {
    pub field: String,
    pub column: String,
}

/// SQL ready to prepare, with the argument feeding each `?` in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundSql {
    pub sql: String,
    pub slots: Vec<BindSlot>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindSlot {
    pub param: usize,
    /// Element index for collection parameters.
    pub element: Option<usize>,
}

impl CompiledQuery {
    /// Renders the SQL for one call. `lengths[i]` is the number of elements
    /// passed for collection parameter `i` (ignored for scalar parameters).
    pub fn expand(&self, lengths: &[usize]) -> BoundSql {
        let mut sql = String::new();
        let mut slots = Vec::new();
        for piece in &self.pieces {
            match piece {
                SqlPiece::Text(text) => sql.push_str(text),
                SqlPiece::Slot(param) => {
                    let collection = self
                        .parameters
                        .get(*param)
                        .is_some_and(|p| p.collection);
                    if collection {
                        let n = lengths.get(*param).copied().unwrap_or(0);
                        for element in 0..n {
                            if element > 0 {
                                sql.push_str(", ");
                            }
                            sql.push('?');
                            slots.push(BindSlot {
                                param: *param,
                                element: Some(element),
                            });
                        }
                    } else {
                        sql.push('?');
                        slots.push(BindSlot {
                            param: *param,
                            element: None,
                        });
                    }
                }
            }
        }
        BoundSql { sql, slots }
    }

    /// Whether the query can run with the normalized `sql` as is.
    pub fn is_static(&self) -> bool {
        self.parameters.iter().all(|p| !p.collection)
    }

    pub fn returns_rows(&self) -> bool {
        matches!(
            self.mapping,
            ResultMapping::Entity { .. } | ResultMapping::Scalar { .. } | ResultMapping::Rows
        )
    }
}

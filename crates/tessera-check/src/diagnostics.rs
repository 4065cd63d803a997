//! Query diagnostics.
//!
//! [`QueryError`] ties a [`QueryErrorKind`] to the contract operation it was
//! found in. All variants are build-time failures: a query that produces one
//! never reaches the runtime.

use serde::{Deserialize, Serialize};

/// A query validation failure located at one contract operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{contract}.{operation}: {kind}")]
pub struct QueryError {
    pub contract: String,
    pub operation: String,
    pub kind: QueryErrorKind,
}

impl QueryError {
    pub fn new(contract: impl Into<String>, operation: impl Into<String>, kind: QueryErrorKind) -> Self {
        QueryError {
            contract: contract.into(),
            operation: operation.into(),
            kind,
        }
    }
}

/// What was wrong with the query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "error", rename_all = "snake_case")]
pub enum QueryErrorKind {
    /// Placeholder count does not match the declared parameter count.
    #[error("query has {placeholders} placeholder(s) but the method declares {parameters} parameter(s)")]
    ParameterArity {
        placeholders: usize,
        parameters: usize,
    },

    /// A column name does not resolve against any table in scope.
    #[error("unknown column '{column}'{}", table.as_ref().map(|t| format!(" in table '{}'", t)).unwrap_or_default())]
    UnknownColumn {
        column: String,
        table: Option<String>,
    },

    /// A bare column name is carried by more than one table in scope.
    #[error("ambiguous column name '{column}'")]
    AmbiguousColumn { column: String },

    /// A table, alias or join target does not resolve.
    #[error("unknown table '{table}'")]
    UnknownTable { table: String },

    /// A named placeholder does not match any declared parameter.
    #[error("placeholder '{name}' does not match any declared parameter")]
    UnknownParameter { name: String },

    /// A declared parameter cannot be bound by a raw query.
    #[error("parameter '{name}' cannot be bound: {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("syntax error: {message}")]
    Syntax { message: String },

    #[error("unsupported statement: {statement}")]
    UnsupportedStatement { statement: String },

    /// The declared return shape does not fit what the query produces.
    #[error("declared return {declared} does not fit the query: {reason}")]
    ResultShape { declared: String, reason: String },
}

impl QueryErrorKind {
    pub(crate) fn syntax(message: impl Into<String>) -> Self {
        QueryErrorKind::Syntax {
            message: message.into(),
        }
    }

    pub(crate) fn unknown_column(column: impl Into<String>, table: Option<&str>) -> Self {
        QueryErrorKind::UnknownColumn {
            column: column.into(),
            table: table.map(str::to_string),
        }
    }

    pub(crate) fn ambiguous_column(column: impl Into<String>) -> Self {
        QueryErrorKind::AmbiguousColumn {
            column: column.into(),
        }
    }

    pub(crate) fn unknown_table(table: impl Into<String>) -> Self {
        QueryErrorKind::UnknownTable {
            table: table.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_operation() {
        let err = QueryError::new(
            "ItemDao",
            "by_price",
            QueryErrorKind::ParameterArity {
                placeholders: 1,
                parameters: 2,
            },
        );
        assert_eq!(
            err.to_string(),
            "ItemDao.by_price: query has 1 placeholder(s) but the method declares 2 parameter(s)"
        );
    }

    #[test]
    fn unknown_column_mentions_table_when_known() {
        let kind = QueryErrorKind::unknown_column("cost", Some("items"));
        assert_eq!(kind.to_string(), "unknown column 'cost' in table 'items'");
        let kind = QueryErrorKind::unknown_column("cost", None);
        assert_eq!(kind.to_string(), "unknown column 'cost'");
    }

    #[test]
    fn serializes_with_tag() {
        let kind = QueryErrorKind::unknown_table("ghosts");
        let json = serde_json::to_value(&kind).unwrap();
        assert_eq!(json["error"], "unknown_table");
        assert_eq!(json["table"], "ghosts");
    }
}

//! Raw query compilation.
//!
//! [`QueryCompiler::compile`] runs the full pipeline for one raw-query
//! operation:
//!
//! 1. tokenize and bind placeholders to declared parameters (arity first);
//! 2. parse the statement structure;
//! 3. resolve every table and column against the schema model;
//! 4. check the declared return shape against the inferred result;
//! 5. freeze the result into a [`CompiledQuery`].

use std::collections::HashMap;

use tessera_core::contract::{OperationDescriptor, OperationKind, ParamDescriptor, ParamType, ReturnShape};
use tessera_core::schema::SchemaModel;
use crate::compiled::{CompiledQuery, FieldMapping, ParamBinding, ResultMapping, SqlPiece, StatementKind};
use crate::diagnostics::{QueryError, QueryErrorKind};
use crate::parse::{parse_statement, ParseError};
use crate::resolve::{resolve_statement, Resolution, Target};
use crate::tokens::{tokenize, Placeholder, Tok, TokKind};

/// Compiles raw queries against one schema model.
#[derive(Debug, Clone, Copy)]
pub struct QueryCompiler<'s> {
    schema: &'s SchemaModel,
}

impl<'s> QueryCompiler<'s> {
    pub fn new(schema: &'s SchemaModel) -> Self {
        QueryCompiler { schema }
    }

    /// Compiles a raw-query operation of `contract`.
    ///
    /// Structured operations are rejected with
    /// [`QueryErrorKind::UnsupportedStatement`]; they are derived from table
    /// definitions instead of query text.
    pub fn compile(&self, contract: &str, op: &OperationDescriptor) -> Result<CompiledQuery, QueryError> {
        match &op.kind {
            OperationKind::RawQuery { sql } => {
                self.compile_sql(contract, &op.name, sql, &op.params, &op.returns)
            }
            _ => Err(QueryError::new(
                contract,
                &op.name,
                QueryErrorKind::UnsupportedStatement {
                    statement: "structured operation has no query text".to_string(),
                },
            )),
        }
    }

    pub fn compile_sql(
        &self,
        contract: &str,
        operation: &str,
        sql: &str,
        params: &[ParamDescriptor],
        returns: &ReturnShape,
    ) -> Result<CompiledQuery, QueryError> {
        self.compile_inner(contract, operation, sql, params, returns)
            .map_err(|kind| QueryError::new(contract, operation, kind))
    }

    fn compile_inner(
        &self,
        contract: &str,
        operation: &str,
        sql: &str,
        params: &[ParamDescriptor],
        returns: &ReturnShape,
    ) -> Result<CompiledQuery, QueryErrorKind> {
        let mut toks: Vec<Tok> = tokenize(sql).map_err(QueryErrorKind::syntax)?;
        // one terminating `;` is allowed; anything after it is a second statement
        if toks.last().is_some_and(|t| t.is(&TokKind::Semicolon)) {
            toks.pop();
        }

        let parameters = value_parameters(params)?;
        let slots = bind_placeholders(&toks, params)?;

        let stmt = parse_statement(&toks).map_err(|e| match e {
            ParseError::Syntax(message) => QueryErrorKind::Syntax { message },
            ParseError::Unsupported(statement) => QueryErrorKind::UnsupportedStatement { statement },
        })?;
        let resolution = resolve_statement(self.schema, &stmt)?;
        let mapping = map_result(self.schema, contract, operation, returns, &resolution)?;

        let (kind, written_table) = match &resolution.target {
            Target::Read => (StatementKind::Read, None),
            Target::Insert { table } => (StatementKind::Insert, Some(table.clone())),
            Target::Update { table } => (StatementKind::Update, Some(table.clone())),
            Target::Delete { table } => (StatementKind::Delete, Some(table.clone())),
        };

        let pieces = build_pieces(&toks, &slots);
        let normalized = render_numbered(&pieces);
        let mut parameters = parameters;
        for slot in &slots {
            parameters[*slot].occurrences += 1;
        }

        tracing::debug!(
            contract,
            operation,
            sql = %normalized,
            tables = ?resolution.tables,
            "compiled query"
        );

        Ok(CompiledQuery {
            contract: contract.to_string(),
            operation: operation.to_string(),
            sql: normalized,
            pieces,
            parameters,
            kind,
            tables: resolution.tables.clone(),
            written_table,
            result_columns: resolution
                .projection
                .as_ref()
                .map(|p| p.names())
                .unwrap_or_default(),
            mapping,
        })
    }
}

/// Raw queries bind plain values only.
fn value_parameters(params: &[ParamDescriptor]) -> Result<Vec<ParamBinding>, QueryErrorKind> {
    params
        .iter()
        .map(|p| match &p.ty {
            ParamType::Value(domain_type) => Ok(ParamBinding {
                name: p.name.clone(),
                domain_type: domain_type.clone(),
                nullable: p.nullable,
                collection: p.collection,
                occurrences: 0,
            }),
            ParamType::Entity(entity) => Err(QueryErrorKind::InvalidParameter {
                name: p.name.clone(),
                reason: format!("raw queries bind values, not '{}' entities", entity),
            }),
        })
        .collect()
}

/// Maps every placeholder occurrence, in text order, to a parameter index.
fn bind_placeholders(toks: &[Tok], params: &[ParamDescriptor]) -> Result<Vec<usize>, QueryErrorKind> {
    let found: Vec<&Placeholder> = toks
        .iter()
        .filter_map(|t| match &t.kind {
            TokKind::Placeholder(p) => Some(p),
            _ => None,
        })
        .collect();

    let Some(first) = found.first() else {
        return if params.is_empty() {
            Ok(Vec::new())
        } else {
            Err(QueryErrorKind::ParameterArity {
                placeholders: 0,
                parameters: params.len(),
            })
        };
    };
    if let Some(other) = found
        .iter()
        .find(|p| std::mem::discriminant(**p) != std::mem::discriminant(*first))
    {
        return Err(QueryErrorKind::syntax(format!(
            "cannot mix {} and {} placeholders",
            first.form(),
            other.form()
        )));
    }

    let arity = |placeholders: usize| {
        if placeholders == params.len() {
            Ok(())
        } else {
            Err(QueryErrorKind::ParameterArity {
                placeholders,
                parameters: params.len(),
            })
        }
    };

    match first {
        Placeholder::Positional => {
            arity(found.len())?;
            Ok((0..found.len()).collect())
        }
        Placeholder::Numbered(_) => {
            let mut distinct: Vec<usize> = found
                .iter()
                .filter_map(|p| match p {
                    Placeholder::Numbered(n) => Some(*n),
                    _ => None,
                })
                .collect();
            let in_order = distinct.clone();
            distinct.sort_unstable();
            distinct.dedup();
            arity(distinct.len())?;
            if let Some(n) = distinct.iter().find(|n| **n > params.len()) {
                return Err(QueryErrorKind::UnknownParameter {
                    name: format!("?{}", n),
                });
            }
            Ok(in_order.into_iter().map(|n| n - 1).collect())
        }
        Placeholder::Named(_) => {
            let names: Vec<&str> = found
                .iter()
                .filter_map(|p| match p {
                    Placeholder::Named(n) => Some(n.as_str()),
                    _ => None,
                })
                .collect();
            let mut distinct: Vec<&str> = Vec::new();
            for name in &names {
                if !distinct.contains(name) {
                    distinct.push(name);
                }
            }
            arity(distinct.len())?;
            let index: HashMap<&str, usize> = params
                .iter()
                .enumerate()
                .map(|(i, p)| (p.name.as_str(), i))
                .collect();
            names
                .into_iter()
                .map(|name| {
                    index
                        .get(name)
                        .copied()
                        .ok_or_else(|| QueryErrorKind::UnknownParameter {
                            name: name.to_string(),
                        })
                })
                .collect()
        }
    }
}

fn build_pieces(toks: &[Tok], slots: &[usize]) -> Vec<SqlPiece> {
    let mut pieces = Vec::new();
    let mut text = String::new();
    let mut next_slot = slots.iter();
    for tok in toks {
        if tok.space_before && !(text.is_empty() && pieces.is_empty()) {
            text.push(' ');
        }
        if tok.is(&TokKind::Placeholder(Placeholder::Positional)) {
            if let Some(slot) = next_slot.next() {
                pieces.push(SqlPiece::Text(std::mem::take(&mut text)));
                pieces.push(SqlPiece::Slot(*slot));
                continue;
            }
        }
        text.push_str(&tok.text);
    }
    if !text.is_empty() {
        pieces.push(SqlPiece::Text(text));
    }
    pieces
}

fn render_numbered(pieces: &[SqlPiece]) -> String {
    let mut out = String::new();
    for piece in pieces {
        match piece {
            SqlPiece::Text(text) => out.push_str(text),
            SqlPiece::Slot(param) => {
                out.push('?');
                out.push_str(&(param + 1).to_string());
            }
        }
    }
    out
}

fn describe(returns: &ReturnShape) -> String {
    match returns {
        ReturnShape::Void => "void".to_string(),
        ReturnShape::RowCount => "row_count".to_string(),
        ReturnShape::InsertedKey => "inserted_key".to_string(),
        ReturnShape::InsertedKeys => "inserted_keys".to_string(),
        ReturnShape::Entity(e) => format!("entity({})", e),
        ReturnShape::EntityList(e) => format!("entity_list({})", e),
        ReturnShape::Scalar(t) => format!("scalar({})", t),
        ReturnShape::ScalarList(t) => format!("scalar_list({})", t),
        ReturnShape::Rows => "rows".to_string(),
    }
}

/// Checks the declared return shape against the resolved statement.
fn map_result(
    schema: &SchemaModel,
    contract: &str,
    operation: &str,
    returns: &ReturnShape,
    resolution: &Resolution,
) -> Result<ResultMapping, QueryErrorKind> {
    let shape_error = |reason: String| QueryErrorKind::ResultShape {
        declared: describe(returns),
        reason,
    };
    let is_write = resolution.target != Target::Read;
    let projection = || {
        resolution
            .projection
            .as_ref()
            .ok_or_else(|| shape_error("the statement returns no rows".to_string()))
    };

    match returns {
        ReturnShape::Void | ReturnShape::RowCount if !is_write => Err(shape_error(
            "only write statements can return nothing or a row count".to_string(),
        )),
        ReturnShape::Void => Ok(ResultMapping::None),
        ReturnShape::RowCount => Ok(ResultMapping::RowCount),
        ReturnShape::InsertedKey => match resolution.target {
            Target::Insert { .. } => Ok(ResultMapping::InsertedKey),
            _ => Err(shape_error("only an INSERT produces a generated key".to_string())),
        },
        ReturnShape::InsertedKeys => Err(shape_error(
            "a single statement yields at most one generated key".to_string(),
        )),
        ReturnShape::Entity(entity) | ReturnShape::EntityList(entity) => {
            let projection = projection()?;
            let table = schema
                .table(entity)
                .ok_or_else(|| shape_error(format!("unknown entity '{}'", entity)))?;
            let mut fields = Vec::with_capacity(table.columns.len());
            for column in &table.columns {
                let found = projection
                    .columns
                    .iter()
                    .find(|c| c.name.eq_ignore_ascii_case(&column.name));
                match found {
                    Some(c) => fields.push(FieldMapping {
                        field: column.field.clone(),
                        column: c.name.clone(),
                    }),
                    None if projection.open => fields.push(FieldMapping {
                        field: column.field.clone(),
                        column: column.name.clone(),
                    }),
                    None if column.nullable => {}
                    None => {
                        return Err(shape_error(format!(
                            "result has no column for non-nullable field '{}'",
                            column.field
                        )))
                    }
                }
            }
            for extra in projection
                .columns
                .iter()
                .filter(|c| table.column(&c.name).is_none())
            {
                tracing::warn!(
                    contract,
                    operation,
                    column = %extra.name,
                    entity = %entity,
                    "result column does not match any entity field and is ignored"
                );
            }
            Ok(ResultMapping::Entity {
                entity: entity.clone(),
                fields,
                many: matches!(returns, ReturnShape::EntityList(_)),
            })
        }
        ReturnShape::Scalar(domain_type) | ReturnShape::ScalarList(domain_type) => {
            let projection = projection()?;
            if !projection.open && projection.columns.len() != 1 {
                return Err(shape_error(format!(
                    "expected exactly one result column, found {}",
                    projection.columns.len()
                )));
            }
            Ok(ResultMapping::Scalar {
                domain_type: domain_type.clone(),
                many: matches!(returns, ReturnShape::ScalarList(_)),
            })
        }
        ReturnShape::Rows => {
            projection()?;
            Ok(ResultMapping::Rows)
        }
    }
}

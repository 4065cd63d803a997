//! Structural SQL parser.
//!
//! Parses the statement forms the compiler accepts into a tree that keeps
//! exactly what name resolution needs: table sources, projections, column
//! references and nested queries. Expressions are not parsed into operator
//! trees; an [`Expr`] is the list of references found in its token span.

use crate::tokens::{Tok, TokKind};

/// Parse failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    Syntax(String),
    Unsupported(String),
}

type PResult<T> = Result<T, ParseError>;

fn syntax<T>(message: impl Into<String>) -> PResult<T> {
    Err(ParseError::Syntax(message.into()))
}

// ---------------------------------------------------------------------------
// Tree
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Query(Query),
    Insert(Insert),
    Update(Update),
    Delete(Delete),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub ctes: Vec<Cte>,
    /// Compound members; a plain select has exactly one.
    pub body: Vec<SelectCore>,
    pub order_by: Vec<Expr>,
    pub limit: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cte {
    pub name: String,
    pub columns: Vec<String>,
    pub query: Query,
    pub recursive: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SelectCore {
    Select {
        items: Vec<SelectItem>,
        from: Vec<FromItem>,
        filter: Option<Expr>,
        group_by: Vec<Expr>,
        having: Option<Expr>,
        windows: Vec<Expr>,
    },
    Values(Vec<Vec<Expr>>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SelectItem {
    Wildcard,
    QualifiedWildcard(String),
    Expr { expr: Expr, alias: Option<String> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct FromItem {
    pub source: TableSource,
    pub constraint: Option<JoinConstraint>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TableSource {
    Table {
        name: String,
        alias: Option<String>,
    },
    Subquery {
        query: Box<Query>,
        alias: Option<String>,
    },
    /// Table-valued function such as `json_each(...)`.
    Function {
        name: String,
        args: Vec<Expr>,
        alias: Option<String>,
    },
    Nested(Vec<FromItem>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum JoinConstraint {
    On(Expr),
    Using(Vec<String>),
    /// `NATURAL` join: shared column names are merged.
    Natural,
}

/// The references found in one expression span.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Expr {
    pub refs: Vec<ExprRef>,
    /// Source text, whitespace collapsed.
    pub text: String,
    /// Set when the whole expression is one (possibly qualified) column.
    pub single_column: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprRef {
    Column {
        qualifier: Option<String>,
        name: String,
        /// Unquoted word that may be a keyword rather than a column.
        keyword: bool,
    },
    Subquery(Box<Query>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Insert {
    pub ctes: Vec<Cte>,
    pub table: String,
    pub alias: Option<String>,
    pub columns: Vec<String>,
    pub source: InsertSource,
    pub upserts: Vec<Upsert>,
    pub returning: Vec<SelectItem>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InsertSource {
    Values(Vec<Vec<Expr>>),
    Query(Box<Query>),
    DefaultValues,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Upsert {
    pub target: Vec<Expr>,
    pub target_filter: Option<Expr>,
    pub action: UpsertAction,
}

#[derive(Debug, Clone, PartialEq)]
pub enum UpsertAction {
    Nothing,
    Update {
        assignments: Vec<Assignment>,
        filter: Option<Expr>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub columns: Vec<String>,
    pub value: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    pub ctes: Vec<Cte>,
    pub table: String,
    pub alias: Option<String>,
    pub assignments: Vec<Assignment>,
    pub from: Vec<FromItem>,
    pub filter: Option<Expr>,
    pub returning: Vec<SelectItem>,
    pub trailing: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Delete {
    pub ctes: Vec<Cte>,
    pub table: String,
    pub alias: Option<String>,
    pub filter: Option<Expr>,
    pub returning: Vec<SelectItem>,
    pub trailing: Vec<Expr>,
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

/// Parses one statement, optionally followed by `;`.
pub fn parse_statement(toks: &[Tok]) -> PResult<Statement> {
    let mut p = Parser { toks, pos: 0 };
    let stmt = p.statement()?;
    let terminated = p.eat(&TokKind::Semicolon);
    if let Some(tok) = p.peek() {
        if terminated || p.at_statement_start() {
            return Err(ParseError::Unsupported(
                "multiple statements in one query".to_string(),
            ));
        }
        return syntax(format!("unexpected '{}'", tok.text));
    }
    Ok(stmt)
}

struct Parser<'t> {
    toks: &'t [Tok],
    pos: usize,
}

/// The join keywords that may start a join operator.
const JOIN_WORDS: &[&str] = &["JOIN", "INNER", "LEFT", "RIGHT", "FULL", "CROSS", "NATURAL"];

/// Words that end an expression at paren depth zero.
const EXPR_STOP: &[&str] = &[
    "AS", "FROM", "WHERE", "GROUP", "HAVING", "ORDER", "LIMIT", "OFFSET", "UNION", "INTERSECT",
    "EXCEPT", "WINDOW", "RETURNING", "SET", "VALUES", "ON", "USING", "JOIN", "INNER", "LEFT",
    "RIGHT", "FULL", "CROSS", "NATURAL", "DO",
];

impl<'t> Parser<'t> {
    fn peek(&self) -> Option<&'t Tok> {
        self.toks.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&'t Tok> {
        self.toks.get(self.pos + offset)
    }

    fn bump(&mut self) -> Option<&'t Tok> {
        let tok = self.toks.get(self.pos);
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn at_kw(&self, kw: &str) -> bool {
        self.peek().is_some_and(|t| t.is_kw(kw))
    }

    fn at_any_kw(&self, kws: &[&str]) -> bool {
        kws.iter().any(|k| self.at_kw(k))
    }

    fn eat_kw(&mut self, kw: &str) -> bool {
        if self.at_kw(kw) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_kw(&mut self, kw: &str) -> PResult<()> {
        if self.eat_kw(kw) {
            Ok(())
        } else {
            syntax(format!("expected {} {}", kw, self.found()))
        }
    }

    fn at(&self, kind: &TokKind) -> bool {
        self.peek().is_some_and(|t| t.is(kind))
    }

    fn eat(&mut self, kind: &TokKind) -> bool {
        if self.at(kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokKind, what: &str) -> PResult<()> {
        if self.eat(kind) {
            Ok(())
        } else {
            syntax(format!("expected {} {}", what, self.found()))
        }
    }

    fn found(&self) -> String {
        match self.peek() {
            Some(tok) => format!("near '{}'", tok.text),
            None => "at end of query".to_string(),
        }
    }

    fn at_statement_start(&self) -> bool {
        self.at_any_kw(&["SELECT", "WITH", "VALUES", "INSERT", "REPLACE", "UPDATE", "DELETE"])
    }

    fn at_query_start(&self) -> bool {
        self.at_any_kw(&["SELECT", "WITH", "VALUES"])
    }

    /// Any identifier, quoted or not.
    fn ident(&mut self, what: &str) -> PResult<String> {
        match self.peek() {
            Some(Tok {
                kind: TokKind::Word { value, .. },
                ..
            }) => {
                self.pos += 1;
                Ok(value.clone())
            }
            _ => syntax(format!("expected {} {}", what, self.found())),
        }
    }

    /// `[schema .] name`, returning the unqualified name.
    fn object_name(&mut self, what: &str) -> PResult<String> {
        let mut name = self.ident(what)?;
        if self.at(&TokKind::Period) && self.peek_at(1).is_some_and(|t| t.word().is_some()) {
            self.pos += 1;
            name = self.ident(what)?;
        }
        Ok(name)
    }

    fn ident_list(&mut self, what: &str) -> PResult<Vec<String>> {
        self.expect(&TokKind::LParen, "'('")?;
        let mut names = vec![self.ident(what)?];
        while self.eat(&TokKind::Comma) {
            names.push(self.ident(what)?);
        }
        self.expect(&TokKind::RParen, "')'")?;
        Ok(names)
    }

    /// `[AS] alias`; an implicit alias must not be a reserved word.
    fn alias(&mut self) -> PResult<Option<String>> {
        if self.eat_kw("AS") {
            return match self.peek() {
                Some(Tok {
                    kind: TokKind::Word { value, .. },
                    ..
                }) => {
                    self.pos += 1;
                    Ok(Some(value.clone()))
                }
                Some(Tok {
                    kind: TokKind::Literal,
                    text,
                    ..
                }) => {
                    self.pos += 1;
                    Ok(Some(text.trim_matches('\'').to_string()))
                }
                _ => syntax(format!("expected alias {}", self.found())),
            };
        }
        match self.peek() {
            Some(tok) if tok.word().is_some() && !tok.is_reserved() => {
                self.pos += 1;
                Ok(tok.word().map(str::to_string))
            }
            _ => Ok(None),
        }
    }

    // -- statements ---------------------------------------------------------

    fn statement(&mut self) -> PResult<Statement> {
        let ctes = if self.at_kw("WITH") {
            self.with_clause()?
        } else {
            Vec::new()
        };
        if self.at_any_kw(&["SELECT", "VALUES"]) {
            return Ok(Statement::Query(self.query_body(ctes)?));
        }
        if self.at_kw("INSERT") || self.at_kw("REPLACE") {
            return Ok(Statement::Insert(self.insert(ctes)?));
        }
        if self.eat_kw("UPDATE") {
            return Ok(Statement::Update(self.update(ctes)?));
        }
        if self.eat_kw("DELETE") {
            return Ok(Statement::Delete(self.delete(ctes)?));
        }
        match self.peek() {
            Some(tok) => Err(ParseError::Unsupported(tok.text.to_ascii_uppercase())),
            None => syntax("empty query"),
        }
    }

    fn conflict_clause(&mut self) -> PResult<()> {
        if self.eat_kw("OR") {
            if !self.at_any_kw(&["ROLLBACK", "ABORT", "REPLACE", "FAIL", "IGNORE"]) {
                return syntax(format!("expected conflict resolution {}", self.found()));
            }
            self.pos += 1;
        }
        Ok(())
    }

    fn insert(&mut self, ctes: Vec<Cte>) -> PResult<Insert> {
        if !self.eat_kw("REPLACE") {
            self.expect_kw("INSERT")?;
            self.conflict_clause()?;
        }
        self.expect_kw("INTO")?;
        let table = self.object_name("table name")?;
        let alias = if self.eat_kw("AS") {
            Some(self.ident("alias")?)
        } else {
            None
        };
        let columns = if self.at(&TokKind::LParen) {
            self.ident_list("column name")?
        } else {
            Vec::new()
        };
        let source = if self.eat_kw("DEFAULT") {
            self.expect_kw("VALUES")?;
            InsertSource::DefaultValues
        } else if self.eat_kw("VALUES") {
            InsertSource::Values(self.value_rows()?)
        } else if self.at_query_start() {
            InsertSource::Query(Box::new(self.query()?))
        } else {
            return syntax(format!("expected VALUES or SELECT {}", self.found()));
        };

        let mut upserts = Vec::new();
        while self.eat_kw("ON") {
            self.expect_kw("CONFLICT")?;
            let mut target = Vec::new();
            let mut target_filter = None;
            if self.eat(&TokKind::LParen) {
                target = self.expr_list()?;
                self.expect(&TokKind::RParen, "')'")?;
                if self.eat_kw("WHERE") {
                    target_filter = Some(self.expr(false)?);
                }
            }
            self.expect_kw("DO")?;
            let action = if self.eat_kw("NOTHING") {
                UpsertAction::Nothing
            } else {
                self.expect_kw("UPDATE")?;
                self.expect_kw("SET")?;
                let assignments = self.assignments()?;
                let filter = if self.eat_kw("WHERE") {
                    Some(self.expr(false)?)
                } else {
                    None
                };
                UpsertAction::Update {
                    assignments,
                    filter,
                }
            };
            upserts.push(Upsert {
                target,
                target_filter,
                action,
            });
        }

        let returning = self.returning()?;
        Ok(Insert {
            ctes,
            table,
            alias,
            columns,
            source,
            upserts,
            returning,
        })
    }

    fn update(&mut self, ctes: Vec<Cte>) -> PResult<Update> {
        self.conflict_clause()?;
        let table = self.object_name("table name")?;
        let alias = self.alias()?;
        self.indexed_hint()?;
        self.expect_kw("SET")?;
        let assignments = self.assignments()?;
        let from = if self.eat_kw("FROM") {
            self.from_clause()?
        } else {
            Vec::new()
        };
        let filter = if self.eat_kw("WHERE") {
            Some(self.expr(false)?)
        } else {
            None
        };
        let returning = self.returning()?;
        let trailing = self.trailing()?;
        Ok(Update {
            ctes,
            table,
            alias,
            assignments,
            from,
            filter,
            returning,
            trailing,
        })
    }

    fn delete(&mut self, ctes: Vec<Cte>) -> PResult<Delete> {
        self.expect_kw("FROM")?;
        let table = self.object_name("table name")?;
        let alias = self.alias()?;
        self.indexed_hint()?;
        let filter = if self.eat_kw("WHERE") {
            Some(self.expr(false)?)
        } else {
            None
        };
        let returning = self.returning()?;
        let trailing = self.trailing()?;
        Ok(Delete {
            ctes,
            table,
            alias,
            filter,
            returning,
            trailing,
        })
    }

    fn returning(&mut self) -> PResult<Vec<SelectItem>> {
        if self.eat_kw("RETURNING") {
            self.select_items()
        } else {
            Ok(Vec::new())
        }
    }

    fn assignments(&mut self) -> PResult<Vec<Assignment>> {
        let mut out = Vec::new();
        loop {
            let columns = if self.at(&TokKind::LParen) {
                self.ident_list("column name")?
            } else {
                vec![self.ident("column name")?]
            };
            match self.bump() {
                Some(tok) if tok.text == "=" => {}
                _ => return syntax("expected '=' in assignment"),
            }
            let value = self.expr(false)?;
            out.push(Assignment { columns, value });
            if !self.eat(&TokKind::Comma) {
                return Ok(out);
            }
        }
    }

    fn indexed_hint(&mut self) -> PResult<()> {
        if self.eat_kw("INDEXED") {
            self.expect_kw("BY")?;
            self.ident("index name")?;
        } else if self.at_kw("NOT") && self.peek_at(1).is_some_and(|t| t.is_kw("INDEXED")) {
            self.pos += 2;
        }
        Ok(())
    }

    // -- queries ------------------------------------------------------------

    fn query(&mut self) -> PResult<Query> {
        let ctes = if self.at_kw("WITH") {
            self.with_clause()?
        } else {
            Vec::new()
        };
        self.query_body(ctes)
    }

    fn with_clause(&mut self) -> PResult<Vec<Cte>> {
        self.expect_kw("WITH")?;
        let recursive = self.eat_kw("RECURSIVE");
        let mut ctes = Vec::new();
        loop {
            let name = self.ident("table name")?;
            let columns = if self.at(&TokKind::LParen) {
                self.ident_list("column name")?
            } else {
                Vec::new()
            };
            self.expect_kw("AS")?;
            self.eat_kw("NOT");
            self.eat_kw("MATERIALIZED");
            self.expect(&TokKind::LParen, "'('")?;
            let query = self.query()?;
            self.expect(&TokKind::RParen, "')'")?;
            ctes.push(Cte {
                name,
                columns,
                query,
                recursive,
            });
            if !self.eat(&TokKind::Comma) {
                return Ok(ctes);
            }
        }
    }

    fn query_body(&mut self, ctes: Vec<Cte>) -> PResult<Query> {
        let mut body = vec![self.select_core()?];
        loop {
            if self.eat_kw("UNION") {
                self.eat_kw("ALL");
            } else if !(self.eat_kw("INTERSECT") || self.eat_kw("EXCEPT")) {
                break;
            }
            body.push(self.select_core()?);
        }
        let (order_by, limit) = self.order_and_limit()?;
        Ok(Query {
            ctes,
            body,
            order_by,
            limit,
        })
    }

    fn select_core(&mut self) -> PResult<SelectCore> {
        if self.eat_kw("VALUES") {
            return Ok(SelectCore::Values(self.value_rows()?));
        }
        self.expect_kw("SELECT")?;
        if !self.eat_kw("DISTINCT") {
            self.eat_kw("ALL");
        }
        let items = self.select_items()?;
        let from = if self.eat_kw("FROM") {
            self.from_clause()?
        } else {
            Vec::new()
        };
        let filter = if self.eat_kw("WHERE") {
            Some(self.expr(false)?)
        } else {
            None
        };
        let mut group_by = Vec::new();
        let mut having = None;
        if self.eat_kw("GROUP") {
            self.expect_kw("BY")?;
            group_by = self.expr_list()?;
            if self.eat_kw("HAVING") {
                having = Some(self.expr(false)?);
            }
        }
        let mut windows = Vec::new();
        if self.eat_kw("WINDOW") {
            loop {
                self.ident("window name")?;
                self.expect_kw("AS")?;
                windows.push(self.expr(false)?);
                if !self.eat(&TokKind::Comma) {
                    break;
                }
            }
        }
        Ok(SelectCore::Select {
            items,
            from,
            filter,
            group_by,
            having,
            windows,
        })
    }

    fn value_rows(&mut self) -> PResult<Vec<Vec<Expr>>> {
        let mut rows = Vec::new();
        loop {
            self.expect(&TokKind::LParen, "'('")?;
            rows.push(self.expr_list()?);
            self.expect(&TokKind::RParen, "')'")?;
            if !self.eat(&TokKind::Comma) {
                return Ok(rows);
            }
        }
    }

    fn select_items(&mut self) -> PResult<Vec<SelectItem>> {
        let mut items = Vec::new();
        loop {
            items.push(self.select_item()?);
            if !self.eat(&TokKind::Comma) {
                return Ok(items);
            }
        }
    }

    fn select_item(&mut self) -> PResult<SelectItem> {
        if self.eat(&TokKind::Star) {
            return Ok(SelectItem::Wildcard);
        }
        if let (Some(word), Some(period), Some(star)) = (self.peek(), self.peek_at(1), self.peek_at(2)) {
            if word.word().is_some() && period.is(&TokKind::Period) && star.is(&TokKind::Star) {
                let qualifier = word.word().unwrap_or_default().to_string();
                self.pos += 3;
                return Ok(SelectItem::QualifiedWildcard(qualifier));
            }
        }
        let expr = self.expr(true)?;
        let alias = self.alias()?;
        Ok(SelectItem::Expr { expr, alias })
    }

    /// Parses `ORDER BY` terms and `LIMIT`/`OFFSET` expressions.
    fn order_and_limit(&mut self) -> PResult<(Vec<Expr>, Vec<Expr>)> {
        let mut order_by = Vec::new();
        if self.eat_kw("ORDER") {
            self.expect_kw("BY")?;
            order_by = self.expr_list()?;
        }
        let mut limit = Vec::new();
        if self.eat_kw("LIMIT") {
            limit.push(self.expr(false)?);
            if self.eat_kw("OFFSET") || self.eat(&TokKind::Comma) {
                limit.push(self.expr(false)?);
            }
        }
        Ok((order_by, limit))
    }

    fn trailing(&mut self) -> PResult<Vec<Expr>> {
        let (mut order_by, limit) = self.order_and_limit()?;
        order_by.extend(limit);
        Ok(order_by)
    }

    fn from_clause(&mut self) -> PResult<Vec<FromItem>> {
        let mut items = vec![FromItem {
            source: self.table_source()?,
            constraint: None,
        }];
        loop {
            let mut natural = false;
            if !self.eat(&TokKind::Comma) {
                if !self.at_any_kw(JOIN_WORDS) {
                    return Ok(items);
                }
                natural = self.eat_kw("NATURAL");
                if self.eat_kw("LEFT") || self.eat_kw("RIGHT") || self.eat_kw("FULL") {
                    self.eat_kw("OUTER");
                } else if !self.eat_kw("INNER") {
                    self.eat_kw("CROSS");
                }
                self.expect_kw("JOIN")?;
            }
            let source = self.table_source()?;
            let constraint = if self.eat_kw("ON") {
                Some(JoinConstraint::On(self.expr(false)?))
            } else if self.eat_kw("USING") {
                Some(JoinConstraint::Using(self.ident_list("column name")?))
            } else if natural {
                Some(JoinConstraint::Natural)
            } else {
                None
            };
            items.push(FromItem { source, constraint });
        }
    }

    fn table_source(&mut self) -> PResult<TableSource> {
        if self.eat(&TokKind::LParen) {
            if self.at_query_start() {
                let query = self.query()?;
                self.expect(&TokKind::RParen, "')'")?;
                let alias = self.alias()?;
                return Ok(TableSource::Subquery {
                    query: Box::new(query),
                    alias,
                });
            }
            let nested = self.from_clause()?;
            self.expect(&TokKind::RParen, "')'")?;
            self.alias()?;
            return Ok(TableSource::Nested(nested));
        }
        let name = self.object_name("table name")?;
        if self.eat(&TokKind::LParen) {
            let args = if self.at(&TokKind::RParen) {
                Vec::new()
            } else {
                self.expr_list()?
            };
            self.expect(&TokKind::RParen, "')'")?;
            let alias = self.alias()?;
            return Ok(TableSource::Function { name, args, alias });
        }
        let alias = self.alias()?;
        self.indexed_hint()?;
        Ok(TableSource::Table { name, alias })
    }

    // -- expressions --------------------------------------------------------

    fn expr_list(&mut self) -> PResult<Vec<Expr>> {
        let mut out = vec![self.expr(false)?];
        while self.eat(&TokKind::Comma) {
            out.push(self.expr(false)?);
        }
        Ok(out)
    }

    /// Scans one expression up to a depth-zero comma, closing paren, `;` or
    /// clause keyword. With `allow_alias`, a bare word directly after a
    /// complete operand also ends the expression.
    fn expr(&mut self, allow_alias: bool) -> PResult<Expr> {
        let start = self.pos;
        let mut refs = Vec::new();
        let mut depth = 0usize;
        // Paren depth at which a CAST target type is being skipped.
        let mut type_depth: Option<usize> = None;

        while let Some(tok) = self.peek() {
            if depth == 0 {
                let stops = match &tok.kind {
                    TokKind::Comma | TokKind::RParen | TokKind::Semicolon => true,
                    TokKind::Word { quoted: false, value, .. } => {
                        EXPR_STOP.iter().any(|k| value.eq_ignore_ascii_case(k))
                    }
                    _ => false,
                };
                let alias_here = allow_alias
                    && self.pos > start
                    && tok.word().is_some()
                    && !tok.is_reserved()
                    && self.toks[self.pos - 1].ends_operand()
                    && !self.toks[self.pos - 1].is(&TokKind::Period);
                if stops || alias_here {
                    break;
                }
            }

            match &tok.kind {
                TokKind::LParen => {
                    self.pos += 1;
                    if self.at_query_start() {
                        let query = self.query()?;
                        self.expect(&TokKind::RParen, "')'")?;
                        refs.push(ExprRef::Subquery(Box::new(query)));
                    } else {
                        depth += 1;
                    }
                }
                TokKind::RParen => {
                    self.pos += 1;
                    depth = depth.saturating_sub(1);
                    if type_depth.is_some_and(|d| depth < d) {
                        type_depth = None;
                    }
                }
                TokKind::Word { value, quoted, keyword } => {
                    let next = self.peek_at(1);
                    // collation names and `OVER name` window references are not columns
                    let prev_collate = self.pos > start
                        && (self.toks[self.pos - 1].is_kw("COLLATE") || self.toks[self.pos - 1].is_kw("OVER"));
                    if next.is_some_and(|t| t.is(&TokKind::LParen)) {
                        // function call
                        self.pos += 1;
                    } else if !*quoted && value.eq_ignore_ascii_case("AS") && depth > 0 {
                        type_depth = Some(depth);
                        self.pos += 1;
                    } else if type_depth.is_some() || prev_collate {
                        self.pos += 1;
                    } else if next.is_some_and(|t| t.is(&TokKind::Period))
                        && self.peek_at(2).is_some_and(|t| t.word().is_some())
                    {
                        let mut qualifier = value.clone();
                        let mut name = self.peek_at(2).and_then(Tok::word).unwrap_or_default().to_string();
                        self.pos += 3;
                        // schema.table.column
                        if self.at(&TokKind::Period) && self.peek_at(1).is_some_and(|t| t.word().is_some()) {
                            qualifier = name;
                            name = self.peek_at(1).and_then(Tok::word).unwrap_or_default().to_string();
                            self.pos += 2;
                        }
                        refs.push(ExprRef::Column {
                            qualifier: Some(qualifier),
                            name,
                            keyword: false,
                        });
                    } else {
                        refs.push(ExprRef::Column {
                            qualifier: None,
                            name: value.clone(),
                            keyword: *keyword,
                        });
                        self.pos += 1;
                    }
                }
                _ => self.pos += 1,
            }
        }

        if self.pos == start {
            return syntax(format!("expected expression {}", self.found()));
        }
        let span = &self.toks[start..self.pos];
        let single_column = match (span, refs.as_slice()) {
            ([_], [ExprRef::Column { name, .. }])
            | ([_, _, _], [ExprRef::Column { name, .. }])
            | ([_, _, _, _, _], [ExprRef::Column { name, .. }]) => Some(name.clone()),
            _ => None,
        };
        Ok(Expr {
            refs,
            text: span_text(span),
            single_column,
        })
    }
}

fn span_text(span: &[Tok]) -> String {
    let mut out = String::new();
    for tok in span {
        if tok.space_before && !out.is_empty() {
            out.push(' ');
        }
        out.push_str(&tok.text);
    }
    out
}

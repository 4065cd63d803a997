//! Name resolution of a parsed statement against the schema model.
//!
//! Every table source, qualified reference and column name is resolved
//! through a chain of [`Scope`]s, so correlated sub-selects see the sources
//! of the queries enclosing them. The outcome is a [`Resolution`]: the tables
//! touched, the written table (if any) and the projected result columns.

use std::collections::BTreeSet;

use tessera_core::schema::{SchemaModel, TableDefinition};

use crate::diagnostics::QueryErrorKind;
use crate::parse::{
    Assignment, Cte, Expr, ExprRef, FromItem, InsertSource, JoinConstraint, Query, SelectCore,
    SelectItem, Statement, TableSource, UpsertAction,
};

type RResult<T> = Result<T, QueryErrorKind>;

/// One column of a statement's result set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultColumn {
    pub name: String,
    /// `(table, column)` when the column is a direct table column reference.
    pub origin: Option<(String, String)>,
}

/// The projected columns of a query or `RETURNING` clause.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Projection {
    pub columns: Vec<ResultColumn>,
    /// Some columns come from a source whose columns are unknown (a
    /// table-valued function), so the list is incomplete.
    pub open: bool,
}

impl Projection {
    pub fn names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }
}

/// What the statement kind is, for shape checks and invalidation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Read,
    Insert { table: String },
    Update { table: String },
    Delete { table: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub target: Target,
    /// Schema tables referenced anywhere in the statement.
    pub tables: BTreeSet<String>,
    /// `None` for writes without `RETURNING`.
    pub projection: Option<Projection>,
}

/// Resolves `stmt` against `schema`.
pub fn resolve_statement(schema: &SchemaModel, stmt: &Statement) -> RResult<Resolution> {
    let mut r = Resolver {
        schema,
        tables: BTreeSet::new(),
    };
    let (target, projection) = match stmt {
        Statement::Query(q) => (Target::Read, Some(r.query(q, None)?)),
        Statement::Insert(ins) => {
            let scope = r.cte_scope(&ins.ctes, None)?;
            let table = r.schema_table(&ins.table)?;
            let qualifier = ins.alias.clone();
            for column in &ins.columns {
                require_column(table, column)?;
            }
            let expected = if ins.columns.is_empty() {
                table.columns.len()
            } else {
                ins.columns.len()
            };
            match &ins.source {
                InsertSource::Values(rows) => {
                    for row in rows {
                        if row.len() != expected {
                            return Err(QueryErrorKind::syntax(format!(
                                "{} values for {} columns",
                                row.len(),
                                expected
                            )));
                        }
                        for expr in row {
                            r.expr(expr, &scope)?;
                        }
                    }
                }
                InsertSource::Query(q) => {
                    let projection = r.query(q, Some(&scope))?;
                    if !projection.open && projection.columns.len() != expected {
                        return Err(QueryErrorKind::syntax(format!(
                            "{} values for {} columns",
                            projection.columns.len(),
                            expected
                        )));
                    }
                }
                InsertSource::DefaultValues => {}
            }

            let mut target_scope = scope.child();
            target_scope.sources.push(Source::table(table, qualifier));
            target_scope.sources.push(Source {
                qualified_only: true,
                ..Source::table(table, Some("excluded".to_string()))
            });
            for upsert in &ins.upserts {
                for expr in &upsert.target {
                    r.expr(expr, &target_scope)?;
                }
                r.opt_expr(upsert.target_filter.as_ref(), &target_scope)?;
                if let UpsertAction::Update {
                    assignments,
                    filter,
                } = &upsert.action
                {
                    r.assignments(table, assignments, &target_scope)?;
                    r.opt_expr(filter.as_ref(), &target_scope)?;
                }
            }
            target_scope.sources.pop();
            let projection = r.returning(&ins.returning, &target_scope)?;
            (
                Target::Insert {
                    table: table.name.clone(),
                },
                projection,
            )
        }
        Statement::Update(up) => {
            let scope = r.cte_scope(&up.ctes, None)?;
            let table = r.schema_table(&up.table)?;
            let mut target_scope = scope.child();
            target_scope
                .sources
                .push(Source::table(table, up.alias.clone()));
            for item in &up.from {
                r.from_item(item, &mut target_scope)?;
            }
            r.assignments(table, &up.assignments, &target_scope)?;
            r.opt_expr(up.filter.as_ref(), &target_scope)?;
            for expr in &up.trailing {
                r.expr(expr, &target_scope)?;
            }
            let projection = r.returning(&up.returning, &target_scope)?;
            (
                Target::Update {
                    table: table.name.clone(),
                },
                projection,
            )
        }
        Statement::Delete(del) => {
            let scope = r.cte_scope(&del.ctes, None)?;
            let table = r.schema_table(&del.table)?;
            let mut target_scope = scope.child();
            target_scope
                .sources
                .push(Source::table(table, del.alias.clone()));
            r.opt_expr(del.filter.as_ref(), &target_scope)?;
            for expr in &del.trailing {
                r.expr(expr, &target_scope)?;
            }
            let projection = r.returning(&del.returning, &target_scope)?;
            (
                Target::Delete {
                    table: table.name.clone(),
                },
                projection,
            )
        }
    };
    Ok(Resolution {
        target,
        tables: r.tables,
        projection,
    })
}

// ---------------------------------------------------------------------------
// Scopes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Columns<'a> {
    Table(&'a TableDefinition),
    Derived(Vec<String>),
    Open,
}

impl Columns<'_> {
    fn has(&self, column: &str) -> bool {
        match self {
            Columns::Table(t) => t.column(column).is_some() || is_rowid(column),
            Columns::Derived(names) => names.iter().any(|n| n.eq_ignore_ascii_case(column)),
            Columns::Open => true,
        }
    }
}

fn is_rowid(column: &str) -> bool {
    ["rowid", "oid", "_rowid_"]
        .iter()
        .any(|r| r.eq_ignore_ascii_case(column))
}

#[derive(Debug, Clone)]
struct Source<'a> {
    /// Table, CTE or function name.
    name: String,
    alias: Option<String>,
    columns: Columns<'a>,
    /// Reachable only through its qualifier (`excluded` in an upsert).
    qualified_only: bool,
}

impl<'a> Source<'a> {
    fn new(name: String, alias: Option<String>, columns: Columns<'a>) -> Self {
        Source {
            name,
            alias,
            columns,
            qualified_only: false,
        }
    }

    fn table(table: &'a TableDefinition, alias: Option<String>) -> Self {
        Source::new(table.name.clone(), alias, Columns::Table(table))
    }

    fn column_names(&self) -> Vec<String> {
        match &self.columns {
            Columns::Table(t) => t.columns.iter().map(|c| c.name.clone()).collect(),
            Columns::Derived(names) => names.clone(),
            Columns::Open => Vec::new(),
        }
    }

    fn answers_to(&self, qualifier: &str) -> bool {
        match &self.alias {
            Some(alias) => alias.eq_ignore_ascii_case(qualifier),
            None => self.name.eq_ignore_ascii_case(qualifier),
        }
    }
}

#[derive(Debug)]
struct Scope<'p, 'a> {
    sources: Vec<Source<'a>>,
    /// Projection aliases, visible to WHERE / GROUP BY / ORDER BY.
    aliases: Vec<String>,
    ctes: Vec<(String, Columns<'a>)>,
    /// Columns merged by `USING` or `NATURAL` joins.
    merged: Vec<String>,
    parent: Option<&'p Scope<'p, 'a>>,
}

impl<'p, 'a> Scope<'p, 'a> {
    fn new(parent: Option<&'p Scope<'p, 'a>>) -> Self {
        Scope {
            sources: Vec::new(),
            aliases: Vec::new(),
            ctes: Vec::new(),
            merged: Vec::new(),
            parent,
        }
    }

    fn child(&self) -> Scope<'_, 'a> {
        Scope::new(Some(self))
    }

    fn chain(&self) -> impl Iterator<Item = &Scope<'p, 'a>> {
        std::iter::successors(Some(self), |s| s.parent)
    }

    fn find_cte(&self, name: &str) -> Option<Columns<'a>> {
        self.chain().find_map(|s| {
            s.ctes
                .iter()
                .rev()
                .find(|(n, _)| n.eq_ignore_ascii_case(name))
                .map(|(_, c)| c.clone())
        })
    }

    fn find_qualifier(&self, qualifier: &str) -> Option<&Source<'a>> {
        self.chain()
            .find_map(|s| s.sources.iter().rev().find(|src| src.answers_to(qualifier)))
    }

    /// Resolves a bare column, returning its origin when it is a table column.
    ///
    /// The innermost scope that knows the name decides. Two of its sources
    /// with known columns both carrying the name is an ambiguity, unless a
    /// join merged that column.
    fn find_column(&self, column: &str) -> RResult<Option<Option<(String, String)>>> {
        for scope in self.chain() {
            let visible: Vec<&Source<'a>> = scope
                .sources
                .iter()
                .filter(|s| !s.qualified_only && s.columns.has(column))
                .collect();
            let known: Vec<&Source<'a>> = visible
                .iter()
                .copied()
                .filter(|s| !matches!(s.columns, Columns::Open))
                .collect();
            if let [src, rest @ ..] = known.as_slice() {
                let merged = scope.merged.iter().any(|m| m.eq_ignore_ascii_case(column));
                if !rest.is_empty() && !merged {
                    return Err(QueryErrorKind::ambiguous_column(column));
                }
                return Ok(Some(origin(src, column)));
            }
            if !visible.is_empty() || scope.aliases.iter().any(|a| a.eq_ignore_ascii_case(column)) {
                return Ok(Some(None));
            }
        }
        Ok(None)
    }
}

fn origin(src: &Source<'_>, column: &str) -> Option<(String, String)> {
    match &src.columns {
        Columns::Table(t) => t
            .column(column)
            .map(|c| (t.name.clone(), c.name.clone())),
        _ => None,
    }
}

fn require_column(table: &TableDefinition, column: &str) -> RResult<()> {
    if table.column(column).is_some() {
        Ok(())
    } else {
        Err(QueryErrorKind::unknown_column(column, Some(&table.name)))
    }
}

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

struct Resolver<'a> {
    schema: &'a SchemaModel,
    tables: BTreeSet<String>,
}

impl<'a> Resolver<'a> {
    fn schema_table(&mut self, name: &str) -> RResult<&'a TableDefinition> {
        let table = self
            .schema
            .table_by_name(name)
            .ok_or_else(|| QueryErrorKind::unknown_table(name))?;
        self.tables.insert(table.name.clone());
        Ok(table)
    }

    fn cte_scope<'p>(
        &mut self,
        ctes: &[Cte],
        parent: Option<&'p Scope<'p, 'a>>,
    ) -> RResult<Scope<'p, 'a>> {
        let mut scope = Scope::new(parent);
        for cte in ctes {
            if cte.recursive {
                let provisional = if cte.columns.is_empty() {
                    Columns::Open
                } else {
                    Columns::Derived(cte.columns.clone())
                };
                scope.ctes.push((cte.name.clone(), provisional));
            }
            let projection = self.query(&cte.query, Some(&scope))?;
            let columns = if !cte.columns.is_empty() {
                if !projection.open && projection.columns.len() != cte.columns.len() {
                    return Err(QueryErrorKind::syntax(format!(
                        "table {} has {} values for {} columns",
                        cte.name,
                        projection.columns.len(),
                        cte.columns.len()
                    )));
                }
                Columns::Derived(cte.columns.clone())
            } else if projection.open {
                Columns::Open
            } else {
                Columns::Derived(projection.names())
            };
            if cte.recursive {
                scope.ctes.pop();
            }
            scope.ctes.push((cte.name.clone(), columns));
        }
        Ok(scope)
    }

    fn query(&mut self, q: &Query, parent: Option<&Scope<'_, 'a>>) -> RResult<Projection> {
        let scope = self.cte_scope(&q.ctes, parent)?;
        if let [core] = q.body.as_slice() {
            let trailing: Vec<&Expr> = q.order_by.iter().chain(q.limit.iter()).collect();
            return self.core(core, &scope, &trailing);
        }

        let mut first: Option<Projection> = None;
        for core in &q.body {
            let projection = self.core(core, &scope, &[])?;
            if let Some(f) = first.as_ref() {
                if !f.open && !projection.open && f.columns.len() != projection.columns.len() {
                    return Err(QueryErrorKind::syntax(
                        "compound SELECTs do not have the same number of result columns",
                    ));
                }
            }
            if first.is_none() {
                first = Some(projection);
            }
        }
        let projection = first.unwrap_or_default();

        // Compound ORDER BY terms refer to result columns.
        let mut order_scope = scope.child();
        order_scope.sources.push(Source::new(
            String::new(),
            None,
            if projection.open {
                Columns::Open
            } else {
                Columns::Derived(projection.names())
            },
        ));
        for expr in &q.order_by {
            self.expr(expr, &order_scope)?;
        }
        for expr in &q.limit {
            self.expr(expr, &scope)?;
        }
        Ok(projection)
    }

    fn core(
        &mut self,
        core: &SelectCore,
        parent: &Scope<'_, 'a>,
        trailing: &[&Expr],
    ) -> RResult<Projection> {
        match core {
            SelectCore::Values(rows) => {
                for row in rows {
                    for expr in row {
                        self.expr(expr, parent)?;
                    }
                }
                let width = rows.first().map(Vec::len).unwrap_or(0);
                if rows.iter().any(|r| r.len() != width) {
                    return Err(QueryErrorKind::syntax(
                        "all VALUES must have the same number of terms",
                    ));
                }
                for expr in trailing {
                    self.expr(expr, parent)?;
                }
                Ok(Projection {
                    columns: (1..=width)
                        .map(|i| ResultColumn {
                            name: format!("column{}", i),
                            origin: None,
                        })
                        .collect(),
                    open: false,
                })
            }
            SelectCore::Select {
                items,
                from,
                filter,
                group_by,
                having,
                windows,
            } => {
                let mut scope = parent.child();
                for item in from {
                    self.from_item(item, &mut scope)?;
                }
                let projection = self.projection(items, &scope)?;
                scope.aliases = items
                    .iter()
                    .filter_map(|i| match i {
                        SelectItem::Expr { alias: Some(a), .. } => Some(a.clone()),
                        _ => None,
                    })
                    .collect();
                self.opt_expr(filter.as_ref(), &scope)?;
                for expr in group_by {
                    self.expr(expr, &scope)?;
                }
                self.opt_expr(having.as_ref(), &scope)?;
                for expr in windows {
                    self.expr(expr, &scope)?;
                }
                for expr in trailing {
                    self.expr(expr, &scope)?;
                }
                Ok(projection)
            }
        }
    }

    fn from_item<'p>(&mut self, item: &FromItem, scope: &mut Scope<'p, 'a>) -> RResult<()> {
        match &item.source {
            TableSource::Table { name, alias } => {
                let columns = match scope.find_cte(name) {
                    Some(columns) => columns,
                    None => match self.schema.table_by_name(name) {
                        Some(table) => {
                            self.tables.insert(table.name.clone());
                            Columns::Table(table)
                        }
                        None if name.to_ascii_lowercase().starts_with("sqlite_") => Columns::Open,
                        None => return Err(QueryErrorKind::unknown_table(name.as_str())),
                    },
                };
                scope.sources.push(Source::new(name.clone(), alias.clone(), columns));
            }
            TableSource::Subquery { query, alias } => {
                let projection = self.query(query, scope.parent)?;
                scope.sources.push(Source::new(
                    alias.clone().unwrap_or_default(),
                    alias.clone(),
                    if projection.open {
                        Columns::Open
                    } else {
                        Columns::Derived(projection.names())
                    },
                ));
            }
            TableSource::Function { name, args, alias } => {
                for expr in args {
                    self.expr(expr, scope)?;
                }
                scope.sources.push(Source::new(name.clone(), alias.clone(), Columns::Open));
            }
            TableSource::Nested(items) => {
                for nested in items {
                    self.from_item(nested, scope)?;
                }
            }
        }

        match &item.constraint {
            Some(JoinConstraint::On(expr)) => {
                self.expr(expr, scope)?;
            }
            Some(JoinConstraint::Using(columns)) => {
                let joined = scope.sources.last();
                for column in columns {
                    let on_right = joined.is_some_and(|s| s.columns.has(column));
                    let on_left = scope.sources[..scope.sources.len().saturating_sub(1)]
                        .iter()
                        .any(|s| s.columns.has(column));
                    if !on_right || !on_left {
                        return Err(QueryErrorKind::unknown_column(
                            column.as_str(),
                            joined.map(|s| s.name.as_str()),
                        ));
                    }
                }
                scope.merged.extend(columns.iter().cloned());
            }
            Some(JoinConstraint::Natural) => {
                if let Some((joined, left)) = scope.sources.split_last() {
                    let shared: Vec<String> = joined
                        .column_names()
                        .into_iter()
                        .filter(|c| left.iter().any(|s| s.columns.has(c)))
                        .collect();
                    scope.merged.extend(shared);
                }
            }
            None => {}
        }
        Ok(())
    }

    fn projection(&mut self, items: &[SelectItem], scope: &Scope<'_, 'a>) -> RResult<Projection> {
        let mut out = Projection::default();
        for item in items {
            match item {
                SelectItem::Wildcard => {
                    if scope.sources.is_empty() {
                        return Err(QueryErrorKind::syntax("no tables specified"));
                    }
                    for src in &scope.sources {
                        expand_source(src, &mut out);
                    }
                }
                SelectItem::QualifiedWildcard(qualifier) => {
                    let src = scope
                        .sources
                        .iter()
                        .rev()
                        .find(|s| s.answers_to(qualifier))
                        .ok_or_else(|| QueryErrorKind::unknown_table(qualifier.as_str()))?;
                    expand_source(src, &mut out);
                }
                SelectItem::Expr { expr, alias } => {
                    let origin = self.expr(expr, scope)?;
                    let name = alias
                        .clone()
                        .or_else(|| expr.single_column.clone())
                        .unwrap_or_else(|| expr.text.clone());
                    out.columns.push(ResultColumn { name, origin });
                }
            }
        }
        Ok(out)
    }

    fn returning(
        &mut self,
        items: &[SelectItem],
        scope: &Scope<'_, 'a>,
    ) -> RResult<Option<Projection>> {
        if items.is_empty() {
            Ok(None)
        } else {
            self.projection(items, scope).map(Some)
        }
    }

    fn assignments(
        &mut self,
        table: &TableDefinition,
        assignments: &[Assignment],
        scope: &Scope<'_, 'a>,
    ) -> RResult<()> {
        for assignment in assignments {
            for column in &assignment.columns {
                require_column(table, column)?;
            }
            self.expr(&assignment.value, scope)?;
        }
        Ok(())
    }

    fn opt_expr(&mut self, expr: Option<&Expr>, scope: &Scope<'_, 'a>) -> RResult<()> {
        if let Some(expr) = expr {
            self.expr(expr, scope)?;
        }
        Ok(())
    }

    /// Resolves every reference in `expr`. Returns the column origin when the
    /// expression is a single table column.
    fn expr(&mut self, expr: &Expr, scope: &Scope<'_, 'a>) -> RResult<Option<(String, String)>> {
        let mut single = None;
        for reference in &expr.refs {
            match reference {
                ExprRef::Column {
                    qualifier: Some(q),
                    name,
                    ..
                } => {
                    let src = scope
                        .find_qualifier(q)
                        .ok_or_else(|| QueryErrorKind::unknown_table(q.as_str()))?;
                    if !src.columns.has(name) {
                        return Err(QueryErrorKind::unknown_column(
                            format!("{}.{}", q, name),
                            Some(src.name.as_str()),
                        ));
                    }
                    single = origin(src, name);
                }
                ExprRef::Column {
                    qualifier: None,
                    name,
                    keyword,
                } => match scope.find_column(name)? {
                    Some(found) => single = found,
                    None if *keyword => {}
                    None => return Err(QueryErrorKind::unknown_column(name.as_str(), None)),
                },
                ExprRef::Subquery(q) => {
                    self.query(q, Some(scope))?;
                }
            }
        }
        Ok(if expr.single_column.is_some() { single } else { None })
    }
}

fn expand_source(src: &Source<'_>, out: &mut Projection) {
    match &src.columns {
        Columns::Table(t) => out.columns.extend(t.columns.iter().map(|c| ResultColumn {
            name: c.name.clone(),
            origin: Some((t.name.clone(), c.name.clone())),
        })),
        Columns::Derived(names) => out.columns.extend(names.iter().map(|n| ResultColumn {
            name: n.clone(),
            origin: None,
        })),
        Columns::Open => out.open = true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse_statement;
    use crate::tokens::tokenize;
    use tessera_core::convert::ConverterRegistry;
    use tessera_core::descriptor::{EntityDescriptor, FieldDescriptor, ForeignKeyDescriptor};
    use tessera_core::types::DomainType;

    fn schema() -> SchemaModel {
        let item = EntityDescriptor::new("Item")
            .table("items")
            .field(FieldDescriptor::new("id", DomainType::I64))
            .field(FieldDescriptor::new("name", DomainType::String))
            .field(FieldDescriptor::new("price", DomainType::F64))
            .auto_key("id");
        let line = EntityDescriptor::new("OrderLine")
            .table("order_lines")
            .field(FieldDescriptor::new("id", DomainType::I64))
            .field(FieldDescriptor::new("item_id", DomainType::I64))
            .field(FieldDescriptor::new("qty", DomainType::I32))
            .auto_key("id")
            .foreign_key(ForeignKeyDescriptor::new("Item", ["id"], ["item_id"]));
        SchemaModel::build(&[item, line], 1, &ConverterRegistry::new()).unwrap()
    }

    fn resolve(sql: &str) -> RResult<Resolution> {
        let stmt = parse_statement(&tokenize(sql).unwrap()).unwrap();
        resolve_statement(&schema(), &stmt)
    }

    #[test]
    fn star_expands_in_declaration_order() {
        let res = resolve("SELECT * FROM items WHERE price > ?").unwrap();
        let names = res.projection.unwrap().names();
        assert_eq!(names, vec!["id", "name", "price"]);
        assert_eq!(res.target, Target::Read);
    }

    #[test]
    fn unknown_column_is_reported() {
        let err = resolve("SELECT colour FROM items").unwrap_err();
        assert_eq!(err, QueryErrorKind::unknown_column("colour", None));
    }

    #[test]
    fn unknown_table_is_reported() {
        let err = resolve("SELECT * FROM ghosts").unwrap_err();
        assert_eq!(err, QueryErrorKind::unknown_table("ghosts"));
    }

    #[test]
    fn unresolved_join_target_is_unknown_table() {
        let err = resolve("SELECT i.name FROM items i JOIN shipments s ON s.item_id = i.id").unwrap_err();
        assert_eq!(err, QueryErrorKind::unknown_table("shipments"));
    }

    #[test]
    fn join_resolves_qualified_columns_and_tracks_tables() {
        let res = resolve(
            "SELECT i.name, SUM(o.qty) AS total FROM items i LEFT JOIN order_lines o ON o.item_id = i.id GROUP BY i.id ORDER BY total DESC",
        )
        .unwrap();
        let projection = res.projection.unwrap();
        assert_eq!(projection.names(), vec!["name", "total"]);
        assert_eq!(
            projection.columns[0].origin,
            Some(("items".to_string(), "name".to_string()))
        );
        assert_eq!(
            res.tables.into_iter().collect::<Vec<_>>(),
            vec!["items".to_string(), "order_lines".to_string()]
        );
    }

    #[test]
    fn bad_qualified_column() {
        let err = resolve("SELECT i.colour FROM items i").unwrap_err();
        assert!(matches!(err, QueryErrorKind::UnknownColumn { ref column, .. } if column == "i.colour"));
    }

    #[test]
    fn correlated_subquery_sees_outer_sources() {
        resolve(
            "SELECT name FROM items i WHERE EXISTS (SELECT 1 FROM order_lines o WHERE o.item_id = i.id)",
        )
        .unwrap();
    }

    #[test]
    fn cte_and_subquery_sources_expose_projected_names() {
        let res = resolve(
            "WITH cheap AS (SELECT id, name AS label FROM items WHERE price < 5) SELECT label FROM cheap",
        )
        .unwrap();
        assert_eq!(res.projection.unwrap().names(), vec!["label"]);
        let err = resolve("SELECT qty FROM (SELECT id FROM order_lines) sub").unwrap_err();
        assert_eq!(err, QueryErrorKind::unknown_column("qty", None));
    }

    #[test]
    fn insert_checks_columns_and_value_count() {
        let res = resolve("INSERT INTO items (name, price) VALUES (?, ?)").unwrap();
        assert_eq!(res.target, Target::Insert { table: "items".into() });
        assert!(res.projection.is_none());
        let err = resolve("INSERT INTO items (name, cost) VALUES (?, ?)").unwrap_err();
        assert!(matches!(err, QueryErrorKind::UnknownColumn { .. }));
        let err = resolve("INSERT INTO items (name, price) VALUES (?)").unwrap_err();
        assert!(matches!(err, QueryErrorKind::Syntax { .. }));
    }

    #[test]
    fn upsert_sees_excluded() {
        resolve(
            "INSERT INTO items (name, price) VALUES (?, ?) ON CONFLICT(name) DO UPDATE SET price = excluded.price",
        )
        .unwrap();
    }

    #[test]
    fn update_with_returning_projects_columns() {
        let res = resolve("UPDATE items SET price = price * 1.1 WHERE id = ? RETURNING id, price").unwrap();
        assert_eq!(res.target, Target::Update { table: "items".into() });
        assert_eq!(res.projection.unwrap().names(), vec!["id", "price"]);
    }

    #[test]
    fn delete_rejects_unknown_column() {
        let err = resolve("DELETE FROM items WHERE colour = ?").unwrap_err();
        assert_eq!(err, QueryErrorKind::unknown_column("colour", None));
    }

    #[test]
    fn keywords_that_are_not_columns_are_ignored() {
        resolve("SELECT name FROM items WHERE name IS NOT NULL AND price BETWEEN ? AND ?").unwrap();
    }

    #[test]
    fn compound_arity_mismatch() {
        let err = resolve("SELECT id, name FROM items UNION SELECT id FROM order_lines").unwrap_err();
        assert!(matches!(err, QueryErrorKind::Syntax { .. }));
    }

    #[test]
    fn generic_keyword_names_are_still_columns() {
        for column in ["status", "value", "position", "owner"] {
            let err = resolve(&format!("SELECT id FROM items WHERE {} = ?", column)).unwrap_err();
            assert_eq!(err, QueryErrorKind::unknown_column(column, None));
        }
    }

    #[test]
    fn bare_column_in_two_sources_is_ambiguous() {
        let err = resolve("SELECT id FROM items, order_lines").unwrap_err();
        assert_eq!(err, QueryErrorKind::ambiguous_column("id"));

        let err = resolve("SELECT i.name FROM items i JOIN order_lines o ON item_id = id").unwrap_err();
        assert_eq!(err, QueryErrorKind::ambiguous_column("id"));

        resolve("SELECT name, qty FROM items, order_lines WHERE item_id = items.id").unwrap();
    }

    #[test]
    fn merged_join_columns_are_not_ambiguous() {
        resolve("SELECT id, name FROM items JOIN order_lines USING (id)").unwrap();
        resolve("SELECT id, qty FROM items NATURAL JOIN order_lines").unwrap();
    }

    #[test]
    fn inner_scope_shadows_outer_without_ambiguity() {
        resolve("SELECT name FROM items WHERE EXISTS (SELECT 1 FROM order_lines WHERE id = ?)").unwrap();
    }

    #[test]
    fn upsert_bare_columns_name_the_target() {
        resolve(
            "INSERT INTO items (name, price) VALUES (?, ?) ON CONFLICT(name) DO UPDATE SET price = price + excluded.price",
        )
        .unwrap();
    }
}

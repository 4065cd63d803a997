//! Query validation against a small multi-table schema.
//!
//! Covers joins, aliases, sub-selects, CTEs, upserts and the placeholder
//! arity property.

use proptest::prelude::*;

use tessera_check::{
    validate_contracts, QueryCompiler, QueryErrorKind, ResultMapping, StatementKind,
};
use tessera_core::contract::{AccessObjectContract, OperationDescriptor, ParamDescriptor, ReturnShape};
use tessera_core::convert::ConverterRegistry;
use tessera_core::descriptor::{EntityDescriptor, FieldDescriptor, ForeignKeyDescriptor, IndexDescriptor};
use tessera_core::schema::SchemaModel;
use tessera_core::types::DomainType;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn schema() -> SchemaModel {
    let customer = EntityDescriptor::new("Customer")
        .table("customers")
        .field(FieldDescriptor::new("id", DomainType::I64))
        .field(FieldDescriptor::new("email", DomainType::String))
        .auto_key("id")
        .index(IndexDescriptor::on(["email"]).unique());
    let order = EntityDescriptor::new("Order")
        .table("orders")
        .field(FieldDescriptor::new("id", DomainType::I64))
        .field(FieldDescriptor::new("customer_id", DomainType::I64))
        .field(FieldDescriptor::new("total", DomainType::F64))
        .auto_key("id")
        .foreign_key(ForeignKeyDescriptor::new("Customer", ["id"], ["customer_id"]));
    SchemaModel::build(&[customer, order], 1, &ConverterRegistry::new()).unwrap()
}

fn check(sql: &str, params: &[(&str, DomainType)], returns: ReturnShape) -> Result<tessera_check::CompiledQuery, QueryErrorKind> {
    let schema = schema();
    let params: Vec<ParamDescriptor> = params
        .iter()
        .map(|(name, ty)| ParamDescriptor::value(*name, ty.clone()))
        .collect();
    QueryCompiler::new(&schema)
        .compile_sql("Shop", "op", sql, &params, &returns)
        .map_err(|e| e.kind)
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

#[test]
fn join_with_aliases_resolves() {
    let q = check(
        "SELECT o.id, o.customer_id, o.total FROM orders o \
         JOIN customers c ON c.id = o.customer_id WHERE c.email = :email",
        &[("email", DomainType::String)],
        ReturnShape::EntityList("Order".into()),
    )
    .expect("join query should compile");
    assert_eq!(q.kind, StatementKind::Read);
    assert_eq!(
        q.tables.iter().cloned().collect::<Vec<_>>(),
        vec!["customers".to_string(), "orders".to_string()]
    );
}

#[test]
fn unresolved_join_target_is_unknown_table() {
    let err = check(
        "SELECT o.total FROM orders o JOIN refunds r ON r.order_id = o.id",
        &[],
        ReturnShape::ScalarList(DomainType::F64),
    )
    .unwrap_err();
    assert_eq!(err, QueryErrorKind::UnknownTable { table: "refunds".into() });
}

#[test]
fn unknown_qualifier_is_unknown_table() {
    let err = check(
        "SELECT x.total FROM orders o",
        &[],
        ReturnShape::ScalarList(DomainType::F64),
    )
    .unwrap_err();
    assert_eq!(err, QueryErrorKind::UnknownTable { table: "x".into() });
}

#[test]
fn unknown_projection_column() {
    let err = check(
        "SELECT colour FROM orders",
        &[],
        ReturnShape::Rows,
    )
    .unwrap_err();
    assert!(
        matches!(&err, QueryErrorKind::UnknownColumn { column, .. } if column == "colour"),
        "expected unknown column, got {:?}",
        err
    );
}

#[test]
fn sub_select_columns_are_visible() {
    let q = check(
        "SELECT big.customer_id FROM (SELECT customer_id, SUM(total) AS spent FROM orders GROUP BY customer_id) big \
         WHERE big.spent > :floor",
        &[("floor", DomainType::F64)],
        ReturnShape::ScalarList(DomainType::I64),
    )
    .expect("derived table query should compile");
    assert_eq!(q.result_columns, vec!["customer_id"]);
}

#[test]
fn cte_and_correlated_sub_select() {
    check(
        "WITH spenders AS (SELECT customer_id FROM orders WHERE total > ?) \
         SELECT c.id, c.email FROM customers c \
         WHERE EXISTS (SELECT 1 FROM spenders s WHERE s.customer_id = c.id)",
        &[("min", DomainType::F64)],
        ReturnShape::EntityList("Customer".into()),
    )
    .expect("CTE query should compile");
}

#[test]
fn upsert_sees_excluded_row() {
    let q = check(
        "INSERT INTO customers (email) VALUES (:email) \
         ON CONFLICT(email) DO UPDATE SET email = excluded.email",
        &[("email", DomainType::String)],
        ReturnShape::Void,
    )
    .expect("upsert should compile");
    assert_eq!(q.kind, StatementKind::Insert);
    assert_eq!(q.written_table.as_deref(), Some("customers"));
}

#[test]
fn returning_clause_maps_rows() {
    let q = check(
        "DELETE FROM orders WHERE total < :cutoff RETURNING id",
        &[("cutoff", DomainType::F64)],
        ReturnShape::ScalarList(DomainType::I64),
    )
    .expect("delete returning should compile");
    assert_eq!(q.kind, StatementKind::Delete);
    assert!(matches!(q.mapping, ResultMapping::Scalar { many: true, .. }));
}

#[test]
fn escaped_quotes_survive_normalization() {
    let q = check(
        "SELECT id FROM customers WHERE email = 'o''hara@example.com' AND \"email\" <> ?",
        &[("other", DomainType::String)],
        ReturnShape::ScalarList(DomainType::I64),
    )
    .expect("query with an escaped literal should compile");
    assert_eq!(
        q.sql,
        "SELECT id FROM customers WHERE email = 'o''hara@example.com' AND \"email\" <> ?1"
    );
}

#[test]
fn keyword_like_names_must_resolve() {
    for column in ["status", "value", "position", "owner"] {
        let err = check(
            &format!("SELECT id FROM orders WHERE {} = ?", column),
            &[("v", DomainType::String)],
            ReturnShape::ScalarList(DomainType::I64),
        )
        .unwrap_err();
        assert_eq!(
            err,
            QueryErrorKind::UnknownColumn { column: column.into(), table: None },
            "{} should not pass as a keyword",
            column
        );
    }
}

#[test]
fn bare_column_shared_by_joined_tables_is_ambiguous() {
    let err = check(
        "SELECT id FROM orders JOIN customers ON customers.id = orders.customer_id",
        &[],
        ReturnShape::ScalarList(DomainType::I64),
    )
    .unwrap_err();
    assert_eq!(err, QueryErrorKind::AmbiguousColumn { column: "id".into() });

    check(
        "SELECT email, total FROM orders JOIN customers ON customers.id = orders.customer_id",
        &[],
        ReturnShape::Rows,
    )
    .expect("columns unique to one side resolve");
}

#[test]
fn trailing_statement_is_rejected() {
    let err = check(
        "SELECT COUNT(*) FROM orders WHERE id > 0; DROP TABLE orders",
        &[],
        ReturnShape::Scalar(DomainType::I64),
    )
    .unwrap_err();
    assert!(
        matches!(err, QueryErrorKind::UnsupportedStatement { .. }),
        "expected a rejected second statement, got {:?}",
        err
    );

    let q = check(
        "SELECT COUNT(*) FROM orders WHERE id > 0;",
        &[],
        ReturnShape::Scalar(DomainType::I64),
    )
    .expect("a single terminating semicolon is allowed");
    assert_eq!(q.sql, "SELECT COUNT(*) FROM orders WHERE id > 0");
}

// ---------------------------------------------------------------------------
// Whole-contract validation
// ---------------------------------------------------------------------------

#[test]
fn two_parameter_method_with_one_placeholder_fails() {
    let item = EntityDescriptor::new("Item")
        .table("items")
        .field(FieldDescriptor::new("id", DomainType::I64))
        .field(FieldDescriptor::new("title", DomainType::String))
        .field(FieldDescriptor::new("price", DomainType::F64))
        .auto_key("id");
    let schema = SchemaModel::build(&[item], 1, &ConverterRegistry::new()).unwrap();
    let dao = AccessObjectContract::new("ItemDao").operation(
        OperationDescriptor::query(
            "pricier_than",
            "SELECT * FROM items WHERE price > ?",
            ReturnShape::EntityList("Item".into()),
        )
        .param(ParamDescriptor::value("min", DomainType::F64))
        .param(ParamDescriptor::value("max", DomainType::F64)),
    );
    let errors = validate_contracts(&schema, &[dao]).unwrap_err();
    assert_eq!(errors.len(), 1);
    assert_eq!(
        errors[0].kind,
        QueryErrorKind::ParameterArity {
            placeholders: 1,
            parameters: 2
        }
    );
}

proptest! {
    #[test]
    fn named_placeholder_arity(distinct in 0usize..5, declared in 0usize..5, repeats in 1usize..3) {
        prop_assume!(distinct != declared);
        let mut sql = String::from("SELECT id FROM orders WHERE 1 = 1");
        for i in 0..distinct {
            for _ in 0..repeats {
                sql.push_str(&format!(" AND total > :v{}", i));
            }
        }
        let params: Vec<(String, DomainType)> =
            (0..declared).map(|i| (format!("v{}", i), DomainType::F64)).collect();
        let params: Vec<(&str, DomainType)> =
            params.iter().map(|(n, t)| (n.as_str(), t.clone())).collect();
        let err = check(&sql, &params, ReturnShape::ScalarList(DomainType::I64)).unwrap_err();
        prop_assert_eq!(
            err,
            QueryErrorKind::ParameterArity { placeholders: distinct, parameters: declared }
        );
    }
}

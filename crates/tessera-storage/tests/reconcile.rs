//! Open-time reconciliation against file-backed databases.

use std::time::Duration;

use rusqlite::Connection;
use tessera_core::convert::ConverterRegistry;
use tessera_core::descriptor::{EntityDescriptor, FieldDescriptor};
use tessera_core::migration::MigrationStep;
use tessera_core::schema::SchemaModel;
use tessera_core::types::DomainType;
use tessera_storage::{
    meta, open_database, reconcile, ReconcileOptions, ReconcileOutcome, ReconcileState, Reconciler,
    SchemaValidation, StorageError,
};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn item_v1() -> EntityDescriptor {
    EntityDescriptor::new("Item")
        .table("items")
        .field(FieldDescriptor::new("id", DomainType::I64))
        .field(FieldDescriptor::new("name", DomainType::String))
        .field(FieldDescriptor::new("price", DomainType::F64))
        .auto_key("id")
}

fn item_v2() -> EntityDescriptor {
    item_v1().field(FieldDescriptor::new("discount", DomainType::F64).default_value("0"))
}

fn schema(entity: EntityDescriptor, version: u32) -> SchemaModel {
    SchemaModel::build(&[entity], version, &ConverterRegistry::new()).unwrap()
}

fn add_discount() -> MigrationStep {
    MigrationStep::new(1, 2, ["ALTER TABLE items ADD COLUMN discount REAL NOT NULL DEFAULT 0"])
}

fn structural() -> ReconcileOptions {
    ReconcileOptions {
        validation: SchemaValidation::Structural,
        ..ReconcileOptions::default()
    }
}

fn open(dir: &tempfile::TempDir) -> Connection {
    open_database(&dir.path().join("shop.db"), Duration::from_secs(1)).unwrap()
}

fn seeded_v1(dir: &tempfile::TempDir) -> Connection {
    let mut conn = open(dir);
    let outcome = reconcile(&mut conn, &schema(item_v1(), 1), &[], structural()).unwrap();
    assert_eq!(outcome, ReconcileOutcome::Created);
    conn.execute_batch(
        "INSERT INTO items (name, price) VALUES ('bolt', 0.25);
         INSERT INTO items (name, price) VALUES ('nut', 0.1);",
    )
    .unwrap();
    conn
}

fn schema_dump(conn: &Connection) -> Vec<String> {
    let mut stmt = conn
        .prepare("SELECT COALESCE(sql, name) FROM sqlite_master ORDER BY name")
        .unwrap();
    let rows = stmt.query_map([], |r| r.get::<_, String>(0)).unwrap();
    rows.collect::<Result<_, _>>().unwrap()
}

// ---------------------------------------------------------------------------
// Migration
// ---------------------------------------------------------------------------

#[test]
fn discount_column_migration_fills_existing_rows() {
    let dir = tempfile::tempdir().unwrap();
    let mut conn = seeded_v1(&dir);
    drop(conn);

    conn = open(&dir);
    let v2 = schema(item_v2(), 2);
    let steps = [add_discount()];
    let mut reconciler = Reconciler::new(&v2, &steps, structural());
    let outcome = reconciler.run(&mut conn).unwrap();
    assert_eq!(outcome, ReconcileOutcome::Migrated { from: 1, steps: 1 });
    assert_eq!(reconciler.state(), ReconcileState::UpToDate);
    assert_eq!(meta::read_version(&conn).unwrap(), Some(2));

    let discounts: Vec<f64> = conn
        .prepare("SELECT discount FROM items ORDER BY id")
        .unwrap()
        .query_map([], |r| r.get(0))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(discounts, vec![0.0, 0.0], "every existing row gets the default");
}

#[test]
fn reconciling_twice_changes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let mut conn = seeded_v1(&dir);
    let v2 = schema(item_v2(), 2);
    let steps = [add_discount()];
    reconcile(&mut conn, &v2, &steps, structural()).unwrap();
    let before = schema_dump(&conn);

    let outcome = reconcile(&mut conn, &v2, &steps, structural()).unwrap();
    assert_eq!(outcome, ReconcileOutcome::Unchanged);
    assert_eq!(schema_dump(&conn), before, "second run must not alter the schema");
    assert_eq!(meta::applied_steps(&conn).unwrap().len(), 1);
}

#[test]
fn failing_step_rolls_back_everything() {
    let dir = tempfile::tempdir().unwrap();
    let mut conn = seeded_v1(&dir);
    let before = schema_dump(&conn);

    let v3 = schema(item_v2(), 3);
    let steps = [
        add_discount(),
        MigrationStep::new(2, 3, ["ALTER TABLE missing_table ADD COLUMN x INTEGER"]),
    ];
    let mut reconciler = Reconciler::new(&v3, &steps, structural());
    let err = reconciler.run(&mut conn).unwrap_err();
    assert!(matches!(err, StorageError::MigrationFailed { from: 1, to: 3, .. }), "{}", err);
    assert_eq!(reconciler.state(), ReconcileState::MigrationFailed);
    assert_eq!(meta::read_version(&conn).unwrap(), Some(1), "version unchanged");
    assert_eq!(schema_dump(&conn), before, "first step rolled back too");
    assert!(meta::applied_steps(&conn).unwrap().is_empty());
}

#[test]
fn migration_that_misses_the_declared_shape_fails() {
    let dir = tempfile::tempdir().unwrap();
    let mut conn = seeded_v1(&dir);
    // Adds the column as nullable while the entity declares it NOT NULL.
    let sloppy = MigrationStep::new(1, 2, ["ALTER TABLE items ADD COLUMN discount REAL DEFAULT 0"]);
    let err = reconcile(&mut conn, &schema(item_v2(), 2), &[sloppy], structural()).unwrap_err();
    match err {
        StorageError::MigrationFailed { reason, .. } => {
            assert!(reason.contains("nullability"), "{}", reason)
        }
        other => panic!("expected MigrationFailed, got {}", other),
    }
    assert_eq!(meta::read_version(&conn).unwrap(), Some(1));
}

// ---------------------------------------------------------------------------
// Validation at the declared version
// ---------------------------------------------------------------------------

#[test]
fn out_of_band_change_is_a_schema_mismatch() {
    let dir = tempfile::tempdir().unwrap();
    let mut conn = seeded_v1(&dir);
    conn.execute_batch("ALTER TABLE items ADD COLUMN colour TEXT").unwrap();

    let v1 = schema(item_v1(), 1);
    let mut reconciler = Reconciler::new(&v1, &[], structural());
    match reconciler.run(&mut conn) {
        Err(StorageError::SchemaMismatch { differences }) => {
            assert!(differences.iter().any(|d| d.contains("colour")), "{:?}", differences)
        }
        other => panic!("expected SchemaMismatch, got {:?}", other),
    }
    assert_eq!(reconciler.state(), ReconcileState::SchemaMismatch);

    // Identity-only validation cannot see the extra column.
    assert_eq!(
        reconcile(&mut conn, &v1, &[], ReconcileOptions::default()).unwrap(),
        ReconcileOutcome::Unchanged
    );
}

#[test]
fn changed_declaration_without_version_bump_is_detected() {
    let dir = tempfile::tempdir().unwrap();
    let mut conn = seeded_v1(&dir);
    let drifted = schema(item_v2(), 1);
    assert!(matches!(
        reconcile(&mut conn, &drifted, &[], ReconcileOptions::default()),
        Err(StorageError::SchemaMismatch { .. })
    ));

    let off = ReconcileOptions {
        validation: SchemaValidation::Off,
        ..ReconcileOptions::default()
    };
    assert_eq!(
        reconcile(&mut conn, &drifted, &[], off).unwrap(),
        ReconcileOutcome::Unchanged
    );
}

#[test]
fn edited_published_step_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let mut conn = seeded_v1(&dir);
    let v2 = schema(item_v2(), 2);
    reconcile(&mut conn, &v2, &[add_discount()], structural()).unwrap();

    let edited = MigrationStep::new(1, 2, ["ALTER TABLE items ADD COLUMN discount REAL NOT NULL DEFAULT 1"]);
    assert!(matches!(
        reconcile(&mut conn, &v2, &[edited], structural()),
        Err(StorageError::MigrationTampered { from: 1, to: 2 })
    ));
}

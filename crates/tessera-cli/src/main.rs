//! tessera command-line tools.
//!
//! Provides the `tessera` binary for working with database descriptors
//! (JSON files) outside a running application: validating them, printing
//! the DDL they imply, emitting typed Rust access objects and reconciling a
//! database file against them.
//!
//! Every subcommand runs the same `tessera_codegen::generate()` pipeline the
//! runtime uses when a database is opened.

use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use serde_json::json;
use tracing_subscriber::EnvFilter;

use tessera_codegen::{CodegenError, GeneratedDatabase};
use tessera_core::convert::ConverterRegistry;
use tessera_core::database::DatabaseDescriptor;
use tessera_storage::{ReconcileOptions, ReconcileOutcome, SchemaValidation};

/// Typed persistence access objects over SQLite.
#[derive(Parser)]
#[command(name = "tessera", about = "Descriptor tools for tessera databases")]
struct Cli {
    /// Log pipeline and reconciliation steps (overridden by `RUST_LOG`).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a descriptor and print a summary of its access surface.
    Check {
        /// Path to the descriptor JSON file.
        descriptor: PathBuf,
    },

    /// Print the CREATE statements for the declared schema.
    Schema {
        descriptor: PathBuf,
    },

    /// Emit typed Rust access objects.
    Generate {
        descriptor: PathBuf,

        /// Output file (default: stdout).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Create or migrate a database file to the declared schema.
    Migrate {
        descriptor: PathBuf,

        /// Path to the database file.
        #[arg(short, long)]
        db: PathBuf,

        /// Schema validation mode: off, identity, structural.
        #[arg(long, default_value = "identity")]
        validation: SchemaValidation,

        /// Drop and recreate all tables when no migration path exists.
        #[arg(long)]
        destructive_fallback: bool,
    },
}

/// Exit codes: 0 = success, 1 = invalid descriptor, 2 = query validation
/// failure, 3 = I/O or storage error.
fn main() {
    let cli = Cli::parse();
    let default_filter = if cli.verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let exit_code = match cli.command {
        Commands::Check { descriptor } => run_check(&descriptor),
        Commands::Schema { descriptor } => run_schema(&descriptor),
        Commands::Generate { descriptor, output } => run_generate(&descriptor, output.as_deref()),
        Commands::Migrate {
            descriptor,
            db,
            validation,
            destructive_fallback,
        } => run_migrate(
            &descriptor,
            &db,
            ReconcileOptions {
                validation,
                destructive_fallback,
            },
        ),
    };
    process::exit(exit_code);
}

/// Loads and generates `path`, reporting failures on stderr.
fn load(path: &Path) -> Result<GeneratedDatabase, i32> {
    tracing::debug!(path = %path.display(), "loading descriptor");
    let text = fs::read_to_string(path).map_err(|e| {
        eprintln!("Error: failed to read '{}': {}", path.display(), e);
        3
    })?;
    let descriptor = DatabaseDescriptor::from_json(&text).map_err(|e| {
        eprintln!("Error: '{}' is not a valid descriptor: {}", path.display(), e);
        1
    })?;
    let db = tessera_codegen::generate(&descriptor, &ConverterRegistry::new()).map_err(|err| match err {
        CodegenError::QueryValidationFailed(errors) => {
            tracing::warn!(errors = errors.len(), "query validation failed");
            eprintln!("Query validation failed with {} error(s):", errors.len());
            for err in &errors {
                eprintln!("  - {}", err);
            }
            2
        }
        other => {
            eprintln!("Error: {}", other);
            1
        }
    })?;
    tracing::info!(
        database = %db.name,
        version = db.version(),
        contracts = db.contracts.len(),
        "descriptor generated"
    );
    Ok(db)
}

fn run_check(path: &Path) -> i32 {
    let db = match load(path) {
        Ok(db) => db,
        Err(code) => return code,
    };
    let contracts: serde_json::Map<String, serde_json::Value> = db
        .contracts
        .values()
        .map(|c| {
            let ops: Vec<_> = c
                .operations
                .values()
                .map(|op| {
                    json!({
                        "name": op.name,
                        "write": op.is_write(),
                        "tables": op.tables(),
                    })
                })
                .collect();
            (c.name.clone(), json!(ops))
        })
        .collect();
    let contracts_len = contracts.len();
    let summary = json!({
        "database": db.name,
        "version": db.version(),
        "tables": db.schema.tables().map(|t| t.name.clone()).collect::<Vec<_>>(),
        "contracts": contracts,
        "migrations": db.migrations.iter().map(|m| format!("{} -> {}", m.from, m.to)).collect::<Vec<_>>(),
    });
    tracing::debug!(contracts = contracts_len, "checked descriptor");
    print_json(&summary);
    0
}

fn run_schema(path: &Path) -> i32 {
    let db = match load(path) {
        Ok(db) => db,
        Err(code) => return code,
    };
    let statements = db.schema.create_statements();
    tracing::debug!(statements = statements.len(), "printing schema");
    for statement in statements {
        println!("{};", statement);
    }
    0
}

fn run_generate(path: &Path, output: Option<&Path>) -> i32 {
    let db = match load(path) {
        Ok(db) => db,
        Err(code) => return code,
    };
    let source = match tessera_codegen::emit_rust(&db) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    tracing::debug!(bytes = source.len(), "emitted access objects");
    match output {
        Some(out) => match fs::write(out, source) {
            Ok(()) => {
                eprintln!("Wrote {}", out.display());
                0
            }
            Err(e) => {
                eprintln!("Error: failed to write '{}': {}", out.display(), e);
                3
            }
        },
        None => {
            print!("{}", source);
            0
        }
    }
}

fn run_migrate(path: &Path, db_path: &Path, options: ReconcileOptions) -> i32 {
    let db = match load(path) {
        Ok(db) => db,
        Err(code) => return code,
    };
    let mut conn = match tessera_storage::open_database(db_path, std::time::Duration::from_secs(5)) {
        Ok(conn) => conn,
        Err(e) => {
            eprintln!("Error: failed to open database '{}': {}", db_path.display(), e);
            return 3;
        }
    };
    match tessera_storage::reconcile(&mut conn, &db.schema, &db.migrations, options) {
        Ok(outcome) => {
            tracing::info!(db = %db_path.display(), ?outcome, "reconciled");
            let (action, from, steps) = match outcome {
                ReconcileOutcome::Created => ("created", None, 0),
                ReconcileOutcome::Unchanged => ("unchanged", Some(db.version()), 0),
                ReconcileOutcome::Migrated { from, steps } => ("migrated", Some(from), steps),
                ReconcileOutcome::Recreated { from } => ("recreated", Some(from), 0),
            };
            print_json(&json!({
                "database": db_path.display().to_string(),
                "action": action,
                "from": from,
                "to": db.version(),
                "steps": steps,
            }));
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            3
        }
    }
}

fn print_json(value: &serde_json::Value) {
    let text = serde_json::to_string_pretty(value)
        .unwrap_or_else(|e| format!("{{\"error\": \"failed to serialize output: {}\"}}", e));
    println!("{}", text);
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn migrate_parses_validation_mode() {
        let cli = Cli::try_parse_from([
            "tessera",
            "migrate",
            "shop.json",
            "--db",
            "shop.db",
            "--validation",
            "structural",
        ])
        .unwrap();
        match cli.command {
            Commands::Migrate { validation, destructive_fallback, .. } => {
                assert_eq!(validation, SchemaValidation::Structural);
                assert!(!destructive_fallback);
            }
            _ => panic!("expected migrate"),
        }
        assert!(Cli::try_parse_from(["tessera", "migrate", "shop.json", "--db", "x", "--validation", "loose"]).is_err());
    }

    #[test]
    fn missing_descriptor_is_an_io_error() {
        assert_eq!(load(Path::new("/nonexistent/descriptor.json")).err(), Some(3));
    }

    #[test]
    fn malformed_descriptor_is_invalid() {
        let path = std::env::temp_dir().join(format!("tessera-cli-malformed-{}.json", process::id()));
        fs::write(&path, "{ not json").unwrap();
        let code = load(&path).err();
        let _ = fs::remove_file(&path);
        assert_eq!(code, Some(1));
    }
}

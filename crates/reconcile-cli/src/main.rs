use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use reconcile_core::{
    build_status_collection, check_one, create_indexes, summarize_errors, CollectionNames,
    ObjectId, OBJECT_ID_FIELD,
};
use reconcile_store_sqlite::{RunRecord, SqliteStore};
use serde_json::Value;
use time::OffsetDateTime;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};
use ulid::Ulid;

const CLI_CONTRACT_VERSION: &str = "cli.v1";
const DEFAULT_LOG_FILTER: &str = "reconcile=info";

#[derive(Debug, Parser)]
#[command(name = "reconcile")]
#[command(about = "Reconcile pipeline file records against their legacy counterparts")]
struct Cli {
    #[arg(long, default_value = "./reconcile.sqlite3")]
    db: PathBuf,

    #[command(flatten)]
    collections: CollectionArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Args)]
struct CollectionArgs {
    /// Collection holding the pipeline records under test.
    #[arg(long, default_value = "SONG")]
    candidates: String,
    /// Legacy collection every candidate is checked against.
    #[arg(long, default_value = "PCAWGFile")]
    primary: String,
    /// Legacy collection supplying the file copies.
    #[arg(long, default_value = "CollabFile")]
    secondary: String,
    /// Collection receiving one verdict per candidate.
    #[arg(long, default_value = "status")]
    status: String,
}

impl CollectionArgs {
    fn into_names(self) -> CollectionNames {
        CollectionNames {
            candidates: self.candidates,
            primary: self.primary,
            secondary: self.secondary,
            status: self.status,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    Db {
        #[command(subcommand)]
        command: DbCommand,
    },
    Collection {
        #[command(subcommand)]
        command: CollectionCommand,
    },
    Indexes {
        #[command(subcommand)]
        command: IndexesCommand,
    },
    Status {
        #[command(subcommand)]
        command: StatusCommand,
    },
    /// Reconcile a single candidate without writing a verdict.
    Check(CheckArgs),
}

#[derive(Debug, Subcommand)]
enum DbCommand {
    SchemaVersion,
    Migrate(DbMigrateArgs),
}

#[derive(Debug, Args)]
struct DbMigrateArgs {
    #[arg(long, default_value_t = false)]
    dry_run: bool,
}

#[derive(Debug, Subcommand)]
enum CollectionCommand {
    /// Load newline-delimited JSON documents into a collection.
    Import(CollectionImportArgs),
    Drop(CollectionDropArgs),
    List,
}

#[derive(Debug, Args)]
struct CollectionImportArgs {
    #[arg(long)]
    name: String,
    #[arg(long = "in")]
    input: PathBuf,
}

#[derive(Debug, Args)]
struct CollectionDropArgs {
    #[arg(long)]
    name: String,
}

#[derive(Debug, Subcommand)]
enum IndexesCommand {
    /// Index `object_id` in the candidate and legacy collections.
    Create,
}

#[derive(Debug, Subcommand)]
enum StatusCommand {
    /// Rebuild the status collection and record the run.
    Build,
    /// Count verdicts per failure label.
    Summarize,
    Export(StatusExportArgs),
    Runs,
}

#[derive(Debug, Args)]
struct StatusExportArgs {
    #[arg(long)]
    out: PathBuf,
}

#[derive(Debug, Args)]
struct CheckArgs {
    #[arg(long)]
    object_id: String,
}

fn with_contract_version(value: Value) -> Value {
    match value {
        Value::Object(mut object) => {
            object.insert(
                "contract_version".to_string(),
                Value::String(CLI_CONTRACT_VERSION.to_string()),
            );
            Value::Object(object)
        }
        other => serde_json::json!({
            "contract_version": CLI_CONTRACT_VERSION,
            "payload": other
        }),
    }
}

fn emit_json(value: Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&with_contract_version(value))?);
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let names = cli.collections.into_names();
    let mut store = SqliteStore::open(&cli.db)?;

    match cli.command {
        Command::Db { command } => run_db(command, &mut store),
        Command::Collection { command } => {
            store.migrate()?;
            run_collection(command, &mut store)
        }
        Command::Indexes { command } => {
            store.migrate()?;
            run_indexes(&command, &mut store, &names)
        }
        Command::Status { command } => {
            store.migrate()?;
            run_status(command, &mut store, &names)
        }
        Command::Check(args) => {
            store.migrate()?;
            run_check(&args, &store, &names)
        }
    }
}

fn run_db(command: DbCommand, store: &mut SqliteStore) -> Result<()> {
    match command {
        DbCommand::SchemaVersion => run_db_schema_version(store),
        DbCommand::Migrate(args) => run_db_migrate(&args, store),
    }
}

fn run_db_schema_version(store: &SqliteStore) -> Result<()> {
    let status = store.schema_status()?;
    emit_json(serde_json::json!({
        "current_version": status.current_version,
        "target_version": status.target_version,
        "pending_versions": status.pending_versions,
        "up_to_date": status.pending_versions.is_empty()
    }))
}

fn run_db_migrate(args: &DbMigrateArgs, store: &mut SqliteStore) -> Result<()> {
    let before = store.schema_status()?;
    if args.dry_run {
        return emit_json(serde_json::json!({
            "dry_run": true,
            "current_version": before.current_version,
            "target_version": before.target_version,
            "would_apply_versions": before.pending_versions
        }));
    }

    store.migrate()?;
    let after = store.schema_status()?;
    emit_json(serde_json::json!({
        "dry_run": false,
        "before_version": before.current_version,
        "applied_versions": before.pending_versions,
        "after_version": after.current_version,
        "target_version": after.target_version,
        "up_to_date": after.pending_versions.is_empty()
    }))
}

fn run_collection(command: CollectionCommand, store: &mut SqliteStore) -> Result<()> {
    match command {
        CollectionCommand::Import(args) => {
            let summary = store.import_ndjson(&args.name, &args.input)?;
            emit_json(serde_json::json!({
                "in_file": args.input,
                "summary": summary
            }))
        }
        CollectionCommand::Drop(args) => {
            let documents = store.count_documents(&args.name)?;
            store.drop_collection(&args.name)?;
            emit_json(serde_json::json!({
                "collection": args.name,
                "dropped_documents": documents
            }))
        }
        CollectionCommand::List => {
            let collections = store.list_collections()?;
            emit_json(serde_json::json!({ "collections": collections }))
        }
    }
}

fn run_indexes(
    command: &IndexesCommand,
    store: &mut SqliteStore,
    names: &CollectionNames,
) -> Result<()> {
    match command {
        IndexesCommand::Create => {
            create_indexes(store, names).context("failed to create object_id indexes")?;
            let indexes: Vec<Value> = names
                .sources()
                .iter()
                .map(|collection| {
                    serde_json::json!({ "collection": collection, "field": OBJECT_ID_FIELD })
                })
                .collect();
            emit_json(serde_json::json!({ "indexes": indexes }))
        }
    }
}

fn run_status(
    command: StatusCommand,
    store: &mut SqliteStore,
    names: &CollectionNames,
) -> Result<()> {
    match command {
        StatusCommand::Build => run_status_build(store, names),
        StatusCommand::Summarize => {
            let report = summarize_errors(&*store, names).with_context(|| {
                format!("failed to summarize status collection {}", names.status)
            })?;
            emit_json(serde_json::json!({
                "status_collection": names.status,
                "verdicts": store.count_documents(&names.status)?,
                "errors": report
            }))
        }
        StatusCommand::Export(args) => {
            let manifest = store.export_collection(&names.status, &args.out)?;
            emit_json(serde_json::json!({
                "out_dir": args.out,
                "manifest": manifest
            }))
        }
        StatusCommand::Runs => {
            let runs = store.list_runs()?;
            emit_json(serde_json::json!({ "runs": runs }))
        }
    }
}

fn run_status_build(store: &mut SqliteStore, names: &CollectionNames) -> Result<()> {
    let run_id = Ulid::new();
    let started_at = OffsetDateTime::now_utc();
    info!(%run_id, candidates = %names.candidates, status = %names.status, "status build started");

    let tally = build_status_collection(store, names)
        .with_context(|| format!("status build {run_id} aborted"))?;
    let run = RunRecord {
        run_id,
        candidates_collection: names.candidates.clone(),
        status_collection: names.status.clone(),
        started_at,
        finished_at: OffsetDateTime::now_utc(),
        tally,
    };
    store.record_run(&run)?;

    emit_json(serde_json::to_value(&run).context("failed to serialize run record")?)
}

fn run_check(args: &CheckArgs, store: &SqliteStore, names: &CollectionNames) -> Result<()> {
    let object_id = ObjectId::new(args.object_id.as_str());
    let verdict = check_one(store, names, &object_id)
        .with_context(|| format!("failed to check {OBJECT_ID_FIELD} {object_id}"))?;
    emit_json(serde_json::json!({
        "candidates_collection": names.candidates,
        "verdict": verdict
    }))
}

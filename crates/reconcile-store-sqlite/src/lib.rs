use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use reconcile_core::{ObjectId, ReconcileError, Record, RecordStore, RunTally, OBJECT_ID_FIELD};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use tracing::{debug, info};
use ulid::Ulid;

const LATEST_SCHEMA_VERSION: i64 = 2;

const CREATE_SCHEMA_MIGRATIONS_SQL: &str = r"
CREATE TABLE IF NOT EXISTS schema_migrations (
  version INTEGER PRIMARY KEY,
  applied_at TEXT NOT NULL
);
";

const MIGRATION_001_SQL: &str = r"
CREATE TABLE IF NOT EXISTS collections (
  name TEXT PRIMARY KEY,
  created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS documents (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  collection TEXT NOT NULL,
  object_id TEXT,
  document_json TEXT NOT NULL,
  FOREIGN KEY (collection) REFERENCES collections(name) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS collection_indexes (
  collection TEXT NOT NULL,
  field TEXT NOT NULL,
  index_name TEXT NOT NULL UNIQUE,
  created_at TEXT NOT NULL,
  PRIMARY KEY (collection, field),
  FOREIGN KEY (collection) REFERENCES collections(name) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_documents_collection ON documents(collection);
";

const MIGRATION_002_SQL: &str = r"
CREATE TABLE IF NOT EXISTS reconcile_runs (
  run_id TEXT PRIMARY KEY,
  candidates_collection TEXT NOT NULL,
  status_collection TEXT NOT NULL,
  started_at TEXT NOT NULL,
  finished_at TEXT NOT NULL,
  candidates INTEGER NOT NULL CHECK (candidates >= 0),
  passed INTEGER NOT NULL CHECK (passed >= 0),
  failed INTEGER NOT NULL CHECK (failed >= 0),
  CHECK (passed + failed = candidates)
);

CREATE INDEX IF NOT EXISTS idx_reconcile_runs_started_at ON reconcile_runs(started_at);
";

const MIGRATIONS: [(i64, &str); 2] = [(1, MIGRATION_001_SQL), (2, MIGRATION_002_SQL)];

pub struct SqliteStore {
    conn: Connection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SchemaStatus {
    pub current_version: i64,
    pub target_version: i64,
    pub pending_versions: Vec<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CollectionSummary {
    pub name: String,
    pub documents: usize,
    pub indexed_fields: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImportSummary {
    pub collection: String,
    pub imported_documents: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExportFileDigest {
    pub path: String,
    pub sha256: String,
    pub records: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExportManifest {
    pub schema_version: i64,
    pub collection: String,
    pub exported_at: String,
    pub files: Vec<ExportFileDigest>,
}

/// One completed status build.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunRecord {
    pub run_id: Ulid,
    pub candidates_collection: String,
    pub status_collection: String,
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub finished_at: OffsetDateTime,
    #[serde(flatten)]
    pub tally: RunTally,
}

impl SqliteStore {
    /// Open a SQLite-backed document store and configure required runtime pragmas.
    ///
    /// # Errors
    /// Returns an error when the database cannot be opened or pragmas cannot be applied.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open sqlite database at {}", path.display()))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )
        .context("failed to configure sqlite pragmas")?;

        Ok(Self { conn })
    }

    /// Report current and target schema versions plus pending migrations.
    ///
    /// # Errors
    /// Returns an error when schema metadata cannot be read or initialized.
    pub fn schema_status(&self) -> Result<SchemaStatus> {
        self.conn
            .execute_batch(CREATE_SCHEMA_MIGRATIONS_SQL)
            .context("failed to apply schema_migrations table")?;
        let current_version = current_schema_version(&self.conn)?;
        let pending_versions = MIGRATIONS
            .iter()
            .map(|(version, _)| *version)
            .filter(|version| *version > current_version)
            .collect();

        Ok(SchemaStatus { current_version, target_version: LATEST_SCHEMA_VERSION, pending_versions })
    }

    /// Apply all forward migrations up to the latest supported schema version.
    ///
    /// # Errors
    /// Returns an error when any migration step fails or the database is newer than supported.
    pub fn migrate(&mut self) -> Result<()> {
        self.conn
            .execute_batch(CREATE_SCHEMA_MIGRATIONS_SQL)
            .context("failed to apply schema_migrations table")?;

        let current_version = current_schema_version(&self.conn)?;
        if current_version > LATEST_SCHEMA_VERSION {
            return Err(anyhow!(
                "unsupported schema version {current_version}; expected {LATEST_SCHEMA_VERSION}"
            ));
        }

        for (version, sql) in MIGRATIONS {
            if version <= current_version {
                continue;
            }
            let tx = self
                .conn
                .transaction()
                .with_context(|| format!("failed to start migration v{version} transaction"))?;
            tx.execute_batch(sql).with_context(|| format!("failed to apply migration v{version}"))?;
            tx.execute(
                "INSERT OR IGNORE INTO schema_migrations(version, applied_at) VALUES (?1, ?2)",
                params![version, now_rfc3339()?],
            )
            .with_context(|| format!("failed to record migration version {version}"))?;
            tx.commit().with_context(|| format!("failed to commit migration v{version}"))?;
            info!(version, "applied schema migration");
        }

        Ok(())
    }

    /// Register a collection. Creating an existing collection is a no-op.
    ///
    /// # Errors
    /// Returns an error when the name is invalid or the write fails.
    pub fn create_collection(&mut self, name: &str) -> Result<()> {
        validate_name("collection", name)?;
        ensure_collection(&self.conn, name)
    }

    /// Remove a collection, its documents and its indexes.
    ///
    /// # Errors
    /// Returns an error when the name is invalid or any delete fails.
    pub fn drop_collection(&mut self, name: &str) -> Result<()> {
        validate_name("collection", name)?;
        let tx = self.conn.transaction().context("failed to start transaction")?;

        let index_names = {
            let mut stmt =
                tx.prepare("SELECT index_name FROM collection_indexes WHERE collection = ?1")?;
            let rows = stmt.query_map(params![name], |row| row.get::<_, String>(0))?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };
        for index_name in &index_names {
            tx.execute_batch(&format!("DROP INDEX IF EXISTS \"{index_name}\";"))
                .with_context(|| format!("failed to drop index {index_name}"))?;
        }

        let removed = tx
            .execute("DELETE FROM documents WHERE collection = ?1", params![name])
            .context("failed to delete collection documents")?;
        tx.execute("DELETE FROM collection_indexes WHERE collection = ?1", params![name])
            .context("failed to delete collection index rows")?;
        tx.execute("DELETE FROM collections WHERE name = ?1", params![name])
            .context("failed to delete collection")?;
        tx.commit().context("failed to commit drop transaction")?;

        debug!(collection = name, removed, indexes = index_names.len(), "dropped collection");
        Ok(())
    }

    /// Build a SQLite index accelerating lookups on `field` within `collection`.
    ///
    /// `object_id` uses the extracted column; any other field is indexed through a
    /// `json_extract` expression. Creating an existing index is a no-op.
    ///
    /// # Errors
    /// Returns an error when a name is invalid or the index cannot be created.
    pub fn create_index(&mut self, collection: &str, field: &str) -> Result<()> {
        validate_name("collection", collection)?;
        validate_field(field)?;

        let index_name = index_name(collection, field);
        let target = if field == OBJECT_ID_FIELD {
            "object_id".to_string()
        } else {
            format!("json_extract(document_json, '$.{field}')")
        };

        let tx = self.conn.transaction().context("failed to start transaction")?;
        ensure_collection(&tx, collection)?;
        tx.execute_batch(&format!(
            "CREATE INDEX IF NOT EXISTS \"{index_name}\" ON documents({target})
             WHERE collection = '{collection}';"
        ))
        .with_context(|| format!("failed to create index {index_name}"))?;
        tx.execute(
            "INSERT OR IGNORE INTO collection_indexes(collection, field, index_name, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![collection, field, index_name, now_rfc3339()?],
        )
        .context("failed to record collection index")?;
        tx.commit().context("failed to commit index transaction")?;
        Ok(())
    }

    /// Append one document, creating the collection on first use.
    ///
    /// # Errors
    /// Returns an error when the collection name is invalid or the write fails.
    pub fn insert_document(&mut self, collection: &str, record: &Record) -> Result<()> {
        validate_name("collection", collection)?;
        let tx = self.conn.transaction().context("failed to start transaction")?;
        insert_in(&tx, collection, record)?;
        tx.commit().context("failed to commit insert transaction")?;
        Ok(())
    }

    /// Documents of `collection` whose `object_id` matches, in insertion order.
    ///
    /// # Errors
    /// Returns an error when the lookup fails or a stored document cannot be decoded.
    pub fn find_documents(&self, collection: &str, object_id: &ObjectId) -> Result<Vec<Record>> {
        validate_name("collection", collection)?;
        // The literal collection lets SQLite pick the partial index built by create_index.
        let mut stmt = self.conn.prepare(&format!(
            "SELECT document_json FROM documents
             WHERE collection = '{collection}' AND object_id = ?1
             ORDER BY id ASC"
        ))?;
        let rows = stmt.query_map(params![object_id.as_str()], |row| row.get::<_, String>(0))?;
        decode_rows(rows)
    }

    /// Every document of `collection` in insertion order.
    ///
    /// # Errors
    /// Returns an error when rows cannot be read or decoded.
    pub fn scan_documents(&self, collection: &str) -> Result<Vec<Record>> {
        let mut stmt = self.conn.prepare(
            "SELECT document_json FROM documents WHERE collection = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![collection], |row| row.get::<_, String>(0))?;
        decode_rows(rows)
    }

    /// Number of documents stored in `collection`.
    ///
    /// # Errors
    /// Returns an error when the count query fails.
    pub fn count_documents(&self, collection: &str) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM documents WHERE collection = ?1",
            params![collection],
            |row| row.get(0),
        )?;
        usize::try_from(count).context("document count out of range")
    }

    /// All collections with document counts and indexed fields, ordered by name.
    ///
    /// # Errors
    /// Returns an error when the catalog cannot be read.
    pub fn list_collections(&self) -> Result<Vec<CollectionSummary>> {
        let names = {
            let mut stmt = self.conn.prepare("SELECT name FROM collections ORDER BY name ASC")?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };

        let mut summaries = Vec::with_capacity(names.len());
        for name in names {
            let mut stmt = self.conn.prepare(
                "SELECT field FROM collection_indexes WHERE collection = ?1 ORDER BY field ASC",
            )?;
            let indexed_fields = stmt
                .query_map(params![name], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            summaries.push(CollectionSummary {
                documents: self.count_documents(&name)?,
                indexed_fields,
                name,
            });
        }
        Ok(summaries)
    }

    /// Load one JSON document per line into `collection`. Blank lines are skipped and the
    /// whole file is written in a single transaction.
    ///
    /// # Errors
    /// Returns an error when the file cannot be read, a line is not a JSON object, or a write
    /// fails. Nothing is imported in that case.
    pub fn import_ndjson(&mut self, collection: &str, path: &Path) -> Result<ImportSummary> {
        validate_name("collection", collection)?;
        let records = read_ndjson_file(path)?;

        let tx = self.conn.transaction().context("failed to start import transaction")?;
        for record in &records {
            insert_in(&tx, collection, record)?;
        }
        tx.commit().context("failed to commit import transaction")?;

        info!(collection, documents = records.len(), path = %path.display(), "imported documents");
        Ok(ImportSummary { collection: collection.to_string(), imported_documents: records.len() })
    }

    /// Export `collection` as NDJSON plus a manifest carrying its SHA-256 digest.
    ///
    /// # Errors
    /// Returns an error when export files cannot be created, written, or serialized.
    pub fn export_collection(&self, collection: &str, out_dir: &Path) -> Result<ExportManifest> {
        validate_name("collection", collection)?;
        fs::create_dir_all(out_dir)
            .with_context(|| format!("failed to create export directory {}", out_dir.display()))?;

        let records = self.scan_documents(collection)?;
        let file_name = format!("{collection}.ndjson");
        let (sha256, written) = write_ndjson_file(&out_dir.join(&file_name), &records)?;

        let manifest = ExportManifest {
            schema_version: LATEST_SCHEMA_VERSION,
            collection: collection.to_string(),
            exported_at: now_rfc3339()?,
            files: vec![ExportFileDigest { path: file_name, sha256, records: written }],
        };

        let manifest_path = out_dir.join("manifest.json");
        let manifest_json =
            serde_json::to_vec_pretty(&manifest).context("failed to serialize export manifest")?;
        fs::write(&manifest_path, manifest_json).with_context(|| {
            format!("failed to write export manifest {}", manifest_path.display())
        })?;

        Ok(manifest)
    }

    /// Append a finished run to the run ledger.
    ///
    /// # Errors
    /// Returns an error when timestamps cannot be formatted or the insert fails.
    pub fn record_run(&mut self, run: &RunRecord) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO reconcile_runs(
                    run_id, candidates_collection, status_collection, started_at, finished_at,
                    candidates, passed, failed
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    run.run_id.to_string(),
                    run.candidates_collection,
                    run.status_collection,
                    rfc3339(run.started_at)?,
                    rfc3339(run.finished_at)?,
                    to_sql_count(run.tally.candidates)?,
                    to_sql_count(run.tally.passed)?,
                    to_sql_count(run.tally.failed)?,
                ],
            )
            .context("failed to record reconciliation run")?;
        Ok(())
    }

    /// Run ledger, most recent first.
    ///
    /// # Errors
    /// Returns an error when rows cannot be read or decoded.
    pub fn list_runs(&self) -> Result<Vec<RunRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT run_id, candidates_collection, status_collection, started_at, finished_at,
                    candidates, passed, failed
             FROM reconcile_runs
             ORDER BY started_at DESC, run_id DESC",
        )?;
        let mut rows = stmt.query([])?;
        let mut runs = Vec::new();

        while let Some(row) = rows.next()? {
            let run_id_raw: String = row.get(0)?;
            let started_at_raw: String = row.get(3)?;
            let finished_at_raw: String = row.get(4)?;
            runs.push(RunRecord {
                run_id: Ulid::from_string(&run_id_raw)
                    .with_context(|| format!("invalid ULID: {run_id_raw}"))?,
                candidates_collection: row.get(1)?,
                status_collection: row.get(2)?,
                started_at: parse_rfc3339(&started_at_raw)?,
                finished_at: parse_rfc3339(&finished_at_raw)?,
                tally: RunTally {
                    candidates: from_sql_count(row.get(5)?)?,
                    passed: from_sql_count(row.get(6)?)?,
                    failed: from_sql_count(row.get(7)?)?,
                },
            });
        }

        Ok(runs)
    }
}

impl RecordStore for SqliteStore {
    fn create_collection(&mut self, name: &str) -> Result<(), ReconcileError> {
        Self::create_collection(self, name).map_err(store_error)
    }

    fn drop_collection(&mut self, name: &str) -> Result<(), ReconcileError> {
        Self::drop_collection(self, name).map_err(store_error)
    }

    fn create_index(&mut self, collection: &str, field: &str) -> Result<(), ReconcileError> {
        Self::create_index(self, collection, field).map_err(store_error)
    }

    fn insert(&mut self, collection: &str, record: &Record) -> Result<(), ReconcileError> {
        self.insert_document(collection, record).map_err(store_error)
    }

    fn find_by_object_id(
        &self,
        collection: &str,
        object_id: &ObjectId,
    ) -> Result<Vec<Record>, ReconcileError> {
        self.find_documents(collection, object_id).map_err(store_error)
    }

    fn scan(&self, collection: &str) -> Result<Vec<Record>, ReconcileError> {
        self.scan_documents(collection).map_err(store_error)
    }
}

fn store_error(err: anyhow::Error) -> ReconcileError {
    ReconcileError::Store(format!("{err:#}"))
}

fn ensure_collection(conn: &Connection, name: &str) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO collections(name, created_at) VALUES (?1, ?2)",
        params![name, now_rfc3339()?],
    )
    .with_context(|| format!("failed to create collection {name}"))?;
    Ok(())
}

fn insert_in(tx: &Transaction<'_>, collection: &str, record: &Record) -> Result<()> {
    ensure_collection(tx, collection)?;
    let document_json =
        serde_json::to_string(&record.to_json()).context("failed to serialize document")?;
    tx.execute(
        "INSERT INTO documents(collection, object_id, document_json) VALUES (?1, ?2, ?3)",
        params![collection, record.object_id().map(|id| id.0), document_json],
    )
    .with_context(|| format!("failed to insert document into {collection}"))?;
    Ok(())
}

fn decode_rows<F>(rows: rusqlite::MappedRows<'_, F>) -> Result<Vec<Record>>
where
    F: FnMut(&rusqlite::Row<'_>) -> rusqlite::Result<String>,
{
    let mut records = Vec::new();
    for row in rows {
        let document_json = row?;
        let document: serde_json::Value =
            serde_json::from_str(&document_json).context("failed to parse stored document")?;
        records.push(Record::from_json(document).map_err(|err| anyhow!("{err}"))?);
    }
    Ok(records)
}

fn validate_name(kind: &str, name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name.len() <= 64
        && name.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if valid {
        Ok(())
    } else {
        Err(anyhow!("invalid {kind} name `{name}`: use 1-64 of [A-Za-z0-9_.-]"))
    }
}

fn validate_field(field: &str) -> Result<()> {
    let valid = !field.is_empty()
        && field.len() <= 64
        && !field.starts_with('.')
        && !field.ends_with('.')
        && field.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(anyhow!("invalid field path `{field}`: use dotted [A-Za-z0-9_] segments"))
    }
}

fn index_name(collection: &str, field: &str) -> String {
    format!("idx_doc_{collection}__{field}")
        .replace(|c: char| !c.is_ascii_alphanumeric() && c != '_', "_")
}

fn current_schema_version(conn: &Connection) -> Result<i64> {
    let version: Option<i64> = conn
        .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| row.get(0))
        .optional()?
        .flatten();
    Ok(version.unwrap_or(0))
}

fn to_sql_count(value: usize) -> Result<i64> {
    i64::try_from(value).context("count does not fit in an sqlite integer")
}

fn from_sql_count(value: i64) -> Result<usize> {
    usize::try_from(value).context("stored count is negative")
}

fn now_rfc3339() -> Result<String> {
    rfc3339(OffsetDateTime::now_utc())
}

fn rfc3339(value: OffsetDateTime) -> Result<String> {
    value
        .format(&time::format_description::well_known::Rfc3339)
        .context("failed to format RFC3339 timestamp")
}

fn parse_rfc3339(value: &str) -> Result<OffsetDateTime> {
    OffsetDateTime::parse(value, &time::format_description::well_known::Rfc3339)
        .with_context(|| format!("invalid RFC3339 timestamp: {value}"))
}

fn write_ndjson_file(path: &Path, records: &[Record]) -> Result<(String, usize)> {
    let file = File::create(path)
        .with_context(|| format!("failed to create export file {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    let mut hasher = Sha256::new();

    for record in records {
        let line =
            serde_json::to_string(&record.to_json()).context("failed to serialize NDJSON row")?;
        writer
            .write_all(line.as_bytes())
            .with_context(|| format!("failed to write export file {}", path.display()))?;
        writer
            .write_all(b"\n")
            .with_context(|| format!("failed to write export file {}", path.display()))?;
        hasher.update(line.as_bytes());
        hasher.update(b"\n");
    }

    writer.flush().with_context(|| format!("failed to flush export file {}", path.display()))?;

    Ok((format!("{:x}", hasher.finalize()), records.len()))
}

fn read_ndjson_file(path: &Path) -> Result<Vec<Record>> {
    let file = File::open(path)
        .with_context(|| format!("failed to open NDJSON file {}", path.display()))?;
    let reader = BufReader::new(file);
    let mut records = Vec::new();

    for (index, line) in reader.lines().enumerate() {
        let line = line.with_context(|| {
            format!("failed to read line {} from {}", index + 1, path.display())
        })?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let document: serde_json::Value = serde_json::from_str(trimmed).with_context(|| {
            format!("failed to parse NDJSON row {} from {}", index + 1, path.display())
        })?;
        let record = Record::from_json(document).map_err(|err| {
            anyhow!("invalid document on line {} of {}: {err}", index + 1, path.display())
        })?;
        records.push(record);
    }

    Ok(records)
}

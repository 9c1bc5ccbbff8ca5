// crates/conflux-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Config Store
// Description: Durable ConfigPersistence backed by SQLite.
// Purpose: Persist configuration entities, provenance and the file hash log.
// Dependencies: conflux-core, rusqlite, serde, thiserror
// ============================================================================

//! ## Overview
//! This module implements [`ConfigPersistence`] over a single `SQLite`
//! connection. Every [`ConfigPersistence::commit`] call runs in one
//! transaction; dropping the transaction on error rolls back every entity
//! write and the file hash write together.
//!
//! Keys cascade with their provider through a foreign key. The hash log keeps
//! every distinct file hash; a repeat sighting refreshes `updated_at` and
//! moves the hash to the front of the sighting order.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use conflux_core::ClientConfig;
use conflux_core::ConfigPersistence;
use conflux_core::ConfigSnapshot;
use conflux_core::FileHashRecord;
use conflux_core::Key;
use conflux_core::PersistOp;
use conflux_core::ProviderConfig;
use conflux_core::ProviderName;
use conflux_core::ProvenanceEntry;
use conflux_core::StoreError;
use conflux_core::ToolClientConfig;
use rusqlite::Connection;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::Transaction;
use rusqlite::params;
use serde::Deserialize;
use thiserror::Error;

use crate::codec::ClientConfigRow;
use crate::codec::KeyRow;
use crate::codec::ProvenanceRow;
use crate::codec::ProviderRow;
use crate::codec::ToolClientRow;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// `SQLite` schema version for the store.
const SCHEMA_VERSION: i64 = 1;
/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteStoreMode {
    /// WAL journal mode (recommended).
    #[default]
    Wal,
    /// Delete journal mode (legacy).
    Delete,
}

impl SqliteStoreMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// `SQLite` sync mode configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// Full synchronous mode (safest).
    #[default]
    Full,
    /// Normal synchronous mode (balanced).
    Normal,
}

impl SqliteSyncMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

/// Configuration for the `SQLite` config store.
#[derive(Debug, Clone, Deserialize)]
pub struct SqliteStoreConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

impl SqliteStoreConfig {
    /// Creates a configuration with default tuning for a database path.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
        }
    }
}

/// Returns the default busy timeout for `SQLite` connections.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` store errors.
#[derive(Debug, Error)]
pub enum SqliteStoreError {
    /// Store I/O error.
    #[error("sqlite store io error: {0}")]
    Io(String),
    /// `SQLite` engine error.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// Stored data cannot be decoded.
    #[error("sqlite store corruption: {0}")]
    Corrupt(String),
    /// Store schema version mismatch.
    #[error("sqlite store version mismatch: {0}")]
    VersionMismatch(String),
    /// Invalid data or request.
    #[error("sqlite store invalid data: {0}")]
    Invalid(String),
}

impl From<SqliteStoreError> for StoreError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Io(message) => Self::Io(message),
            SqliteStoreError::Db(message) => Self::Store(message),
            SqliteStoreError::Corrupt(message) => Self::Corrupt(message),
            SqliteStoreError::VersionMismatch(message) => Self::VersionMismatch(message),
            SqliteStoreError::Invalid(message) => Self::Invalid(message),
        }
    }
}

/// Maps an engine error into a store error.
#[allow(clippy::needless_pass_by_value, reason = "Used directly as a map_err callback.")]
fn db_err(err: rusqlite::Error) -> SqliteStoreError {
    SqliteStoreError::Db(err.to_string())
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite`-backed configuration store.
#[derive(Clone)]
pub struct SqliteConfigStore {
    /// Shared `SQLite` connection guarded by a mutex.
    connection: Arc<Mutex<Connection>>,
}

impl SqliteConfigStore {
    /// Opens an `SQLite`-backed configuration store.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the database cannot be opened or
    /// initialized.
    pub fn new(config: &SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        validate_store_path(&config.path)?;
        ensure_parent_dir(&config.path)?;
        let mut connection = open_connection(config)?;
        initialize_schema(&mut connection)?;
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    /// Runs a closure inside a transaction and commits on success.
    fn with_transaction<T>(
        &self,
        work: impl FnOnce(&Transaction<'_>) -> Result<T, SqliteStoreError>,
    ) -> Result<T, SqliteStoreError> {
        let mut guard = self
            .connection
            .lock()
            .map_err(|_| SqliteStoreError::Db("mutex poisoned".to_string()))?;
        let tx = guard.transaction().map_err(db_err)?;
        let value = work(&tx)?;
        tx.commit().map_err(db_err)?;
        drop(guard);
        Ok(value)
    }
}

impl ConfigPersistence for SqliteConfigStore {
    fn load(&self) -> Result<ConfigSnapshot, StoreError> {
        self.with_transaction(load_snapshot).map_err(StoreError::from)
    }

    fn latest_file_hash(&self) -> Result<Option<FileHashRecord>, StoreError> {
        self.with_transaction(|tx| {
            tx.query_row(
                "SELECT hash, created_at, updated_at FROM config_hashes ORDER BY seen_seq DESC \
                 LIMIT 1",
                params![],
                hash_record_from_row,
            )
            .optional()
            .map_err(db_err)
        })
        .map_err(StoreError::from)
    }

    fn file_hashes(&self) -> Result<Vec<FileHashRecord>, StoreError> {
        self.with_transaction(|tx| {
            let mut stmt = tx
                .prepare(
                    "SELECT hash, created_at, updated_at FROM config_hashes ORDER BY seen_seq DESC",
                )
                .map_err(db_err)?;
            let rows = stmt.query_map(params![], hash_record_from_row).map_err(db_err)?;
            rows.collect::<Result<Vec<_>, _>>().map_err(db_err)
        })
        .map_err(StoreError::from)
    }

    fn commit(&self, ops: &[PersistOp]) -> Result<(), StoreError> {
        self.with_transaction(|tx| {
            for op in ops {
                apply_op(tx, op)?;
            }
            Ok(())
        })
        .map_err(StoreError::from)
    }
}

// ============================================================================
// SECTION: Reads
// ============================================================================

/// Reads a hash log row.
fn hash_record_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<FileHashRecord> {
    Ok(FileHashRecord {
        hash: row.get(0)?,
        created_at_ms: row.get(1)?,
        updated_at_ms: row.get(2)?,
    })
}

/// Loads every entity table into a snapshot.
fn load_snapshot(tx: &Transaction<'_>) -> Result<ConfigSnapshot, SqliteStoreError> {
    let client_config = tx
        .query_row(
            "SELECT config_json, config_hash FROM client_config WHERE id = 1",
            params![],
            |row| {
                Ok(ClientConfigRow {
                    config_json: row.get(0)?,
                    config_hash: row.get(1)?,
                })
            },
        )
        .optional()
        .map_err(db_err)?
        .map(ClientConfigRow::decode)
        .transpose()?;

    let mut keys_by_provider: BTreeMap<String, Vec<Key>> = BTreeMap::new();
    {
        let mut stmt = tx
            .prepare(
                "SELECT provider, key_id, position, name, value, models_json, weight, \
                 family_json, config_hash FROM provider_keys ORDER BY provider, position",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![], |row| {
                Ok(KeyRow {
                    provider: row.get(0)?,
                    key_id: row.get(1)?,
                    position: row.get(2)?,
                    name: row.get(3)?,
                    value: row.get(4)?,
                    models_json: row.get(5)?,
                    weight: row.get(6)?,
                    family_json: row.get(7)?,
                    config_hash: row.get(8)?,
                })
            })
            .map_err(db_err)?;
        for row in rows {
            let row = row.map_err(db_err)?;
            let provider = row.provider.clone();
            keys_by_provider.entry(provider).or_default().push(row.decode()?);
        }
    }

    let mut providers = BTreeMap::new();
    {
        let mut stmt = tx
            .prepare(
                "SELECT name, network_json, concurrency_json, proxy_json, custom_json, \
                 send_back_raw_response, config_hash FROM providers ORDER BY name",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![], |row| {
                Ok(ProviderRow {
                    name: row.get(0)?,
                    network_json: row.get(1)?,
                    concurrency_json: row.get(2)?,
                    proxy_json: row.get(3)?,
                    custom_json: row.get(4)?,
                    send_back_raw_response: row.get(5)?,
                    config_hash: row.get(6)?,
                })
            })
            .map_err(db_err)?;
        for row in rows {
            let row = row.map_err(db_err)?;
            let keys = keys_by_provider.remove(&row.name).unwrap_or_default();
            let (name, config) = row.decode(keys)?;
            providers.insert(name, config);
        }
    }
    if let Some(orphan) = keys_by_provider.keys().next() {
        return Err(SqliteStoreError::Corrupt(format!("keys reference missing provider {orphan}")));
    }

    let mut tool_clients = Vec::new();
    {
        let mut stmt = tx
            .prepare(
                "SELECT client_id, name, connection_json, tools_to_execute_json, \
                 tools_to_skip_json, headers_json, config_hash FROM tool_clients ORDER BY position",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![], |row| {
                Ok(ToolClientRow {
                    client_id: row.get(0)?,
                    name: row.get(1)?,
                    connection_json: row.get(2)?,
                    tools_to_execute_json: row.get(3)?,
                    tools_to_skip_json: row.get(4)?,
                    headers_json: row.get(5)?,
                    config_hash: row.get(6)?,
                })
            })
            .map_err(db_err)?;
        for row in rows {
            tool_clients.push(row.map_err(db_err)?.decode()?);
        }
    }

    let mut provenance = Vec::new();
    {
        let mut stmt = tx
            .prepare(
                "SELECT config_path, env_var, provider, value_kind, key_id FROM env_provenance \
                 ORDER BY env_var, config_path",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![], |row| {
                Ok(ProvenanceRow {
                    config_path: row.get(0)?,
                    env_var: row.get(1)?,
                    provider: row.get(2)?,
                    value_kind: row.get(3)?,
                    key_id: row.get(4)?,
                })
            })
            .map_err(db_err)?;
        for row in rows {
            provenance.push(row.map_err(db_err)?.decode()?);
        }
    }

    Ok(ConfigSnapshot {
        client_config,
        providers,
        tool_clients,
        provenance,
    })
}

// ============================================================================
// SECTION: Writes
// ============================================================================

/// Applies one operation inside the open transaction.
fn apply_op(tx: &Transaction<'_>, op: &PersistOp) -> Result<(), SqliteStoreError> {
    match op {
        PersistOp::UpsertProvider {
            name,
            config,
        } => upsert_provider(tx, name, config),
        PersistOp::DeleteProvider(name) => {
            tx.execute("DELETE FROM providers WHERE name = ?1", params![name.as_str()])
                .map_err(db_err)?;
            Ok(())
        }
        PersistOp::UpsertToolClient(client) => upsert_tool_client(tx, client),
        PersistOp::DeleteToolClient(name) => {
            tx.execute("DELETE FROM tool_clients WHERE name = ?1", params![name])
                .map_err(db_err)?;
            Ok(())
        }
        PersistOp::SaveClientConfig(config) => save_client_config(tx, config),
        PersistOp::ReplaceProvenance(entries) => replace_provenance(tx, entries),
        PersistOp::RecordFileHash(hash) => record_file_hash(tx, hash),
    }
}

/// Writes a provider row and replaces its keys.
fn upsert_provider(
    tx: &Transaction<'_>,
    name: &ProviderName,
    config: &ProviderConfig,
) -> Result<(), SqliteStoreError> {
    let row = ProviderRow::encode(name, config)?;
    tx.execute(
        "INSERT INTO providers (name, network_json, concurrency_json, proxy_json, custom_json, \
         send_back_raw_response, config_hash, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, \
         ?8) ON CONFLICT(name) DO UPDATE SET network_json = excluded.network_json, \
         concurrency_json = excluded.concurrency_json, proxy_json = excluded.proxy_json, \
         custom_json = excluded.custom_json, send_back_raw_response = \
         excluded.send_back_raw_response, config_hash = excluded.config_hash, updated_at = \
         excluded.updated_at",
        params![
            row.name,
            row.network_json,
            row.concurrency_json,
            row.proxy_json,
            row.custom_json,
            row.send_back_raw_response,
            row.config_hash,
            unix_millis()
        ],
    )
    .map_err(db_err)?;
    tx.execute("DELETE FROM provider_keys WHERE provider = ?1", params![name.as_str()])
        .map_err(db_err)?;
    for (position, key) in config.keys.iter().enumerate() {
        let row = KeyRow::encode(name, position, key)?;
        tx.execute(
            "INSERT INTO provider_keys (provider, key_id, position, name, value, models_json, \
             weight, family_json, config_hash) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                row.provider,
                row.key_id,
                row.position,
                row.name,
                row.value,
                row.models_json,
                row.weight,
                row.family_json,
                row.config_hash
            ],
        )
        .map_err(db_err)?;
    }
    Ok(())
}

/// Inserts or replaces a tool client, keeping its position on update.
fn upsert_tool_client(
    tx: &Transaction<'_>,
    client: &ToolClientConfig,
) -> Result<(), SqliteStoreError> {
    let row = ToolClientRow::encode(client)?;
    tx.execute(
        "INSERT INTO tool_clients (client_id, name, position, connection_json, \
         tools_to_execute_json, tools_to_skip_json, headers_json, config_hash) VALUES (?1, ?2, \
         (SELECT COALESCE(MAX(position), -1) + 1 FROM tool_clients), ?3, ?4, ?5, ?6, ?7) ON \
         CONFLICT(client_id) DO UPDATE SET name = excluded.name, connection_json = \
         excluded.connection_json, tools_to_execute_json = excluded.tools_to_execute_json, \
         tools_to_skip_json = excluded.tools_to_skip_json, headers_json = excluded.headers_json, \
         config_hash = excluded.config_hash",
        params![
            row.client_id,
            row.name,
            row.connection_json,
            row.tools_to_execute_json,
            row.tools_to_skip_json,
            row.headers_json,
            row.config_hash
        ],
    )
    .map_err(db_err)?;
    Ok(())
}

/// Writes the singleton client settings row.
fn save_client_config(tx: &Transaction<'_>, config: &ClientConfig) -> Result<(), SqliteStoreError> {
    let row = ClientConfigRow::encode(config)?;
    tx.execute(
        "INSERT INTO client_config (id, config_json, config_hash) VALUES (1, ?1, ?2) ON \
         CONFLICT(id) DO UPDATE SET config_json = excluded.config_json, config_hash = \
         excluded.config_hash",
        params![row.config_json, row.config_hash],
    )
    .map_err(db_err)?;
    Ok(())
}

/// Replaces the provenance table.
fn replace_provenance(
    tx: &Transaction<'_>,
    entries: &[ProvenanceEntry],
) -> Result<(), SqliteStoreError> {
    tx.execute("DELETE FROM env_provenance", params![]).map_err(db_err)?;
    for entry in entries {
        let row = ProvenanceRow::encode(entry);
        tx.execute(
            "INSERT INTO env_provenance (config_path, env_var, provider, value_kind, key_id) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![row.config_path, row.env_var, row.provider, row.value_kind, row.key_id],
        )
        .map_err(db_err)?;
    }
    Ok(())
}

/// Inserts a file hash or refreshes its last sighting.
fn record_file_hash(tx: &Transaction<'_>, hash: &str) -> Result<(), SqliteStoreError> {
    let now = unix_millis();
    tx.execute(
        "INSERT INTO config_hashes (hash, created_at, updated_at, seen_seq) VALUES (?1, ?2, ?2, \
         (SELECT COALESCE(MAX(seen_seq), 0) + 1 FROM config_hashes)) ON CONFLICT(hash) DO \
         UPDATE SET updated_at = excluded.updated_at, seen_seq = excluded.seen_seq",
        params![hash, now],
    )
    .map_err(db_err)?;
    Ok(())
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Ensures the parent directory for the store exists.
fn ensure_parent_dir(path: &Path) -> Result<(), SqliteStoreError> {
    let Some(parent) = path.parent() else {
        return Err(SqliteStoreError::Io("store path missing parent directory".to_string()));
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }
    std::fs::create_dir_all(parent).map_err(|err| SqliteStoreError::Io(err.to_string()))
}

/// Validates store paths for safety limits.
fn validate_store_path(path: &Path) -> Result<(), SqliteStoreError> {
    let path_string = path.display().to_string();
    if path_string.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(SqliteStoreError::Invalid("store path exceeds length limit".to_string()));
    }
    for component in path.components() {
        let name = component.as_os_str().to_string_lossy();
        if name.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(SqliteStoreError::Invalid(
                "store path contains an overlong component".to_string(),
            ));
        }
    }
    if path.exists() && path.is_dir() {
        return Err(SqliteStoreError::Invalid(
            "store path must be a file, not a directory".to_string(),
        ));
    }
    Ok(())
}

/// Opens an `SQLite` connection with secure defaults.
fn open_connection(config: &SqliteStoreConfig) -> Result<Connection, SqliteStoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection = Connection::open_with_flags(&config.path, flags).map_err(db_err)?;
    apply_pragmas(&connection, config)?;
    Ok(connection)
}

/// Applies `SQLite` pragmas required for durability.
fn apply_pragmas(
    connection: &Connection,
    config: &SqliteStoreConfig,
) -> Result<(), SqliteStoreError> {
    connection.execute_batch("PRAGMA foreign_keys = ON;").map_err(db_err)?;
    connection
        .execute_batch(&format!("PRAGMA journal_mode = {};", config.journal_mode.pragma_value()))
        .map_err(db_err)?;
    connection
        .execute_batch(&format!("PRAGMA synchronous = {};", config.sync_mode.pragma_value()))
        .map_err(db_err)?;
    connection
        .busy_timeout(std::time::Duration::from_millis(config.busy_timeout_ms))
        .map_err(db_err)?;
    Ok(())
}

/// Initializes the `SQLite` schema or validates existing version.
fn initialize_schema(connection: &mut Connection) -> Result<(), SqliteStoreError> {
    let tx = connection.transaction().map_err(db_err)?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")
        .map_err(db_err)?;
    let version: Option<i64> = tx
        .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| row.get(0))
        .optional()
        .map_err(db_err)?;
    match version {
        None => {
            tx.execute("INSERT INTO store_meta (version) VALUES (?1)", params![SCHEMA_VERSION])
                .map_err(db_err)?;
            tx.execute_batch(
                "CREATE TABLE IF NOT EXISTS client_config (
                    id INTEGER PRIMARY KEY CHECK (id = 1),
                    config_json TEXT NOT NULL,
                    config_hash TEXT
                );
                CREATE TABLE IF NOT EXISTS providers (
                    name TEXT PRIMARY KEY,
                    network_json TEXT,
                    concurrency_json TEXT,
                    proxy_json TEXT,
                    custom_json TEXT,
                    send_back_raw_response INTEGER NOT NULL,
                    config_hash TEXT,
                    updated_at INTEGER NOT NULL
                );
                CREATE TABLE IF NOT EXISTS provider_keys (
                    provider TEXT NOT NULL,
                    key_id TEXT NOT NULL,
                    position INTEGER NOT NULL,
                    name TEXT,
                    value TEXT NOT NULL,
                    models_json TEXT NOT NULL,
                    weight REAL NOT NULL,
                    family_json TEXT,
                    config_hash TEXT,
                    PRIMARY KEY (provider, key_id),
                    FOREIGN KEY (provider) REFERENCES providers(name) ON DELETE CASCADE
                );
                CREATE TABLE IF NOT EXISTS tool_clients (
                    client_id TEXT PRIMARY KEY,
                    name TEXT NOT NULL UNIQUE,
                    position INTEGER NOT NULL,
                    connection_json TEXT NOT NULL,
                    tools_to_execute_json TEXT NOT NULL,
                    tools_to_skip_json TEXT NOT NULL,
                    headers_json TEXT NOT NULL,
                    config_hash TEXT
                );
                CREATE TABLE IF NOT EXISTS env_provenance (
                    config_path TEXT PRIMARY KEY,
                    env_var TEXT NOT NULL,
                    provider TEXT,
                    value_kind TEXT NOT NULL,
                    key_id TEXT
                );
                CREATE INDEX IF NOT EXISTS idx_env_provenance_env_var
                    ON env_provenance (env_var);
                CREATE TABLE IF NOT EXISTS config_hashes (
                    hash TEXT PRIMARY KEY,
                    created_at INTEGER NOT NULL,
                    updated_at INTEGER NOT NULL,
                    seen_seq INTEGER NOT NULL
                );",
            )
            .map_err(db_err)?;
        }
        Some(value) if value == SCHEMA_VERSION => {}
        Some(value) => {
            return Err(SqliteStoreError::VersionMismatch(format!(
                "unsupported schema version: {value}"
            )));
        }
    }
    tx.commit().map_err(db_err)?;
    Ok(())
}

/// Returns the current unix epoch in milliseconds.
fn unix_millis() -> i64 {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    i64::try_from(now.as_millis()).unwrap_or(i64::MAX)
}

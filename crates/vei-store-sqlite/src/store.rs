// crates/vei-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Receipt Store
// Description: Durable ReceiptSink and fixture tables backed by SQLite WAL.
// Purpose: Persist receipts and replay fixtures with per-row integrity hashes.
// Dependencies: vei-core, rusqlite, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! [`SqliteReceiptStore`] implements [`ReceiptSink`] over an append-only
//! `receipts` table keyed by `(session_id, sequence)`. Each row stores the
//! receipt as canonical JSON bytes together with their SHA-256 digest, and
//! sequences must strictly increase per session. Replay fixtures are stored
//! as named sets, one row per fingerprint, so a recording made under Sim can
//! be loaded by a later Replay session. Loads verify every hash and fail
//! closed on corruption, schema drift, or oversized rows.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use rusqlite::Connection;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::Transaction;
use rusqlite::params;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use vei_core::Fingerprint;
use vei_core::Receipt;
use vei_core::ReceiptSink;
use vei_core::ReceiptSinkError;
use vei_core::RecordedOutcome;
use vei_core::ReplayFixtures;
use vei_core::SessionId;
use vei_core::hashing::DEFAULT_HASH_ALGORITHM;
use vei_core::hashing::HashAlgorithm;
use vei_core::hashing::canonical_json_bytes;
use vei_core::hashing::hash_bytes;

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
/// Maximum length of a fixture set name.
const MAX_FIXTURE_SET_NAME_LENGTH: usize = 255;
/// Maximum size of one stored receipt or fixture payload.
pub const MAX_RECORD_BYTES: usize = 1024 * 1024;

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteStoreMode {
    /// WAL journal mode.
    #[default]
    Wal,
    /// Delete journal mode.
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
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// Full synchronous mode.
    #[default]
    Full,
    /// Normal synchronous mode.
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

/// Configuration for the `SQLite` receipt store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
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
    /// Creates a config with default pragmas for a database path.
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
    /// Store corruption or hash mismatch.
    #[error("sqlite store corruption: {0}")]
    Corrupt(String),
    /// Store schema version mismatch.
    #[error("sqlite store version mismatch: {0}")]
    VersionMismatch(String),
    /// Invalid store data or request.
    #[error("sqlite store invalid data: {0}")]
    Invalid(String),
    /// Payload exceeded the per-row size limit.
    #[error("sqlite store payload too large: {actual_bytes} bytes (max {max_bytes})")]
    TooLarge {
        /// Maximum allowed bytes.
        max_bytes: usize,
        /// Actual payload size in bytes.
        actual_bytes: usize,
    },
}

impl From<SqliteStoreError> for ReceiptSinkError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Io(message) => Self::Io(message),
            SqliteStoreError::Invalid(message) => Self::Serialization(message),
            other => Self::Sink(other.to_string()),
        }
    }
}

/// Maps an engine error into [`SqliteStoreError::Db`].
fn db_error(err: &rusqlite::Error) -> SqliteStoreError {
    SqliteStoreError::Db(err.to_string())
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite`-backed receipt and fixture store.
#[derive(Clone)]
pub struct SqliteReceiptStore {
    /// Shared `SQLite` connection guarded by a mutex.
    connection: Arc<Mutex<Connection>>,
}

impl SqliteReceiptStore {
    /// Opens or creates a store.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the database cannot be opened or
    /// its schema version is not supported.
    pub fn new(config: &SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        validate_store_path(&config.path)?;
        ensure_parent_dir(&config.path)?;
        let mut connection = open_connection(config)?;
        initialize_schema(&mut connection)?;
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    /// Runs `f` inside a transaction on the shared connection.
    fn with_transaction<T>(
        &self,
        f: impl FnOnce(&Transaction<'_>) -> Result<T, SqliteStoreError>,
    ) -> Result<T, SqliteStoreError> {
        let mut guard =
            self.connection.lock().map_err(|_| SqliteStoreError::Db("mutex poisoned".to_string()))?;
        let tx = guard.transaction().map_err(|err| db_error(&err))?;
        let value = f(&tx)?;
        tx.commit().map_err(|err| db_error(&err))?;
        drop(guard);
        Ok(value)
    }

    /// Appends a receipt for a session.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::Invalid`] when the sequence does not
    /// follow the last stored sequence for the session, and
    /// [`SqliteStoreError::TooLarge`] when the payload exceeds
    /// [`MAX_RECORD_BYTES`].
    pub fn append_receipt(&self, session: &SessionId, receipt: &Receipt) -> Result<(), SqliteStoreError> {
        let bytes = canonical_json_bytes(receipt).map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
        ensure_record_size(bytes.len())?;
        let digest = hash_bytes(DEFAULT_HASH_ALGORITHM, &bytes);
        let sequence = i64::try_from(receipt.sequence)
            .map_err(|_| SqliteStoreError::Invalid("receipt sequence exceeds storage range".to_string()))?;
        let stored_at = unix_millis();
        self.with_transaction(|tx| {
            let last: Option<i64> = tx
                .query_row(
                    "SELECT MAX(sequence) FROM receipts WHERE session_id = ?1",
                    params![session.as_str()],
                    |row| row.get(0),
                )
                .map_err(|err| db_error(&err))?;
            if let Some(last) = last
                && sequence <= last
            {
                return Err(SqliteStoreError::Invalid(format!(
                    "receipt sequence {sequence} does not follow {last} for session {session}"
                )));
            }
            tx.execute(
                "INSERT INTO receipts (session_id, sequence, receipt_json, receipt_hash, hash_algorithm, \
                 stored_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    session.as_str(),
                    sequence,
                    bytes,
                    digest.value,
                    hash_algorithm_label(digest.algorithm),
                    stored_at
                ],
            )
            .map_err(|err| db_error(&err))?;
            Ok(())
        })
    }

    /// Loads a session's receipts in sequence order, verifying each row.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::Corrupt`] on a hash mismatch and
    /// [`SqliteStoreError::Invalid`] when a payload does not decode or its
    /// sequence disagrees with the row key.
    pub fn load_receipts(&self, session: &SessionId) -> Result<Vec<Receipt>, SqliteStoreError> {
        let rows = self.with_transaction(|tx| {
            let mut statement = tx
                .prepare(
                    "SELECT sequence, receipt_json, receipt_hash, hash_algorithm FROM receipts WHERE \
                     session_id = ?1 ORDER BY sequence",
                )
                .map_err(|err| db_error(&err))?;
            let mapped = statement
                .query_map(params![session.as_str()], |row| {
                    Ok(StoredRow {
                        key: row.get::<_, i64>(0)?.to_string(),
                        bytes: row.get(1)?,
                        hash: row.get(2)?,
                        algorithm: row.get(3)?,
                    })
                })
                .map_err(|err| db_error(&err))?;
            let rows = mapped.collect::<Result<Vec<_>, _>>().map_err(|err| db_error(&err))?;
            Ok(rows)
        })?;
        rows.into_iter()
            .map(|row| {
                let receipt: Receipt = row.decode(&format!("receipt {} of session {session}", row.key))?;
                if receipt.sequence.to_string() != row.key {
                    return Err(SqliteStoreError::Invalid(
                        "sequence mismatch between key and payload".to_string(),
                    ));
                }
                Ok(receipt)
            })
            .collect()
    }

    /// Returns the session ids with stored receipts, in lexical order.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::Db`] when the query fails.
    pub fn session_ids(&self) -> Result<Vec<SessionId>, SqliteStoreError> {
        self.with_transaction(|tx| {
            let mut statement = tx
                .prepare("SELECT DISTINCT session_id FROM receipts ORDER BY session_id")
                .map_err(|err| db_error(&err))?;
            let mapped = statement
                .query_map(params![], |row| row.get::<_, String>(0))
                .map_err(|err| db_error(&err))?;
            let ids = mapped.collect::<Result<Vec<_>, _>>().map_err(|err| db_error(&err))?;
            Ok(ids.into_iter().map(SessionId::new).collect())
        })
    }

    /// Replaces the named fixture set with `fixtures`.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::Invalid`] for a bad set name and
    /// [`SqliteStoreError::TooLarge`] for an oversized outcome.
    pub fn save_fixtures(&self, name: &str, fixtures: &ReplayFixtures) -> Result<(), SqliteStoreError> {
        validate_fixture_set_name(name)?;
        let mut encoded = Vec::with_capacity(fixtures.len());
        for (fingerprint, outcome) in fixtures.iter() {
            let bytes =
                canonical_json_bytes(outcome).map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
            ensure_record_size(bytes.len())?;
            let digest = hash_bytes(DEFAULT_HASH_ALGORITHM, &bytes);
            encoded.push((fingerprint.as_str().to_string(), bytes, digest));
        }
        let entry_count = i64::try_from(encoded.len())
            .map_err(|_| SqliteStoreError::Invalid("fixture set too large".to_string()))?;
        let saved_at = unix_millis();
        self.with_transaction(|tx| {
            tx.execute("DELETE FROM replay_fixtures WHERE fixture_set = ?1", params![name])
                .map_err(|err| db_error(&err))?;
            tx.execute(
                "INSERT INTO fixture_sets (name, entry_count, saved_at) VALUES (?1, ?2, ?3) ON \
                 CONFLICT(name) DO UPDATE SET entry_count = excluded.entry_count, saved_at = \
                 excluded.saved_at",
                params![name, entry_count, saved_at],
            )
            .map_err(|err| db_error(&err))?;
            for (fingerprint, bytes, digest) in &encoded {
                tx.execute(
                    "INSERT INTO replay_fixtures (fixture_set, fingerprint, outcome_json, outcome_hash, \
                     hash_algorithm) VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![name, fingerprint, bytes, digest.value, hash_algorithm_label(digest.algorithm)],
                )
                .map_err(|err| db_error(&err))?;
            }
            Ok(())
        })
    }

    /// Loads a named fixture set; `None` when it was never saved.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::Corrupt`] when a hash or the entry count
    /// does not match.
    pub fn load_fixtures(&self, name: &str) -> Result<Option<ReplayFixtures>, SqliteStoreError> {
        validate_fixture_set_name(name)?;
        let loaded = self.with_transaction(|tx| {
            let expected: Option<i64> = tx
                .query_row("SELECT entry_count FROM fixture_sets WHERE name = ?1", params![name], |row| {
                    row.get(0)
                })
                .optional()
                .map_err(|err| db_error(&err))?;
            let Some(expected) = expected else {
                return Ok(None);
            };
            let mut statement = tx
                .prepare(
                    "SELECT fingerprint, outcome_json, outcome_hash, hash_algorithm FROM replay_fixtures \
                     WHERE fixture_set = ?1 ORDER BY fingerprint",
                )
                .map_err(|err| db_error(&err))?;
            let mapped = statement
                .query_map(params![name], |row| {
                    Ok(StoredRow {
                        key: row.get(0)?,
                        bytes: row.get(1)?,
                        hash: row.get(2)?,
                        algorithm: row.get(3)?,
                    })
                })
                .map_err(|err| db_error(&err))?;
            let rows = mapped.collect::<Result<Vec<_>, _>>().map_err(|err| db_error(&err))?;
            Ok(Some((expected, rows)))
        })?;
        let Some((expected, rows)) = loaded else {
            return Ok(None);
        };
        if usize::try_from(expected).ok() != Some(rows.len()) {
            return Err(SqliteStoreError::Corrupt(format!(
                "fixture set {name} expected {expected} entries, found {}",
                rows.len()
            )));
        }
        let mut fixtures = ReplayFixtures::new();
        for row in rows {
            let outcome: RecordedOutcome = row.decode(&format!("fixture {} in set {name}", row.key))?;
            fixtures.record(Fingerprint::from_hex(row.key), outcome);
        }
        Ok(Some(fixtures))
    }
}

impl ReceiptSink for SqliteReceiptStore {
    fn append(&self, session: &SessionId, receipt: &Receipt) -> Result<(), ReceiptSinkError> {
        self.append_receipt(session, receipt).map_err(ReceiptSinkError::from)
    }

    fn flush(&self) -> Result<(), ReceiptSinkError> {
        // Every append commits its own transaction.
        Ok(())
    }
}

// ============================================================================
// SECTION: Stored Rows
// ============================================================================

/// Hashed payload row read back from the database.
struct StoredRow {
    /// Row key rendered as text (sequence or fingerprint).
    key: String,
    /// Canonical JSON payload.
    bytes: Vec<u8>,
    /// Stored digest value.
    hash: String,
    /// Stored digest algorithm label.
    algorithm: String,
}

impl StoredRow {
    /// Verifies the row hash and decodes the payload.
    fn decode<T: serde::de::DeserializeOwned>(&self, label: &str) -> Result<T, SqliteStoreError> {
        ensure_record_size(self.bytes.len())?;
        let algorithm = parse_hash_algorithm(&self.algorithm)?;
        if hash_bytes(algorithm, &self.bytes).value != self.hash {
            return Err(SqliteStoreError::Corrupt(format!("hash mismatch for {label}")));
        }
        serde_json::from_slice(&self.bytes).map_err(|err| SqliteStoreError::Invalid(err.to_string()))
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Rejects payloads above [`MAX_RECORD_BYTES`].
const fn ensure_record_size(actual_bytes: usize) -> Result<(), SqliteStoreError> {
    if actual_bytes > MAX_RECORD_BYTES {
        return Err(SqliteStoreError::TooLarge {
            max_bytes: MAX_RECORD_BYTES,
            actual_bytes,
        });
    }
    Ok(())
}

/// Validates a fixture set name.
fn validate_fixture_set_name(name: &str) -> Result<(), SqliteStoreError> {
    if name.trim().is_empty() {
        return Err(SqliteStoreError::Invalid("fixture set name must be non-empty".to_string()));
    }
    if name.len() > MAX_FIXTURE_SET_NAME_LENGTH {
        return Err(SqliteStoreError::Invalid("fixture set name exceeds max length".to_string()));
    }
    Ok(())
}

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
            return Err(SqliteStoreError::Invalid("store path contains an overlong component".to_string()));
        }
    }
    if path.is_dir() {
        return Err(SqliteStoreError::Invalid("store path must be a file, not a directory".to_string()));
    }
    Ok(())
}

/// Opens an `SQLite` connection with durable defaults.
fn open_connection(config: &SqliteStoreConfig) -> Result<Connection, SqliteStoreError> {
    let flags =
        OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection = Connection::open_with_flags(&config.path, flags).map_err(|err| db_error(&err))?;
    apply_pragmas(&connection, config)?;
    Ok(connection)
}

/// Applies `SQLite` pragmas required for durability.
fn apply_pragmas(connection: &Connection, config: &SqliteStoreConfig) -> Result<(), SqliteStoreError> {
    connection.execute_batch("PRAGMA foreign_keys = ON;").map_err(|err| db_error(&err))?;
    connection
        .execute_batch(&format!("PRAGMA journal_mode = {};", config.journal_mode.pragma_value()))
        .map_err(|err| db_error(&err))?;
    connection
        .execute_batch(&format!("PRAGMA synchronous = {};", config.sync_mode.pragma_value()))
        .map_err(|err| db_error(&err))?;
    connection
        .busy_timeout(std::time::Duration::from_millis(config.busy_timeout_ms))
        .map_err(|err| db_error(&err))?;
    Ok(())
}

/// Initializes the schema or validates the existing version.
fn initialize_schema(connection: &mut Connection) -> Result<(), SqliteStoreError> {
    let tx = connection.transaction().map_err(|err| db_error(&err))?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")
        .map_err(|err| db_error(&err))?;
    let version: Option<i64> = tx
        .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| row.get(0))
        .optional()
        .map_err(|err| db_error(&err))?;
    match version {
        None => {
            tx.execute("INSERT INTO store_meta (version) VALUES (?1)", params![SCHEMA_VERSION])
                .map_err(|err| db_error(&err))?;
            tx.execute_batch(
                "CREATE TABLE IF NOT EXISTS receipts (
                    session_id TEXT NOT NULL,
                    sequence INTEGER NOT NULL,
                    receipt_json BLOB NOT NULL,
                    receipt_hash TEXT NOT NULL,
                    hash_algorithm TEXT NOT NULL,
                    stored_at INTEGER NOT NULL,
                    PRIMARY KEY (session_id, sequence)
                );
                CREATE TABLE IF NOT EXISTS fixture_sets (
                    name TEXT PRIMARY KEY,
                    entry_count INTEGER NOT NULL,
                    saved_at INTEGER NOT NULL
                );
                CREATE TABLE IF NOT EXISTS replay_fixtures (
                    fixture_set TEXT NOT NULL,
                    fingerprint TEXT NOT NULL,
                    outcome_json BLOB NOT NULL,
                    outcome_hash TEXT NOT NULL,
                    hash_algorithm TEXT NOT NULL,
                    PRIMARY KEY (fixture_set, fingerprint),
                    FOREIGN KEY (fixture_set) REFERENCES fixture_sets(name) ON DELETE CASCADE
                );",
            )
            .map_err(|err| db_error(&err))?;
        }
        Some(value) if value == SCHEMA_VERSION => {}
        Some(value) => {
            return Err(SqliteStoreError::VersionMismatch(format!("unsupported schema version: {value}")));
        }
    }
    tx.commit().map_err(|err| db_error(&err))?;
    Ok(())
}

/// Returns the current unix epoch in milliseconds.
fn unix_millis() -> i64 {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    i64::try_from(now.as_millis()).unwrap_or(i64::MAX)
}

/// Returns the canonical hash algorithm label.
const fn hash_algorithm_label(algorithm: HashAlgorithm) -> &'static str {
    match algorithm {
        HashAlgorithm::Sha256 => "sha256",
    }
}

/// Parses a hash algorithm label.
fn parse_hash_algorithm(label: &str) -> Result<HashAlgorithm, SqliteStoreError> {
    match label {
        "sha256" => Ok(HashAlgorithm::Sha256),
        other => Err(SqliteStoreError::Invalid(format!("unsupported hash algorithm: {other}"))),
    }
}

// crates/certledger-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Directory Store
// Description: Durable DirectoryStore backed by SQLite WAL.
// Purpose: Persist directory entries with hash verification and atomic CAS.
// Dependencies: certledger-core, rusqlite, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! This module implements a durable [`DirectoryStore`] using `SQLite`. Each
//! entry is stored as canonical JSON of its attribute map alongside a digest
//! of those bytes. Reads verify the digest and fail closed on corruption.
//!
//! Every write runs in a `BEGIN IMMEDIATE` transaction: the preconditions of a
//! conditional replace are evaluated and the new attributes written while the
//! database write lock is held, so replicas sharing the file (in one process
//! or several) observe a single order of replaces.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::time::Duration;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use certledger_core::DirectoryEntry;
use certledger_core::DirectoryStore;
use certledger_core::Modification;
use certledger_core::Precondition;
use certledger_core::SearchPage;
use certledger_core::SearchRequest;
use certledger_core::StoreError;
use certledger_core::hashing::DEFAULT_HASH_ALGORITHM;
use certledger_core::hashing::HashAlgorithm;
use certledger_core::hashing::canonical_json_bytes;
use certledger_core::hashing::hash_bytes;
use certledger_core::interfaces::Attributes;
use certledger_core::interfaces::apply_modifications;
use certledger_core::interfaces::parent_dn;
use rusqlite::Connection;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::Transaction;
use rusqlite::TransactionBehavior;
use rusqlite::params;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

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
/// Maximum canonical entry size accepted by the store.
pub const MAX_ENTRY_BYTES: usize = 4 * 1024 * 1024;
/// Maximum distinguished name length accepted by the store.
const MAX_DN_LENGTH: usize = 1024;

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `journal_mode` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
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
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `synchronous` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
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

/// Configuration for the `SQLite` directory store.
///
/// # Invariants
/// - `path` must resolve to a file path (not a directory).
/// - `busy_timeout_ms` is interpreted as milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
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
    /// Creates a configuration with default pragmas for the path.
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
///
/// # Invariants
/// - Error messages avoid embedding raw entry payloads.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
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
    /// Invalid store data.
    #[error("sqlite store invalid data: {0}")]
    Invalid(String),
    /// Entry payload exceeded the size limit.
    #[error("sqlite store payload too large: {actual_bytes} bytes (max {max_bytes})")]
    TooLarge {
        /// Maximum allowed bytes.
        max_bytes: usize,
        /// Actual payload size in bytes.
        actual_bytes: usize,
    },
    /// Entry does not exist.
    #[error("entry not found: {0}")]
    NotFound(String),
    /// Entry already exists.
    #[error("entry already exists: {0}")]
    AlreadyExists(String),
    /// Precondition did not hold.
    #[error("precondition failed: {0}")]
    ConditionFailed(String),
}

impl From<SqliteStoreError> for StoreError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Io(message) => Self::Io(message),
            SqliteStoreError::Db(message) => Self::Store(message),
            SqliteStoreError::Corrupt(message) => Self::Corrupt(message),
            SqliteStoreError::VersionMismatch(message) => Self::VersionMismatch(message),
            SqliteStoreError::Invalid(message) => Self::Invalid(message),
            SqliteStoreError::TooLarge {
                max_bytes,
                actual_bytes,
            } => Self::Invalid(format!(
                "entry exceeds size limit: {actual_bytes} bytes (max {max_bytes})"
            )),
            SqliteStoreError::NotFound(dn) => Self::NotFound(dn),
            SqliteStoreError::AlreadyExists(dn) => Self::AlreadyExists(dn),
            SqliteStoreError::ConditionFailed(message) => Self::ConditionFailed(message),
        }
    }
}

/// Maps a rusqlite error into a store error.
fn db_error(err: &rusqlite::Error) -> SqliteStoreError {
    SqliteStoreError::Db(err.to_string())
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite`-backed directory store with WAL support.
///
/// # Invariants
/// - Entry reads verify stored hashes before deserialization.
/// - `SQLite` connection access is serialized through a mutex.
/// - Writes hold the database write lock from precondition check to commit.
#[derive(Clone)]
pub struct SqliteDirectoryStore {
    /// Store configuration.
    config: SqliteStoreConfig,
    /// Shared connection guarded by a mutex.
    connection: Arc<Mutex<Connection>>,
}

impl SqliteDirectoryStore {
    /// Opens an `SQLite`-backed directory store.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the database cannot be opened or
    /// initialized.
    pub fn new(config: SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        validate_store_path(&config.path)?;
        ensure_parent_dir(&config.path)?;
        let mut connection = open_connection(&config)?;
        initialize_schema(&mut connection)?;
        Ok(Self {
            config,
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    /// Returns the store configuration.
    #[must_use]
    pub const fn config(&self) -> &SqliteStoreConfig {
        &self.config
    }

    /// Locks the shared connection.
    fn lock(&self) -> Result<MutexGuard<'_, Connection>, SqliteStoreError> {
        self.connection
            .lock()
            .map_err(|_| SqliteStoreError::Io("sqlite connection mutex poisoned".to_string()))
    }

    /// Runs `work` inside an immediate transaction and commits on success.
    fn write<T>(
        &self,
        work: impl FnOnce(&Transaction<'_>) -> Result<T, SqliteStoreError>,
    ) -> Result<T, SqliteStoreError> {
        let mut guard = self.lock()?;
        let tx = guard
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|err| db_error(&err))?;
        let value = work(&tx)?;
        tx.commit().map_err(|err| db_error(&err))?;
        drop(guard);
        Ok(value)
    }

    /// Reads one entry.
    fn load_entry(&self, dn: &str) -> Result<Option<DirectoryEntry>, SqliteStoreError> {
        let guard = self.lock()?;
        let attributes = fetch_attributes(&guard, dn)?;
        drop(guard);
        Ok(attributes.map(|attributes| DirectoryEntry {
            dn: dn.to_string(),
            attributes,
        }))
    }

    /// Inserts a new entry.
    fn insert_entry(&self, entry: &DirectoryEntry) -> Result<(), SqliteStoreError> {
        validate_dn(&entry.dn)?;
        let payload = EntryPayload::encode(&entry.attributes)?;
        self.write(|tx| {
            let exists: Option<i64> = tx
                .query_row("SELECT 1 FROM entries WHERE dn = ?1", params![entry.dn], |row| {
                    row.get(0)
                })
                .optional()
                .map_err(|err| db_error(&err))?;
            if exists.is_some() {
                return Err(SqliteStoreError::AlreadyExists(entry.dn.clone()));
            }
            tx.execute(
                "INSERT INTO entries (dn, parent, attributes_json, attributes_hash, \
                 hash_algorithm, modified_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    entry.dn,
                    parent_dn(&entry.dn),
                    payload.bytes,
                    payload.hash_value,
                    payload.hash_algorithm,
                    unix_millis()
                ],
            )
            .map_err(|err| db_error(&err))?;
            Ok(())
        })
    }

    /// Applies modifications when every precondition holds.
    fn update_entry(
        &self,
        dn: &str,
        modifications: &[Modification],
        preconditions: &[Precondition],
    ) -> Result<(), SqliteStoreError> {
        self.write(|tx| {
            let mut attributes =
                fetch_attributes(tx, dn)?.ok_or_else(|| SqliteStoreError::NotFound(dn.to_string()))?;
            if let Some(failed) = preconditions.iter().find(|pre| !pre.holds(&attributes)) {
                return Err(SqliteStoreError::ConditionFailed(format!(
                    "{dn}: {} changed",
                    failed.attribute
                )));
            }
            apply_modifications(&mut attributes, modifications);
            let payload = EntryPayload::encode(&attributes)?;
            tx.execute(
                "UPDATE entries SET attributes_json = ?2, attributes_hash = ?3, hash_algorithm = \
                 ?4, modified_at = ?5 WHERE dn = ?1",
                params![
                    dn,
                    payload.bytes,
                    payload.hash_value,
                    payload.hash_algorithm,
                    unix_millis()
                ],
            )
            .map_err(|err| db_error(&err))?;
            Ok(())
        })
    }

    /// Lists matching children of the search base after the cursor.
    fn search_entries(&self, request: &SearchRequest) -> Result<SearchPage, SqliteStoreError> {
        if request.limit == 0 {
            return Err(SqliteStoreError::Invalid("search limit must be greater than zero".to_string()));
        }
        let guard = self.lock()?;
        let mut statement = guard
            .prepare(
                "SELECT dn, attributes_json, attributes_hash, hash_algorithm FROM entries WHERE \
                 parent = ?1 AND dn > ?2 ORDER BY dn",
            )
            .map_err(|err| db_error(&err))?;
        let cursor = request.cursor.clone().unwrap_or_default();
        let mut rows = statement.query(params![request.base, cursor]).map_err(|err| db_error(&err))?;
        let mut entries = Vec::new();
        let mut next_cursor = None;
        while let Some(row) = rows.next().map_err(|err| db_error(&err))? {
            let dn: String = row.get(0).map_err(|err| db_error(&err))?;
            let payload = EntryPayload {
                bytes: row.get(1).map_err(|err| db_error(&err))?,
                hash_value: row.get(2).map_err(|err| db_error(&err))?,
                hash_algorithm: row.get(3).map_err(|err| db_error(&err))?,
            };
            let attributes = payload.decode(&dn)?;
            if !request.matches(&attributes) {
                continue;
            }
            entries.push(DirectoryEntry {
                dn,
                attributes,
            });
            if entries.len() == request.limit {
                next_cursor = entries.last().map(|entry| entry.dn.clone());
                break;
            }
        }
        Ok(SearchPage {
            entries,
            next_cursor,
        })
    }
}

impl DirectoryStore for SqliteDirectoryStore {
    fn read_entry(&self, dn: &str) -> Result<Option<DirectoryEntry>, StoreError> {
        self.load_entry(dn).map_err(StoreError::from)
    }

    fn add_entry(&self, entry: &DirectoryEntry) -> Result<(), StoreError> {
        self.insert_entry(entry).map_err(StoreError::from)
    }

    fn modify_entry(
        &self,
        dn: &str,
        modifications: &[Modification],
        preconditions: &[Precondition],
    ) -> Result<(), StoreError> {
        self.update_entry(dn, modifications, preconditions).map_err(StoreError::from)
    }

    fn search(&self, request: &SearchRequest) -> Result<SearchPage, StoreError> {
        self.search_entries(request).map_err(StoreError::from)
    }
}

// ============================================================================
// SECTION: Payloads
// ============================================================================

/// Stored attribute payload with its digest.
#[derive(Debug)]
struct EntryPayload {
    /// Canonical JSON bytes of the attribute map.
    bytes: Vec<u8>,
    /// Stored hash value for the payload.
    hash_value: String,
    /// Stored hash algorithm label.
    hash_algorithm: String,
}

impl EntryPayload {
    /// Canonicalizes and hashes an attribute map.
    fn encode(attributes: &Attributes) -> Result<Self, SqliteStoreError> {
        let bytes = canonical_json_bytes(attributes)
            .map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
        if bytes.len() > MAX_ENTRY_BYTES {
            return Err(SqliteStoreError::TooLarge {
                max_bytes: MAX_ENTRY_BYTES,
                actual_bytes: bytes.len(),
            });
        }
        let digest = hash_bytes(DEFAULT_HASH_ALGORITHM, &bytes);
        Ok(Self {
            bytes,
            hash_value: digest.value,
            hash_algorithm: digest.algorithm.as_str().to_string(),
        })
    }

    /// Verifies the digest and decodes the attribute map.
    fn decode(self, dn: &str) -> Result<Attributes, SqliteStoreError> {
        if self.bytes.len() > MAX_ENTRY_BYTES {
            return Err(SqliteStoreError::TooLarge {
                max_bytes: MAX_ENTRY_BYTES,
                actual_bytes: self.bytes.len(),
            });
        }
        let algorithm = HashAlgorithm::parse(&self.hash_algorithm).ok_or_else(|| {
            SqliteStoreError::Invalid(format!("unsupported hash algorithm: {}", self.hash_algorithm))
        })?;
        let expected = hash_bytes(algorithm, &self.bytes);
        if expected.value != self.hash_value {
            return Err(SqliteStoreError::Corrupt(format!("hash mismatch for entry {dn}")));
        }
        serde_json::from_slice(&self.bytes)
            .map_err(|err| SqliteStoreError::Corrupt(format!("entry {dn}: {err}")))
    }
}

/// Fetches and verifies the attributes of one entry.
fn fetch_attributes(
    connection: &Connection,
    dn: &str,
) -> Result<Option<Attributes>, SqliteStoreError> {
    let payload = connection
        .query_row(
            "SELECT attributes_json, attributes_hash, hash_algorithm FROM entries WHERE dn = ?1",
            params![dn],
            |row| {
                Ok(EntryPayload {
                    bytes: row.get(0)?,
                    hash_value: row.get(1)?,
                    hash_algorithm: row.get(2)?,
                })
            },
        )
        .optional()
        .map_err(|err| db_error(&err))?;
    payload.map(|payload| payload.decode(dn)).transpose()
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Ensures the parent directory for the store exists.
fn ensure_parent_dir(path: &Path) -> Result<(), SqliteStoreError> {
    let Some(parent) = path.parent() else {
        return Err(SqliteStoreError::Io("store path missing parent directory".to_string()));
    };
    std::fs::create_dir_all(parent).map_err(|err| SqliteStoreError::Io(err.to_string()))
}

/// Validates store paths for safety limits.
fn validate_store_path(path: &Path) -> Result<(), SqliteStoreError> {
    if path.as_os_str().is_empty() {
        return Err(SqliteStoreError::Invalid("store path must not be empty".to_string()));
    }
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

/// Validates a distinguished name before it is written.
fn validate_dn(dn: &str) -> Result<(), SqliteStoreError> {
    if dn.is_empty() || dn.len() > MAX_DN_LENGTH {
        return Err(SqliteStoreError::Invalid(format!(
            "distinguished name must be 1..={MAX_DN_LENGTH} bytes"
        )));
    }
    Ok(())
}

/// Opens an `SQLite` connection with secure defaults.
fn open_connection(config: &SqliteStoreConfig) -> Result<Connection, SqliteStoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection =
        Connection::open_with_flags(&config.path, flags).map_err(|err| db_error(&err))?;
    apply_pragmas(&connection, config)?;
    Ok(connection)
}

/// Applies `SQLite` pragmas required for durability.
fn apply_pragmas(
    connection: &Connection,
    config: &SqliteStoreConfig,
) -> Result<(), SqliteStoreError> {
    connection
        .busy_timeout(Duration::from_millis(config.busy_timeout_ms))
        .map_err(|err| db_error(&err))?;
    connection
        .execute_batch(&format!("PRAGMA journal_mode = {};", config.journal_mode.pragma_value()))
        .map_err(|err| db_error(&err))?;
    connection
        .execute_batch(&format!("PRAGMA synchronous = {};", config.sync_mode.pragma_value()))
        .map_err(|err| db_error(&err))?;
    Ok(())
}

/// Initializes the `SQLite` schema or validates existing version.
fn initialize_schema(connection: &mut Connection) -> Result<(), SqliteStoreError> {
    let tx = connection
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(|err| db_error(&err))?;
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
                "CREATE TABLE IF NOT EXISTS entries (
                    dn TEXT NOT NULL PRIMARY KEY,
                    parent TEXT NOT NULL,
                    attributes_json BLOB NOT NULL,
                    attributes_hash TEXT NOT NULL,
                    hash_algorithm TEXT NOT NULL,
                    modified_at INTEGER NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_entries_parent ON entries (parent, dn);",
            )
            .map_err(|err| db_error(&err))?;
        }
        Some(value) if value == SCHEMA_VERSION => {}
        Some(value) => {
            return Err(SqliteStoreError::VersionMismatch(format!(
                "unsupported schema version: {value}"
            )));
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

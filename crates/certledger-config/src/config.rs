// crates/certledger-config/src/config.rs
// ============================================================================
// Module: Certledger Configuration
// Description: Configuration loading and validation for Certledger replicas.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: certledger-core, certledger-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and path limits.
//! Unknown keys, missing sections that have no safe default, and out-of-range
//! values all fail closed.
//!
//! The generator mode configured for a counter only seeds a fresh counter
//! entry. Once the entry exists, the persisted mode wins and a differing
//! configured mode is reported as a mismatch when the generator opens.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::path::PathBuf;

use certledger_core::CounterName;
use certledger_core::GeneratorMode;
use certledger_core::GeneratorSettings;
use certledger_core::REQUEST_NUMBER_COUNTER;
use certledger_core::ReplicaId;
use certledger_core::SERIAL_NUMBER_COUNTER;
use certledger_core::runtime::DEFAULT_CHECKPOINT_INTERVAL;
use certledger_core::runtime::DEFAULT_COLLISION_RETRY_BUDGET;
use certledger_core::runtime::DEFAULT_LEASE_RETRY_BUDGET;
use certledger_store_sqlite::SqliteStoreConfig;
use certledger_store_sqlite::SqliteStoreMode;
use certledger_store_sqlite::SqliteSyncMode;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "certledger.toml";
/// Environment variable used to override the config path.
pub const CONFIG_ENV_VAR: &str = "CERTLEDGER_CONFIG";
/// Maximum size of a config file in bytes.
pub(crate) const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
pub(crate) const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
pub(crate) const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Maximum replica identifier length.
pub(crate) const MAX_REPLICA_ID_LENGTH: usize = 64;
/// Default busy timeout for `SQLite` stores.
const DEFAULT_STORE_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Maximum busy timeout for `SQLite` stores.
pub(crate) const MAX_STORE_BUSY_TIMEOUT_MS: u64 = 60_000;
/// Default range size for sequential counters.
const DEFAULT_RANGE_SIZE: u64 = 1_000;
/// Maximum range size a single lease may take.
pub(crate) const MAX_RANGE_SIZE: u64 = 1 << 40;
/// Maximum lease retry budget.
pub(crate) const MAX_LEASE_RETRY_BUDGET: u32 = 1_024;
/// Maximum collision retry budget.
pub(crate) const MAX_COLLISION_RETRY_BUDGET: u32 = 64;

// ============================================================================
// SECTION: Root Config
// ============================================================================

/// Top-level `certledger.toml` configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CertledgerConfig {
    /// Identity of this CA replica.
    pub replica: ReplicaConfig,
    /// Directory store configuration.
    #[serde(default)]
    pub store: StoreConfig,
    /// Counter configuration.
    #[serde(default)]
    pub counters: CountersConfig,
    /// Allocation retry budgets.
    #[serde(default)]
    pub allocation: AllocationConfig,
    /// Audit sink configuration.
    #[serde(default)]
    pub audit: AuditConfig,
}

impl CertledgerConfig {
    /// Loads configuration from disk using the default resolution rules.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path)?;
        validate_path(&resolved)?;
        let bytes = read_config_bytes(&resolved)?;
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        Self::from_toml(content)
    }

    /// Parses and validates configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when parsing or validation fails.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.replica.validate()?;
        self.store.validate()?;
        self.counters.serial_number.validate("counters.serial_number")?;
        self.counters.request_number.validate("counters.request_number")?;
        self.allocation.validate()?;
        self.audit.validate()?;
        Ok(())
    }

    /// Returns the replica identifier.
    #[must_use]
    pub fn replica_id(&self) -> ReplicaId {
        ReplicaId::new(self.replica.id.trim())
    }

    /// Returns generator settings for the serial number counter.
    #[must_use]
    pub fn serial_number_settings(&self) -> GeneratorSettings {
        self.counters.serial_number.settings(
            CounterName::new(SERIAL_NUMBER_COUNTER),
            self.replica_id(),
            self.allocation.collision_retry_budget,
        )
    }

    /// Returns generator settings for the request number counter.
    #[must_use]
    pub fn request_number_settings(&self) -> GeneratorSettings {
        self.counters.request_number.settings(
            CounterName::new(REQUEST_NUMBER_COUNTER),
            self.replica_id(),
            self.allocation.collision_retry_budget,
        )
    }

    /// Returns the settings for a counter addressed by its stored name.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the counter name is unknown.
    pub fn settings_for(&self, counter: &str) -> Result<GeneratorSettings, ConfigError> {
        match counter {
            SERIAL_NUMBER_COUNTER => Ok(self.serial_number_settings()),
            REQUEST_NUMBER_COUNTER => Ok(self.request_number_settings()),
            other => Err(ConfigError::Invalid(format!("unknown counter: {other}"))),
        }
    }

    /// Renders the effective configuration as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when serialization fails.
    pub fn to_json(&self) -> Result<serde_json::Value, ConfigError> {
        serde_json::to_value(self).map_err(|err| ConfigError::Invalid(err.to_string()))
    }
}

// ============================================================================
// SECTION: Replica
// ============================================================================

/// Replica identity configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReplicaConfig {
    /// Replica identifier used to name lease entries.
    pub id: String,
}

impl ReplicaConfig {
    /// Validates the replica identifier.
    fn validate(&self) -> Result<(), ConfigError> {
        let id = self.id.trim();
        if id.is_empty() {
            return Err(ConfigError::Invalid("replica.id must be non-empty".to_string()));
        }
        if id.len() > MAX_REPLICA_ID_LENGTH {
            return Err(ConfigError::Invalid(format!(
                "replica.id exceeds {MAX_REPLICA_ID_LENGTH} characters"
            )));
        }
        if !id.chars().all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.')) {
            return Err(ConfigError::Invalid(
                "replica.id may only contain ascii letters, digits, '-', '_' or '.'".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// Directory store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// Store backend type.
    #[serde(rename = "type", default)]
    pub store_type: StoreType,
    /// `SQLite` database path when using the sqlite backend.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_store_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` synchronous mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            store_type: StoreType::default(),
            path: None,
            busy_timeout_ms: default_store_busy_timeout_ms(),
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
        }
    }
}

impl StoreConfig {
    /// Validates store configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        match self.store_type {
            StoreType::Memory => {
                if self.path.is_some() {
                    return Err(ConfigError::Invalid("memory store must not set path".to_string()));
                }
                Ok(())
            }
            StoreType::Sqlite => {
                let path = self.path.as_ref().ok_or_else(|| {
                    ConfigError::Invalid("sqlite store requires path".to_string())
                })?;
                validate_path_string("store.path", &path.to_string_lossy())?;
                if self.busy_timeout_ms > MAX_STORE_BUSY_TIMEOUT_MS {
                    return Err(ConfigError::Invalid(format!(
                        "store.busy_timeout_ms must be at most {MAX_STORE_BUSY_TIMEOUT_MS}"
                    )));
                }
                Ok(())
            }
        }
    }

    /// Returns the `SQLite` store configuration for the sqlite backend.
    #[must_use]
    pub fn sqlite_config(&self) -> Option<SqliteStoreConfig> {
        match (self.store_type, &self.path) {
            (StoreType::Sqlite, Some(path)) => Some(SqliteStoreConfig {
                path: path.clone(),
                busy_timeout_ms: self.busy_timeout_ms,
                journal_mode: self.journal_mode,
                sync_mode: self.sync_mode,
            }),
            _ => None,
        }
    }
}

/// Directory store backend type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StoreType {
    /// Use the in-memory store (process lifetime only).
    #[default]
    Memory,
    /// Use the `SQLite`-backed durable store.
    Sqlite,
}

/// Returns the default busy timeout for `SQLite` stores.
const fn default_store_busy_timeout_ms() -> u64 {
    DEFAULT_STORE_BUSY_TIMEOUT_MS
}

// ============================================================================
// SECTION: Counters
// ============================================================================

/// Configuration for both identifier counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CountersConfig {
    /// Certificate serial number counter.
    #[serde(default)]
    pub serial_number: CounterConfig,
    /// Request identifier counter.
    #[serde(default)]
    pub request_number: CounterConfig,
}

/// Configuration for one identifier counter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CounterConfig {
    /// Mode used to seed a fresh counter entry.
    #[serde(default = "default_mode")]
    pub mode: GeneratorMode,
    /// Values leased per range.
    #[serde(default = "default_range_size")]
    pub range_size: u64,
    /// First value handed out by a fresh counter.
    #[serde(default = "default_initial_start")]
    pub initial_start: u64,
    /// Allocations between persisted cursor checkpoints.
    #[serde(default = "default_checkpoint_interval")]
    pub checkpoint_interval: u64,
}

impl Default for CounterConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            range_size: default_range_size(),
            initial_start: default_initial_start(),
            checkpoint_interval: default_checkpoint_interval(),
        }
    }
}

impl CounterConfig {
    /// Validates counter sizing.
    fn validate(&self, field: &str) -> Result<(), ConfigError> {
        if self.range_size == 0 {
            return Err(ConfigError::Invalid(format!(
                "{field}.range_size must be greater than zero"
            )));
        }
        if self.range_size > MAX_RANGE_SIZE {
            return Err(ConfigError::Invalid(format!(
                "{field}.range_size must be at most {MAX_RANGE_SIZE}"
            )));
        }
        if self.checkpoint_interval == 0 {
            return Err(ConfigError::Invalid(format!(
                "{field}.checkpoint_interval must be greater than zero"
            )));
        }
        if self.mode == GeneratorMode::Random && self.initial_start != default_initial_start() {
            return Err(ConfigError::Invalid(format!(
                "{field}.initial_start has no effect in random mode"
            )));
        }
        Ok(())
    }

    /// Builds generator settings for the counter.
    fn settings(
        &self,
        counter: CounterName,
        replica: ReplicaId,
        collision_retry_budget: u32,
    ) -> GeneratorSettings {
        let mut settings = GeneratorSettings::new(counter, replica, self.mode);
        settings.range_size = u128::from(self.range_size);
        settings.initial_start = u128::from(self.initial_start);
        settings.checkpoint_interval = u128::from(self.checkpoint_interval);
        settings.collision_retry_budget = collision_retry_budget;
        settings
    }
}

/// Returns the default seed mode.
const fn default_mode() -> GeneratorMode {
    GeneratorMode::Legacy
}

/// Returns the default range size.
const fn default_range_size() -> u64 {
    DEFAULT_RANGE_SIZE
}

/// Returns the default first value.
const fn default_initial_start() -> u64 {
    1
}

/// Returns the default checkpoint interval.
fn default_checkpoint_interval() -> u64 {
    u64::try_from(DEFAULT_CHECKPOINT_INTERVAL).unwrap_or(100)
}

// ============================================================================
// SECTION: Allocation
// ============================================================================

/// Allocation retry budgets.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AllocationConfig {
    /// Conditional replace attempts before a lease fails.
    #[serde(default = "default_lease_retry_budget")]
    pub lease_retry_budget: u32,
    /// Random draws before a random-mode allocation fails.
    #[serde(default = "default_collision_retry_budget")]
    pub collision_retry_budget: u32,
}

impl Default for AllocationConfig {
    fn default() -> Self {
        Self {
            lease_retry_budget: default_lease_retry_budget(),
            collision_retry_budget: default_collision_retry_budget(),
        }
    }
}

impl AllocationConfig {
    /// Validates retry budgets.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.lease_retry_budget == 0 || self.lease_retry_budget > MAX_LEASE_RETRY_BUDGET {
            return Err(ConfigError::Invalid(format!(
                "allocation.lease_retry_budget must be between 1 and {MAX_LEASE_RETRY_BUDGET}"
            )));
        }
        if self.collision_retry_budget == 0
            || self.collision_retry_budget > MAX_COLLISION_RETRY_BUDGET
        {
            return Err(ConfigError::Invalid(format!(
                "allocation.collision_retry_budget must be between 1 and \
                 {MAX_COLLISION_RETRY_BUDGET}"
            )));
        }
        Ok(())
    }
}

/// Returns the default lease retry budget.
const fn default_lease_retry_budget() -> u32 {
    DEFAULT_LEASE_RETRY_BUDGET
}

/// Returns the default collision retry budget.
const fn default_collision_retry_budget() -> u32 {
    DEFAULT_COLLISION_RETRY_BUDGET
}

// ============================================================================
// SECTION: Audit
// ============================================================================

/// Audit sink configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuditConfig {
    /// Sink receiving audit events.
    #[serde(default)]
    pub sink: AuditSinkType,
    /// Log file path for the file sink.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl AuditConfig {
    /// Validates audit configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        match (self.sink, &self.path) {
            (AuditSinkType::File, Some(path)) => {
                validate_path_string("audit.path", &path.to_string_lossy())
            }
            (AuditSinkType::File, None) => {
                Err(ConfigError::Invalid("file audit sink requires path".to_string()))
            }
            (_, Some(_)) => Err(ConfigError::Invalid(
                "audit.path is only valid with the file sink".to_string(),
            )),
            (_, None) => Ok(()),
        }
    }
}

/// Audit sink type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuditSinkType {
    /// JSON lines on stderr.
    #[default]
    Stderr,
    /// JSON lines appended to a file.
    File,
    /// Discard audit events.
    None,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

impl ConfigError {
    /// Returns the stable error kind label.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Io(_) => "config_io",
            Self::Parse(_) => "config_parse",
            Self::Invalid(_) => "config_invalid",
        }
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Reads the config file, refusing it before reading when it is too large.
fn read_config_bytes(path: &Path) -> Result<Vec<u8>, ConfigError> {
    let io = |err: std::io::Error| ConfigError::Io(err.to_string());
    let too_large = || ConfigError::Invalid("config file exceeds size limit".to_string());
    let file = File::open(path).map_err(io)?;
    let size = file.metadata().map_err(io)?.len();
    let limit = u64::try_from(MAX_CONFIG_FILE_SIZE).map_err(|_| too_large())?;
    if size > limit {
        return Err(too_large());
    }
    let mut bytes = Vec::new();
    file.take(limit.saturating_add(1)).read_to_end(&mut bytes).map_err(io)?;
    if bytes.len() > MAX_CONFIG_FILE_SIZE {
        return Err(too_large());
    }
    Ok(bytes)
}

/// Resolves the config path from CLI or environment defaults.
fn resolve_path(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = path {
        return Ok(path.to_path_buf());
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(PathBuf::from(env_path));
    }
    Ok(PathBuf::from(DEFAULT_CONFIG_NAME))
}

/// Validates the resolved path against security limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

/// Validates a path string against length constraints.
fn validate_path_string(field: &str, value: &str) -> Result<(), ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if trimmed.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    for component in Path::new(trimmed).components() {
        let component_value = component.as_os_str().to_string_lossy();
        if component_value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid(format!("{field} path component too long")));
        }
    }
    Ok(())
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test-only assertions are permitted."
    )]

    use super::*;

    #[test]
    fn validate_path_string_rejects_whitespace_only() {
        let result = validate_path_string("store.path", "   ");
        assert!(result.unwrap_err().to_string().contains("non-empty"));
    }

    #[test]
    fn validate_path_string_rejects_exceeds_max_length() {
        let long_path = "a".repeat(MAX_TOTAL_PATH_LENGTH + 1);
        let result = validate_path_string("store.path", &long_path);
        assert!(result.unwrap_err().to_string().contains("max length"));
    }

    #[test]
    fn default_checkpoint_interval_matches_generator_default() {
        assert_eq!(u128::from(default_checkpoint_interval()), DEFAULT_CHECKPOINT_INTERVAL);
    }
}

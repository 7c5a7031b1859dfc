// crates/certledger-cli/src/context.rs
// ============================================================================
// Module: Replica Context
// Description: Wires configuration into a directory store, audit sink, and
//              repositories for one CLI invocation.
// Purpose: Keep command handlers free of backend construction details.
// Dependencies: certledger-config, certledger-core, certledger-store-sqlite
// ============================================================================

//! ## Overview
//! A [`ReplicaContext`] owns the shared directory handle and audit sink built
//! from `certledger.toml`. Generators are opened on demand with the counter's
//! persisted mode: the configured mode only seeds a counter that does not
//! exist yet.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use certledger_config::AuditSinkType;
use certledger_config::CertledgerConfig;
use certledger_config::ConfigError;
use certledger_config::StoreType;
use certledger_core::AllocationError;
use certledger_core::CertificateRepository;
use certledger_core::CounterName;
use certledger_core::FileAuditSink;
use certledger_core::IdGenerator;
use certledger_core::InMemoryDirectoryStore;
use certledger_core::NoopAuditSink;
use certledger_core::RangeManager;
use certledger_core::REQUEST_NUMBER_COUNTER;
use certledger_core::RequestRepository;
use certledger_core::SERIAL_NUMBER_COUNTER;
use certledger_core::SharedAuditSink;
use certledger_core::SharedDirectoryStore;
use certledger_core::StderrAuditSink;
use certledger_store_sqlite::SqliteDirectoryStore;
use certledger_store_sqlite::SqliteStoreError;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised while wiring a replica context.
#[derive(Debug, Error)]
pub enum ContextError {
    /// Configuration is unusable.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The `SQLite` store could not be opened.
    #[error(transparent)]
    Store(#[from] SqliteStoreError),
    /// The audit log could not be opened.
    #[error("audit log {path}: {message}")]
    Audit {
        /// Audit log path.
        path: String,
        /// I/O error message.
        message: String,
    },
    /// Counter setup failed.
    #[error(transparent)]
    Allocation(#[from] AllocationError),
}

impl ContextError {
    /// Returns the stable taxonomy label.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Config(err) => err.kind(),
            Self::Store(SqliteStoreError::Corrupt(_)) => "store_corrupt",
            Self::Store(SqliteStoreError::VersionMismatch(_)) => "store_version_mismatch",
            Self::Store(_) => "store_failure",
            Self::Audit {
                ..
            } => "audit_unavailable",
            Self::Allocation(err) => err.kind(),
        }
    }
}

// ============================================================================
// SECTION: Context
// ============================================================================

/// Store, audit sink, and configuration for one replica.
pub struct ReplicaContext {
    /// Validated configuration.
    config: CertledgerConfig,
    /// Shared directory handle.
    store: SharedDirectoryStore,
    /// Audit sink for every component.
    audit: SharedAuditSink,
}

impl ReplicaContext {
    /// Opens the configured store and audit sink.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError`] when the store or audit log cannot be opened.
    pub fn open(config: CertledgerConfig) -> Result<Self, ContextError> {
        let store = match config.store.store_type {
            StoreType::Memory => SharedDirectoryStore::from_store(InMemoryDirectoryStore::new()),
            StoreType::Sqlite => {
                let sqlite = config.store.sqlite_config().ok_or_else(|| {
                    ConfigError::Invalid("sqlite store requires path".to_string())
                })?;
                SharedDirectoryStore::from_store(SqliteDirectoryStore::new(sqlite)?)
            }
        };
        let audit = open_audit_sink(&config)?;
        Ok(Self {
            config,
            store,
            audit,
        })
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &CertledgerConfig {
        &self.config
    }

    /// Returns the shared directory handle.
    #[must_use]
    pub fn store(&self) -> SharedDirectoryStore {
        self.store.clone()
    }

    /// Returns a range manager honoring the configured retry budget.
    #[must_use]
    pub fn ranges(&self) -> RangeManager {
        RangeManager::new(self.store.clone(), Arc::clone(&self.audit))
            .with_retry_budget(self.config.allocation.lease_retry_budget)
    }

    /// Resolves a counter name given on the command line.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::Config`] for names other than the two counters.
    pub fn counter(&self, name: &str) -> Result<CounterName, ContextError> {
        Ok(self.config.settings_for(name)?.counter)
    }

    /// Opens the generator for a counter using its persisted mode.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError`] when the counter name is unknown or the counter
    /// entry cannot be read or created.
    pub fn generator(&self, counter: &str) -> Result<IdGenerator, ContextError> {
        let mut settings = self.config.settings_for(counter)?;
        let ranges = self.ranges();
        match ranges.read_counter(&settings.counter) {
            Ok((persisted, _)) => settings.mode = persisted,
            Err(AllocationError::CounterNotInitialized(_)) => {}
            Err(err) => return Err(err.into()),
        }
        Ok(IdGenerator::open(ranges, settings)?)
    }

    /// Builds the certificate repository.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError`] when the serial number generator cannot open.
    pub fn certificates(&self) -> Result<CertificateRepository, ContextError> {
        let generator = self.generator(SERIAL_NUMBER_COUNTER)?;
        Ok(CertificateRepository::new(
            self.store.clone(),
            Arc::new(generator),
            Arc::clone(&self.audit),
        ))
    }

    /// Builds the request repository.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError`] when the request number generator cannot open.
    pub fn requests(&self) -> Result<RequestRepository, ContextError> {
        let generator = self.generator(REQUEST_NUMBER_COUNTER)?;
        Ok(RequestRepository::new(self.store.clone(), Arc::new(generator), Arc::clone(&self.audit)))
    }
}

/// Opens the configured audit sink.
fn open_audit_sink(config: &CertledgerConfig) -> Result<SharedAuditSink, ContextError> {
    let sink: SharedAuditSink = match (config.audit.sink, &config.audit.path) {
        (AuditSinkType::Stderr, _) => Arc::new(StderrAuditSink),
        (AuditSinkType::None, _) => Arc::new(NoopAuditSink),
        (AuditSinkType::File, Some(path)) => {
            Arc::new(FileAuditSink::new(path).map_err(|err| ContextError::Audit {
                path: path.display().to_string(),
                message: err.to_string(),
            })?)
        }
        (AuditSinkType::File, None) => {
            return Err(ConfigError::Invalid("file audit sink requires path".to_string()).into());
        }
    };
    Ok(sink)
}

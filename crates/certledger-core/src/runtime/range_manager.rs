// crates/certledger-core/src/runtime/range_manager.rs
// ============================================================================
// Module: Certledger Range Manager
// Description: Range leasing over a conditional-replace directory pointer.
// Purpose: Hand replicas disjoint identifier ranges without a shared lock.
// Dependencies: crate::{audit, core, interfaces}, thiserror
// ============================================================================

//! ## Overview
//! Each counter entry carries a `nextRange` pointer that only ever advances.
//! Leasing reads the pointer `N`, claims `[N, N+size-1]`, and writes `N+size`
//! back with a precondition that the pointer still equals `N`. A failed
//! precondition means another replica won the race; the manager re-reads and
//! retries with bounded exponential backoff. Ranges are disjoint because every
//! successful write starts where the previous one ended.
//!
//! After a successful lease the replica's own lease entry records the interval
//! and a cursor checkpoint so a restarted replica never reuses an identifier.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::thread;
use std::time::Duration;

use thiserror::Error;

use crate::audit::AuditEvent;
use crate::audit::EVENT_COUNTER_MIGRATED;
use crate::audit::EVENT_RANGE_LEASED;
use crate::audit::EVENT_RANGE_RELEASED;
use crate::audit::SharedAuditSink;
use crate::core::CounterInfo;
use crate::core::CounterName;
use crate::core::GeneratorMode;
use crate::core::LeaseState;
use crate::core::RangeLease;
use crate::core::ReplicaId;
use crate::core::ReplicaLease;
use crate::interfaces::ATTR_BEGIN_RANGE;
use crate::interfaces::ATTR_CURSOR_CHECKPOINT;
use crate::interfaces::ATTR_END_RANGE;
use crate::interfaces::ATTR_GENERATOR_MODE;
use crate::interfaces::ATTR_LEASE_STATE;
use crate::interfaces::ATTR_NEXT_RANGE;
use crate::interfaces::DirectoryEntry;
use crate::interfaces::DirectoryStore;
use crate::interfaces::Modification;
use crate::interfaces::Precondition;
use crate::interfaces::SearchRequest;
use crate::interfaces::StoreError;
use crate::runtime::store::SharedDirectoryStore;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Container holding counter entries.
pub const RANGES_CONTAINER: &str = "ou=ranges,ou=ca";
/// Default number of conditional-replace attempts per lease.
pub const DEFAULT_LEASE_RETRY_BUDGET: u32 = 16;
/// Initial backoff between lease attempts.
const LEASE_INITIAL_BACKOFF: Duration = Duration::from_millis(1);
/// Maximum backoff between lease attempts.
const LEASE_MAX_BACKOFF: Duration = Duration::from_millis(64);
/// Page size used when listing replica leases.
const LEASE_PAGE_SIZE: usize = 256;

/// Returns the distinguished name of a counter entry.
#[must_use]
pub fn counter_dn(counter: &CounterName) -> String {
    format!("cn={counter},{RANGES_CONTAINER}")
}

/// Returns the distinguished name of a replica lease entry.
#[must_use]
pub fn replica_lease_dn(replica: &ReplicaId, counter: &CounterName) -> String {
    format!("cn={replica},{}", counter_dn(counter))
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors surfaced by identifier allocation.
///
/// Range exhaustion, lease conflicts, and individual random-draw collisions
/// are resolved internally and never appear here.
#[derive(Debug, Error)]
pub enum AllocationError {
    /// A range could not be leased.
    #[error("provisioning failure for counter {counter}: {reason}")]
    ProvisioningFailure {
        /// Counter being leased.
        counter: CounterName,
        /// Failure description.
        reason: String,
    },
    /// Every random draw in the retry budget collided.
    #[error("fatal allocation error for counter {counter}: {attempts} draws collided")]
    FatalAllocationError {
        /// Counter being allocated.
        counter: CounterName,
        /// Number of draws attempted.
        attempts: u32,
    },
    /// The counter entry does not exist.
    #[error("counter {0} is not initialized")]
    CounterNotInitialized(CounterName),
    /// The persisted mode differs from the requested mode.
    #[error("counter {counter} is persisted in {persisted} mode but {configured} was requested")]
    ModeMismatch {
        /// Counter name.
        counter: CounterName,
        /// Mode stored on the counter entry.
        persisted: GeneratorMode,
        /// Mode requested by configuration.
        configured: GeneratorMode,
    },
    /// Migration refused while sequential leases are active.
    #[error("counter {counter} migration blocked by active leases: {}", .replicas.join(", "))]
    MigrationBlocked {
        /// Counter name.
        counter: CounterName,
        /// Replicas holding active leases.
        replicas: Vec<String>,
    },
    /// Directory store failure.
    #[error("counter {counter}: {source}")]
    Store {
        /// Counter involved.
        counter: CounterName,
        /// Underlying store error.
        source: StoreError,
    },
}

impl AllocationError {
    /// Returns the stable taxonomy label.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::ProvisioningFailure {
                ..
            } => "provisioning_failure",
            Self::FatalAllocationError {
                ..
            } => "fatal_allocation_error",
            Self::CounterNotInitialized(_) => "counter_not_initialized",
            Self::ModeMismatch {
                ..
            } => "mode_mismatch",
            Self::MigrationBlocked {
                ..
            } => "migration_blocked",
            Self::Store {
                source, ..
            } => store_error_kind(source),
        }
    }

    /// Returns the counter the error refers to.
    #[must_use]
    pub const fn counter(&self) -> &CounterName {
        match self {
            Self::ProvisioningFailure {
                counter, ..
            }
            | Self::FatalAllocationError {
                counter, ..
            }
            | Self::ModeMismatch {
                counter, ..
            }
            | Self::MigrationBlocked {
                counter, ..
            }
            | Self::Store {
                counter, ..
            }
            | Self::CounterNotInitialized(counter) => counter,
        }
    }
}

/// Returns the taxonomy label of a store error.
#[must_use]
pub const fn store_error_kind(error: &StoreError) -> &'static str {
    match error {
        StoreError::Corrupt(_) => "store_corrupt",
        StoreError::NotFound(_) => "not_found",
        StoreError::AlreadyExists(_) => "already_exists",
        StoreError::ConditionFailed(_) => "condition_failed",
        StoreError::Io(_)
        | StoreError::VersionMismatch(_)
        | StoreError::Invalid(_)
        | StoreError::Store(_) => "store_unavailable",
    }
}

// ============================================================================
// SECTION: Range Manager
// ============================================================================

/// Result of a mode migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MigrationOutcome {
    /// Mode before the migration.
    pub from: GeneratorMode,
    /// Mode after the migration.
    pub to: GeneratorMode,
}

impl MigrationOutcome {
    /// Returns true when the counter already used the requested mode.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.from == self.to
    }
}

/// Leases disjoint ranges and manages counter entries.
#[derive(Clone)]
pub struct RangeManager {
    /// Shared directory.
    store: SharedDirectoryStore,
    /// Audit sink for lease events.
    audit: SharedAuditSink,
    /// Conditional-replace attempts per lease.
    retry_budget: u32,
}

impl RangeManager {
    /// Creates a range manager with the default retry budget.
    #[must_use]
    pub fn new(store: SharedDirectoryStore, audit: SharedAuditSink) -> Self {
        Self {
            store,
            audit,
            retry_budget: DEFAULT_LEASE_RETRY_BUDGET,
        }
    }

    /// Overrides the conditional-replace retry budget (minimum one attempt).
    #[must_use]
    pub fn with_retry_budget(mut self, retry_budget: u32) -> Self {
        self.retry_budget = retry_budget.max(1);
        self
    }

    /// Returns the shared directory.
    #[must_use]
    pub const fn store(&self) -> &SharedDirectoryStore {
        &self.store
    }

    /// Returns the audit sink.
    #[must_use]
    pub const fn audit(&self) -> &SharedAuditSink {
        &self.audit
    }

    /// Creates the counter entry when absent and returns the persisted mode.
    ///
    /// # Errors
    ///
    /// Returns [`AllocationError::ModeMismatch`] when the counter exists with a
    /// different mode.
    pub fn ensure_counter(
        &self,
        counter: &CounterName,
        mode: GeneratorMode,
        initial_start: u128,
    ) -> Result<GeneratorMode, AllocationError> {
        let dn = counter_dn(counter);
        let persisted = match self.read_counter(counter) {
            Ok((persisted, _)) => persisted,
            Err(AllocationError::CounterNotInitialized(_)) => {
                let entry = DirectoryEntry::new(&dn)
                    .with(ATTR_NEXT_RANGE, initial_start.to_string())
                    .with(ATTR_GENERATOR_MODE, mode.as_str());
                match self.store.add_entry(&entry) {
                    Ok(()) => mode,
                    Err(StoreError::AlreadyExists(_)) => self.read_counter(counter)?.0,
                    Err(source) => return Err(store_failure(counter, source)),
                }
            }
            Err(err) => return Err(err),
        };
        if persisted != mode {
            return Err(AllocationError::ModeMismatch {
                counter: counter.clone(),
                persisted,
                configured: mode,
            });
        }
        Ok(persisted)
    }

    /// Reads the persisted mode and `nextRange` pointer.
    ///
    /// # Errors
    ///
    /// Returns [`AllocationError::CounterNotInitialized`] when the counter entry
    /// does not exist.
    pub fn read_counter(
        &self,
        counter: &CounterName,
    ) -> Result<(GeneratorMode, u128), AllocationError> {
        let dn = counter_dn(counter);
        let entry = self
            .store
            .read_entry(&dn)
            .map_err(|source| store_failure(counter, source))?
            .ok_or_else(|| AllocationError::CounterNotInitialized(counter.clone()))?;
        let mode = entry
            .get(ATTR_GENERATOR_MODE)
            .ok_or_else(|| corrupt(counter, &dn, ATTR_GENERATOR_MODE))?
            .parse::<GeneratorMode>()
            .map_err(|_| corrupt(counter, &dn, ATTR_GENERATOR_MODE))?;
        let next_range = parse_u128(&entry, ATTR_NEXT_RANGE, counter)?;
        Ok((mode, next_range))
    }

    /// Leases a fresh range of `size` values for the replica.
    ///
    /// # Errors
    ///
    /// Returns [`AllocationError::ProvisioningFailure`] when the retry budget is
    /// exhausted, the pointer would overflow, or the counter is in random mode.
    pub fn lease_new_range(
        &self,
        replica: &ReplicaId,
        counter: &CounterName,
        size: u128,
    ) -> Result<RangeLease, AllocationError> {
        if size == 0 {
            return Err(provisioning(counter, "range size must be greater than zero"));
        }
        let dn = counter_dn(counter);
        let mut backoff = LEASE_INITIAL_BACKOFF;
        for attempt in 1 ..= self.retry_budget {
            let (mode, start) = self.read_counter(counter)?;
            if !mode.is_sequential() {
                return Err(provisioning(counter, "counter is in random mode"));
            }
            let Some(next_range_start) = start.checked_add(size) else {
                return Err(provisioning(counter, "counter exhausted"));
            };
            let end = next_range_start - 1;
            let outcome = self.store.modify_entry(
                &dn,
                &[Modification::replace(ATTR_NEXT_RANGE, next_range_start.to_string())],
                &[
                    Precondition::equals(ATTR_NEXT_RANGE, start.to_string()),
                    Precondition::equals(ATTR_GENERATOR_MODE, mode.as_str()),
                ],
            );
            match outcome {
                Ok(()) => {
                    let lease = RangeLease {
                        counter: counter.clone(),
                        start,
                        end,
                        next_range_start,
                    };
                    self.persist_replica_lease(replica, &lease)?;
                    self.audit.record(
                        &AuditEvent::new(EVENT_RANGE_LEASED)
                            .counter(counter)
                            .replica(replica)
                            .identifier(start)
                            .detail(format!("range [{start}, {end}] attempt {attempt}")),
                    );
                    return Ok(lease);
                }
                // Either the pointer moved or the mode was migrated; the
                // next pass re-reads both.
                Err(StoreError::ConditionFailed(_)) => {
                    if attempt < self.retry_budget {
                        thread::sleep(backoff);
                        backoff = (backoff * 2).min(LEASE_MAX_BACKOFF);
                    }
                }
                Err(source) => return Err(store_failure(counter, source)),
            }
        }
        Err(provisioning(
            counter,
            &format!("lease conflict persisted after {} attempts", self.retry_budget),
        ))
    }

    /// Loads the replica's lease entry, if any.
    ///
    /// # Errors
    ///
    /// Returns [`AllocationError::Store`] when the entry cannot be read or
    /// parsed.
    pub fn load_replica_lease(
        &self,
        replica: &ReplicaId,
        counter: &CounterName,
    ) -> Result<Option<ReplicaLease>, AllocationError> {
        let dn = replica_lease_dn(replica, counter);
        let entry = self.store.read_entry(&dn).map_err(|source| store_failure(counter, source))?;
        entry.map(|entry| parse_replica_lease(&entry, replica.clone(), counter)).transpose()
    }

    /// Raises the persisted cursor checkpoint of an active lease.
    ///
    /// Returns `false` when the lease entry no longer describes this active
    /// range (it was released or replaced), in which case nothing is written.
    ///
    /// # Errors
    ///
    /// Returns [`AllocationError::Store`] on store failures.
    pub fn advance_checkpoint(
        &self,
        lease: &ReplicaLease,
        checkpoint: u128,
    ) -> Result<bool, AllocationError> {
        let dn = replica_lease_dn(&lease.replica, &lease.counter);
        let outcome = self.store.modify_entry(
            &dn,
            &[Modification::replace(ATTR_CURSOR_CHECKPOINT, checkpoint.to_string())],
            &[
                Precondition::equals(ATTR_BEGIN_RANGE, lease.start.to_string()),
                Precondition::equals(ATTR_LEASE_STATE, LeaseState::Active.as_str()),
            ],
        );
        match outcome {
            Ok(()) => Ok(true),
            Err(StoreError::ConditionFailed(_) | StoreError::NotFound(_)) => Ok(false),
            Err(source) => Err(store_failure(&lease.counter, source)),
        }
    }

    /// Retires the replica's active lease; remaining values are abandoned.
    ///
    /// Returns the released lease, or `None` when no active lease exists.
    ///
    /// # Errors
    ///
    /// Returns [`AllocationError::Store`] on store failures.
    pub fn release_range(
        &self,
        replica: &ReplicaId,
        counter: &CounterName,
    ) -> Result<Option<ReplicaLease>, AllocationError> {
        let Some(mut lease) = self.load_replica_lease(replica, counter)? else {
            return Ok(None);
        };
        if lease.state != LeaseState::Active {
            return Ok(None);
        }
        let dn = replica_lease_dn(replica, counter);
        let outcome = self.store.modify_entry(
            &dn,
            &[Modification::replace(ATTR_LEASE_STATE, LeaseState::Released.as_str())],
            &[
                Precondition::equals(ATTR_BEGIN_RANGE, lease.start.to_string()),
                Precondition::equals(ATTR_LEASE_STATE, LeaseState::Active.as_str()),
            ],
        );
        match outcome {
            Ok(()) => {}
            Err(StoreError::ConditionFailed(_)) => return Ok(None),
            Err(source) => return Err(store_failure(counter, source)),
        }
        lease.state = LeaseState::Released;
        self.audit.record(
            &AuditEvent::new(EVENT_RANGE_RELEASED)
                .counter(counter)
                .replica(replica)
                .detail(format!(
                    "range [{}, {}] released at checkpoint {}",
                    lease.start, lease.end, lease.checkpoint
                )),
        );
        Ok(Some(lease))
    }

    /// Changes the counter's persisted generator mode.
    ///
    /// Moving from a sequential mode to random mode is refused while any
    /// replica holds an active lease. Migrating to the current mode is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`AllocationError::MigrationBlocked`] when active leases exist
    /// and [`AllocationError::Store`] when the mode changed or a range was
    /// leased after the active-lease check.
    pub fn migrate_mode(
        &self,
        counter: &CounterName,
        mode: GeneratorMode,
    ) -> Result<MigrationOutcome, AllocationError> {
        let (current, next_range) = self.read_counter(counter)?;
        let outcome = MigrationOutcome {
            from: current,
            to: mode,
        };
        if outcome.is_noop() {
            return Ok(outcome);
        }
        if current.is_sequential() && !mode.is_sequential() {
            let active: Vec<String> = self
                .list_replica_leases(counter)?
                .into_iter()
                .filter(|lease| lease.state == LeaseState::Active)
                .map(|lease| lease.replica.to_string())
                .collect();
            if !active.is_empty() {
                return Err(AllocationError::MigrationBlocked {
                    counter: counter.clone(),
                    replicas: active,
                });
            }
        }
        self.store
            .modify_entry(
                &counter_dn(counter),
                &[Modification::replace(ATTR_GENERATOR_MODE, mode.as_str())],
                &[
                    Precondition::equals(ATTR_GENERATOR_MODE, current.as_str()),
                    Precondition::equals(ATTR_NEXT_RANGE, next_range.to_string()),
                ],
            )
            .map_err(|source| store_failure(counter, source))?;
        self.audit.record(
            &AuditEvent::new(EVENT_COUNTER_MIGRATED)
                .counter(counter)
                .detail(format!("{current} -> {mode}")),
        );
        Ok(outcome)
    }

    /// Returns the counter's mode, pointer, and every replica lease.
    ///
    /// # Errors
    ///
    /// Returns [`AllocationError::CounterNotInitialized`] when the counter does
    /// not exist.
    pub fn counter_info(&self, counter: &CounterName) -> Result<CounterInfo, AllocationError> {
        let (mode, next_range) = self.read_counter(counter)?;
        Ok(CounterInfo {
            counter: counter.clone(),
            mode,
            next_range,
            leases: self.list_replica_leases(counter)?,
        })
    }

    /// Lists every replica lease recorded under the counter.
    fn list_replica_leases(
        &self,
        counter: &CounterName,
    ) -> Result<Vec<ReplicaLease>, AllocationError> {
        let mut leases = Vec::new();
        let mut request = SearchRequest::children(counter_dn(counter), LEASE_PAGE_SIZE);
        loop {
            let page = self.store.search(&request).map_err(|source| store_failure(counter, source))?;
            for entry in &page.entries {
                let replica = entry
                    .dn
                    .split_once(',')
                    .and_then(|(rdn, _)| rdn.strip_prefix("cn="))
                    .map(ReplicaId::new)
                    .ok_or_else(|| corrupt(counter, &entry.dn, "cn"))?;
                leases.push(parse_replica_lease(entry, replica, counter)?);
            }
            match page.next_cursor {
                Some(cursor) => request.cursor = Some(cursor),
                None => break,
            }
        }
        Ok(leases)
    }

    /// Writes the replica lease entry for a freshly leased range.
    fn persist_replica_lease(
        &self,
        replica: &ReplicaId,
        lease: &RangeLease,
    ) -> Result<(), AllocationError> {
        let dn = replica_lease_dn(replica, &lease.counter);
        let start = lease.start.to_string();
        let end = lease.end.to_string();
        let entry = DirectoryEntry::new(&dn)
            .with(ATTR_BEGIN_RANGE, start.clone())
            .with(ATTR_END_RANGE, end.clone())
            .with(ATTR_CURSOR_CHECKPOINT, start.clone())
            .with(ATTR_LEASE_STATE, LeaseState::Active.as_str());
        match self.store.add_entry(&entry) {
            Ok(()) => Ok(()),
            Err(StoreError::AlreadyExists(_)) => self
                .store
                .modify_entry(
                    &dn,
                    &[
                        Modification::replace(ATTR_BEGIN_RANGE, start.clone()),
                        Modification::replace(ATTR_END_RANGE, end),
                        Modification::replace(ATTR_CURSOR_CHECKPOINT, start),
                        Modification::replace(ATTR_LEASE_STATE, LeaseState::Active.as_str()),
                    ],
                    &[],
                )
                .map_err(|source| store_failure(&lease.counter, source)),
            Err(source) => Err(store_failure(&lease.counter, source)),
        }
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Parses a replica lease entry.
fn parse_replica_lease(
    entry: &DirectoryEntry,
    replica: ReplicaId,
    counter: &CounterName,
) -> Result<ReplicaLease, AllocationError> {
    let state = entry
        .get(ATTR_LEASE_STATE)
        .and_then(LeaseState::parse)
        .ok_or_else(|| corrupt(counter, &entry.dn, ATTR_LEASE_STATE))?;
    let lease = ReplicaLease {
        replica,
        counter: counter.clone(),
        start: parse_u128(entry, ATTR_BEGIN_RANGE, counter)?,
        end: parse_u128(entry, ATTR_END_RANGE, counter)?,
        checkpoint: parse_u128(entry, ATTR_CURSOR_CHECKPOINT, counter)?,
        state,
    };
    if lease.start > lease.end
        || lease.checkpoint < lease.start
        || lease.checkpoint > lease.end.saturating_add(1)
    {
        return Err(corrupt(counter, &entry.dn, ATTR_CURSOR_CHECKPOINT));
    }
    Ok(lease)
}

/// Parses a decimal `u128` attribute.
fn parse_u128(
    entry: &DirectoryEntry,
    attribute: &str,
    counter: &CounterName,
) -> Result<u128, AllocationError> {
    entry
        .get(attribute)
        .and_then(|value| value.parse::<u128>().ok())
        .ok_or_else(|| corrupt(counter, &entry.dn, attribute))
}

/// Builds a corruption error for a missing or malformed attribute.
fn corrupt(counter: &CounterName, dn: &str, attribute: &str) -> AllocationError {
    store_failure(counter, StoreError::Corrupt(format!("{dn}: invalid {attribute}")))
}

/// Wraps a store error with its counter.
fn store_failure(counter: &CounterName, source: StoreError) -> AllocationError {
    AllocationError::Store {
        counter: counter.clone(),
        source,
    }
}

/// Builds a provisioning failure.
fn provisioning(counter: &CounterName, reason: &str) -> AllocationError {
    AllocationError::ProvisioningFailure {
        counter: counter.clone(),
        reason: reason.to_string(),
    }
}

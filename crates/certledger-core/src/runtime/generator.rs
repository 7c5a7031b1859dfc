// crates/certledger-core/src/runtime/generator.rs
// ============================================================================
// Module: Certledger ID Generator
// Description: Per-counter identifier generator over leased ranges or CSPRNG.
// Purpose: Produce identifiers that are unique across replicas.
// Dependencies: crate::{core, runtime::range_manager}, rand
// ============================================================================

//! ## Overview
//! One [`IdGenerator`] serves one counter on one replica. Its mode is the mode
//! persisted on the counter entry and never changes for the life of the
//! generator.
//!
//! Sequential modes hand out the cursor and advance it. The cursor lives
//! behind a mutex and the lease round-trip for a fresh range happens while
//! that mutex is held, so a value outside the current lease is never
//! returned. Before the cursor reaches the persisted checkpoint the checkpoint
//! is raised, so a restarted replica resumes above every value it could have
//! handed out.
//!
//! Random mode draws 128-bit values and asks the caller whether each one is
//! already taken. A bounded number of draws is attempted before giving up.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Mutex;
use std::sync::MutexGuard;

use rand::CryptoRng;
use rand::RngCore;
use rand::rngs::OsRng;

use crate::core::CounterName;
use crate::core::GeneratorMode;
use crate::core::LeaseState;
use crate::core::ReplicaId;
use crate::core::ReplicaLease;
use crate::interfaces::StoreError;
use crate::runtime::range_manager::AllocationError;
use crate::runtime::range_manager::RangeManager;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default number of random draws before a fatal allocation error.
pub const DEFAULT_COLLISION_RETRY_BUDGET: u32 = 3;
/// Sequential values skipped past existing records before a fatal error.
pub const SEQUENTIAL_COLLISION_BUDGET: u32 = 64;
/// Default number of values covered by one checkpoint write.
pub const DEFAULT_CHECKPOINT_INTERVAL: u128 = 100;

// ============================================================================
// SECTION: Random Source
// ============================================================================

/// Cryptographically secure random source used for random-mode draws.
pub trait IdentifierRng: RngCore + CryptoRng + Send {}

impl<T: RngCore + CryptoRng + Send> IdentifierRng for T {}

// ============================================================================
// SECTION: Settings
// ============================================================================

/// Per-counter generator settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratorSettings {
    /// Counter served by the generator.
    pub counter: CounterName,
    /// Replica owning the leases.
    pub replica: ReplicaId,
    /// Mode used to seed a fresh counter.
    pub mode: GeneratorMode,
    /// Values per leased range.
    pub range_size: u128,
    /// `nextRange` value for a fresh counter.
    pub initial_start: u128,
    /// Values covered by one checkpoint write.
    pub checkpoint_interval: u128,
    /// Random draws attempted before a fatal allocation error.
    pub collision_retry_budget: u32,
}

impl GeneratorSettings {
    /// Creates settings with default sizing for the counter and replica.
    #[must_use]
    pub const fn new(counter: CounterName, replica: ReplicaId, mode: GeneratorMode) -> Self {
        Self {
            counter,
            replica,
            mode,
            range_size: 1000,
            initial_start: 1,
            checkpoint_interval: DEFAULT_CHECKPOINT_INTERVAL,
            collision_retry_budget: DEFAULT_COLLISION_RETRY_BUDGET,
        }
    }
}

// ============================================================================
// SECTION: Generator
// ============================================================================

/// Local cursor over the replica's active lease.
#[derive(Debug, Clone)]
struct CursorState {
    /// Active lease, including the persisted checkpoint.
    lease: ReplicaLease,
    /// Next value to hand out.
    next: u128,
}

/// Identifier generator for one counter on one replica.
pub struct IdGenerator {
    /// Range manager used for leasing and checkpoints.
    ranges: RangeManager,
    /// Settings with `mode` set to the persisted mode.
    settings: GeneratorSettings,
    /// Cursor state; `None` until the first lease is loaded.
    cursor: Mutex<Option<CursorState>>,
    /// Random source for random mode.
    rng: Mutex<Box<dyn IdentifierRng>>,
}

impl IdGenerator {
    /// Opens a generator, creating the counter entry when absent.
    ///
    /// # Errors
    ///
    /// Returns [`AllocationError::ModeMismatch`] when the counter already exists
    /// in a different mode.
    pub fn open(ranges: RangeManager, settings: GeneratorSettings) -> Result<Self, AllocationError> {
        if settings.range_size == 0 {
            return Err(AllocationError::ProvisioningFailure {
                counter: settings.counter,
                reason: "range size must be greater than zero".to_string(),
            });
        }
        ranges.ensure_counter(&settings.counter, settings.mode, settings.initial_start)?;
        Ok(Self {
            ranges,
            settings,
            cursor: Mutex::new(None),
            rng: Mutex::new(Box::new(OsRng)),
        })
    }

    /// Replaces the random source.
    #[must_use]
    pub fn with_rng(mut self, rng: impl IdentifierRng + 'static) -> Self {
        self.rng = Mutex::new(Box::new(rng));
        self
    }

    /// Returns the counter served by this generator.
    #[must_use]
    pub const fn counter(&self) -> &CounterName {
        &self.settings.counter
    }

    /// Returns the persisted generator mode.
    #[must_use]
    pub const fn mode(&self) -> GeneratorMode {
        self.settings.mode
    }

    /// Returns the range manager.
    #[must_use]
    pub const fn ranges(&self) -> &RangeManager {
        &self.ranges
    }

    /// Returns the active lease, if one is loaded.
    ///
    /// # Errors
    ///
    /// Returns [`AllocationError::Store`] when the cursor mutex is poisoned.
    pub fn current_lease(&self) -> Result<Option<ReplicaLease>, AllocationError> {
        Ok(self.lock_cursor()?.as_ref().map(|state| state.lease.clone()))
    }

    /// Loads the persisted lease (or leases a new range) without allocating.
    ///
    /// Random-mode generators hold no lease and return `None`.
    ///
    /// # Errors
    ///
    /// Returns [`AllocationError`] when leasing fails.
    pub fn resume(&self) -> Result<Option<ReplicaLease>, AllocationError> {
        if !self.settings.mode.is_sequential() {
            return Ok(None);
        }
        let mut guard = self.lock_cursor()?;
        if guard.is_none() {
            *guard = Some(self.acquire_lease()?);
        }
        Ok(guard.as_ref().map(|state| state.lease.clone()))
    }

    /// Returns how many taken identifiers a caller may skip before failing.
    ///
    /// Random mode uses the configured collision budget; sequential modes
    /// skip records imported ahead of the counter.
    #[must_use]
    pub fn collision_budget(&self) -> u32 {
        if self.settings.mode.is_sequential() {
            SEQUENTIAL_COLLISION_BUDGET
        } else {
            self.settings.collision_retry_budget.max(1)
        }
    }

    /// Allocates the next identifier with no collision check.
    ///
    /// # Errors
    ///
    /// Returns [`AllocationError`] when no identifier can be produced.
    pub fn allocate(&self) -> Result<u128, AllocationError> {
        self.allocate_unique(|_| Ok(false))
    }

    /// Allocates the next identifier.
    ///
    /// In random mode each draw is passed to `is_taken`; a taken draw (or a
    /// draw of zero) is discarded and redrawn. Sequential modes never consult
    /// `is_taken`.
    ///
    /// # Errors
    ///
    /// Returns [`AllocationError::FatalAllocationError`] when every random
    /// draw collides and [`AllocationError::ProvisioningFailure`] when a
    /// range cannot be leased.
    pub fn allocate_unique<F>(&self, is_taken: F) -> Result<u128, AllocationError>
    where
        F: FnMut(u128) -> Result<bool, StoreError>,
    {
        if self.settings.mode.is_sequential() {
            self.allocate_sequential()
        } else {
            self.allocate_random(is_taken)
        }
    }

    /// Hands out the cursor value, leasing a new range when exhausted.
    fn allocate_sequential(&self) -> Result<u128, AllocationError> {
        let mut guard = self.lock_cursor()?;
        loop {
            let mut state = match guard.take() {
                Some(state) if state.next <= state.lease.end => state,
                _ => self.acquire_lease()?,
            };
            let value = state.next;
            if value >= state.lease.checkpoint {
                let ceiling = state.lease.end.saturating_add(1);
                let target = value.saturating_add(self.settings.checkpoint_interval).min(ceiling);
                if !self.ranges.advance_checkpoint(&state.lease, target)? {
                    // Lease released or replaced underneath us; lease again.
                    continue;
                }
                state.lease.checkpoint = target;
            }
            state.next = value + 1;
            *guard = Some(state);
            return Ok(value);
        }
    }

    /// Draws random identifiers until one is free or the budget is spent.
    fn allocate_random<F>(&self, mut is_taken: F) -> Result<u128, AllocationError>
    where
        F: FnMut(u128) -> Result<bool, StoreError>,
    {
        let budget = self.collision_budget();
        for _ in 0 .. budget {
            let candidate = self.draw()?;
            if candidate == 0 {
                continue;
            }
            let taken = is_taken(candidate).map_err(|source| AllocationError::Store {
                counter: self.settings.counter.clone(),
                source,
            })?;
            if !taken {
                return Ok(candidate);
            }
        }
        Err(AllocationError::FatalAllocationError {
            counter: self.settings.counter.clone(),
            attempts: budget,
        })
    }

    /// Draws one 128-bit value.
    fn draw(&self) -> Result<u128, AllocationError> {
        let mut rng = self.rng.lock().map_err(|_| poisoned(&self.settings.counter, "rng"))?;
        let mut bytes = [0_u8; 16];
        rng.fill_bytes(&mut bytes);
        drop(rng);
        Ok(u128::from_be_bytes(bytes))
    }

    /// Resumes the persisted lease when values remain, otherwise leases anew.
    fn acquire_lease(&self) -> Result<CursorState, AllocationError> {
        let settings = &self.settings;
        if let Some(lease) = self.ranges.load_replica_lease(&settings.replica, &settings.counter)?
            && lease.state == LeaseState::Active
            && lease.has_remaining()
        {
            let next = lease.checkpoint;
            return Ok(CursorState {
                lease,
                next,
            });
        }
        let leased =
            self.ranges.lease_new_range(&settings.replica, &settings.counter, settings.range_size)?;
        Ok(CursorState {
            lease: ReplicaLease {
                replica: settings.replica.clone(),
                counter: settings.counter.clone(),
                start: leased.start,
                end: leased.end,
                checkpoint: leased.start,
                state: LeaseState::Active,
            },
            next: leased.start,
        })
    }

    /// Locks the cursor state.
    fn lock_cursor(&self) -> Result<MutexGuard<'_, Option<CursorState>>, AllocationError> {
        self.cursor.lock().map_err(|_| poisoned(&self.settings.counter, "cursor"))
    }
}

/// Builds a poisoned-mutex store error.
fn poisoned(counter: &CounterName, what: &str) -> AllocationError {
    AllocationError::Store {
        counter: counter.clone(),
        source: StoreError::Store(format!("generator {what} mutex poisoned")),
    }
}

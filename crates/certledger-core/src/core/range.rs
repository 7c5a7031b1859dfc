// crates/certledger-core/src/core/range.rs
// ============================================================================
// Module: Certledger Range Model
// Description: Generator modes, leased ranges, and counter snapshots.
// Purpose: Describe the shared counter state that replicas coordinate through.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! A counter entry in the directory holds the shared `nextRange` pointer and
//! the persisted [`GeneratorMode`]. Each replica that leases from the counter
//! owns one [`ReplicaLease`] entry recording its inclusive interval and the
//! cursor checkpoint. Ranges are disjoint because the pointer only advances
//! through a conditional replace.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::CounterName;
use crate::core::identifiers::ReplicaId;
use crate::core::identifiers::decimal_u128;

// ============================================================================
// SECTION: Generator Mode
// ============================================================================

/// Identifier allocation strategy persisted on the counter entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeneratorMode {
    /// Sequential values from leased ranges.
    Legacy,
    /// Sequential values from leased ranges, labelled for migration tooling.
    Legacy2,
    /// 128-bit random draws with a collision check.
    Random,
}

impl GeneratorMode {
    /// Returns the stored attribute value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Legacy => "legacy",
            Self::Legacy2 => "legacy2",
            Self::Random => "random",
        }
    }

    /// Returns true when the mode hands out values from leased ranges.
    #[must_use]
    pub const fn is_sequential(self) -> bool {
        matches!(self, Self::Legacy | Self::Legacy2)
    }
}

impl fmt::Display for GeneratorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GeneratorMode {
    type Err = String;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        match text {
            "legacy" => Ok(Self::Legacy),
            "legacy2" => Ok(Self::Legacy2),
            "random" => Ok(Self::Random),
            other => Err(format!("unknown generator mode: {other}")),
        }
    }
}

// ============================================================================
// SECTION: Leases
// ============================================================================

/// Inclusive interval leased to one replica for one counter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeLease {
    /// Counter the range was leased from.
    pub counter: CounterName,
    /// First value in the range.
    #[serde(with = "decimal_u128")]
    pub start: u128,
    /// Last value in the range (inclusive).
    #[serde(with = "decimal_u128")]
    pub end: u128,
    /// Shared pointer value written by the lease.
    #[serde(with = "decimal_u128")]
    pub next_range_start: u128,
}

impl RangeLease {
    /// Returns true when the value lies inside the lease.
    #[must_use]
    pub const fn contains(&self, value: u128) -> bool {
        value >= self.start && value <= self.end
    }

    /// Returns true when two leases share at least one value.
    #[must_use]
    pub const fn overlaps(&self, other: &Self) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

/// Lifecycle of a replica lease entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaseState {
    /// The replica may hand out values from the range.
    Active,
    /// The range was retired; remaining values are abandoned.
    Released,
}

impl LeaseState {
    /// Returns the stored attribute value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Released => "released",
        }
    }

    /// Parses the stored attribute value.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        match text {
            "active" => Some(Self::Active),
            "released" => Some(Self::Released),
            _ => None,
        }
    }
}

/// Persisted lease entry for one replica on one counter.
///
/// # Invariants
/// - `start <= checkpoint <= end + 1`.
/// - No value at or above `checkpoint` has been handed out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaLease {
    /// Replica owning the lease.
    pub replica: ReplicaId,
    /// Counter the lease belongs to.
    pub counter: CounterName,
    /// First value in the range.
    #[serde(with = "decimal_u128")]
    pub start: u128,
    /// Last value in the range (inclusive).
    #[serde(with = "decimal_u128")]
    pub end: u128,
    /// Cursor high-water mark.
    #[serde(with = "decimal_u128")]
    pub checkpoint: u128,
    /// Lease lifecycle state.
    pub state: LeaseState,
}

impl ReplicaLease {
    /// Returns true when values at or above the checkpoint remain in range.
    #[must_use]
    pub const fn has_remaining(&self) -> bool {
        self.checkpoint <= self.end
    }
}

// ============================================================================
// SECTION: Counter Snapshot
// ============================================================================

/// Snapshot of a counter and every replica lease recorded under it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterInfo {
    /// Counter name.
    pub counter: CounterName,
    /// Persisted generator mode.
    pub mode: GeneratorMode,
    /// Shared next-range pointer.
    #[serde(with = "decimal_u128")]
    pub next_range: u128,
    /// Replica leases ordered by replica identifier.
    pub leases: Vec<ReplicaLease>,
}

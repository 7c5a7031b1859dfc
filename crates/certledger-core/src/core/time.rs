// crates/certledger-core/src/core/time.rs
// ============================================================================
// Module: Certledger Time Model
// Description: Timestamp representation for validity windows and audit fields.
// Purpose: Provide comparable, serializable instants with RFC 3339 text forms.
// Dependencies: serde, time
// ============================================================================

//! ## Overview
//! Record timestamps are unix epoch milliseconds. Repositories accept explicit
//! timestamps for every state change so tests and imports stay deterministic;
//! [`Timestamp::now`] is the only place the wall clock is read.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised when parsing or formatting timestamps.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimestampError {
    /// Text is not an RFC 3339 timestamp or unix millisecond integer.
    #[error("invalid timestamp: {0}")]
    Invalid(String),
    /// Value lies outside the representable range.
    #[error("timestamp out of range: {0}")]
    OutOfRange(i64),
}

// ============================================================================
// SECTION: Time Values
// ============================================================================

/// Instant expressed as unix epoch milliseconds.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Creates a timestamp from unix milliseconds.
    #[must_use]
    pub const fn from_unix_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Returns the unix millisecond value.
    #[must_use]
    pub const fn as_unix_millis(self) -> i64 {
        self.0
    }

    /// Reads the current wall-clock time.
    #[must_use]
    pub fn now() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
            .unwrap_or(0);
        Self(millis)
    }

    /// Parses either an RFC 3339 timestamp or an integer of unix milliseconds.
    ///
    /// # Errors
    ///
    /// Returns [`TimestampError::Invalid`] when neither form matches.
    pub fn parse(text: &str) -> Result<Self, TimestampError> {
        let trimmed = text.trim();
        if let Ok(millis) = trimmed.parse::<i64>() {
            return Ok(Self(millis));
        }
        let parsed = OffsetDateTime::parse(trimmed, &Rfc3339)
            .map_err(|_| TimestampError::Invalid(trimmed.to_string()))?;
        let millis = parsed.unix_timestamp_nanos() / 1_000_000;
        i64::try_from(millis)
            .map(Self)
            .map_err(|_| TimestampError::Invalid(trimmed.to_string()))
    }

    /// Formats the timestamp as RFC 3339 in UTC.
    ///
    /// # Errors
    ///
    /// Returns [`TimestampError::OutOfRange`] when the value cannot be
    /// represented as a calendar date.
    pub fn to_rfc3339(self) -> Result<String, TimestampError> {
        let nanos = i128::from(self.0) * 1_000_000;
        let instant = OffsetDateTime::from_unix_timestamp_nanos(nanos)
            .map_err(|_| TimestampError::OutOfRange(self.0))?;
        instant.format(&Rfc3339).map_err(|_| TimestampError::OutOfRange(self.0))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_rfc3339() {
            Ok(text) => f.write_str(&text),
            Err(_) => write!(f, "{}ms", self.0),
        }
    }
}

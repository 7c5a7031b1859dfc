// crates/certledger-core/src/core/identifiers.rs
// ============================================================================
// Module: Certledger Identifiers
// Description: Strongly typed identifiers for counters, replicas, and records.
// Purpose: Provide serializable IDs with stable string forms.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! Counter and replica names are opaque strings. Certificate serial numbers and
//! request identifiers are 128-bit unsigned integers: the width of a random
//! draw and the ceiling of every leased range. Serial numbers render as
//! lowercase `0x` hex; request identifiers render as decimal. Both parse from
//! either form.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Counter name for certificate serial numbers.
pub const SERIAL_NUMBER_COUNTER: &str = "serialNumber";
/// Counter name for request identifiers.
pub const REQUEST_NUMBER_COUNTER: &str = "requestNumber";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised when parsing identifiers from text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentifierError {
    /// The text is not a decimal or `0x` hex unsigned integer.
    #[error("invalid identifier: {0}")]
    Invalid(String),
    /// The text is empty or whitespace.
    #[error("identifier must be non-empty")]
    Empty,
}

// ============================================================================
// SECTION: Name Types
// ============================================================================

/// Name of an identifier counter stored in the directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CounterName(String);

impl CounterName {
    /// Creates a new counter name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Counter backing certificate serial numbers.
    #[must_use]
    pub fn serial_number() -> Self {
        Self::new(SERIAL_NUMBER_COUNTER)
    }

    /// Counter backing request identifiers.
    #[must_use]
    pub fn request_number() -> Self {
        Self::new(REQUEST_NUMBER_COUNTER)
    }

    /// Returns the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CounterName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for CounterName {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Identifier of a CA replica sharing the directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReplicaId(String);

impl ReplicaId {
    /// Creates a new replica identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReplicaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for ReplicaId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

// ============================================================================
// SECTION: Numeric Identifiers
// ============================================================================

/// Certificate serial number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SerialNumber(u128);

impl SerialNumber {
    /// Creates a serial number from its integer value.
    #[must_use]
    pub const fn new(value: u128) -> Self {
        Self(value)
    }

    /// Returns the integer value.
    #[must_use]
    pub const fn get(self) -> u128 {
        self.0
    }
}

impl fmt::Display for SerialNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

impl FromStr for SerialNumber {
    type Err = IdentifierError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        parse_unsigned(text).map(Self)
    }
}

impl Serialize for SerialNumber {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SerialNumber {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// Enrollment, renewal, or revocation request identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(u128);

impl RequestId {
    /// Creates a request identifier from its integer value.
    #[must_use]
    pub const fn new(value: u128) -> Self {
        Self(value)
    }

    /// Returns the integer value.
    #[must_use]
    pub const fn get(self) -> u128 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for RequestId {
    type Err = IdentifierError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        parse_unsigned(text).map(Self)
    }
}

impl Serialize for RequestId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RequestId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// SECTION: Parsing Helpers
// ============================================================================

/// Parses a decimal or `0x`-prefixed hex unsigned 128-bit integer.
///
/// # Errors
///
/// Returns [`IdentifierError`] when the text is empty or malformed.
pub fn parse_unsigned(text: &str) -> Result<u128, IdentifierError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(IdentifierError::Empty);
    }
    let parsed = if let Some(hex) =
        trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X"))
    {
        u128::from_str_radix(hex, 16)
    } else {
        trimmed.parse::<u128>()
    };
    parsed.map_err(|_| IdentifierError::Invalid(trimmed.to_string()))
}

/// Serde adapter storing `u128` values as decimal strings.
///
/// JSON consumers commonly lose precision above 2^53, so counter values never
/// travel as JSON numbers.
pub mod decimal_u128 {
    use serde::Deserialize;
    use serde::Deserializer;
    use serde::Serializer;

    /// Serializes the value as a decimal string.
    ///
    /// # Errors
    ///
    /// Returns the serializer error when writing fails.
    pub fn serialize<S: Serializer>(value: &u128, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    /// Deserializes a decimal or `0x` hex string.
    ///
    /// # Errors
    ///
    /// Returns a deserializer error when the string is not an unsigned integer.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u128, D::Error> {
        let text = String::deserialize(deserializer)?;
        super::parse_unsigned(&text).map_err(serde::de::Error::custom)
    }
}

// crates/certledger-core/src/interfaces/mod.rs
// ============================================================================
// Module: Certledger Interfaces
// Description: Backend-agnostic directory store and signing interfaces.
// Purpose: Define the contract surfaces used by allocation and repositories.
// Dependencies: crate::core, thiserror
// ============================================================================

//! ## Overview
//! The core never talks to a concrete database or signing engine. It reads and
//! writes attribute maps through [`DirectoryStore`] and asks a
//! [`CertificateSigner`] to turn certificate info into signed bytes.
//!
//! The only cross-replica linearization point is the conditional replace in
//! [`DirectoryStore::modify_entry`]: a modification applies only when every
//! [`Precondition`] still holds on the stored entry. Implementations must
//! evaluate the preconditions and apply the modifications atomically.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::identifiers::SerialNumber;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Attribute Names
// ============================================================================

/// Shared next-range pointer on a counter entry.
pub const ATTR_NEXT_RANGE: &str = "nextRange";
/// Persisted generator mode on a counter entry.
pub const ATTR_GENERATOR_MODE: &str = "generatorMode";
/// First value of a replica lease.
pub const ATTR_BEGIN_RANGE: &str = "beginRange";
/// Last value of a replica lease.
pub const ATTR_END_RANGE: &str = "endRange";
/// Cursor high-water mark of a replica lease.
pub const ATTR_CURSOR_CHECKPOINT: &str = "cursorCheckpoint";
/// Lifecycle state of a replica lease.
pub const ATTR_LEASE_STATE: &str = "leaseState";
/// Certificate record key.
pub const ATTR_SERIAL_NO: &str = "serialno";
/// Request record key.
pub const ATTR_REQUEST_ID: &str = "requestId";
/// Certificate status index.
pub const ATTR_CERT_STATUS: &str = "certstatus";
/// Request status index.
pub const ATTR_REQUEST_STATE: &str = "requeststate";
/// Request type index.
pub const ATTR_REQUEST_TYPE: &str = "requesttype";
/// Serialized record payload.
pub const ATTR_RECORD_DATA: &str = "recordData";

// ============================================================================
// SECTION: Directory Entries
// ============================================================================

/// Attribute map of a directory entry.
pub type Attributes = BTreeMap<String, String>;

/// Directory entry addressed by distinguished name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    /// Distinguished name.
    pub dn: String,
    /// Single-valued attributes.
    pub attributes: Attributes,
}

impl DirectoryEntry {
    /// Creates an entry with no attributes.
    #[must_use]
    pub fn new(dn: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            attributes: Attributes::new(),
        }
    }

    /// Adds an attribute, returning the entry.
    #[must_use]
    pub fn with(mut self, attribute: &str, value: impl Into<String>) -> Self {
        self.attributes.insert(attribute.to_string(), value.into());
        self
    }

    /// Returns an attribute value.
    #[must_use]
    pub fn get(&self, attribute: &str) -> Option<&str> {
        self.attributes.get(attribute).map(String::as_str)
    }
}

/// Returns everything after the first RDN of a distinguished name.
#[must_use]
pub fn parent_dn(dn: &str) -> &str {
    dn.split_once(',').map_or("", |(_, parent)| parent)
}

/// Single attribute change applied by [`DirectoryStore::modify_entry`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Modification {
    /// Attribute to change.
    pub attribute: String,
    /// New value; `None` removes the attribute.
    pub value: Option<String>,
}

impl Modification {
    /// Replaces (or adds) an attribute value.
    #[must_use]
    pub fn replace(attribute: &str, value: impl Into<String>) -> Self {
        Self {
            attribute: attribute.to_string(),
            value: Some(value.into()),
        }
    }

    /// Removes an attribute.
    #[must_use]
    pub fn remove(attribute: &str) -> Self {
        Self {
            attribute: attribute.to_string(),
            value: None,
        }
    }
}

/// Expected current value checked before a modification applies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Precondition {
    /// Attribute to check.
    pub attribute: String,
    /// Expected value; `None` requires the attribute to be absent.
    pub expected: Option<String>,
}

impl Precondition {
    /// Requires the attribute to hold exactly `expected`.
    #[must_use]
    pub fn equals(attribute: &str, expected: impl Into<String>) -> Self {
        Self {
            attribute: attribute.to_string(),
            expected: Some(expected.into()),
        }
    }

    /// Returns true when the entry satisfies the precondition.
    #[must_use]
    pub fn holds(&self, attributes: &Attributes) -> bool {
        attributes.get(&self.attribute).map(String::as_str) == self.expected.as_deref()
    }
}

/// Applies modifications to an attribute map in order.
pub fn apply_modifications(attributes: &mut Attributes, modifications: &[Modification]) {
    for modification in modifications {
        match &modification.value {
            Some(value) => {
                attributes.insert(modification.attribute.clone(), value.clone());
            }
            None => {
                attributes.remove(&modification.attribute);
            }
        }
    }
}

/// One-level search under a container entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    /// Container distinguished name; only direct children match.
    pub base: String,
    /// Equality filter; every pair must match.
    pub filter: Attributes,
    /// Exclusive distinguished-name cursor from a previous page.
    pub cursor: Option<String>,
    /// Maximum entries per page.
    pub limit: usize,
}

impl SearchRequest {
    /// Creates an unfiltered search of the container.
    #[must_use]
    pub fn children(base: impl Into<String>, limit: usize) -> Self {
        Self {
            base: base.into(),
            filter: Attributes::new(),
            cursor: None,
            limit,
        }
    }

    /// Adds an equality filter term.
    #[must_use]
    pub fn with_filter(mut self, attribute: &str, value: impl Into<String>) -> Self {
        self.filter.insert(attribute.to_string(), value.into());
        self
    }

    /// Returns true when the entry matches the equality filter.
    #[must_use]
    pub fn matches(&self, attributes: &Attributes) -> bool {
        self.filter.iter().all(|(key, value)| attributes.get(key) == Some(value))
    }
}

/// Page of search results ordered by distinguished name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchPage {
    /// Matching entries.
    pub entries: Vec<DirectoryEntry>,
    /// Cursor for the next page, when more entries may remain.
    pub next_cursor: Option<String>,
}

// ============================================================================
// SECTION: Directory Store
// ============================================================================

/// Directory store errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Store I/O error.
    #[error("directory store io error: {0}")]
    Io(String),
    /// Store data is corrupted or fails integrity checks.
    #[error("directory store corruption: {0}")]
    Corrupt(String),
    /// Store data version is incompatible.
    #[error("directory store version mismatch: {0}")]
    VersionMismatch(String),
    /// Store data or request is invalid.
    #[error("directory store invalid data: {0}")]
    Invalid(String),
    /// Store reported an error.
    #[error("directory store error: {0}")]
    Store(String),
    /// Entry does not exist.
    #[error("directory entry not found: {0}")]
    NotFound(String),
    /// Entry already exists.
    #[error("directory entry already exists: {0}")]
    AlreadyExists(String),
    /// A conditional replace precondition no longer holds.
    #[error("directory precondition failed: {0}")]
    ConditionFailed(String),
}

/// Shared directory backing counters and records.
pub trait DirectoryStore {
    /// Reads an entry by distinguished name.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn read_entry(&self, dn: &str) -> Result<Option<DirectoryEntry>, StoreError>;

    /// Adds a new entry.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::AlreadyExists`] when the name is taken.
    fn add_entry(&self, entry: &DirectoryEntry) -> Result<(), StoreError>;

    /// Applies modifications when every precondition holds.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when the entry is missing and
    /// [`StoreError::ConditionFailed`] when a precondition no longer holds;
    /// the entry is unchanged in both cases.
    fn modify_entry(
        &self,
        dn: &str,
        modifications: &[Modification],
        preconditions: &[Precondition],
    ) -> Result<(), StoreError>;

    /// Lists direct children of a container, ordered by distinguished name.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the search fails.
    fn search(&self, request: &SearchRequest) -> Result<SearchPage, StoreError>;
}

// ============================================================================
// SECTION: Certificate Signer
// ============================================================================

/// Certificate fields handed to the signing collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsignedCertificate {
    /// Allocated serial number.
    pub serial_number: SerialNumber,
    /// Subject distinguished name.
    pub subject: String,
    /// Issuer distinguished name.
    pub issuer: String,
    /// Start of validity.
    pub not_before: Timestamp,
    /// End of validity.
    pub not_after: Timestamp,
}

/// Signing errors.
#[derive(Debug, Error)]
pub enum SigningError {
    /// Signer reported an error.
    #[error("signing error: {0}")]
    SigningFailed(String),
}

/// Signing collaborator producing encoded certificates.
pub trait CertificateSigner {
    /// Signs certificate info and returns the encoded certificate.
    ///
    /// # Errors
    ///
    /// Returns [`SigningError`] when signing fails.
    fn sign(&self, info: &UnsignedCertificate) -> Result<Vec<u8>, SigningError>;

    /// Returns the issuer distinguished name.
    fn issuer_name(&self) -> String;
}

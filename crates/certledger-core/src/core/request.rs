// crates/certledger-core/src/core/request.rs
// ============================================================================
// Module: Certledger Request Records
// Description: Enrollment, renewal, and revocation request records.
// Purpose: Provide the persisted shape of CA requests.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Requests are created PENDING and move exactly once to a terminal status.
//! Completed enrollment and renewal requests keep a mutable link to the
//! certificate they produced.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;

use crate::core::challenge::ChallengeDigest;
use crate::core::identifiers::RequestId;
use crate::core::identifiers::SerialNumber;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Request Type
// ============================================================================

/// Kind of request submitted to the CA.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestType {
    /// New certificate enrollment.
    Enrollment,
    /// Renewal of an existing certificate.
    Renewal,
    /// Revocation of an issued certificate.
    Revocation,
    /// Release of a certificate hold.
    Unrevocation,
}

impl RequestType {
    /// Returns the stored `requesttype` attribute value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Enrollment => "enrollment",
            Self::Renewal => "renewal",
            Self::Revocation => "revocation",
            Self::Unrevocation => "unrevocation",
        }
    }

    /// Returns true when completion yields a certificate.
    #[must_use]
    pub const fn produces_certificate(self) -> bool {
        matches!(self, Self::Enrollment | Self::Renewal)
    }
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestType {
    type Err = String;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        match text.to_ascii_lowercase().as_str() {
            "enrollment" => Ok(Self::Enrollment),
            "renewal" => Ok(Self::Renewal),
            "revocation" => Ok(Self::Revocation),
            "unrevocation" => Ok(Self::Unrevocation),
            _ => Err(format!("unknown request type: {text}")),
        }
    }
}

// ============================================================================
// SECTION: Request Status
// ============================================================================

/// Request lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    /// Awaiting processing.
    Pending,
    /// Processed successfully.
    Complete,
    /// Refused by an agent or policy.
    Rejected,
    /// Withdrawn by the requester.
    Canceled,
}

impl RequestStatus {
    /// Returns the stored `requeststate` attribute value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Complete => "complete",
            Self::Rejected => "rejected",
            Self::Canceled => "canceled",
        }
    }

    /// Returns true for COMPLETE, REJECTED, and CANCELED.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = String;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        match text.to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "complete" => Ok(Self::Complete),
            "rejected" => Ok(Self::Rejected),
            "canceled" | "cancelled" => Ok(Self::Canceled),
            _ => Err(format!("unknown request status: {text}")),
        }
    }
}

/// Status filter for request listings; `All` disables filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatusFilter {
    /// Match every status.
    All,
    /// Match one status.
    Only(RequestStatus),
}

impl FromStr for RequestStatusFilter {
    type Err = String;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        if text.eq_ignore_ascii_case("all") {
            return Ok(Self::All);
        }
        text.parse().map(Self::Only)
    }
}

// ============================================================================
// SECTION: Records
// ============================================================================

/// Persisted request record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestRecord {
    /// Request identifier.
    pub request_id: RequestId,
    /// Request kind.
    pub request_type: RequestType,
    /// Lifecycle status.
    pub status: RequestStatus,
    /// Opaque key/value payload (CSR, profile id, DNS names).
    #[serde(default)]
    pub extension_data: BTreeMap<String, String>,
    /// Salted challenge-phrase digest.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub challenge: Option<ChallengeDigest>,
    /// Certificate produced by a completed enrollment or renewal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_certificate_id: Option<SerialNumber>,
    /// Time the request was submitted.
    pub created_at: Timestamp,
    /// Time of the last change.
    pub modified_at: Timestamp,
}

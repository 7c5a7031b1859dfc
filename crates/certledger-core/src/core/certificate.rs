// crates/certledger-core/src/core/certificate.rs
// ============================================================================
// Module: Certledger Certificate Records
// Description: Certificate record, status, and revocation reason types.
// Purpose: Provide the persisted shape of issued certificates.
// Dependencies: base64, serde
// ============================================================================

//! ## Overview
//! A [`CertificateRecord`] is created once per issued certificate and then
//! mutated only by status transitions or by appending CRL issuance metadata.
//! Status transitions are validated by the certificate repository; this module
//! only defines the data and its stored encodings.

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
// SECTION: Status
// ============================================================================

/// Certificate lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CertificateStatus {
    /// Issued and in force.
    Valid,
    /// Revoked before expiry.
    Revoked,
    /// Past `not_after` without revocation.
    Expired,
    /// Revoked and past `not_after`.
    RevokedExpired,
}

impl CertificateStatus {
    /// Returns the stored `certstatus` attribute value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Valid => "VALID",
            Self::Revoked => "REVOKED",
            Self::Expired => "EXPIRED",
            Self::RevokedExpired => "REVOKED_EXPIRED",
        }
    }
}

impl fmt::Display for CertificateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CertificateStatus {
    type Err = String;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        match text.to_ascii_uppercase().as_str() {
            "VALID" => Ok(Self::Valid),
            "REVOKED" => Ok(Self::Revoked),
            "EXPIRED" => Ok(Self::Expired),
            "REVOKED_EXPIRED" => Ok(Self::RevokedExpired),
            _ => Err(format!("unknown certificate status: {text}")),
        }
    }
}

// ============================================================================
// SECTION: Revocation
// ============================================================================

/// RFC 5280 CRL reason codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RevocationReason {
    /// No reason given.
    Unspecified,
    /// Subject key compromised.
    KeyCompromise,
    /// Issuing CA key compromised.
    CaCompromise,
    /// Subject affiliation changed.
    AffiliationChanged,
    /// Certificate replaced.
    Superseded,
    /// Subject ceased operation.
    CessationOfOperation,
    /// Temporary suspension that may be released.
    CertificateHold,
    /// Delta CRL removal marker.
    RemoveFromCrl,
    /// Privilege withdrawn.
    PrivilegeWithdrawn,
    /// Attribute authority compromised.
    AaCompromise,
}

impl RevocationReason {
    /// Every reason in code order.
    pub const ALL: [Self; 10] = [
        Self::Unspecified,
        Self::KeyCompromise,
        Self::CaCompromise,
        Self::AffiliationChanged,
        Self::Superseded,
        Self::CessationOfOperation,
        Self::CertificateHold,
        Self::RemoveFromCrl,
        Self::PrivilegeWithdrawn,
        Self::AaCompromise,
    ];

    /// Returns the RFC 5280 reason code.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Unspecified => 0,
            Self::KeyCompromise => 1,
            Self::CaCompromise => 2,
            Self::AffiliationChanged => 3,
            Self::Superseded => 4,
            Self::CessationOfOperation => 5,
            Self::CertificateHold => 6,
            Self::RemoveFromCrl => 8,
            Self::PrivilegeWithdrawn => 9,
            Self::AaCompromise => 10,
        }
    }

    /// Returns the stable label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unspecified => "UNSPECIFIED",
            Self::KeyCompromise => "KEY_COMPROMISE",
            Self::CaCompromise => "CA_COMPROMISE",
            Self::AffiliationChanged => "AFFILIATION_CHANGED",
            Self::Superseded => "SUPERSEDED",
            Self::CessationOfOperation => "CESSATION_OF_OPERATION",
            Self::CertificateHold => "CERTIFICATE_HOLD",
            Self::RemoveFromCrl => "REMOVE_FROM_CRL",
            Self::PrivilegeWithdrawn => "PRIVILEGE_WITHDRAWN",
            Self::AaCompromise => "AA_COMPROMISE",
        }
    }

    /// Looks up a reason by RFC 5280 code.
    #[must_use]
    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|reason| reason.code() == code)
    }
}

impl fmt::Display for RevocationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RevocationReason {
    type Err = String;

    /// Accepts a label (any case, `-` or `_`) or a numeric reason code.
    fn from_str(text: &str) -> Result<Self, Self::Err> {
        if let Ok(code) = text.parse::<u8>() {
            return Self::from_code(code).ok_or_else(|| format!("unknown reason code: {code}"));
        }
        let normalized = text.trim().replace('-', "_").to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|reason| reason.as_str() == normalized)
            .ok_or_else(|| format!("unknown revocation reason: {text}"))
    }
}

/// Revocation details stored on a revoked certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revocation {
    /// Reason code.
    pub reason: RevocationReason,
    /// Effective revocation date.
    pub date: Timestamp,
}

/// Metadata about a CRL that listed this certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrlIssuance {
    /// CRL number.
    pub crl_number: u64,
    /// Time the CRL was issued.
    pub issued_at: Timestamp,
}

// ============================================================================
// SECTION: Records
// ============================================================================

/// Persisted certificate record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateRecord {
    /// Certificate serial number.
    pub serial_number: SerialNumber,
    /// Subject distinguished name.
    pub subject: String,
    /// Issuer distinguished name.
    pub issuer: String,
    /// Start of validity.
    pub not_before: Timestamp,
    /// End of validity.
    pub not_after: Timestamp,
    /// Lifecycle status.
    pub status: CertificateStatus,
    /// Revocation details when revoked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revocation: Option<Revocation>,
    /// Request that produced this certificate.
    pub originating_request_id: RequestId,
    /// Opaque key/value metadata.
    #[serde(default)]
    pub meta_info: BTreeMap<String, String>,
    /// Salted challenge-phrase digest.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub challenge: Option<ChallengeDigest>,
    /// Signed certificate bytes (base64 in storage).
    #[serde(with = "base64_bytes")]
    pub certificate_bytes: Vec<u8>,
    /// CRLs that listed this certificate, oldest first.
    #[serde(default)]
    pub crl_issuances: Vec<CrlIssuance>,
    /// Time the record was created.
    pub created_at: Timestamp,
    /// Time of the last state change.
    pub modified_at: Timestamp,
}

/// Caller-supplied fields for a certificate about to be issued.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CertificateTemplate {
    /// Subject distinguished name.
    pub subject: String,
    /// Start of validity.
    pub not_before: Timestamp,
    /// End of validity.
    pub not_after: Timestamp,
    /// Opaque key/value metadata.
    pub meta_info: BTreeMap<String, String>,
    /// Optional challenge phrase; stored only as a salted digest.
    pub challenge_phrase: Option<String>,
}

/// Serde adapter storing byte payloads as standard base64.
pub mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::Deserialize;
    use serde::Deserializer;
    use serde::Serializer;

    /// Serializes bytes as a base64 string.
    ///
    /// # Errors
    ///
    /// Returns the serializer error when writing fails.
    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    /// Deserializes bytes from a base64 string.
    ///
    /// # Errors
    ///
    /// Returns a deserializer error when the string is not valid base64.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        STANDARD.decode(text.as_bytes()).map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

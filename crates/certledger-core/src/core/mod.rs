// crates/certledger-core/src/core/mod.rs
// ============================================================================
// Module: Certledger Core Types
// Description: Identifiers, range leases, and certificate/request records.
// Purpose: Provide stable, serializable types shared by every backend.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Core types describe what is stored in the shared directory: counters and
//! their leases, certificate records, and request records. They carry no
//! storage or allocation logic.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod certificate;
pub mod challenge;
pub mod hashing;
pub mod identifiers;
pub mod range;
pub mod request;
pub mod time;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use certificate::CertificateRecord;
pub use certificate::CertificateStatus;
pub use certificate::CertificateTemplate;
pub use certificate::CrlIssuance;
pub use certificate::Revocation;
pub use certificate::RevocationReason;
pub use challenge::ChallengeDigest;
pub use hashing::DEFAULT_HASH_ALGORITHM;
pub use hashing::HashAlgorithm;
pub use hashing::HashDigest;
pub use identifiers::CounterName;
pub use identifiers::IdentifierError;
pub use identifiers::REQUEST_NUMBER_COUNTER;
pub use identifiers::ReplicaId;
pub use identifiers::RequestId;
pub use identifiers::SERIAL_NUMBER_COUNTER;
pub use identifiers::SerialNumber;
pub use range::CounterInfo;
pub use range::GeneratorMode;
pub use range::LeaseState;
pub use range::RangeLease;
pub use range::ReplicaLease;
pub use request::RequestRecord;
pub use request::RequestStatus;
pub use request::RequestStatusFilter;
pub use request::RequestType;
pub use time::Timestamp;
pub use time::TimestampError;

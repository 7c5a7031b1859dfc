// crates/certledger-core/src/lib.rs
// ============================================================================
// Module: Certledger Core Library
// Description: Public API surface for the Certledger core.
// Purpose: Expose identifier allocation, record repositories, and interfaces.
// Dependencies: crate::{audit, core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! Certledger core assigns certificate serial numbers and request identifiers
//! for CA replicas that share one directory, and tracks certificate and
//! request records built on those identifiers. It is backend-agnostic: storage
//! and signing are reached through explicit interfaces.
//!
//! Replicas coordinate only through a conditional replace on each counter's
//! `nextRange` pointer. Sequential identifiers come from disjoint leased
//! ranges; random identifiers are 128-bit draws checked against the record
//! container before use.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod audit;
pub mod core;
pub mod interfaces;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use self::core::*;

pub use audit::AuditEvent;
pub use audit::AuditSink;
pub use audit::FileAuditSink;
pub use audit::MemoryAuditSink;
pub use audit::NoopAuditSink;
pub use audit::SharedAuditSink;
pub use audit::StderrAuditSink;
pub use interfaces::CertificateSigner;
pub use interfaces::DirectoryEntry;
pub use interfaces::DirectoryStore;
pub use interfaces::Modification;
pub use interfaces::Precondition;
pub use interfaces::SearchPage;
pub use interfaces::SearchRequest;
pub use interfaces::SigningError;
pub use interfaces::StoreError;
pub use interfaces::UnsignedCertificate;
pub use runtime::AllocationError;
pub use runtime::CertificateFilter;
pub use runtime::CertificateRepository;
pub use runtime::GeneratorSettings;
pub use runtime::IdGenerator;
pub use runtime::InMemoryDirectoryStore;
pub use runtime::MigrationOutcome;
pub use runtime::PageRequest;
pub use runtime::RangeManager;
pub use runtime::RecordPage;
pub use runtime::RepositoryError;
pub use runtime::RequestRepository;
pub use runtime::SharedDirectoryStore;
pub use runtime::SortOrder;

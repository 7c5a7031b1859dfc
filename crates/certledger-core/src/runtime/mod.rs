// crates/certledger-core/src/runtime/mod.rs
// ============================================================================
// Module: Certledger Runtime
// Description: Allocation engine, record repositories, and in-memory store.
// Purpose: Implement identifier allocation and record lifecycles over a directory.
// Dependencies: crate::{audit, core, interfaces}
// ============================================================================

//! ## Overview
//! Runtime modules turn the directory interface into the allocation protocol
//! (range manager and generator) and the record repositories built on it.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod certificates;
pub mod generator;
pub mod range_manager;
pub mod repository;
pub mod requests;
pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use certificates::CERTIFICATE_CONTAINER;
pub use certificates::CertificateFilter;
pub use certificates::CertificateKind;
pub use certificates::CertificateRepository;
pub use generator::DEFAULT_CHECKPOINT_INTERVAL;
pub use generator::DEFAULT_COLLISION_RETRY_BUDGET;
pub use generator::GeneratorSettings;
pub use generator::IdGenerator;
pub use generator::IdentifierRng;
pub use generator::SEQUENTIAL_COLLISION_BUDGET;
pub use range_manager::AllocationError;
pub use range_manager::DEFAULT_LEASE_RETRY_BUDGET;
pub use range_manager::MigrationOutcome;
pub use range_manager::RANGES_CONTAINER;
pub use range_manager::RangeManager;
pub use range_manager::counter_dn;
pub use range_manager::replica_lease_dn;
pub use repository::DEFAULT_PAGE_LIMIT;
pub use repository::PageRequest;
pub use repository::RecordKind;
pub use repository::RecordPage;
pub use repository::RecordRepository;
pub use repository::RepositoryError;
pub use repository::SortOrder;
pub use repository::TransitionDenied;
pub use requests::REQUEST_CONTAINER;
pub use requests::RequestKind;
pub use requests::RequestRepository;
pub use store::InMemoryDirectoryStore;
pub use store::SharedDirectoryStore;

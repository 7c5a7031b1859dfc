// crates/certledger-store-sqlite/src/lib.rs
// ============================================================================
// Module: Certledger SQLite Store
// Description: SQLite-backed directory store for Certledger replicas.
// Purpose: Provide a durable, multi-process DirectoryStore implementation.
// Dependencies: certledger-core, rusqlite, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! This crate provides [`SqliteDirectoryStore`], a [`certledger_core::DirectoryStore`]
//! that keeps every directory entry as hash-verified canonical JSON in a
//! single `SQLite` database. Conditional replaces run inside immediate
//! transactions so replicas in separate processes share one linearization
//! point.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use store::MAX_ENTRY_BYTES;
pub use store::SqliteDirectoryStore;
pub use store::SqliteStoreConfig;
pub use store::SqliteStoreError;
pub use store::SqliteStoreMode;
pub use store::SqliteSyncMode;

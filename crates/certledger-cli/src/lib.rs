// crates/certledger-cli/src/lib.rs
// ============================================================================
// Module: Certledger CLI Library
// Description: Shared helpers for the Certledger command-line interface.
// Purpose: Provide reusable components (message catalog, replica wiring) for
//          the CLI binary and tests.
// Dependencies: certledger-config, certledger-core, certledger-store-sqlite
// ============================================================================

//! ## Overview
//! This library houses the CLI's message catalog and the replica context that
//! turns a validated `certledger.toml` into a directory store, audit sink, and
//! repositories. The binary entry point (`src/main.rs`) imports these helpers
//! to keep all user-facing output consistent.

// ============================================================================
// SECTION: Modules
// ============================================================================

/// Replica wiring from configuration.
pub mod context;
/// Message catalog and translation helpers.
pub mod i18n;

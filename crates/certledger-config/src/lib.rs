// crates/certledger-config/src/lib.rs
// ============================================================================
// Module: Certledger Config Library
// Description: Canonical config model, validation, and example payloads.
// Purpose: Single source of truth for certledger.toml semantics.
// Dependencies: certledger-core, certledger-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! `certledger-config` defines the configuration model for a Certledger
//! replica: its identity, the shared directory store, per-counter allocation
//! settings, retry budgets, and the audit sink. Validation is strict and
//! fails closed.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;
pub mod examples;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::*;
pub use examples::config_toml_example;

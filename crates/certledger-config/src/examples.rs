// crates/certledger-config/src/examples.rs
// ============================================================================
// Module: Config Examples
// Description: Canonical example configuration payload.
// Purpose: Deterministic example for docs and `certledger config example`.
// Dependencies: std
// ============================================================================

//! ## Overview
//! Canonical example for Certledger configuration. The output is static and
//! must always pass validation.

/// Returns a canonical example `certledger.toml` configuration.
#[must_use]
pub fn config_toml_example() -> String {
    String::from(
        r#"[replica]
id = "ca-east-1"

[store]
type = "sqlite"
path = "certledger.db"
journal_mode = "wal"
sync_mode = "full"
busy_timeout_ms = 5000

[counters.serial_number]
mode = "random"
range_size = 1000
checkpoint_interval = 100

[counters.request_number]
mode = "legacy"
range_size = 1000
initial_start = 1
checkpoint_interval = 100

[allocation]
lease_retry_budget = 16
collision_retry_budget = 3

[audit]
sink = "file"
path = "certledger-audit.log"
"#,
    )
}

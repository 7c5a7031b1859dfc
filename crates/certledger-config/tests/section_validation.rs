//! Section validation tests for certledger-config.
// crates/certledger-config/tests/section_validation.rs
// =============================================================================
// Module: Config Section Validation Tests
// Description: Validate replica, store, counter, allocation, and audit rules.
// Purpose: Ensure invalid section values fail closed with precise messages.
// =============================================================================

use certledger_config::AuditSinkType;
use certledger_config::CertledgerConfig;
use certledger_config::ConfigError;
use certledger_core::GeneratorMode;
use certledger_core::REQUEST_NUMBER_COUNTER;
use certledger_core::SERIAL_NUMBER_COUNTER;
use certledger_store_sqlite::SqliteStoreMode;

type TestResult = Result<(), String>;

const MINIMAL: &str = "[replica]\nid = \"ca-1\"\n";

fn assert_invalid(result: Result<CertledgerConfig, ConfigError>, needle: &str) -> TestResult {
    match result {
        Err(error) => {
            let message = error.to_string();
            if message.contains(needle) {
                Ok(())
            } else {
                Err(format!("error {message} did not contain {needle}"))
            }
        }
        Ok(_) => Err("expected invalid config".to_string()),
    }
}

fn with_minimal(extra: &str) -> String {
    format!("{MINIMAL}{extra}")
}

// ============================================================================
// SECTION: Defaults
// ============================================================================

#[test]
fn minimal_config_uses_defaults() -> TestResult {
    let config = CertledgerConfig::from_toml(MINIMAL).map_err(|err| err.to_string())?;
    let serial = config.serial_number_settings();
    if serial.mode != GeneratorMode::Legacy || serial.range_size != 1_000 {
        return Err(format!("unexpected serial defaults {serial:?}"));
    }
    if serial.initial_start != 1 || serial.checkpoint_interval != 100 {
        return Err(format!("unexpected serial defaults {serial:?}"));
    }
    if config.allocation.lease_retry_budget != 16 || config.allocation.collision_retry_budget != 3 {
        return Err("unexpected allocation defaults".to_string());
    }
    if config.audit.sink != AuditSinkType::Stderr {
        return Err("audit should default to stderr".to_string());
    }
    if config.store.sqlite_config().is_some() {
        return Err("memory store should not yield sqlite config".to_string());
    }
    Ok(())
}

#[test]
fn counter_settings_follow_configuration() -> TestResult {
    let text = with_minimal(
        "[counters.serial_number]\nmode = \"random\"\n\n[counters.request_number]\nmode = \
         \"legacy2\"\nrange_size = 25\ninitial_start = 500\ncheckpoint_interval = 5\n\n\
         [allocation]\ncollision_retry_budget = 7\n",
    );
    let config = CertledgerConfig::from_toml(&text).map_err(|err| err.to_string())?;
    let serial = config.settings_for(SERIAL_NUMBER_COUNTER).map_err(|err| err.to_string())?;
    if serial.mode != GeneratorMode::Random || serial.collision_retry_budget != 7 {
        return Err(format!("unexpected serial settings {serial:?}"));
    }
    let request = config.settings_for(REQUEST_NUMBER_COUNTER).map_err(|err| err.to_string())?;
    if request.mode != GeneratorMode::Legacy2
        || request.range_size != 25
        || request.initial_start != 500
        || request.checkpoint_interval != 5
    {
        return Err(format!("unexpected request settings {request:?}"));
    }
    if request.replica.as_str() != "ca-1" {
        return Err("replica id not propagated".to_string());
    }
    match config.settings_for("crlNumber") {
        Err(error) if error.to_string().contains("unknown counter") => Ok(()),
        other => Err(format!("expected unknown counter, got {other:?}")),
    }
}

// ============================================================================
// SECTION: Replica
// ============================================================================

#[test]
fn replica_section_is_required() -> TestResult {
    assert_invalid(CertledgerConfig::from_toml("[store]\ntype = \"memory\"\n"), "replica")?;
    Ok(())
}

#[test]
fn replica_id_rejects_blank() -> TestResult {
    assert_invalid(CertledgerConfig::from_toml("[replica]\nid = \"  \"\n"), "non-empty")?;
    Ok(())
}

#[test]
fn replica_id_rejects_separator_characters() -> TestResult {
    assert_invalid(
        CertledgerConfig::from_toml("[replica]\nid = \"cn=ca,ou=x\"\n"),
        "replica.id may only contain",
    )?;
    Ok(())
}

#[test]
fn replica_id_rejects_overlong() -> TestResult {
    let text = format!("[replica]\nid = \"{}\"\n", "r".repeat(65));
    assert_invalid(CertledgerConfig::from_toml(&text), "replica.id exceeds")?;
    Ok(())
}

#[test]
fn unknown_keys_are_rejected() -> TestResult {
    assert_invalid(
        CertledgerConfig::from_toml(&with_minimal("[allocation]\nretry = 3\n")),
        "unknown field",
    )?;
    Ok(())
}

// ============================================================================
// SECTION: Store
// ============================================================================

#[test]
fn sqlite_store_requires_path() -> TestResult {
    assert_invalid(
        CertledgerConfig::from_toml(&with_minimal("[store]\ntype = \"sqlite\"\n")),
        "sqlite store requires path",
    )?;
    Ok(())
}

#[test]
fn memory_store_rejects_path() -> TestResult {
    assert_invalid(
        CertledgerConfig::from_toml(&with_minimal(
            "[store]\ntype = \"memory\"\npath = \"ledger.db\"\n",
        )),
        "memory store must not set path",
    )?;
    Ok(())
}

#[test]
fn sqlite_store_rejects_excessive_busy_timeout() -> TestResult {
    assert_invalid(
        CertledgerConfig::from_toml(&with_minimal(
            "[store]\ntype = \"sqlite\"\npath = \"ledger.db\"\nbusy_timeout_ms = 600000\n",
        )),
        "store.busy_timeout_ms",
    )?;
    Ok(())
}

#[test]
fn sqlite_store_yields_store_config() -> TestResult {
    let config = CertledgerConfig::from_toml(&with_minimal(
        "[store]\ntype = \"sqlite\"\npath = \"ledger.db\"\njournal_mode = \"delete\"\n",
    ))
    .map_err(|err| err.to_string())?;
    let sqlite = config.store.sqlite_config().ok_or("expected sqlite config")?;
    if sqlite.journal_mode != SqliteStoreMode::Delete || sqlite.busy_timeout_ms != 5_000 {
        return Err(format!("unexpected sqlite config {sqlite:?}"));
    }
    Ok(())
}

// ============================================================================
// SECTION: Counters and Allocation
// ============================================================================

#[test]
fn counter_rejects_zero_range_size() -> TestResult {
    assert_invalid(
        CertledgerConfig::from_toml(&with_minimal("[counters.serial_number]\nrange_size = 0\n")),
        "counters.serial_number.range_size must be greater than zero",
    )?;
    Ok(())
}

#[test]
fn counter_rejects_zero_checkpoint_interval() -> TestResult {
    assert_invalid(
        CertledgerConfig::from_toml(&with_minimal(
            "[counters.request_number]\ncheckpoint_interval = 0\n",
        )),
        "counters.request_number.checkpoint_interval",
    )?;
    Ok(())
}

#[test]
fn counter_rejects_unknown_mode() -> TestResult {
    assert_invalid(
        CertledgerConfig::from_toml(&with_minimal("[counters.serial_number]\nmode = \"uuid\"\n")),
        "config parse error",
    )?;
    Ok(())
}

#[test]
fn random_counter_rejects_initial_start() -> TestResult {
    assert_invalid(
        CertledgerConfig::from_toml(&with_minimal(
            "[counters.serial_number]\nmode = \"random\"\ninitial_start = 40\n",
        )),
        "no effect in random mode",
    )?;
    Ok(())
}

#[test]
fn allocation_rejects_zero_budgets() -> TestResult {
    assert_invalid(
        CertledgerConfig::from_toml(&with_minimal("[allocation]\nlease_retry_budget = 0\n")),
        "allocation.lease_retry_budget",
    )?;
    assert_invalid(
        CertledgerConfig::from_toml(&with_minimal("[allocation]\ncollision_retry_budget = 0\n")),
        "allocation.collision_retry_budget",
    )?;
    Ok(())
}

// ============================================================================
// SECTION: Audit
// ============================================================================

#[test]
fn file_audit_sink_requires_path() -> TestResult {
    assert_invalid(
        CertledgerConfig::from_toml(&with_minimal("[audit]\nsink = \"file\"\n")),
        "file audit sink requires path",
    )?;
    Ok(())
}

#[test]
fn audit_path_requires_file_sink() -> TestResult {
    assert_invalid(
        CertledgerConfig::from_toml(&with_minimal("[audit]\nsink = \"none\"\npath = \"a.log\"\n")),
        "audit.path is only valid with the file sink",
    )?;
    Ok(())
}

#[test]
fn effective_config_renders_as_json() -> TestResult {
    let config = CertledgerConfig::from_toml(MINIMAL).map_err(|err| err.to_string())?;
    let json = config.to_json().map_err(|err| err.to_string())?;
    if json["replica"]["id"] != "ca-1" || json["store"]["type"] != "memory" {
        return Err(format!("unexpected json {json}"));
    }
    if json["counters"]["serial_number"]["mode"] != "legacy" {
        return Err(format!("unexpected json {json}"));
    }
    Ok(())
}

// crates/certledger-core/src/audit.rs
// ============================================================================
// Module: Certledger Audit Logging
// Description: Structured audit events for allocation and record lifecycle.
// Purpose: Emit JSON-line audit records without hard logging dependencies.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Every lease, migration, and record state change emits one [`AuditEvent`]
//! through an [`AuditSink`]. Sinks never fail the operation that produced the
//! event: serialization and I/O errors are dropped.
//!
//! An `identifier_abandoned` event is the reportable anomaly raised when an
//! identifier was allocated but its record could not be persisted.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Serialize;

// ============================================================================
// SECTION: Event Names
// ============================================================================

/// A replica leased a new range.
pub const EVENT_RANGE_LEASED: &str = "range_leased";
/// A replica retired its active range.
pub const EVENT_RANGE_RELEASED: &str = "range_released";
/// A counter changed generator mode.
pub const EVENT_COUNTER_MIGRATED: &str = "counter_migrated";
/// An allocated identifier was never persisted.
pub const EVENT_IDENTIFIER_ABANDONED: &str = "identifier_abandoned";
/// A certificate record was created.
pub const EVENT_CERTIFICATE_ISSUED: &str = "certificate_issued";
/// A certificate was revoked or its revocation reason escalated.
pub const EVENT_CERTIFICATE_REVOKED: &str = "certificate_revoked";
/// A certificate hold was released.
pub const EVENT_CERTIFICATE_HOLD_RELEASED: &str = "certificate_hold_released";
/// A certificate moved to an expired status.
pub const EVENT_CERTIFICATE_EXPIRED: &str = "certificate_expired";
/// A request was submitted.
pub const EVENT_REQUEST_SUBMITTED: &str = "request_submitted";
/// A request completed.
pub const EVENT_REQUEST_COMPLETED: &str = "request_completed";
/// A request was rejected.
pub const EVENT_REQUEST_REJECTED: &str = "request_rejected";
/// A request was canceled.
pub const EVENT_REQUEST_CANCELED: &str = "request_canceled";
/// A pre-existing record was imported.
pub const EVENT_RECORD_IMPORTED: &str = "record_imported";

// ============================================================================
// SECTION: Types
// ============================================================================

/// Audit event payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Counter involved, when applicable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counter: Option<String>,
    /// Identifier involved, when applicable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    /// Replica involved, when applicable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replica_id: Option<String>,
    /// Free-form detail.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl AuditEvent {
    /// Creates a new audit event with a consistent timestamp.
    #[must_use]
    pub fn new(event: &'static str) -> Self {
        let timestamp_ms =
            SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis();
        Self {
            event,
            timestamp_ms,
            counter: None,
            identifier: None,
            replica_id: None,
            detail: None,
        }
    }

    /// Sets the counter name.
    #[must_use]
    pub fn counter(mut self, counter: impl ToString) -> Self {
        self.counter = Some(counter.to_string());
        self
    }

    /// Sets the identifier.
    #[must_use]
    pub fn identifier(mut self, identifier: impl ToString) -> Self {
        self.identifier = Some(identifier.to_string());
        self
    }

    /// Sets the replica identifier.
    #[must_use]
    pub fn replica(mut self, replica: impl ToString) -> Self {
        self.replica_id = Some(replica.to_string());
        self
    }

    /// Sets the detail text.
    #[must_use]
    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Audit sink for allocation and record events.
pub trait AuditSink: Send + Sync {
    /// Record an audit event.
    fn record(&self, event: &AuditEvent);
}

/// Shared audit sink handle.
pub type SharedAuditSink = Arc<dyn AuditSink>;

/// Audit sink that logs JSON lines to stderr.
pub struct StderrAuditSink;

impl AuditSink for StderrAuditSink {
    fn record(&self, event: &AuditEvent) {
        if let Ok(payload) = serde_json::to_string(event) {
            let _ = writeln!(std::io::stderr(), "{payload}");
        }
    }
}

/// Audit sink that logs JSON lines to a file.
pub struct FileAuditSink {
    /// File handle used for append-only logging.
    file: Mutex<std::fs::File>,
}

impl FileAuditSink {
    /// Opens the audit log file in append mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn new(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl AuditSink for FileAuditSink {
    fn record(&self, event: &AuditEvent) {
        if let Ok(payload) = serde_json::to_string(event)
            && let Ok(mut file) = self.file.lock()
        {
            let _ = writeln!(file, "{payload}");
            let _ = file.flush();
        }
    }
}

/// No-op audit sink.
pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    fn record(&self, _event: &AuditEvent) {}
}

/// Audit sink that keeps events in memory for inspection.
#[derive(Default)]
pub struct MemoryAuditSink {
    /// Recorded events in emission order.
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every recorded event.
    #[must_use]
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().map(|events| events.clone()).unwrap_or_default()
    }

    /// Returns the recorded events with the given name.
    #[must_use]
    pub fn named(&self, event: &str) -> Vec<AuditEvent> {
        self.events().into_iter().filter(|recorded| recorded.event == event).collect()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, event: &AuditEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

// crates/certledger-core/tests/requests.rs
// ============================================================================
// Module: Request Repository Tests
// Description: Submission, terminal transitions, linking, and listings.
// Purpose: Validate the one-way request lifecycle.
// ============================================================================

//! ## Overview
//! Exercises [`RequestRepository`]:
//! - PENDING requests move once to a terminal status
//! - Terminal requests refuse further transitions without being rewritten
//! - Rejected and canceled requests refuse even a timestamp-only rewrite
//! - Certificate links are limited to completed enrollments and renewals
//! - Listings by status and type

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

mod common;

use std::collections::BTreeMap;
use std::sync::Arc;

use certledger_core::DirectoryStore;
use certledger_core::GeneratorMode;
use certledger_core::PageRequest;
use certledger_core::RepositoryError;
use certledger_core::RequestId;
use certledger_core::RequestRecord;
use certledger_core::RequestStatus;
use certledger_core::RequestStatusFilter;
use certledger_core::RequestType;
use certledger_core::SerialNumber;
use certledger_core::SortOrder;
use certledger_core::Timestamp;
use certledger_core::audit::EVENT_REQUEST_CANCELED;
use certledger_core::audit::EVENT_REQUEST_COMPLETED;
use certledger_core::audit::EVENT_REQUEST_REJECTED;
use certledger_core::audit::EVENT_REQUEST_SUBMITTED;
use certledger_core::runtime::REQUEST_CONTAINER;
use certledger_core::runtime::RecordRepository;
use certledger_core::runtime::RequestKind;
use common::Harness;
use common::TestSigner;
use common::template;

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Returns a CSR-style extension payload.
fn csr_payload(host: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("profileId".to_string(), "caServerCert".to_string()),
        ("dnsNames".to_string(), host.to_string()),
    ])
}

// ============================================================================
// SECTION: Lifecycle
// ============================================================================

/// Verifies a completed request is linked and refuses a later rejection.
#[test]
fn completed_request_cannot_be_rejected() {
    let harness = Harness::new();
    let requests = harness.requests("r1");
    let submitted =
        requests.submit(RequestType::Enrollment, csr_payload("a.example"), None).unwrap();
    assert_eq!(submitted.status, RequestStatus::Pending);
    assert_eq!(submitted.request_id, RequestId::new(1));

    let completed = requests.complete(submitted.request_id, Some(SerialNumber::new(42))).unwrap();
    assert_eq!(completed.status, RequestStatus::Complete);
    assert_eq!(completed.result_certificate_id, Some(SerialNumber::new(42)));

    let dn = format!("cn=1,{REQUEST_CONTAINER}");
    let before = harness.store.read_entry(&dn).unwrap().unwrap();
    match requests.reject(submitted.request_id) {
        Err(RepositoryError::InvalidTransition {
            from,
            to,
            ..
        }) => {
            assert_eq!(from, "complete");
            assert_eq!(to, "rejected");
        }
        other => panic!("expected invalid transition, got {other:?}"),
    }
    assert_eq!(harness.store.read_entry(&dn).unwrap().unwrap(), before);
    assert_eq!(requests.read(submitted.request_id).unwrap(), completed);
}

/// Verifies each terminal status is reached once and then frozen.
#[test]
fn terminal_statuses_are_final() {
    let harness = Harness::new();
    let requests = harness.requests("r1");
    let rejected = requests.submit(RequestType::Renewal, BTreeMap::new(), None).unwrap();
    let canceled = requests.submit(RequestType::Revocation, BTreeMap::new(), None).unwrap();

    assert_eq!(requests.reject(rejected.request_id).unwrap().status, RequestStatus::Rejected);
    assert_eq!(requests.cancel(canceled.request_id).unwrap().status, RequestStatus::Canceled);

    assert!(requests.cancel(rejected.request_id).is_err());
    assert!(requests.complete(canceled.request_id, None).is_err());
    assert!(requests.reject(canceled.request_id).is_err());

    assert_eq!(harness.audit.named(EVENT_REQUEST_SUBMITTED).len(), 2);
    assert_eq!(harness.audit.named(EVENT_REQUEST_REJECTED).len(), 1);
    assert_eq!(harness.audit.named(EVENT_REQUEST_CANCELED).len(), 1);
    assert!(harness.audit.named(EVENT_REQUEST_COMPLETED).is_empty());
}

/// Verifies rejected and canceled requests cannot be rewritten with only a
/// newer modification time.
#[test]
fn frozen_terminal_request_refuses_timestamp_rewrite() {
    let harness = Harness::new();
    let requests = harness.requests("r1");
    let rejected = requests.submit(RequestType::Enrollment, csr_payload("r.example"), None).unwrap();
    let canceled = requests.submit(RequestType::Renewal, BTreeMap::new(), None).unwrap();
    requests.reject(rejected.request_id).unwrap();
    requests.cancel(canceled.request_id).unwrap();

    let generator = harness.generator("requestNumber", "r1", GeneratorMode::Legacy, 100, 1);
    let records: RecordRepository<RequestKind> =
        RecordRepository::new(harness.shared(), Arc::new(generator), harness.sink());
    for id in [rejected.request_id, canceled.request_id] {
        let stored = requests.read(id).unwrap();
        let dn = format!("cn={},{REQUEST_CONTAINER}", id.get());
        let before = harness.store.read_entry(&dn).unwrap();

        let mut touched = stored.clone();
        let later = stored.modified_at.as_unix_millis() + 1_000;
        touched.modified_at = Timestamp::from_unix_millis(later);
        let err = records.update(&touched).unwrap_err();
        assert_eq!(err.kind(), "invalid_transition");
        assert_eq!(harness.store.read_entry(&dn).unwrap(), before);
        assert_eq!(records.update(&stored).unwrap(), stored);
    }
}

/// Verifies a revocation request cannot carry a certificate link.
#[test]
fn revocation_request_cannot_link_certificate() {
    let harness = Harness::new();
    let requests = harness.requests("r1");
    let request = requests.submit(RequestType::Revocation, BTreeMap::new(), None).unwrap();

    let err = requests.complete(request.request_id, Some(SerialNumber::new(9))).unwrap_err();
    assert_eq!(err.kind(), "invalid_transition");
    assert_eq!(requests.read(request.request_id).unwrap().status, RequestStatus::Pending);

    let completed = requests.complete(request.request_id, None).unwrap();
    assert_eq!(completed.status, RequestStatus::Complete);
    assert!(requests.link_certificate(request.request_id, SerialNumber::new(9)).is_err());
}

/// Verifies an enrollment is completed with the certificate it produced.
#[test]
fn enrollment_links_issued_certificate() {
    let harness = Harness::new();
    let requests = harness.requests("r1");
    let certificates = harness.certificates("r1", GeneratorMode::Legacy);
    let request = requests
        .submit(RequestType::Enrollment, csr_payload("b.example"), Some("renew-me"))
        .unwrap();
    assert!(request.challenge.as_ref().is_some_and(|challenge| challenge.matches("renew-me")));

    let issued =
        certificates.issue(request.request_id, &template("CN=b.example", 0), &TestSigner).unwrap();
    requests.complete(request.request_id, None).unwrap();
    let linked = requests.link_certificate(request.request_id, issued.serial_number).unwrap();
    assert_eq!(linked.result_certificate_id, Some(issued.serial_number));
    assert_eq!(linked.status, RequestStatus::Complete);
    assert_eq!(issued.originating_request_id, request.request_id);
}

/// Verifies a pending request cannot be linked before completion.
#[test]
fn pending_request_link_is_refused() {
    let harness = Harness::new();
    let requests = harness.requests("r1");
    let request = requests.submit(RequestType::Enrollment, BTreeMap::new(), None).unwrap();
    let err = requests.link_certificate(request.request_id, SerialNumber::new(5)).unwrap_err();
    assert!(matches!(err, RepositoryError::InvalidTransition { .. }));
}

/// Verifies operations on an unknown request report not found.
#[test]
fn unknown_request_is_not_found() {
    let harness = Harness::new();
    let requests = harness.requests("r1");
    let err = requests.complete(RequestId::new(404), None).unwrap_err();
    assert_eq!(err.kind(), "not_found");
    assert!(matches!(requests.read(RequestId::new(404)), Err(RepositoryError::NotFound { .. })));
}

// ============================================================================
// SECTION: Listings and Import
// ============================================================================

/// Verifies listings by status and type.
#[test]
fn find_by_status_and_type() {
    let harness = Harness::new();
    let requests = harness.requests("r1");
    let types = [
        RequestType::Enrollment,
        RequestType::Renewal,
        RequestType::Enrollment,
        RequestType::Revocation,
        RequestType::Enrollment,
    ];
    for request_type in types {
        requests.submit(request_type, BTreeMap::new(), None).unwrap();
    }
    requests.reject(RequestId::new(2)).unwrap();
    requests.complete(RequestId::new(3), Some(SerialNumber::new(77))).unwrap();

    let pending = requests
        .find_by_status(
            RequestStatusFilter::Only(RequestStatus::Pending),
            SortOrder::Ascending,
            PageRequest::default(),
        )
        .unwrap();
    let ids: Vec<u128> = pending.items.iter().map(|record| record.request_id.get()).collect();
    assert_eq!(ids, vec![1, 4, 5]);

    let all = requests
        .find_by_status(RequestStatusFilter::All, SortOrder::Descending, PageRequest {
            offset: 0,
            limit: 2,
        })
        .unwrap();
    let ids: Vec<u128> = all.items.iter().map(|record| record.request_id.get()).collect();
    assert_eq!(all.total, 5);
    assert_eq!(ids, vec![5, 4]);

    let enrollments = requests
        .find_by_type(RequestType::Enrollment, SortOrder::Ascending, PageRequest::default())
        .unwrap();
    let ids: Vec<u128> = enrollments.items.iter().map(|record| record.request_id.get()).collect();
    assert_eq!(ids, vec![1, 3, 5]);
}

/// Verifies an imported terminal request keeps its identifier and status.
#[test]
fn import_preserves_terminal_request() {
    let harness = Harness::new();
    let requests = harness.requests("r1");
    let record = RequestRecord {
        request_id: RequestId::new(5_000),
        request_type: RequestType::Enrollment,
        status: RequestStatus::Complete,
        extension_data: csr_payload("legacy.example"),
        challenge: None,
        result_certificate_id: Some(SerialNumber::new(0x1f)),
        created_at: Timestamp::from_unix_millis(1),
        modified_at: Timestamp::from_unix_millis(2),
    };
    requests.import(&record).unwrap();
    assert_eq!(requests.read(record.request_id).unwrap(), record);
    assert!(requests.cancel(record.request_id).is_err());
    assert_eq!(requests.import(&record).unwrap_err().kind(), "already_exists");
}

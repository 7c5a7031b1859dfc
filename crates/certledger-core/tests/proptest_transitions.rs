// crates/certledger-core/tests/proptest_transitions.rs
// ============================================================================
// Module: Lifecycle Property-Based Tests
// Description: Random operation sequences over certificate and request records.
// Purpose: Check statuses only follow the lifecycle graph and refusals never write.
// ============================================================================

//! Property-based tests for certificate and request state machines.

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

use certledger_core::CertificateStatus;
use certledger_core::DirectoryEntry;
use certledger_core::DirectoryStore;
use certledger_core::GeneratorMode;
use certledger_core::RequestId;
use certledger_core::RequestStatus;
use certledger_core::RequestType;
use certledger_core::RevocationReason;
use certledger_core::SerialNumber;
use certledger_core::Timestamp;
use certledger_core::runtime::CERTIFICATE_CONTAINER;
use certledger_core::runtime::REQUEST_CONTAINER;
use common::Harness;
use common::TestSigner;
use common::template;
use proptest::prelude::*;

/// Operation applied to a certificate.
#[derive(Debug, Clone, Copy)]
enum CertificateOp {
    /// Revoke with the reason at this index.
    Revoke(usize),
    /// Release a hold.
    ReleaseHold,
    /// Run the expiry sweep after the validity window.
    Expire,
    /// Append CRL metadata.
    Crl(u64),
}

/// Operation applied to a request.
#[derive(Debug, Clone, Copy)]
enum RequestOp {
    /// Complete, optionally linking a certificate.
    Complete(bool),
    /// Reject.
    Reject,
    /// Cancel.
    Cancel,
    /// Replace the linked certificate.
    Link(u8),
}

fn certificate_op() -> impl Strategy<Value = CertificateOp> {
    prop_oneof![
        (0 .. RevocationReason::ALL.len()).prop_map(CertificateOp::Revoke),
        Just(CertificateOp::ReleaseHold),
        Just(CertificateOp::Expire),
        any::<u64>().prop_map(CertificateOp::Crl),
    ]
}

fn request_op() -> impl Strategy<Value = RequestOp> {
    prop_oneof![
        any::<bool>().prop_map(RequestOp::Complete),
        Just(RequestOp::Reject),
        Just(RequestOp::Cancel),
        any::<u8>().prop_map(RequestOp::Link),
    ]
}

fn request_type() -> impl Strategy<Value = RequestType> {
    prop_oneof![
        Just(RequestType::Enrollment),
        Just(RequestType::Renewal),
        Just(RequestType::Revocation),
        Just(RequestType::Unrevocation),
    ]
}

/// Returns true when the certificate lifecycle has an edge `from -> to`.
fn certificate_edge(from: CertificateStatus, to: CertificateStatus) -> bool {
    use CertificateStatus::Expired;
    use CertificateStatus::Revoked;
    use CertificateStatus::RevokedExpired;
    use CertificateStatus::Valid;
    from == to
        || matches!(
            (from, to),
            (Valid, Revoked | Expired)
                | (Revoked, Valid | RevokedExpired)
                | (Expired, RevokedExpired)
        )
}

fn read_raw(harness: &Harness, dn: &str) -> DirectoryEntry {
    harness.store.read_entry(dn).unwrap().unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn certificate_statuses_follow_lifecycle(ops in prop::collection::vec(certificate_op(), 1 .. 24)) {
        let harness = Harness::new();
        let certificates = harness.certificates("r1", GeneratorMode::Legacy);
        let issued = certificates
            .issue(RequestId::new(1), &template("CN=prop", 0), &TestSigner)
            .unwrap();
        let serial = issued.serial_number;
        let dn = format!("cn={},{CERTIFICATE_CONTAINER}", serial.get());
        let after = Timestamp::from_unix_millis(10 * 86_400_000);

        for op in ops {
            let before_entry = read_raw(&harness, &dn);
            let before = certificates.read(serial).unwrap();
            let outcome = match op {
                CertificateOp::Revoke(index) => certificates
                    .revoke(serial, RevocationReason::ALL[index], Timestamp::from_unix_millis(5))
                    .map(|_| ()),
                CertificateOp::ReleaseHold => certificates.release_hold(serial).map(|_| ()),
                CertificateOp::Expire => certificates.expire_due(after).map(|_| ()),
                CertificateOp::Crl(number) => certificates
                    .record_crl_issuance(serial, number, Timestamp::from_unix_millis(7))
                    .map(|_| ()),
            };
            let current = certificates.read(serial).unwrap();
            match outcome {
                Ok(()) => {
                    prop_assert!(
                        certificate_edge(before.status, current.status),
                        "{:?}: {} -> {}", op, before.status, current.status
                    );
                    if before.status == CertificateStatus::Revoked
                        && current.status == CertificateStatus::Valid
                    {
                        prop_assert_eq!(
                            before.revocation.map(|revocation| revocation.reason),
                            Some(RevocationReason::CertificateHold)
                        );
                    }
                    let unrevoked = matches!(
                        current.status,
                        CertificateStatus::Valid | CertificateStatus::Expired
                    );
                    prop_assert_eq!(unrevoked, current.revocation.is_none());
                }
                Err(err) => {
                    prop_assert!(
                        matches!(err.kind(), "invalid_transition" | "revocation_conflict"),
                        "unexpected error {}", err
                    );
                    prop_assert_eq!(read_raw(&harness, &dn), before_entry);
                }
            }
        }
    }

    #[test]
    fn request_statuses_are_one_way(
        kind in request_type(),
        ops in prop::collection::vec(request_op(), 1 .. 12),
    ) {
        let harness = Harness::new();
        let requests = harness.requests("r1");
        let submitted = requests.submit(kind, BTreeMap::new(), None).unwrap();
        let id = submitted.request_id;
        let dn = format!("cn={},{REQUEST_CONTAINER}", id.get());

        for op in ops {
            let before_entry = read_raw(&harness, &dn);
            let before = requests.read(id).unwrap();
            let outcome = match op {
                RequestOp::Complete(link) => {
                    let result = link.then_some(SerialNumber::new(1));
                    requests.complete(id, result).map(|_| ())
                }
                RequestOp::Reject => requests.reject(id).map(|_| ()),
                RequestOp::Cancel => requests.cancel(id).map(|_| ()),
                RequestOp::Link(serial) => requests
                    .link_certificate(id, SerialNumber::new(u128::from(serial)))
                    .map(|_| ()),
            };
            let current = requests.read(id).unwrap();
            match outcome {
                Ok(()) => {
                    prop_assert!(
                        before.status == RequestStatus::Pending || before.status == current.status,
                        "{:?}: {} -> {}", op, before.status, current.status
                    );
                    if current.result_certificate_id.is_some() {
                        prop_assert_eq!(current.status, RequestStatus::Complete);
                        prop_assert!(kind.produces_certificate());
                    }
                }
                Err(err) => {
                    prop_assert_eq!(err.kind(), "invalid_transition");
                    prop_assert_eq!(read_raw(&harness, &dn), before_entry);
                }
            }
        }
    }
}

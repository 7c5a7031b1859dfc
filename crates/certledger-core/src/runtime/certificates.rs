// crates/certledger-core/src/runtime/certificates.rs
// ============================================================================
// Module: Certledger Certificate Repository
// Description: Issuance, revocation, hold release, and expiry of certificates.
// Purpose: Keep certificate records consistent with the revocation state machine.
// Dependencies: crate::{audit, core, interfaces, runtime::repository}
// ============================================================================

//! ## Overview
//! Certificate records move through this state machine:
//!
//! | From | Operation | To |
//! |---|---|---|
//! | VALID | revoke | REVOKED |
//! | EXPIRED | revoke | REVOKED_EXPIRED |
//! | VALID | expiry sweep | EXPIRED |
//! | REVOKED (hold) | release hold | VALID |
//! | REVOKED (hold) | revoke with another reason | REVOKED |
//! | REVOKED | expiry sweep | REVOKED_EXPIRED |
//!
//! Revoking again with the stored reason is a successful no-op. REVOKED and
//! REVOKED_EXPIRED are otherwise terminal. CRL issuance metadata may be
//! appended in any status.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;

use crate::audit::AuditEvent;
use crate::audit::EVENT_CERTIFICATE_EXPIRED;
use crate::audit::EVENT_CERTIFICATE_HOLD_RELEASED;
use crate::audit::EVENT_CERTIFICATE_ISSUED;
use crate::audit::EVENT_CERTIFICATE_REVOKED;
use crate::audit::SharedAuditSink;
use crate::core::CertificateRecord;
use crate::core::CertificateStatus;
use crate::core::CertificateTemplate;
use crate::core::ChallengeDigest;
use crate::core::CrlIssuance;
use crate::core::RequestId;
use crate::core::Revocation;
use crate::core::RevocationReason;
use crate::core::SerialNumber;
use crate::core::Timestamp;
use crate::interfaces::ATTR_CERT_STATUS;
use crate::interfaces::ATTR_SERIAL_NO;
use crate::interfaces::CertificateSigner;
use crate::interfaces::UnsignedCertificate;
use crate::runtime::generator::IdGenerator;
use crate::runtime::repository::PageRequest;
use crate::runtime::repository::RecordKind;
use crate::runtime::repository::RecordPage;
use crate::runtime::repository::RecordRepository;
use crate::runtime::repository::RepositoryError;
use crate::runtime::repository::SortOrder;
use crate::runtime::repository::TransitionDenied;
use crate::runtime::store::SharedDirectoryStore;

// ============================================================================
// SECTION: Record Kind
// ============================================================================

/// Container holding certificate records.
pub const CERTIFICATE_CONTAINER: &str = "ou=certificateRepository,ou=ca";

/// Certificate record kind.
pub struct CertificateKind;

impl RecordKind for CertificateKind {
    type Id = SerialNumber;
    type Record = CertificateRecord;

    const CONTAINER: &'static str = CERTIFICATE_CONTAINER;
    const KEY_ATTRIBUTE: &'static str = ATTR_SERIAL_NO;
    const KIND: &'static str = "certificate";
    const STATUS_ATTRIBUTE: &'static str = ATTR_CERT_STATUS;

    fn id_from_value(value: u128) -> Self::Id {
        SerialNumber::new(value)
    }

    fn id_value(id: Self::Id) -> u128 {
        id.get()
    }

    fn record_id(record: &Self::Record) -> Self::Id {
        record.serial_number
    }

    fn status_label(record: &Self::Record) -> &'static str {
        record.status.as_str()
    }

    fn check_successor(
        stored: &Self::Record,
        proposed: &Self::Record,
    ) -> Result<(), TransitionDenied> {
        let denied = || TransitionDenied::new(state_label(stored), state_label(proposed));
        let identity_unchanged = stored.serial_number == proposed.serial_number
            && stored.subject == proposed.subject
            && stored.issuer == proposed.issuer
            && stored.not_before == proposed.not_before
            && stored.not_after == proposed.not_after
            && stored.originating_request_id == proposed.originating_request_id
            && stored.certificate_bytes == proposed.certificate_bytes
            && stored.challenge == proposed.challenge
            && stored.created_at == proposed.created_at;
        if !identity_unchanged || !proposed.crl_issuances.starts_with(&stored.crl_issuances) {
            return Err(denied());
        }
        if status_permitted(stored, proposed) { Ok(()) } else { Err(denied()) }
    }
}

/// Returns true when the status and revocation change is allowed.
fn status_permitted(stored: &CertificateRecord, proposed: &CertificateRecord) -> bool {
    use CertificateStatus::Expired;
    use CertificateStatus::Revoked;
    use CertificateStatus::RevokedExpired;
    use CertificateStatus::Valid;

    let stored_hold = stored
        .revocation
        .is_some_and(|revocation| revocation.reason == RevocationReason::CertificateHold);
    let unrevoked = stored.revocation.is_none() && proposed.revocation.is_none();
    let same_revocation = stored.revocation.is_some() && stored.revocation == proposed.revocation;
    match (stored.status, proposed.status) {
        (Valid, Valid | Expired) | (Expired, Expired) => unrevoked,
        (Valid, Revoked) | (Expired, RevokedExpired) => {
            stored.revocation.is_none() && proposed.revocation.is_some()
        }
        (Revoked, Valid) => stored_hold && proposed.revocation.is_none(),
        (Revoked, Revoked) => same_revocation || (stored_hold && proposed.revocation.is_some()),
        (Revoked | RevokedExpired, RevokedExpired) => same_revocation,
        _ => false,
    }
}

/// Returns a status label including the revocation reason.
fn state_label(record: &CertificateRecord) -> String {
    match record.revocation {
        Some(revocation) => format!("{}({})", record.status, revocation.reason),
        None => record.status.to_string(),
    }
}

/// Derives the revoked successor of a stored certificate, or `None` when it
/// is already revoked for the requested reason.
fn revoked_successor(
    stored: &CertificateRecord,
    reason: RevocationReason,
    date: Timestamp,
) -> Result<Option<CertificateRecord>, RepositoryError> {
    let mut proposed = stored.clone();
    match (stored.status, stored.revocation) {
        (CertificateStatus::Valid, _) => proposed.status = CertificateStatus::Revoked,
        (CertificateStatus::Expired, _) => proposed.status = CertificateStatus::RevokedExpired,
        (_, Some(current)) if current.reason == reason => return Ok(None),
        (CertificateStatus::Revoked, Some(current))
            if current.reason == RevocationReason::CertificateHold => {}
        (_, Some(current)) => {
            return Err(RepositoryError::RevocationConflict {
                serial: stored.serial_number,
                current: current.reason,
                requested: reason,
            });
        }
        (_, None) => {
            return Err(RepositoryError::InvalidTransition {
                kind: CertificateKind::KIND,
                id: stored.serial_number.to_string(),
                from: state_label(stored),
                to: CertificateStatus::Revoked.to_string(),
            });
        }
    }
    proposed.revocation = Some(Revocation {
        reason,
        date,
    });
    proposed.modified_at = Timestamp::now();
    Ok(Some(proposed))
}

// ============================================================================
// SECTION: Queries
// ============================================================================

/// Filter for certificate listings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateFilter {
    /// Required status.
    pub status: Option<CertificateStatus>,
    /// Lowest serial number (inclusive).
    pub serial_from: Option<SerialNumber>,
    /// Highest serial number (inclusive).
    pub serial_to: Option<SerialNumber>,
    /// Earliest `not_before` (inclusive).
    pub issued_from: Option<Timestamp>,
    /// Latest `not_before` (inclusive).
    pub issued_to: Option<Timestamp>,
    /// Earliest `not_after` (inclusive).
    pub expires_from: Option<Timestamp>,
    /// Latest `not_after` (inclusive).
    pub expires_to: Option<Timestamp>,
}

impl CertificateFilter {
    /// Returns true when the record matches every set bound.
    #[must_use]
    pub fn matches(&self, record: &CertificateRecord) -> bool {
        let serial = record.serial_number;
        self.status.is_none_or(|status| record.status == status)
            && self.serial_from.is_none_or(|low| serial >= low)
            && self.serial_to.is_none_or(|high| serial <= high)
            && self.issued_from.is_none_or(|low| record.not_before >= low)
            && self.issued_to.is_none_or(|high| record.not_before <= high)
            && self.expires_from.is_none_or(|low| record.not_after >= low)
            && self.expires_to.is_none_or(|high| record.not_after <= high)
    }
}

// ============================================================================
// SECTION: Repository
// ============================================================================

/// Repository of issued certificates.
#[derive(Clone)]
pub struct CertificateRepository {
    /// Generic record repository.
    records: RecordRepository<CertificateKind>,
}

impl CertificateRepository {
    /// Creates a certificate repository.
    #[must_use]
    pub const fn new(
        store: SharedDirectoryStore,
        generator: Arc<IdGenerator>,
        audit: SharedAuditSink,
    ) -> Self {
        Self {
            records: RecordRepository::new(store, generator, audit),
        }
    }

    /// Allocates a serial number, signs the certificate, and stores it VALID.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Signing`] when the signer fails and
    /// [`RepositoryError::Allocation`] when no serial can be allocated.
    pub fn issue(
        &self,
        request_id: RequestId,
        template: &CertificateTemplate,
        signer: &dyn CertificateSigner,
    ) -> Result<CertificateRecord, RepositoryError> {
        let issuer = signer.issuer_name();
        let record = self.records.create(|serial_number| {
            let info = UnsignedCertificate {
                serial_number,
                subject: template.subject.clone(),
                issuer: issuer.clone(),
                not_before: template.not_before,
                not_after: template.not_after,
            };
            let certificate_bytes =
                signer.sign(&info).map_err(|err| RepositoryError::Signing {
                    serial: serial_number,
                    message: err.to_string(),
                })?;
            let now = Timestamp::now();
            Ok(CertificateRecord {
                serial_number,
                subject: info.subject,
                issuer: info.issuer,
                not_before: info.not_before,
                not_after: info.not_after,
                status: CertificateStatus::Valid,
                revocation: None,
                originating_request_id: request_id,
                meta_info: template.meta_info.clone(),
                challenge: template.challenge_phrase.as_deref().map(ChallengeDigest::derive),
                certificate_bytes,
                crl_issuances: Vec::new(),
                created_at: now,
                modified_at: now,
            })
        })?;
        self.records.audit().record(
            &AuditEvent::new(EVENT_CERTIFICATE_ISSUED)
                .counter(self.records.generator().counter())
                .identifier(record.serial_number)
                .detail(format!("request {request_id}")),
        );
        Ok(record)
    }

    /// Reads a certificate record.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::NotFound`] when the serial is unknown.
    pub fn read(&self, serial: SerialNumber) -> Result<CertificateRecord, RepositoryError> {
        self.records.read(serial)
    }

    /// Revokes a certificate.
    ///
    /// The decision is re-made against the stored record whenever a
    /// concurrent writer changes it first, so a racing revocation with the
    /// same reason returns the stored record.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::RevocationConflict`] when already revoked with
    /// a different reason (other than escalating a hold).
    pub fn revoke(
        &self,
        serial: SerialNumber,
        reason: RevocationReason,
        date: Timestamp,
    ) -> Result<CertificateRecord, RepositoryError> {
        let mut previous = None;
        let updated = self.records.update_with(serial, |stored| {
            previous = None;
            let Some(proposed) = revoked_successor(stored, reason, date)? else {
                return Ok(None);
            };
            previous = Some(state_label(stored));
            Ok(Some(proposed))
        })?;
        if let Some(previous) = previous {
            self.records.audit().record(
                &AuditEvent::new(EVENT_CERTIFICATE_REVOKED)
                    .identifier(serial)
                    .detail(format!("{previous} -> {}", state_label(&updated))),
            );
        }
        Ok(updated)
    }

    /// Releases a certificate hold, returning the certificate to VALID.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::InvalidTransition`] unless the certificate is
    /// REVOKED with reason CERTIFICATE_HOLD.
    pub fn release_hold(&self, serial: SerialNumber) -> Result<CertificateRecord, RepositoryError> {
        let stored = self.records.read(serial)?;
        let on_hold = stored.status == CertificateStatus::Revoked
            && stored
                .revocation
                .is_some_and(|revocation| revocation.reason == RevocationReason::CertificateHold);
        if !on_hold {
            return Err(RepositoryError::InvalidTransition {
                kind: CertificateKind::KIND,
                id: serial.to_string(),
                from: state_label(&stored),
                to: CertificateStatus::Valid.to_string(),
            });
        }
        let mut proposed = stored;
        proposed.status = CertificateStatus::Valid;
        proposed.revocation = None;
        proposed.modified_at = Timestamp::now();
        let updated = self.records.update(&proposed)?;
        self.records
            .audit()
            .record(&AuditEvent::new(EVENT_CERTIFICATE_HOLD_RELEASED).identifier(serial));
        Ok(updated)
    }

    /// Verifies a challenge phrase against the stored salted digest.
    ///
    /// Returns `false` when the certificate carries no challenge.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::NotFound`] when the serial is unknown.
    pub fn match_challenge(
        &self,
        serial: SerialNumber,
        phrase: &str,
    ) -> Result<bool, RepositoryError> {
        let record = self.records.read(serial)?;
        Ok(record.challenge.is_some_and(|challenge| challenge.matches(phrase)))
    }

    /// Moves every certificate past `not_after` to its expired status.
    ///
    /// Certificates changed concurrently by another writer are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError`] when the scan fails.
    pub fn expire_due(&self, now: Timestamp) -> Result<Vec<SerialNumber>, RepositoryError> {
        let mut expired = Vec::new();
        for (from, to) in [
            (CertificateStatus::Valid, CertificateStatus::Expired),
            (CertificateStatus::Revoked, CertificateStatus::RevokedExpired),
        ] {
            let due = self.records.scan(Some(from.as_str()), |record| record.not_after < now)?;
            for record in due {
                let serial = record.serial_number;
                let mut proposed = record;
                proposed.status = to;
                proposed.modified_at = now;
                match self.records.update(&proposed) {
                    Ok(_) => {
                        self.records.audit().record(
                            &AuditEvent::new(EVENT_CERTIFICATE_EXPIRED)
                                .identifier(serial)
                                .detail(format!("{from} -> {to}")),
                        );
                        expired.push(serial);
                    }
                    Err(RepositoryError::InvalidTransition {
                        ..
                    }) => {}
                    Err(err) => return Err(err),
                }
            }
        }
        expired.sort();
        Ok(expired)
    }

    /// Appends CRL issuance metadata without changing status.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::NotFound`] when the serial is unknown.
    pub fn record_crl_issuance(
        &self,
        serial: SerialNumber,
        crl_number: u64,
        issued_at: Timestamp,
    ) -> Result<CertificateRecord, RepositoryError> {
        let mut proposed = self.records.read(serial)?;
        proposed.crl_issuances.push(CrlIssuance {
            crl_number,
            issued_at,
        });
        self.records.update(&proposed)
    }

    /// Stores a pre-existing certificate record under its own serial.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::AlreadyExists`] when the serial is taken.
    pub fn import(&self, record: &CertificateRecord) -> Result<(), RepositoryError> {
        self.records.import(record)
    }

    /// Lists certificates matching the filter.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError`] when the scan fails.
    pub fn find(
        &self,
        filter: &CertificateFilter,
        sort: SortOrder,
        page: PageRequest,
    ) -> Result<RecordPage<CertificateRecord>, RepositoryError> {
        let status = filter.status.map(CertificateStatus::as_str);
        self.records.find(status, |record| filter.matches(record), sort, page)
    }
}

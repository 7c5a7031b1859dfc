// crates/certledger-core/src/runtime/requests.rs
// ============================================================================
// Module: Certledger Request Repository
// Description: Submission and one-way completion of CA requests.
// Purpose: Track enrollment, renewal, and revocation requests to a final state.
// Dependencies: crate::{audit, core, interfaces, runtime::repository}
// ============================================================================

//! ## Overview
//! Requests start PENDING and move once to COMPLETE, REJECTED, or CANCELED.
//! A terminal request is immutable except for the linked certificate of a
//! completed enrollment or renewal.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::audit::AuditEvent;
use crate::audit::EVENT_REQUEST_CANCELED;
use crate::audit::EVENT_REQUEST_COMPLETED;
use crate::audit::EVENT_REQUEST_REJECTED;
use crate::audit::EVENT_REQUEST_SUBMITTED;
use crate::audit::SharedAuditSink;
use crate::core::ChallengeDigest;
use crate::core::RequestId;
use crate::core::RequestRecord;
use crate::core::RequestStatus;
use crate::core::RequestStatusFilter;
use crate::core::RequestType;
use crate::core::SerialNumber;
use crate::core::Timestamp;
use crate::interfaces::ATTR_REQUEST_ID;
use crate::interfaces::ATTR_REQUEST_STATE;
use crate::interfaces::ATTR_REQUEST_TYPE;
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

/// Container holding request records.
pub const REQUEST_CONTAINER: &str = "ou=requests,ou=ca";

/// Request record kind.
pub struct RequestKind;

impl RecordKind for RequestKind {
    type Id = RequestId;
    type Record = RequestRecord;

    const CONTAINER: &'static str = REQUEST_CONTAINER;
    const KEY_ATTRIBUTE: &'static str = ATTR_REQUEST_ID;
    const KIND: &'static str = "request";
    const STATUS_ATTRIBUTE: &'static str = ATTR_REQUEST_STATE;

    fn id_from_value(value: u128) -> Self::Id {
        RequestId::new(value)
    }

    fn id_value(id: Self::Id) -> u128 {
        id.get()
    }

    fn record_id(record: &Self::Record) -> Self::Id {
        record.request_id
    }

    fn status_label(record: &Self::Record) -> &'static str {
        record.status.as_str()
    }

    fn index_attributes(record: &Self::Record) -> Vec<(&'static str, String)> {
        vec![(ATTR_REQUEST_TYPE, record.request_type.as_str().to_string())]
    }

    fn check_successor(
        stored: &Self::Record,
        proposed: &Self::Record,
    ) -> Result<(), TransitionDenied> {
        let denied = || TransitionDenied::new(stored.status, proposed.status);
        if stored.request_id != proposed.request_id
            || stored.request_type != proposed.request_type
            || stored.created_at != proposed.created_at
        {
            return Err(denied());
        }
        if proposed.result_certificate_id.is_some()
            && !(proposed.status == RequestStatus::Complete
                && proposed.request_type.produces_certificate())
        {
            return Err(denied());
        }
        if !stored.status.is_terminal() {
            return Ok(());
        }
        let only_link_changed = stored.status == proposed.status
            && stored.extension_data == proposed.extension_data
            && stored.challenge == proposed.challenge;
        let link_mutable = stored.status == RequestStatus::Complete
            && stored.request_type.produces_certificate();
        // Any other terminal record is frozen, timestamps included.
        let untouched = stored.result_certificate_id == proposed.result_certificate_id
            && stored.modified_at == proposed.modified_at;
        if only_link_changed && (link_mutable || untouched) { Ok(()) } else { Err(denied()) }
    }
}

// ============================================================================
// SECTION: Repository
// ============================================================================

/// Repository of CA requests.
#[derive(Clone)]
pub struct RequestRepository {
    /// Generic record repository.
    records: RecordRepository<RequestKind>,
}

impl RequestRepository {
    /// Creates a request repository.
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

    /// Allocates a request identifier and stores a PENDING request.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Allocation`] when no identifier can be
    /// allocated.
    pub fn submit(
        &self,
        request_type: RequestType,
        extension_data: BTreeMap<String, String>,
        challenge_phrase: Option<&str>,
    ) -> Result<RequestRecord, RepositoryError> {
        let record = self.records.create(|request_id| {
            let now = Timestamp::now();
            Ok(RequestRecord {
                request_id,
                request_type,
                status: RequestStatus::Pending,
                extension_data: extension_data.clone(),
                challenge: challenge_phrase.map(ChallengeDigest::derive),
                result_certificate_id: None,
                created_at: now,
                modified_at: now,
            })
        })?;
        self.records.audit().record(
            &AuditEvent::new(EVENT_REQUEST_SUBMITTED)
                .counter(self.records.generator().counter())
                .identifier(record.request_id)
                .detail(request_type.as_str()),
        );
        Ok(record)
    }

    /// Reads a request record.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::NotFound`] when the identifier is unknown.
    pub fn read(&self, id: RequestId) -> Result<RequestRecord, RepositoryError> {
        self.records.read(id)
    }

    /// Completes a PENDING request, optionally linking the issued certificate.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::InvalidTransition`] unless the request is
    /// PENDING, or when a certificate is linked to a request type that does
    /// not produce one.
    pub fn complete(
        &self,
        id: RequestId,
        result: Option<SerialNumber>,
    ) -> Result<RequestRecord, RepositoryError> {
        let updated = self.finish(id, RequestStatus::Complete, result)?;
        let mut event = AuditEvent::new(EVENT_REQUEST_COMPLETED).identifier(id);
        if let Some(serial) = result {
            event = event.detail(format!("certificate {serial}"));
        }
        self.records.audit().record(&event);
        Ok(updated)
    }

    /// Rejects a PENDING request.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::InvalidTransition`] unless the request is
    /// PENDING.
    pub fn reject(&self, id: RequestId) -> Result<RequestRecord, RepositoryError> {
        let updated = self.finish(id, RequestStatus::Rejected, None)?;
        self.records.audit().record(&AuditEvent::new(EVENT_REQUEST_REJECTED).identifier(id));
        Ok(updated)
    }

    /// Cancels a PENDING request.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::InvalidTransition`] unless the request is
    /// PENDING.
    pub fn cancel(&self, id: RequestId) -> Result<RequestRecord, RepositoryError> {
        let updated = self.finish(id, RequestStatus::Canceled, None)?;
        self.records.audit().record(&AuditEvent::new(EVENT_REQUEST_CANCELED).identifier(id));
        Ok(updated)
    }

    /// Replaces the linked certificate of a completed enrollment or renewal.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::InvalidTransition`] for any other request.
    pub fn link_certificate(
        &self,
        id: RequestId,
        serial: SerialNumber,
    ) -> Result<RequestRecord, RepositoryError> {
        let mut proposed = self.records.read(id)?;
        proposed.result_certificate_id = Some(serial);
        proposed.modified_at = Timestamp::now();
        self.records.update(&proposed)
    }

    /// Lists requests by status; [`RequestStatusFilter::All`] lists everything.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError`] when the scan fails.
    pub fn find_by_status(
        &self,
        status: RequestStatusFilter,
        sort: SortOrder,
        page: PageRequest,
    ) -> Result<RecordPage<RequestRecord>, RepositoryError> {
        let status = match status {
            RequestStatusFilter::All => None,
            RequestStatusFilter::Only(status) => Some(status.as_str()),
        };
        self.records.find(status, |_| true, sort, page)
    }

    /// Lists requests of one type.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError`] when the scan fails.
    pub fn find_by_type(
        &self,
        request_type: RequestType,
        sort: SortOrder,
        page: PageRequest,
    ) -> Result<RecordPage<RequestRecord>, RepositoryError> {
        self.records.find(None, |record| record.request_type == request_type, sort, page)
    }

    /// Stores a pre-existing request record under its own identifier.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::AlreadyExists`] when the identifier is taken.
    pub fn import(&self, record: &RequestRecord) -> Result<(), RepositoryError> {
        self.records.import(record)
    }

    /// Moves a PENDING request to a terminal status.
    fn finish(
        &self,
        id: RequestId,
        status: RequestStatus,
        result: Option<SerialNumber>,
    ) -> Result<RequestRecord, RepositoryError> {
        let stored = self.records.read(id)?;
        if stored.status != RequestStatus::Pending {
            return Err(RepositoryError::InvalidTransition {
                kind: RequestKind::KIND,
                id: id.to_string(),
                from: stored.status.to_string(),
                to: status.to_string(),
            });
        }
        let mut proposed = stored;
        proposed.status = status;
        proposed.result_certificate_id = result;
        proposed.modified_at = Timestamp::now();
        self.records.update(&proposed)
    }
}

// crates/certledger-core/src/runtime/repository.rs
// ============================================================================
// Module: Certledger Record Repository
// Description: Generic create/read/update/find over directory-backed records.
// Purpose: Enforce per-kind state machines on identifier-keyed records.
// Dependencies: crate::{audit, core, interfaces, runtime}, serde, serde_json
// ============================================================================

//! ## Overview
//! A [`RecordRepository`] stores one record kind under one container. Each
//! record is a directory entry named by its numeric identifier and carrying
//! the key attribute, a status attribute, optional index attributes, and the
//! JSON-encoded record in `recordData`.
//!
//! Updates are conditional replaces guarded by the stored `recordData`
//! value. A concurrent writer makes the guard fail; the repository then
//! re-reads, re-derives the successor through the caller's decision, and
//! re-validates the transition against the newly stored record, so an illegal
//! transition is reported against the current state and the stored entry is
//! left untouched.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::cmp::Ordering;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::audit::AuditEvent;
use crate::audit::EVENT_IDENTIFIER_ABANDONED;
use crate::audit::EVENT_RECORD_IMPORTED;
use crate::audit::SharedAuditSink;
use crate::core::RevocationReason;
use crate::core::SerialNumber;
use crate::interfaces::ATTR_RECORD_DATA;
use crate::interfaces::Attributes;
use crate::interfaces::DirectoryEntry;
use crate::interfaces::DirectoryStore;
use crate::interfaces::Modification;
use crate::interfaces::Precondition;
use crate::interfaces::SearchRequest;
use crate::interfaces::StoreError;
use crate::runtime::generator::IdGenerator;
use crate::runtime::range_manager::AllocationError;
use crate::runtime::range_manager::store_error_kind;
use crate::runtime::store::SharedDirectoryStore;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Attempts for an update whose guard keeps failing.
const UPDATE_ATTEMPTS: u32 = 4;
/// Page size used when scanning a container.
const SCAN_PAGE_SIZE: usize = 500;
/// Default page limit for listings.
pub const DEFAULT_PAGE_LIMIT: usize = 100;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors returned by record repositories.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Record does not exist.
    #[error("{kind} {id} not found")]
    NotFound {
        /// Record kind label.
        kind: &'static str,
        /// Record identifier.
        id: String,
    },
    /// Transition not permitted by the record's state machine.
    #[error("invalid transition for {kind} {id}: {from} -> {to}")]
    InvalidTransition {
        /// Record kind label.
        kind: &'static str,
        /// Record identifier.
        id: String,
        /// Stored state.
        from: String,
        /// Requested state.
        to: String,
    },
    /// Certificate already revoked with a different reason.
    #[error(
        "revocation conflict for certificate {serial}: revoked with {current}, requested {requested}"
    )]
    RevocationConflict {
        /// Certificate serial number.
        serial: SerialNumber,
        /// Stored revocation reason.
        current: RevocationReason,
        /// Requested revocation reason.
        requested: RevocationReason,
    },
    /// Record identifier already in use.
    #[error("{kind} {id} already exists")]
    AlreadyExists {
        /// Record kind label.
        kind: &'static str,
        /// Record identifier.
        id: String,
    },
    /// Signing collaborator failed.
    #[error("signing failed for certificate {serial}: {message}")]
    Signing {
        /// Serial number allocated for the certificate.
        serial: SerialNumber,
        /// Signer error message.
        message: String,
    },
    /// Stored record cannot be decoded.
    #[error("{kind} {id} record is corrupt: {message}")]
    Corrupt {
        /// Record kind label.
        kind: &'static str,
        /// Record identifier.
        id: String,
        /// Decode error.
        message: String,
    },
    /// Identifier allocation failed.
    #[error(transparent)]
    Allocation(#[from] AllocationError),
    /// Directory store failure.
    #[error("{kind} {id}: {source}")]
    Store {
        /// Record kind label.
        kind: &'static str,
        /// Record identifier, or `*` for scans.
        id: String,
        /// Underlying store error.
        source: StoreError,
    },
}

impl RepositoryError {
    /// Returns the stable taxonomy label.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::NotFound {
                ..
            } => "not_found",
            Self::InvalidTransition {
                ..
            } => "invalid_transition",
            Self::RevocationConflict {
                ..
            } => "revocation_conflict",
            Self::AlreadyExists {
                ..
            } => "already_exists",
            Self::Signing {
                ..
            } => "signing_failure",
            Self::Corrupt {
                ..
            } => "record_corrupt",
            Self::Allocation(err) => err.kind(),
            Self::Store {
                source, ..
            } => store_error_kind(source),
        }
    }
}

/// A record kind refused a proposed successor state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionDenied {
    /// Stored state label.
    pub from: String,
    /// Proposed state label.
    pub to: String,
}

impl TransitionDenied {
    /// Creates a denial between two state labels.
    #[must_use]
    pub fn new(from: impl fmt::Display, to: impl fmt::Display) -> Self {
        Self {
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}

// ============================================================================
// SECTION: Record Kinds
// ============================================================================

/// Describes how one record kind is keyed, indexed, and validated.
pub trait RecordKind {
    /// Stored record type.
    type Record: Serialize + DeserializeOwned + Clone + PartialEq;
    /// Record identifier type.
    type Id: Copy + fmt::Display;

    /// Kind label used in errors.
    const KIND: &'static str;
    /// Container holding the records.
    const CONTAINER: &'static str;
    /// Attribute holding the decimal identifier.
    const KEY_ATTRIBUTE: &'static str;
    /// Attribute holding the status label.
    const STATUS_ATTRIBUTE: &'static str;

    /// Wraps an allocated integer.
    fn id_from_value(value: u128) -> Self::Id;

    /// Returns the integer behind an identifier.
    fn id_value(id: Self::Id) -> u128;

    /// Returns the record's identifier.
    fn record_id(record: &Self::Record) -> Self::Id;

    /// Returns the record's status label.
    fn status_label(record: &Self::Record) -> &'static str;

    /// Returns additional searchable attributes.
    fn index_attributes(_record: &Self::Record) -> Vec<(&'static str, String)> {
        Vec::new()
    }

    /// Checks that `proposed` may replace `stored`.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionDenied`] when the state machine forbids the change.
    fn check_successor(stored: &Self::Record, proposed: &Self::Record)
    -> Result<(), TransitionDenied>;
}

// ============================================================================
// SECTION: Paging
// ============================================================================

/// Sort order by numeric identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    /// Lowest identifier first.
    #[default]
    Ascending,
    /// Highest identifier first.
    Descending,
}

/// Offset/limit page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    /// Matches to skip.
    pub offset: usize,
    /// Maximum matches to return.
    pub limit: usize,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

/// Page of matching records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordPage<R> {
    /// Records on this page.
    pub items: Vec<R>,
    /// Total matches across all pages.
    pub total: usize,
    /// Offset of the first item.
    pub offset: usize,
    /// Requested limit.
    pub limit: usize,
}

// ============================================================================
// SECTION: Repository
// ============================================================================

/// Directory-backed repository for one record kind.
pub struct RecordRepository<K: RecordKind> {
    /// Shared directory.
    store: SharedDirectoryStore,
    /// Identifier generator for new records.
    generator: Arc<IdGenerator>,
    /// Audit sink.
    audit: SharedAuditSink,
    /// Record kind marker.
    kind: PhantomData<fn() -> K>,
}

impl<K: RecordKind> Clone for RecordRepository<K> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            generator: Arc::clone(&self.generator),
            audit: Arc::clone(&self.audit),
            kind: PhantomData,
        }
    }
}

impl<K: RecordKind> RecordRepository<K> {
    /// Creates a repository over the store using the generator for new ids.
    #[must_use]
    pub const fn new(
        store: SharedDirectoryStore,
        generator: Arc<IdGenerator>,
        audit: SharedAuditSink,
    ) -> Self {
        Self {
            store,
            generator,
            audit,
            kind: PhantomData,
        }
    }

    /// Returns the identifier generator.
    #[must_use]
    pub fn generator(&self) -> &IdGenerator {
        &self.generator
    }

    /// Returns the audit sink.
    #[must_use]
    pub const fn audit(&self) -> &SharedAuditSink {
        &self.audit
    }

    /// Returns the distinguished name of a record.
    #[must_use]
    pub fn entry_dn(id: K::Id) -> String {
        format!("cn={},{}", K::id_value(id), K::CONTAINER)
    }

    /// Allocates an identifier, builds the record, and stores it.
    ///
    /// An identifier whose entry already exists (a concurrent random draw or
    /// an imported record ahead of the counter) is abandoned and a fresh one
    /// allocated, up to the generator's collision budget. When the record
    /// cannot be built or stored, an `identifier_abandoned` audit event is
    /// emitted and the error returned; the identifier is never reused.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError`] when allocation, building, or storing fails,
    /// and [`AllocationError::FatalAllocationError`] when every allocated
    /// identifier was already taken.
    pub fn create<F>(&self, mut build: F) -> Result<K::Record, RepositoryError>
    where
        F: FnMut(K::Id) -> Result<K::Record, RepositoryError>,
    {
        let budget = self.generator.collision_budget();
        for _ in 0 .. budget {
            let value = self.generator.allocate_unique(|candidate| {
                let dn = Self::entry_dn(K::id_from_value(candidate));
                self.store.read_entry(&dn).map(|entry| entry.is_some())
            })?;
            let id = K::id_from_value(value);
            let outcome = build(id).and_then(|record| {
                let entry = Self::to_entry(&record)?;
                self.store.add_entry(&entry).map(|()| record).map_err(|source| match source {
                    StoreError::AlreadyExists(_) => RepositoryError::AlreadyExists {
                        kind: K::KIND,
                        id: id.to_string(),
                    },
                    source => store_error::<K>(id, source),
                })
            });
            match outcome {
                Ok(record) => return Ok(record),
                Err(err) => {
                    self.abandon(id, &err);
                    if !matches!(err, RepositoryError::AlreadyExists { .. }) {
                        return Err(err);
                    }
                }
            }
        }
        Err(RepositoryError::Allocation(AllocationError::FatalAllocationError {
            counter: self.generator.counter().clone(),
            attempts: budget,
        }))
    }

    /// Records an allocated identifier that was never persisted.
    fn abandon(&self, id: K::Id, err: &RepositoryError) {
        self.audit.record(
            &AuditEvent::new(EVENT_IDENTIFIER_ABANDONED)
                .counter(self.generator.counter())
                .identifier(id)
                .detail(format!("{} not persisted: {err}", K::KIND)),
        );
    }

    /// Reads a record by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::NotFound`] when no record exists.
    pub fn read(&self, id: K::Id) -> Result<K::Record, RepositoryError> {
        self.read_with_data(id).map(|(record, _)| record)
    }

    /// Replaces a stored record after validating the transition.
    ///
    /// An unchanged record is accepted without a write.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::InvalidTransition`] when the state machine
    /// forbids the change and [`RepositoryError::NotFound`] when the record is
    /// missing. The stored entry is unchanged on error.
    pub fn update(&self, proposed: &K::Record) -> Result<K::Record, RepositoryError> {
        self.update_with(K::record_id(proposed), |_| Ok(Some(proposed.clone())))
    }

    /// Replaces a stored record with the successor `decide` derives from it.
    ///
    /// `decide` sees the current record on every pass, including passes after
    /// a concurrent writer changed it, and returns `None` to keep the stored
    /// record as is.
    ///
    /// # Errors
    ///
    /// Returns the error from `decide`, [`RepositoryError::InvalidTransition`]
    /// when the state machine forbids the successor, and
    /// [`RepositoryError::NotFound`] when the record is missing. The stored
    /// entry is unchanged on error.
    pub fn update_with<F>(&self, id: K::Id, mut decide: F) -> Result<K::Record, RepositoryError>
    where
        F: FnMut(&K::Record) -> Result<Option<K::Record>, RepositoryError>,
    {
        let dn = Self::entry_dn(id);
        for _ in 0 .. UPDATE_ATTEMPTS {
            let (stored, stored_data) = self.read_with_data(id)?;
            let Some(proposed) = decide(&stored)? else {
                return Ok(stored);
            };
            K::check_successor(&stored, &proposed).map_err(|denied| {
                RepositoryError::InvalidTransition {
                    kind: K::KIND,
                    id: id.to_string(),
                    from: denied.from,
                    to: denied.to,
                }
            })?;
            if stored == proposed {
                return Ok(stored);
            }
            let mut modifications = vec![
                Modification::replace(ATTR_RECORD_DATA, encode_record::<K>(&proposed)?),
                Modification::replace(K::STATUS_ATTRIBUTE, K::status_label(&proposed)),
            ];
            for (attribute, value) in K::index_attributes(&proposed) {
                modifications.push(Modification::replace(attribute, value));
            }
            let guard = [Precondition::equals(ATTR_RECORD_DATA, stored_data)];
            match self.store.modify_entry(&dn, &modifications, &guard) {
                Ok(()) => return Ok(proposed),
                Err(StoreError::ConditionFailed(_)) => {}
                Err(StoreError::NotFound(_)) => {
                    return Err(RepositoryError::NotFound {
                        kind: K::KIND,
                        id: id.to_string(),
                    });
                }
                Err(source) => return Err(store_error::<K>(id, source)),
            }
        }
        Err(store_error::<K>(
            id,
            StoreError::ConditionFailed(format!("{dn}: concurrent updates did not settle")),
        ))
    }

    /// Stores a pre-existing record under its own identifier.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::AlreadyExists`] when the identifier is taken.
    pub fn import(&self, record: &K::Record) -> Result<(), RepositoryError> {
        let id = K::record_id(record);
        let entry = Self::to_entry(record)?;
        self.store.add_entry(&entry).map_err(|source| match source {
            StoreError::AlreadyExists(_) => RepositoryError::AlreadyExists {
                kind: K::KIND,
                id: id.to_string(),
            },
            source => store_error::<K>(id, source),
        })?;
        self.audit.record(
            &AuditEvent::new(EVENT_RECORD_IMPORTED)
                .identifier(id)
                .detail(format!("{} imported with status {}", K::KIND, K::status_label(record))),
        );
        Ok(())
    }

    /// Scans the container, keeping records that match the status and predicate.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError`] when the scan fails or a record is corrupt.
    pub fn scan<P>(&self, status: Option<&str>, predicate: P) -> Result<Vec<K::Record>, RepositoryError>
    where
        P: Fn(&K::Record) -> bool,
    {
        let mut request = SearchRequest::children(K::CONTAINER, SCAN_PAGE_SIZE);
        if let Some(status) = status {
            request = request.with_filter(K::STATUS_ATTRIBUTE, status);
        }
        let mut matches = Vec::new();
        loop {
            let page = self.store.search(&request).map_err(|source| RepositoryError::Store {
                kind: K::KIND,
                id: "*".to_string(),
                source,
            })?;
            for entry in &page.entries {
                let record = decode_entry::<K>(entry)?;
                if predicate(&record) {
                    matches.push(record);
                }
            }
            match page.next_cursor {
                Some(cursor) => request.cursor = Some(cursor),
                None => break,
            }
        }
        Ok(matches)
    }

    /// Finds matching records, sorted numerically by identifier and paged.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError`] when the scan fails.
    pub fn find<P>(
        &self,
        status: Option<&str>,
        predicate: P,
        sort: SortOrder,
        page: PageRequest,
    ) -> Result<RecordPage<K::Record>, RepositoryError>
    where
        P: Fn(&K::Record) -> bool,
    {
        let mut matches = self.scan(status, predicate)?;
        matches.sort_by(|left, right| compare_ids::<K>(left, right, sort));
        let total = matches.len();
        let items = matches.into_iter().skip(page.offset).take(page.limit).collect();
        Ok(RecordPage {
            items,
            total,
            offset: page.offset,
            limit: page.limit,
        })
    }

    /// Reads a record together with its stored `recordData` text.
    fn read_with_data(&self, id: K::Id) -> Result<(K::Record, String), RepositoryError> {
        let entry = self
            .store
            .read_entry(&Self::entry_dn(id))
            .map_err(|source| store_error::<K>(id, source))?
            .ok_or_else(|| RepositoryError::NotFound {
                kind: K::KIND,
                id: id.to_string(),
            })?;
        let record = decode_entry::<K>(&entry)?;
        let data = entry.get(ATTR_RECORD_DATA).unwrap_or_default().to_string();
        Ok((record, data))
    }

    /// Builds the directory entry for a record.
    fn to_entry(record: &K::Record) -> Result<DirectoryEntry, RepositoryError> {
        let id = K::record_id(record);
        let mut attributes = Attributes::new();
        attributes.insert(K::KEY_ATTRIBUTE.to_string(), K::id_value(id).to_string());
        attributes.insert(K::STATUS_ATTRIBUTE.to_string(), K::status_label(record).to_string());
        for (attribute, value) in K::index_attributes(record) {
            attributes.insert(attribute.to_string(), value);
        }
        attributes.insert(ATTR_RECORD_DATA.to_string(), encode_record::<K>(record)?);
        Ok(DirectoryEntry {
            dn: Self::entry_dn(id),
            attributes,
        })
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Serializes a record for the `recordData` attribute.
fn encode_record<K: RecordKind>(record: &K::Record) -> Result<String, RepositoryError> {
    serde_json::to_string(record).map_err(|err| RepositoryError::Corrupt {
        kind: K::KIND,
        id: K::record_id(record).to_string(),
        message: err.to_string(),
    })
}

/// Decodes a record entry and checks it is stored under its own key.
fn decode_entry<K: RecordKind>(entry: &DirectoryEntry) -> Result<K::Record, RepositoryError> {
    let corrupt = |message: String| RepositoryError::Corrupt {
        kind: K::KIND,
        id: entry.dn.clone(),
        message,
    };
    let data = entry
        .get(ATTR_RECORD_DATA)
        .ok_or_else(|| corrupt(format!("missing {ATTR_RECORD_DATA}")))?;
    let record: K::Record = serde_json::from_str(data).map_err(|err| corrupt(err.to_string()))?;
    let key = K::id_value(K::record_id(&record)).to_string();
    if entry.get(K::KEY_ATTRIBUTE) != Some(key.as_str()) {
        return Err(corrupt(format!("{} does not match record", K::KEY_ATTRIBUTE)));
    }
    Ok(record)
}

/// Orders two records by numeric identifier.
fn compare_ids<K: RecordKind>(left: &K::Record, right: &K::Record, sort: SortOrder) -> Ordering {
    let ordering = K::id_value(K::record_id(left)).cmp(&K::id_value(K::record_id(right)));
    match sort {
        SortOrder::Ascending => ordering,
        SortOrder::Descending => ordering.reverse(),
    }
}

/// Wraps a store error for a record identifier.
fn store_error<K: RecordKind>(id: K::Id, source: StoreError) -> RepositoryError {
    RepositoryError::Store {
        kind: K::KIND,
        id: id.to_string(),
        source,
    }
}

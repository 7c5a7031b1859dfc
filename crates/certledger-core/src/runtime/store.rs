// crates/certledger-core/src/runtime/store.rs
// ============================================================================
// Module: Certledger In-Memory Directory
// Description: In-memory directory store and shared store wrapper.
// Purpose: Provide a deterministic directory for tests and local runs.
// Dependencies: crate::interfaces
// ============================================================================

//! ## Overview
//! [`InMemoryDirectoryStore`] keeps entries in a mutex-guarded map keyed by
//! distinguished name. Clones share the same map, so several generators built
//! over clones behave like replicas sharing one directory. It is not intended
//! for production use.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;
use std::sync::Mutex;

use crate::interfaces::Attributes;
use crate::interfaces::DirectoryEntry;
use crate::interfaces::DirectoryStore;
use crate::interfaces::Modification;
use crate::interfaces::Precondition;
use crate::interfaces::SearchPage;
use crate::interfaces::SearchRequest;
use crate::interfaces::StoreError;
use crate::interfaces::apply_modifications;
use crate::interfaces::parent_dn;

// ============================================================================
// SECTION: In-Memory Store
// ============================================================================

/// In-memory directory store for tests and local runs.
#[derive(Debug, Default, Clone)]
pub struct InMemoryDirectoryStore {
    /// Entry map protected by a mutex.
    entries: Arc<Mutex<BTreeMap<String, Attributes>>>,
}

impl InMemoryDirectoryStore {
    /// Creates a new empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }

    /// Locks the entry map.
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, Attributes>>, StoreError> {
        self.entries
            .lock()
            .map_err(|_| StoreError::Store("directory store mutex poisoned".to_string()))
    }
}

impl DirectoryStore for InMemoryDirectoryStore {
    fn read_entry(&self, dn: &str) -> Result<Option<DirectoryEntry>, StoreError> {
        let guard = self.lock()?;
        Ok(guard.get(dn).map(|attributes| DirectoryEntry {
            dn: dn.to_string(),
            attributes: attributes.clone(),
        }))
    }

    fn add_entry(&self, entry: &DirectoryEntry) -> Result<(), StoreError> {
        let mut guard = self.lock()?;
        if guard.contains_key(&entry.dn) {
            return Err(StoreError::AlreadyExists(entry.dn.clone()));
        }
        guard.insert(entry.dn.clone(), entry.attributes.clone());
        drop(guard);
        Ok(())
    }

    fn modify_entry(
        &self,
        dn: &str,
        modifications: &[Modification],
        preconditions: &[Precondition],
    ) -> Result<(), StoreError> {
        let mut guard = self.lock()?;
        let attributes = guard.get_mut(dn).ok_or_else(|| StoreError::NotFound(dn.to_string()))?;
        if let Some(failed) = preconditions.iter().find(|condition| !condition.holds(attributes)) {
            return Err(StoreError::ConditionFailed(format!("{dn}: {}", failed.attribute)));
        }
        apply_modifications(attributes, modifications);
        drop(guard);
        Ok(())
    }

    fn search(&self, request: &SearchRequest) -> Result<SearchPage, StoreError> {
        if request.limit == 0 {
            return Err(StoreError::Invalid("search limit must be greater than zero".to_string()));
        }
        let guard = self.lock()?;
        let lower = request.cursor.as_ref().map_or(Bound::Unbounded, |cursor| {
            Bound::Excluded(cursor.clone())
        });
        let entries: Vec<DirectoryEntry> = guard
            .range((lower, Bound::Unbounded))
            .filter(|(dn, attributes)| parent_dn(dn) == request.base && request.matches(attributes))
            .take(request.limit)
            .map(|(dn, attributes)| DirectoryEntry {
                dn: dn.clone(),
                attributes: attributes.clone(),
            })
            .collect();
        drop(guard);
        let next_cursor = if entries.len() == request.limit {
            entries.last().map(|entry| entry.dn.clone())
        } else {
            None
        };
        Ok(SearchPage {
            entries,
            next_cursor,
        })
    }
}

// ============================================================================
// SECTION: Shared Store Wrapper
// ============================================================================

/// Shared directory store backed by an `Arc` trait object.
#[derive(Clone)]
pub struct SharedDirectoryStore {
    /// Inner store implementation.
    inner: Arc<dyn DirectoryStore + Send + Sync>,
}

impl SharedDirectoryStore {
    /// Wraps a directory store in a shared, clonable wrapper.
    #[must_use]
    pub fn from_store(store: impl DirectoryStore + Send + Sync + 'static) -> Self {
        Self {
            inner: Arc::new(store),
        }
    }

    /// Wraps an existing shared store.
    #[must_use]
    pub const fn new(store: Arc<dyn DirectoryStore + Send + Sync>) -> Self {
        Self {
            inner: store,
        }
    }
}

impl DirectoryStore for SharedDirectoryStore {
    fn read_entry(&self, dn: &str) -> Result<Option<DirectoryEntry>, StoreError> {
        self.inner.read_entry(dn)
    }

    fn add_entry(&self, entry: &DirectoryEntry) -> Result<(), StoreError> {
        self.inner.add_entry(entry)
    }

    fn modify_entry(
        &self,
        dn: &str,
        modifications: &[Modification],
        preconditions: &[Precondition],
    ) -> Result<(), StoreError> {
        self.inner.modify_entry(dn, modifications, preconditions)
    }

    fn search(&self, request: &SearchRequest) -> Result<SearchPage, StoreError> {
        self.inner.search(request)
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

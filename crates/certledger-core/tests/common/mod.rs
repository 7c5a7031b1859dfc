// crates/certledger-core/tests/common/mod.rs
// =============================================================================
// Module: Core Test Helpers
// Description: Shared directory harness, scripted RNG, and test signers.
// Purpose: Reduce duplication across integration tests for certledger-core.
// =============================================================================

#![allow(dead_code, reason = "Test helpers are selectively used across suites.")]
#![allow(clippy::expect_used, reason = "Test helpers use expect for concise failures.")]

use std::collections::BTreeMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;

use certledger_core::CertificateRecord;
use certledger_core::CertificateRepository;
use certledger_core::CertificateSigner;
use certledger_core::CertificateStatus;
use certledger_core::CertificateTemplate;
use certledger_core::CounterName;
use certledger_core::DirectoryEntry;
use certledger_core::DirectoryStore;
use certledger_core::GeneratorMode;
use certledger_core::GeneratorSettings;
use certledger_core::IdGenerator;
use certledger_core::InMemoryDirectoryStore;
use certledger_core::MemoryAuditSink;
use certledger_core::Modification;
use certledger_core::Precondition;
use certledger_core::RangeManager;
use certledger_core::ReplicaId;
use certledger_core::RequestId;
use certledger_core::RequestRepository;
use certledger_core::SearchPage;
use certledger_core::SearchRequest;
use certledger_core::SerialNumber;
use certledger_core::SharedAuditSink;
use certledger_core::SharedDirectoryStore;
use certledger_core::SigningError;
use certledger_core::StoreError;
use certledger_core::Timestamp;
use certledger_core::UnsignedCertificate;
use rand::CryptoRng;
use rand::RngCore;

/// One shared in-memory directory plus a recording audit sink.
pub struct Harness {
    /// Directory shared by every replica built from this harness.
    pub store: InMemoryDirectoryStore,
    /// Audit events emitted by any replica.
    pub audit: Arc<MemoryAuditSink>,
}

impl Harness {
    /// Creates an empty directory.
    pub fn new() -> Self {
        Self {
            store: InMemoryDirectoryStore::new(),
            audit: Arc::new(MemoryAuditSink::new()),
        }
    }

    /// Returns a shared handle to the directory.
    pub fn shared(&self) -> SharedDirectoryStore {
        SharedDirectoryStore::from_store(self.store.clone())
    }

    /// Returns the audit sink as a trait object.
    pub fn sink(&self) -> SharedAuditSink {
        let sink: SharedAuditSink = self.audit.clone();
        sink
    }

    /// Returns a range manager over the directory.
    pub fn ranges(&self) -> RangeManager {
        RangeManager::new(self.shared(), self.sink())
    }

    /// Opens a generator for the counter on the replica.
    pub fn generator(
        &self,
        counter: &str,
        replica: &str,
        mode: GeneratorMode,
        range_size: u128,
        initial_start: u128,
    ) -> IdGenerator {
        IdGenerator::open(self.ranges(), settings(counter, replica, mode, range_size, initial_start))
            .expect("open generator")
    }

    /// Builds a certificate repository for the replica.
    pub fn certificates(&self, replica: &str, mode: GeneratorMode) -> CertificateRepository {
        let generator = self.generator("serialNumber", replica, mode, 100, 1);
        CertificateRepository::new(self.shared(), Arc::new(generator), self.sink())
    }

    /// Builds a certificate repository over a prepared generator.
    pub fn certificates_with(&self, generator: IdGenerator) -> CertificateRepository {
        CertificateRepository::new(self.shared(), Arc::new(generator), self.sink())
    }

    /// Builds a request repository for the replica.
    pub fn requests(&self, replica: &str) -> RequestRepository {
        let generator = self.generator("requestNumber", replica, GeneratorMode::Legacy, 100, 1);
        RequestRepository::new(self.shared(), Arc::new(generator), self.sink())
    }
}

/// Builds generator settings with a small checkpoint interval.
pub fn settings(
    counter: &str,
    replica: &str,
    mode: GeneratorMode,
    range_size: u128,
    initial_start: u128,
) -> GeneratorSettings {
    let mut settings =
        GeneratorSettings::new(CounterName::new(counter), ReplicaId::new(replica), mode);
    settings.range_size = range_size;
    settings.initial_start = initial_start;
    settings.checkpoint_interval = 10;
    settings
}

/// Random source that replays a fixed list of 128-bit values.
pub struct ScriptedRng {
    /// Values returned by successive 16-byte fills.
    values: VecDeque<u128>,
}

impl ScriptedRng {
    /// Creates a source replaying the values in order, then zeros.
    pub fn new(values: &[u128]) -> Self {
        Self {
            values: values.iter().copied().collect(),
        }
    }
}

impl RngCore for ScriptedRng {
    fn next_u32(&mut self) -> u32 {
        u32::try_from(self.next_u64() & u64::from(u32::MAX)).unwrap_or_default()
    }

    fn next_u64(&mut self) -> u64 {
        u64::try_from(self.values.pop_front().unwrap_or_default() & u128::from(u64::MAX))
            .unwrap_or_default()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        let bytes = self.values.pop_front().unwrap_or_default().to_be_bytes();
        for (slot, byte) in dest.iter_mut().zip(bytes.iter()) {
            *slot = *byte;
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}

impl CryptoRng for ScriptedRng {}

/// Signer that encodes the serial into the certificate bytes.
pub struct TestSigner;

impl CertificateSigner for TestSigner {
    fn sign(&self, info: &UnsignedCertificate) -> Result<Vec<u8>, SigningError> {
        Ok(format!("signed:{}:{}", info.serial_number, info.subject).into_bytes())
    }

    fn issuer_name(&self) -> String {
        "CN=Test CA".to_string()
    }
}

/// Signer that always fails.
pub struct FailingSigner;

impl CertificateSigner for FailingSigner {
    fn sign(&self, _info: &UnsignedCertificate) -> Result<Vec<u8>, SigningError> {
        Err(SigningError::SigningFailed("hsm offline".to_string()))
    }

    fn issuer_name(&self) -> String {
        "CN=Test CA".to_string()
    }
}

/// Returns a template valid for one day from `not_before` millis.
pub fn template(subject: &str, not_before: i64) -> CertificateTemplate {
    CertificateTemplate {
        subject: subject.to_string(),
        not_before: Timestamp::from_unix_millis(not_before),
        not_after: Timestamp::from_unix_millis(not_before + 86_400_000),
        ..CertificateTemplate::default()
    }
}

/// Returns a VALID record as an external system would export it.
pub fn imported_certificate(serial: u128, subject: &str) -> CertificateRecord {
    CertificateRecord {
        serial_number: SerialNumber::new(serial),
        subject: subject.to_string(),
        issuer: "CN=Old CA".to_string(),
        not_before: Timestamp::from_unix_millis(0),
        not_after: Timestamp::from_unix_millis(86_400_000),
        status: CertificateStatus::Valid,
        revocation: None,
        originating_request_id: RequestId::new(900),
        meta_info: BTreeMap::new(),
        challenge: None,
        certificate_bytes: vec![0x30, 0x82],
        crl_issuances: Vec::new(),
        created_at: Timestamp::from_unix_millis(0),
        modified_at: Timestamp::from_unix_millis(0),
    }
}

/// Hook run against the underlying directory before a matching modify.
type ModifyHook = Box<dyn FnOnce(&InMemoryDirectoryStore) + Send>;

/// Directory wrapper that injects another replica's writes at chosen points.
///
/// Reads of entries under `hidden_container` report nothing, which models a
/// collision check racing a concurrent insert. A hook registered for a
/// distinguished name runs once, just before the first modify of that entry.
pub struct InterleavingStore {
    /// Directory shared with the rest of the harness.
    inner: InMemoryDirectoryStore,
    /// Container whose entries are invisible to `read_entry`.
    hidden_container: Option<String>,
    /// Pending hook and the entry it fires on.
    hook: Mutex<Option<(String, ModifyHook)>>,
}

impl InterleavingStore {
    /// Wraps the harness directory.
    pub fn new(inner: &InMemoryDirectoryStore) -> Self {
        Self {
            inner: inner.clone(),
            hidden_container: None,
            hook: Mutex::new(None),
        }
    }

    /// Hides every entry under the container from reads.
    pub fn hiding(mut self, container: &str) -> Self {
        self.hidden_container = Some(container.to_string());
        self
    }

    /// Runs `hook` once before the first modify of `dn`.
    pub fn before_modify(
        self,
        dn: &str,
        hook: impl FnOnce(&InMemoryDirectoryStore) + Send + 'static,
    ) -> Self {
        *self.hook.lock().expect("hook lock") = Some((dn.to_string(), Box::new(hook)));
        self
    }

    /// Returns a shared handle to the wrapper.
    pub fn shared(self) -> SharedDirectoryStore {
        SharedDirectoryStore::from_store(self)
    }
}

impl DirectoryStore for InterleavingStore {
    fn read_entry(&self, dn: &str) -> Result<Option<DirectoryEntry>, StoreError> {
        if let Some(container) = &self.hidden_container
            && dn.ends_with(&format!(",{container}"))
        {
            return Ok(None);
        }
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
        let hook = {
            let mut pending = self.hook.lock().expect("hook lock");
            match pending.take() {
                Some((target, hook)) if target == dn => Some(hook),
                other => {
                    *pending = other;
                    None
                }
            }
        };
        if let Some(hook) = hook {
            hook(&self.inner);
        }
        self.inner.modify_entry(dn, modifications, preconditions)
    }

    fn search(&self, request: &SearchRequest) -> Result<SearchPage, StoreError> {
        self.inner.search(request)
    }
}

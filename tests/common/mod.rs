//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;
use gateway_registry::config::RetryConfig;
use gateway_registry::policy::{CompilerError, PolicyAttachmentManager, PolicyCompiler, ScratchArea};
use gateway_registry::registry::Registry;
use gateway_registry::repository::ResourceRepository;
use gateway_registry::resources::{Policy, PolicyType, ResourceGroup, ResourceMetadata, Schema};
use gateway_registry::storage::{MemoryStore, ResourceStore, StoreError, StoreResult, StoredBlob};

/// Memory store that records every write and can inject failures.
#[derive(Default)]
pub struct RecordingStore {
    inner: MemoryStore,
    events: Mutex<Vec<String>>,
    pending_conflicts: AtomicUsize,
    fail_resource_writes: AtomicBool,
    fail_attachment_writes: AtomicBool,
    attachment_gate: Mutex<Option<AttachmentGate>>,
}

/// Holds attachment writes until released.
#[derive(Clone, Default)]
pub struct AttachmentGate {
    reached: Arc<Notify>,
    release: Arc<Notify>,
}

impl AttachmentGate {
    /// Resolves once an attachment write is waiting at the gate.
    pub async fn reached(&self) {
        self.reached.notified().await;
    }

    pub fn release(&self) {
        self.release.notify_one();
    }
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn attachment(&self, filename: &str) -> Option<Vec<u8>> {
        self.inner.attachment(filename)
    }

    /// The next `n` resource writes lose the compare-and-set.
    pub fn inject_conflicts(&self, n: usize) {
        self.pending_conflicts.store(n, Ordering::SeqCst);
    }

    pub fn fail_resource_writes(&self, fail: bool) {
        self.fail_resource_writes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_attachment_writes(&self, fail: bool) {
        self.fail_attachment_writes.store(fail, Ordering::SeqCst);
    }

    /// Park the next attachment write until the returned gate is released.
    pub fn hold_attachment_writes(&self) -> AttachmentGate {
        let gate = AttachmentGate::default();
        *self.attachment_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    fn record(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

fn injected(what: &str) -> StoreError {
    StoreError::Io(std::io::Error::new(std::io::ErrorKind::Other, format!("injected {} failure", what)))
}

#[async_trait]
impl ResourceStore for RecordingStore {
    async fn read_resource(&self) -> StoreResult<Option<StoredBlob>> {
        self.inner.read_resource().await
    }

    async fn write_resource(&self, content: Vec<u8>, expected_etag: Option<&str>) -> StoreResult<String> {
        let conflict = self
            .pending_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if conflict {
            self.record("conflict".into());
            return Err(StoreError::PreconditionFailed("injected".into()));
        }
        if self.fail_resource_writes.load(Ordering::SeqCst) {
            return Err(injected("resource write"));
        }

        let etag = self.inner.write_resource(content, expected_etag).await?;
        self.record("commit".into());
        Ok(etag)
    }

    async fn write_attachment(&self, filename: &str, content: &[u8]) -> StoreResult<()> {
        let gate = self.attachment_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.reached.notify_one();
            gate.release.notified().await;
        }
        if self.fail_attachment_writes.load(Ordering::SeqCst) {
            return Err(injected("attachment write"));
        }
        self.inner.write_attachment(filename, content).await?;
        self.record(format!("save {}", filename));
        Ok(())
    }

    async fn delete_attachment(&self, filename: &str) -> StoreResult<()> {
        self.inner.delete_attachment(filename).await?;
        self.record(format!("delete {}", filename));
        Ok(())
    }

    async fn list_attachments(&self) -> StoreResult<Vec<String>> {
        self.inner.list_attachments().await
    }

    fn backend_name(&self) -> &'static str {
        "recording"
    }
}

/// Compiler double: rejects sources containing `syntax error`.
#[derive(Default)]
pub struct ScriptedCompiler {
    pub calls: AtomicUsize,
}

#[async_trait]
impl PolicyCompiler for ScriptedCompiler {
    fn policy_type(&self) -> PolicyType {
        PolicyType::Opa
    }

    async fn compile(&self, metadata: &ResourceMetadata, source: &str) -> Result<Vec<u8>, CompilerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        if source.contains("syntax error") {
            return Err(CompilerError::Rejected(format!("{}: rego_parse_error: unexpected token", metadata)));
        }
        Ok(format!("bundle:{}", source).into_bytes())
    }
}

pub fn fast_retries(max_attempts: u32) -> RetryConfig {
    RetryConfig {
        max_attempts,
        base_delay_ms: 1,
        max_delay_ms: 5,
    }
}

pub struct Harness {
    pub store: Arc<RecordingStore>,
    pub compiler: Arc<ScriptedCompiler>,
    pub registry: Arc<Registry>,
    pub scratch: PathBuf,
    _dir: tempfile::TempDir,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_retries(fast_retries(3))
    }

    pub fn with_retries(retries: RetryConfig) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let scratch = dir.path().join("scratch");
        let store = Arc::new(RecordingStore::new());
        let compiler = Arc::new(ScriptedCompiler::default());

        let repository = Arc::new(ResourceRepository::new(store.clone()));
        let attachments = PolicyAttachmentManager::new(ScratchArea::new(&scratch)).with_compiler(compiler.clone());
        let registry = Arc::new(Registry::new(repository, attachments, retries));

        Self {
            store,
            compiler,
            registry,
            scratch,
            _dir: dir,
        }
    }

    pub fn repository(&self) -> &Arc<ResourceRepository> {
        self.registry.repository()
    }

    pub fn scratch_files(&self) -> Vec<PathBuf> {
        list_files(&self.scratch)
    }
}

pub fn list_files(dir: &Path) -> Vec<PathBuf> {
    match std::fs::read_dir(dir) {
        Ok(entries) => entries.filter_map(|e| e.ok()).map(|e| e.path()).collect(),
        Err(_) => Vec::new(),
    }
}

pub fn schema(name: &str, sdl: &str) -> Schema {
    Schema {
        metadata: ResourceMetadata::new("ns", name),
        schema: sdl.to_string(),
    }
}

pub fn policy(name: &str, code: &str) -> Policy {
    Policy {
        metadata: ResourceMetadata::new("ns", name),
        policy_type: PolicyType::Opa,
        code: code.to_string(),
        args: None,
        queries: None,
    }
}

pub fn schemas(items: Vec<Schema>) -> ResourceGroup {
    ResourceGroup {
        schemas: items,
        ..Default::default()
    }
}

pub fn policies(items: Vec<Policy>) -> ResourceGroup {
    ResourceGroup {
        policies: items,
        ..Default::default()
    }
}

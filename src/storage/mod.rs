//! Resource store subsystem.
//!
//! # Data Flow
//! ```text
//! ResourceRepository
//!     → ResourceStore (trait object, chosen from config at startup)
//!         → filesystem.rs     (local file + attachment directory)
//!         → object.rs         (S3-compatible object storage over HTTP)
//!         → memory.rs         (process-local, development and tests)
//! ```
//!
//! # Design Decisions
//! - One configuration blob with a store-native CAS token (etag)
//! - Attachments are plain blobs keyed by filename; writes and deletes are idempotent
//! - The store knows nothing about versions or resource types; the repository does

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::{StorageBackend, StorageConfig};

pub mod filesystem;
pub mod memory;
pub mod object;

pub use filesystem::FileSystemStore;
pub use memory::MemoryStore;
pub use object::ObjectStore;

/// The configuration blob as read from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    pub content: Vec<u8>,
    pub etag: String,
}

#[derive(Debug, Error)]
pub enum StoreError {
    /// The conditional write lost the race: the blob's etag moved on.
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("object storage request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected response from object storage: {0}")]
    Protocol(String),

    #[error("failed to serialize resource group: {0}")]
    Serialization(#[source] serde_json::Error),

    #[error("stored resource group is corrupt: {0}")]
    Corrupt(#[source] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Read the configuration blob; `None` until the first commit.
    async fn read_resource(&self) -> StoreResult<Option<StoredBlob>>;

    /// Conditionally replace the configuration blob.
    ///
    /// `expected_etag = None` means the blob must not exist yet. Returns the new etag.
    async fn write_resource(&self, content: Vec<u8>, expected_etag: Option<&str>) -> StoreResult<String>;

    async fn write_attachment(&self, filename: &str, content: &[u8]) -> StoreResult<()>;

    /// Delete an attachment; deleting a missing one is not an error.
    async fn delete_attachment(&self, filename: &str) -> StoreResult<()>;

    async fn list_attachments(&self) -> StoreResult<Vec<String>>;

    /// Local path of the configuration blob, when the backend has one to watch.
    fn watch_path(&self) -> Option<PathBuf> {
        None
    }

    fn backend_name(&self) -> &'static str;
}

/// Build the configured backend.
pub fn from_config(config: &StorageConfig) -> StoreResult<Arc<dyn ResourceStore>> {
    let store: Arc<dyn ResourceStore> = match config.backend {
        StorageBackend::Filesystem => Arc::new(FileSystemStore::new(
            config.filesystem.resource_file_path.clone(),
            config.filesystem.policy_attachments_dir.clone(),
        )),
        StorageBackend::ObjectStorage => Arc::new(ObjectStore::new(&config.object_storage)?),
        StorageBackend::Memory => Arc::new(MemoryStore::new()),
    };

    tracing::info!(backend = store.backend_name(), "Resource store initialized");
    Ok(store)
}

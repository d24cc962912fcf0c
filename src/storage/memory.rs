//! In-memory resource store.
//!
//! Not durable: all state is lost on process restart. Etags are a per-process
//! counter, which is enough for compare-and-set within one process.

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Mutex;

use super::{ResourceStore, StoreError, StoreResult, StoredBlob};

#[derive(Debug, Default)]
struct ResourceSlot {
    blob: Option<StoredBlob>,
    writes: u64,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    resource: Mutex<ResourceSlot>,
    attachments: DashMap<String, Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current content of an attachment.
    pub fn attachment(&self, filename: &str) -> Option<Vec<u8>> {
        self.attachments.get(filename).map(|r| r.value().clone())
    }
}

#[async_trait]
impl ResourceStore for MemoryStore {
    async fn read_resource(&self) -> StoreResult<Option<StoredBlob>> {
        Ok(self.resource.lock().await.blob.clone())
    }

    async fn write_resource(&self, content: Vec<u8>, expected_etag: Option<&str>) -> StoreResult<String> {
        let mut slot = self.resource.lock().await;
        let current = slot.blob.as_ref().map(|b| b.etag.as_str());
        if current != expected_etag {
            return Err(StoreError::PreconditionFailed(format!(
                "expected etag {:?}, found {:?}",
                expected_etag, current
            )));
        }

        slot.writes += 1;
        let etag = format!("mem-{}", slot.writes);
        slot.blob = Some(StoredBlob {
            content,
            etag: etag.clone(),
        });
        Ok(etag)
    }

    async fn write_attachment(&self, filename: &str, content: &[u8]) -> StoreResult<()> {
        self.attachments.insert(filename.to_string(), content.to_vec());
        Ok(())
    }

    async fn delete_attachment(&self, filename: &str) -> StoreResult<()> {
        self.attachments.remove(filename);
        Ok(())
    }

    async fn list_attachments(&self) -> StoreResult<Vec<String>> {
        let mut names: Vec<String> = self.attachments.iter().map(|r| r.key().clone()).collect();
        names.sort();
        Ok(names)
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

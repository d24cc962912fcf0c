//! Filesystem resource store.
//!
//! # Responsibilities
//! - Keep the aggregate in one JSON file, attachments in one directory
//! - Derive the etag from the file content (SHA-256)
//! - Create the attachment directory lazily on first write
//!
//! # Design Decisions
//! - Compare-and-set happens under an in-process lock; the replacement is a
//!   write-to-temp then rename so readers never observe a torn file
//! - Cross-process writers are not coordinated beyond the etag check

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::sync::{Mutex, OnceCell};

use super::{ResourceStore, StoreError, StoreResult, StoredBlob};

const TEMP_SUFFIX: &str = ".tmp";

#[derive(Debug)]
pub struct FileSystemStore {
    resource_file_path: PathBuf,
    attachments_dir: PathBuf,
    write_lock: Mutex<()>,
    attachments_dir_ready: OnceCell<()>,
}

impl FileSystemStore {
    pub fn new(resource_file_path: PathBuf, attachments_dir: PathBuf) -> Self {
        Self {
            resource_file_path,
            attachments_dir,
            write_lock: Mutex::new(()),
            attachments_dir_ready: OnceCell::new(),
        }
    }

    async fn ensure_attachments_dir(&self) -> StoreResult<()> {
        self.attachments_dir_ready
            .get_or_try_init(|| async {
                fs::create_dir_all(&self.attachments_dir).await?;
                tracing::debug!(dir = ?self.attachments_dir, "Created policy attachments directory");
                Ok::<(), StoreError>(())
            })
            .await?;
        Ok(())
    }
}

fn content_etag(content: &[u8]) -> String {
    hex::encode(Sha256::digest(content))
}

/// Write `content` next to `path` and rename it into place.
async fn replace_file(path: &Path, content: &[u8]) -> StoreResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await?;
    }

    let mut temp = path.as_os_str().to_owned();
    temp.push(format!(".{}{}", uuid::Uuid::new_v4().simple(), TEMP_SUFFIX));
    let temp = PathBuf::from(temp);

    fs::write(&temp, content).await?;
    if let Err(e) = fs::rename(&temp, path).await {
        let _ = fs::remove_file(&temp).await;
        return Err(e.into());
    }
    Ok(())
}

#[async_trait]
impl ResourceStore for FileSystemStore {
    async fn read_resource(&self) -> StoreResult<Option<StoredBlob>> {
        match fs::read(&self.resource_file_path).await {
            Ok(content) => {
                let etag = content_etag(&content);
                Ok(Some(StoredBlob { content, etag }))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_resource(&self, content: Vec<u8>, expected_etag: Option<&str>) -> StoreResult<String> {
        let _guard = self.write_lock.lock().await;

        let current = self.read_resource().await?;
        let current_etag = current.as_ref().map(|b| b.etag.as_str());
        if current_etag != expected_etag {
            return Err(StoreError::PreconditionFailed(format!(
                "{} changed since it was read",
                self.resource_file_path.display()
            )));
        }

        replace_file(&self.resource_file_path, &content).await?;
        Ok(content_etag(&content))
    }

    async fn write_attachment(&self, filename: &str, content: &[u8]) -> StoreResult<()> {
        self.ensure_attachments_dir().await?;
        replace_file(&self.attachments_dir.join(filename), content).await
    }

    async fn delete_attachment(&self, filename: &str) -> StoreResult<()> {
        match fs::remove_file(self.attachments_dir.join(filename)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_attachments(&self) -> StoreResult<Vec<String>> {
        let mut entries = match fs::read_dir(&self.attachments_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if !name.ends_with(TEMP_SUFFIX) {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    fn watch_path(&self) -> Option<PathBuf> {
        Some(self.resource_file_path.clone())
    }

    fn backend_name(&self) -> &'static str {
        "filesystem"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_in(dir: &Path) -> FileSystemStore {
        FileSystemStore::new(dir.join("registry/resources.json"), dir.join("attachments"))
    }

    #[tokio::test]
    async fn test_compare_and_set() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());

        assert!(store.read_resource().await.unwrap().is_none());
        let etag = store.write_resource(b"{}".to_vec(), None).await.unwrap();
        assert_eq!(etag, content_etag(b"{}"));

        let stale = store.write_resource(b"{\"a\":1}".to_vec(), None).await;
        assert!(matches!(stale, Err(StoreError::PreconditionFailed(_))));

        let next = store.write_resource(b"{\"a\":2}".to_vec(), Some(&etag)).await.unwrap();
        let blob = store.read_resource().await.unwrap().unwrap();
        assert_eq!(blob.etag, next);
        assert_eq!(blob.content, b"{\"a\":2}");
    }

    #[tokio::test]
    async fn test_attachment_dir_created_lazily() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());

        assert!(store.list_attachments().await.unwrap().is_empty());
        assert!(!dir.path().join("attachments").exists());

        store.write_attachment("ns.p.tar.gz", b"bundle").await.unwrap();
        assert!(dir.path().join("attachments/ns.p.tar.gz").exists());
        assert_eq!(store.list_attachments().await.unwrap(), vec!["ns.p.tar.gz".to_string()]);

        store.delete_attachment("ns.p.tar.gz").await.unwrap();
        // Deleting twice is fine.
        store.delete_attachment("ns.p.tar.gz").await.unwrap();
        assert!(store.list_attachments().await.unwrap().is_empty());
    }
}

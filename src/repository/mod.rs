//! Resource repository: versioning on top of a resource store.
//!
//! # Data Flow
//! ```text
//! fetch_latest()  → store.read_resource() → (ResourceGroup, VersionToken)
//! update(group, token)
//!     → generation + 1, serialize
//!     → store.write_resource(content, token.etag)   (compare-and-set)
//!     → PreconditionFailed → VersionConflict
//!     → success → ChangeSnapshot broadcast to in-process subscribers
//! ```
//!
//! # Design Decisions
//! - The generation counter lives inside the stored document so tokens are
//!   ordered across every backend; the etag is only used for the CAS
//! - Commit notifications are best effort: the change feed also polls

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::error::RegistryError;
use crate::resources::ResourceGroup;
use crate::storage::{ResourceStore, StoreError};

const COMMIT_CHANNEL_CAPACITY: usize = 64;

/// Opaque token identifying a committed version of the aggregate.
///
/// Ordered by generation; the etag is the store-native CAS token.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VersionToken {
    pub generation: u64,
    pub etag: Option<String>,
}

impl fmt::Display for VersionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.generation)
    }
}

/// A committed aggregate as observed by the sync pipeline.
#[derive(Debug, Clone)]
pub struct ChangeSnapshot {
    pub version: VersionToken,
    pub content: Arc<ResourceGroup>,
}

#[derive(Serialize)]
struct StoredDocumentRef<'a> {
    generation: u64,
    #[serde(flatten)]
    group: &'a ResourceGroup,
}

#[derive(Deserialize)]
struct StoredDocument {
    #[serde(default)]
    generation: u64,
    #[serde(flatten)]
    group: ResourceGroup,
}

pub struct ResourceRepository {
    store: Arc<dyn ResourceStore>,
    commits: broadcast::Sender<ChangeSnapshot>,
}

impl ResourceRepository {
    pub fn new(store: Arc<dyn ResourceStore>) -> Self {
        let (commits, _) = broadcast::channel(COMMIT_CHANNEL_CAPACITY);
        Self { store, commits }
    }

    pub fn store(&self) -> &Arc<dyn ResourceStore> {
        &self.store
    }

    /// Latest committed aggregate and the token for a subsequent `update`.
    pub async fn fetch_latest(&self) -> Result<(ResourceGroup, VersionToken), RegistryError> {
        let Some(blob) = self.store.read_resource().await? else {
            return Ok((ResourceGroup::default(), VersionToken::default()));
        };

        let document: StoredDocument =
            serde_json::from_slice(&blob.content).map_err(StoreError::Corrupt)?;
        let token = VersionToken {
            generation: document.generation,
            etag: Some(blob.etag),
        };
        Ok((document.group, token))
    }

    /// Commit `group` if `token` is still current; returns the new token.
    pub async fn update(&self, group: &ResourceGroup, token: &VersionToken) -> Result<VersionToken, RegistryError> {
        let generation = token.generation + 1;
        let content = serde_json::to_vec_pretty(&StoredDocumentRef { generation, group })
            .map_err(StoreError::Serialization)?;

        let etag = match self.store.write_resource(content, token.etag.as_deref()).await {
            Ok(etag) => etag,
            Err(StoreError::PreconditionFailed(reason)) => {
                tracing::debug!(expected = %token, %reason, "Conditional write rejected");
                return Err(RegistryError::VersionConflict {
                    expected: token.clone(),
                });
            }
            Err(e) => return Err(e.into()),
        };

        let committed = VersionToken {
            generation,
            etag: Some(etag),
        };
        tracing::info!(version = %committed, "Resource group committed");

        // No receivers is fine; the feed polls as well.
        let _ = self.commits.send(ChangeSnapshot {
            version: committed.clone(),
            content: Arc::new(group.clone()),
        });
        Ok(committed)
    }

    pub async fn write_policy_attachment(&self, filename: &str, content: &[u8]) -> Result<(), RegistryError> {
        self.store.write_attachment(filename, content).await?;
        tracing::debug!(filename, bytes = content.len(), "Policy attachment written");
        Ok(())
    }

    pub async fn delete_policy_attachment(&self, filename: &str) -> Result<(), RegistryError> {
        self.store.delete_attachment(filename).await?;
        tracing::debug!(filename, "Policy attachment deleted");
        Ok(())
    }

    pub async fn list_policy_attachments(&self) -> Result<Vec<String>, RegistryError> {
        Ok(self.store.list_attachments().await?)
    }

    /// In-process commit notifications.
    pub fn subscribe_commits(&self) -> broadcast::Receiver<ChangeSnapshot> {
        self.commits.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::{ResourceMetadata, Schema};
    use crate::storage::MemoryStore;

    fn group_with(schema: &str) -> ResourceGroup {
        ResourceGroup {
            schemas: vec![Schema {
                metadata: ResourceMetadata::new("ns", "s"),
                schema: schema.to_string(),
            }],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_empty_store_yields_empty_group() {
        let repo = ResourceRepository::new(Arc::new(MemoryStore::new()));
        let (group, token) = repo.fetch_latest().await.unwrap();
        assert!(group.is_empty());
        assert_eq!(token, VersionToken::default());
    }

    #[tokio::test]
    async fn test_versions_advance_and_stale_tokens_conflict() {
        let repo = ResourceRepository::new(Arc::new(MemoryStore::new()));
        let (_, t0) = repo.fetch_latest().await.unwrap();

        let t1 = repo.update(&group_with("scalar A"), &t0).await.unwrap();
        assert!(t1 > t0);

        let (group, fetched) = repo.fetch_latest().await.unwrap();
        assert_eq!(group, group_with("scalar A"));
        assert_eq!(fetched, t1);

        let err = repo.update(&group_with("scalar B"), &t0).await.unwrap_err();
        assert!(matches!(err, RegistryError::VersionConflict { .. }));

        let t2 = repo.update(&group_with("scalar B"), &t1).await.unwrap();
        assert!(t2 > t1);
        assert_eq!(t2.generation, 2);
    }

    #[tokio::test]
    async fn test_commit_is_broadcast() {
        let repo = ResourceRepository::new(Arc::new(MemoryStore::new()));
        let mut commits = repo.subscribe_commits();

        let token = repo.update(&group_with("scalar A"), &VersionToken::default()).await.unwrap();
        let snapshot = commits.recv().await.unwrap();
        assert_eq!(snapshot.version, token);
        assert_eq!(snapshot.content.schemas.len(), 1);
    }
}

//! Two-phase policy attachment lifecycle.
//!
//! # Responsibilities
//! - Diff the previous and next policy sets
//! - Generate (compile) attachments for added or changed policies into scratch
//! - Persist staged saves, then staged deletes, after the commit succeeded
//! - Clean up every scratch artifact of the batch, whatever the outcome
//!
//! # States
//! ```text
//! NEW → GENERATED → STAGED_SAVE   → PERSISTED → CLEANED
//!                 → STAGED_DELETE → PERSISTED
//! ```

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::RegistryError;
use crate::observability::metrics;
use crate::repository::ResourceRepository;
use crate::resources::{Policy, PolicyType, ResourceMetadata};

use super::compiler::{PolicyCompiler, ScratchArea};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentState {
    Generated,
    StagedSave,
    StagedDelete,
    Persisted,
    Cleaned,
}

impl fmt::Display for AttachmentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AttachmentState::Generated => "generated",
            AttachmentState::StagedSave => "staged_save",
            AttachmentState::StagedDelete => "staged_delete",
            AttachmentState::Persisted => "persisted",
            AttachmentState::Cleaned => "cleaned",
        };
        f.write_str(label)
    }
}

/// A compiled attachment waiting in the scratch area.
#[derive(Debug, Clone)]
pub struct GeneratedAttachment {
    pub metadata: ResourceMetadata,
    pub policy_type: PolicyType,
    pub filename: String,
    pub path: PathBuf,
    pub state: AttachmentState,
}

/// An attachment to remove from the repository; nothing is generated for it.
#[derive(Debug, Clone)]
pub struct StagedDelete {
    pub metadata: ResourceMetadata,
    pub policy_type: PolicyType,
    pub filename: String,
    pub state: AttachmentState,
}

/// Compilers by policy type plus the scratch area they generate into.
#[derive(Clone)]
pub struct PolicyAttachmentManager {
    compilers: HashMap<PolicyType, Arc<dyn PolicyCompiler>>,
    scratch: ScratchArea,
}

impl PolicyAttachmentManager {
    pub fn new(scratch: ScratchArea) -> Self {
        Self {
            compilers: HashMap::new(),
            scratch,
        }
    }

    pub fn with_compiler(mut self, compiler: Arc<dyn PolicyCompiler>) -> Self {
        self.compilers.insert(compiler.policy_type(), compiler);
        self
    }

    pub fn scratch(&self) -> &ScratchArea {
        &self.scratch
    }

    /// Attachment filename for a policy, if its type has a compiler.
    pub fn attachment_filename(&self, policy_type: PolicyType, metadata: &ResourceMetadata) -> Option<String> {
        self.compilers
            .get(&policy_type)
            .map(|c| c.attachment_filename(metadata))
    }

    /// Diff `previous` against `next` and generate attachments for the changes.
    ///
    /// A compile failure aborts the whole batch: scratch artifacts already
    /// generated for sibling policies are removed before the error returns.
    pub async fn stage(&self, previous: &[Policy], next: &[Policy]) -> Result<AttachmentBatch, RegistryError> {
        let mut batch = AttachmentBatch::new(self.scratch.clone());

        let changed = next.iter().filter(|p| !previous.contains(p));
        for policy in changed {
            match self.generate(policy).await {
                Ok(Some(attachment)) => batch.saves.push(attachment),
                Ok(None) => {}
                Err(e) => {
                    batch.cleanup().await;
                    return Err(e);
                }
            }
        }

        let removed = previous
            .iter()
            .filter(|old| !next.iter().any(|p| p.metadata == old.metadata));
        for policy in removed {
            if let Some(filename) = self.attachment_filename(policy.policy_type, &policy.metadata) {
                batch.deletes.push(StagedDelete {
                    metadata: policy.metadata.clone(),
                    policy_type: policy.policy_type,
                    filename,
                    state: AttachmentState::StagedDelete,
                });
            }
        }

        for attachment in &mut batch.saves {
            attachment.state = AttachmentState::StagedSave;
        }
        tracing::debug!(
            saves = batch.saves.len(),
            deletes = batch.deletes.len(),
            "Policy attachment batch staged"
        );
        Ok(batch)
    }

    /// Compile one policy into the scratch area. `None` when no compiler handles its type.
    pub async fn generate(&self, policy: &Policy) -> Result<Option<GeneratedAttachment>, RegistryError> {
        let Some(compiler) = self.compilers.get(&policy.policy_type) else {
            tracing::warn!(
                namespace = %policy.metadata.namespace,
                name = %policy.metadata.name,
                policy_type = %policy.policy_type,
                "No compiler registered for policy type; skipping attachment"
            );
            return Ok(None);
        };

        let content = compiler
            .compile(&policy.metadata, &policy.code)
            .await
            .map_err(|e| RegistryError::Compile {
                metadata: policy.metadata.clone(),
                message: e.to_string(),
            })?;

        let filename = compiler.attachment_filename(&policy.metadata);
        let path = self
            .scratch
            .write(&filename, &content)
            .await
            .map_err(|e| RegistryError::Storage(e.into()))?;
        metrics::record_attachment_operation("generate");

        Ok(Some(GeneratedAttachment {
            metadata: policy.metadata.clone(),
            policy_type: policy.policy_type,
            filename,
            path,
            state: AttachmentState::Generated,
        }))
    }
}

/// The attachments of one update cycle.
#[derive(Debug)]
pub struct AttachmentBatch {
    scratch: ScratchArea,
    saves: Vec<GeneratedAttachment>,
    deletes: Vec<StagedDelete>,
}

impl AttachmentBatch {
    pub fn new(scratch: ScratchArea) -> Self {
        Self {
            scratch,
            saves: Vec::new(),
            deletes: Vec::new(),
        }
    }

    pub fn push_save(&mut self, mut attachment: GeneratedAttachment) {
        attachment.state = AttachmentState::StagedSave;
        self.saves.push(attachment);
    }

    pub fn saves(&self) -> &[GeneratedAttachment] {
        &self.saves
    }

    pub fn deletes(&self) -> &[StagedDelete] {
        &self.deletes
    }

    pub fn is_empty(&self) -> bool {
        self.saves.is_empty() && self.deletes.is_empty()
    }

    /// Write every staged save, then delete every staged delete.
    ///
    /// Call only after the commit referencing the new policy set succeeded.
    pub async fn persist(&mut self, repository: &ResourceRepository) -> Result<(), RegistryError> {
        for attachment in &mut self.saves {
            let content = self
                .scratch
                .read(&attachment.path)
                .await
                .map_err(|e| RegistryError::Storage(e.into()))?;
            repository
                .write_policy_attachment(&attachment.filename, &content)
                .await?;
            attachment.state = AttachmentState::Persisted;
            metrics::record_attachment_operation("save");
        }

        for staged in &mut self.deletes {
            repository.delete_policy_attachment(&staged.filename).await?;
            staged.state = AttachmentState::Persisted;
            metrics::record_attachment_operation("delete");
        }
        Ok(())
    }

    /// Remove the scratch files of every generated attachment. Never fails.
    pub async fn cleanup(&mut self) {
        for attachment in self.saves.drain(..) {
            match self.scratch.remove(&attachment.path).await {
                Ok(()) => {
                    tracing::trace!(filename = %attachment.filename, state = %AttachmentState::Cleaned, "Scratch attachment removed");
                }
                Err(e) => {
                    metrics::record_attachment_cleanup_failure();
                    tracing::warn!(
                        error = %e,
                        path = ?attachment.path,
                        filename = %attachment.filename,
                        state = %attachment.state,
                        "Failed to clean up compiled policy; the request outcome is unaffected"
                    );
                }
            }
        }
    }
}

impl Drop for AttachmentBatch {
    // Cancelled cycles never reach `cleanup`.
    fn drop(&mut self) {
        for attachment in &self.saves {
            if let Err(e) = std::fs::remove_file(&attachment.path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(error = %e, path = ?attachment.path, "Failed to remove abandoned scratch file");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::compiler::CompilerError;
    use crate::storage::MemoryStore;
    use async_trait::async_trait;

    struct EchoCompiler;

    #[async_trait]
    impl PolicyCompiler for EchoCompiler {
        fn policy_type(&self) -> PolicyType {
            PolicyType::Opa
        }

        async fn compile(&self, metadata: &ResourceMetadata, source: &str) -> Result<Vec<u8>, CompilerError> {
            if source.contains("syntax error") {
                return Err(CompilerError::Rejected(format!("{}: rego_parse_error", metadata)));
            }
            Ok(format!("compiled:{}", source).into_bytes())
        }
    }

    fn policy(name: &str, code: &str) -> Policy {
        Policy {
            metadata: ResourceMetadata::new("ns", name),
            policy_type: PolicyType::Opa,
            code: code.into(),
            args: None,
            queries: None,
        }
    }

    fn manager(dir: &std::path::Path) -> PolicyAttachmentManager {
        PolicyAttachmentManager::new(ScratchArea::new(dir)).with_compiler(Arc::new(EchoCompiler))
    }

    #[tokio::test]
    async fn test_diff_stages_changed_and_removed() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path());

        let previous = vec![policy("same", "a"), policy("changed", "b"), policy("gone", "c")];
        let next = vec![policy("same", "a"), policy("changed", "b2"), policy("new", "d")];
        let mut batch = manager.stage(&previous, &next).await.unwrap();

        let saves: Vec<&str> = batch.saves().iter().map(|a| a.filename.as_str()).collect();
        assert_eq!(saves, vec!["ns.changed.tar.gz", "ns.new.tar.gz"]);
        assert!(batch.saves().iter().all(|a| a.state == AttachmentState::StagedSave));
        let deletes: Vec<&str> = batch.deletes().iter().map(|d| d.filename.as_str()).collect();
        assert_eq!(deletes, vec!["ns.gone.tar.gz"]);

        batch.cleanup().await;
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_compile_failure_cleans_siblings() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path());

        let next = vec![policy("ok", "a"), policy("broken", "syntax error")];
        let err = manager.stage(&[], &next).await.unwrap_err();

        assert!(matches!(err, RegistryError::Compile { ref metadata, .. } if metadata.name == "broken"));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_persist_saves_then_deletes() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path());
        let store = Arc::new(MemoryStore::new());
        let repository = ResourceRepository::new(store.clone());
        repository.write_policy_attachment("ns.old.tar.gz", b"stale").await.unwrap();

        let mut batch = manager
            .stage(&[policy("old", "x")], &[policy("fresh", "y")])
            .await
            .unwrap();
        batch.persist(&repository).await.unwrap();
        batch.cleanup().await;

        assert_eq!(store.attachment("ns.fresh.tar.gz").unwrap(), b"compiled:y");
        assert!(store.attachment("ns.old.tar.gz").is_none());
        // A second cleanup is a no-op.
        batch.cleanup().await;
    }
}

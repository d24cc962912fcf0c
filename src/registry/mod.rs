//! Registry subsystem: the validate-then-commit protocol.
//!
//! # Data Flow
//! ```text
//! mutation (update*/delete*):
//!     serializer.rs slot
//!         → fetch_latest
//!         → patch.apply → validate_resource_group
//!         → attachments.stage (compile changed policies into scratch)
//!         → repository.update (CAS)   ── VersionConflict → backoff, retry
//!         → attachments.persist (saves, then deletes)
//!         → attachments.cleanup (always)
//!
//! validate*:
//!     fetch_latest → apply → validate → stage → cleanup   (no slot, advisory)
//! ```
//!
//! # Design Decisions
//! - The fetch happens inside the slot, so each mutation sees every earlier commit
//! - Validation and compile errors abort before any repository write
//! - A persist failure after a successful commit is reported; the
//!   reconciliation sweep repairs the attachments
//! - Mutations from `execute` run on a spawned task, so a dropped request
//!   never stops a cycle between commit and persist

use std::sync::Arc;
use std::time::Instant;

use crate::config::RetryConfig;
use crate::error::RegistryError;
use crate::observability::metrics;
use crate::policy::{reconcile_attachments, AttachmentBatch, PolicyAttachmentManager, ReconcileReport};
use crate::repository::{ResourceRepository, VersionToken};
use crate::resilience::backoff::conflict_backoff;
use crate::resources::{ResourceGroup, ResourceGroupPatch};
use crate::validation::validate_resource_group;

pub mod operation;
pub mod serializer;

pub use operation::{Operation, OperationError, Target, Verb};
pub use serializer::UpdateSerializer;

pub struct Registry {
    repository: Arc<ResourceRepository>,
    attachments: PolicyAttachmentManager,
    serializer: UpdateSerializer,
    retries: RetryConfig,
}

impl Registry {
    pub fn new(repository: Arc<ResourceRepository>, attachments: PolicyAttachmentManager, retries: RetryConfig) -> Self {
        Self {
            repository,
            attachments,
            serializer: UpdateSerializer::new(),
            retries,
        }
    }

    pub fn repository(&self) -> &Arc<ResourceRepository> {
        &self.repository
    }

    /// Callers waiting for the mutation slot.
    pub fn queue_depth(&self) -> usize {
        self.serializer.queue_depth()
    }

    /// Run a named operation; the entry point of the HTTP surface.
    pub async fn execute(self: &Arc<Self>, operation: Operation, patch: ResourceGroupPatch) -> Result<(), RegistryError> {
        let started = Instant::now();
        let result = if operation.is_mutation() {
            self.update_detached(patch).await.map(|_| ())
        } else {
            self.validate(&patch).await
        };

        let outcome = match &result {
            Ok(()) => "success",
            Err(e) => e.kind(),
        };
        metrics::record_update(&operation.to_string(), outcome, started);
        if let Err(e) = &result {
            tracing::info!(operation = %operation, kind = e.kind(), error = %e, "Operation rejected");
        }
        result
    }

    /// Dry run against the latest snapshot. Advisory: not serialized with mutations.
    pub async fn validate(&self, patch: &ResourceGroupPatch) -> Result<(), RegistryError> {
        let (current, version) = self.repository.fetch_latest().await?;
        let candidate = patch.apply(&current)?;
        validate_resource_group(&candidate)?;

        let mut batch = self.attachments.stage(&current.policies, &candidate.policies).await?;
        batch.cleanup().await;

        tracing::debug!(version = %version, "Candidate validated");
        Ok(())
    }

    /// Apply `patch` and commit it. Retries the full cycle on version conflicts.
    pub async fn update(&self, patch: &ResourceGroupPatch) -> Result<VersionToken, RegistryError> {
        self.serializer
            .run(move || async move {
                let mut attempt = 0;
                loop {
                    attempt += 1;
                    let result = self.update_cycle(patch).await;
                    let Err(RegistryError::VersionConflict { expected }) = &result else {
                        return result;
                    };

                    metrics::record_version_conflict();
                    if attempt >= self.retries.max_attempts {
                        tracing::warn!(attempt, expected = %expected, "Version conflict; giving up");
                        return result;
                    }
                    let delay = conflict_backoff(attempt, &self.retries);
                    tracing::info!(attempt, expected = %expected, delay = ?delay, "Version conflict; retrying update");
                    tokio::time::sleep(delay).await;
                }
            })
            .await
    }

    /// [`Registry::update`] on its own task. Dropping the returned future
    /// does not cancel the cycle, so a commit is always followed by its persist.
    pub async fn update_detached(self: &Arc<Self>, patch: ResourceGroupPatch) -> Result<VersionToken, RegistryError> {
        let registry = Arc::clone(self);
        let cycle = tokio::spawn(async move { registry.update(&patch).await });
        match cycle.await {
            Ok(result) => result,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(_) => Err(RegistryError::Interrupted),
        }
    }

    /// Run the attachment reconciliation sweep inside the mutation slot.
    pub async fn reconcile(&self) -> Result<ReconcileReport, RegistryError> {
        self.serializer
            .run(move || reconcile_attachments(&self.repository, &self.attachments))
            .await
    }

    async fn update_cycle(&self, patch: &ResourceGroupPatch) -> Result<VersionToken, RegistryError> {
        let (current, token) = self.repository.fetch_latest().await?;
        let candidate = patch.apply(&current)?;
        validate_resource_group(&candidate)?;

        let mut batch = self.attachments.stage(&current.policies, &candidate.policies).await?;
        let result = self.commit(&candidate, &token, &mut batch).await;
        batch.cleanup().await;
        result
    }

    async fn commit(
        &self,
        candidate: &ResourceGroup,
        token: &VersionToken,
        batch: &mut AttachmentBatch,
    ) -> Result<VersionToken, RegistryError> {
        let committed = self.repository.update(candidate, token).await?;

        if let Err(e) = batch.persist(&self.repository).await {
            tracing::error!(
                version = %committed,
                error = %e,
                "Configuration committed but policy attachments were not fully persisted; reconciliation will repair them"
            );
            return Err(e);
        }
        Ok(committed)
    }
}

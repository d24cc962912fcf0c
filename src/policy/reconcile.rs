//! Reconciliation sweep for policy attachments.
//!
//! Heals the gap left when a cycle dies between commit and persist: persisted
//! attachments with no committed policy are removed, and committed policies
//! with no persisted attachment are regenerated. Attachments that exist but
//! lag their policy's content are not detected here; the policy's next
//! update rewrites them.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::error::RegistryError;
use crate::observability::metrics;
use crate::repository::ResourceRepository;
use crate::resources::Policy;

use super::attachments::{AttachmentBatch, PolicyAttachmentManager};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub regenerated: Vec<String>,
    pub removed: Vec<String>,
    /// Committed policies that failed to compile during the sweep.
    pub failed: Vec<String>,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.regenerated.is_empty() && self.removed.is_empty() && self.failed.is_empty()
    }
}

/// Bring persisted attachments in line with the committed policy set.
///
/// Must run inside the update serializer's slot.
pub async fn reconcile_attachments(
    repository: &ResourceRepository,
    manager: &PolicyAttachmentManager,
) -> Result<ReconcileReport, RegistryError> {
    let (group, version) = repository.fetch_latest().await?;

    let expected: BTreeMap<String, &Policy> = group
        .policies
        .iter()
        .filter_map(|p| {
            manager
                .attachment_filename(p.policy_type, &p.metadata)
                .map(|filename| (filename, p))
        })
        .collect();
    let persisted: BTreeSet<String> = repository.list_policy_attachments().await?.into_iter().collect();

    let mut report = ReconcileReport::default();
    let mut batch = AttachmentBatch::new(manager.scratch().clone());

    for (filename, policy) in &expected {
        if persisted.contains(filename) {
            continue;
        }
        match manager.generate(policy).await {
            Ok(Some(attachment)) => {
                batch.push_save(attachment);
                report.regenerated.push(filename.clone());
            }
            Ok(None) => {}
            Err(e) => {
                tracing::error!(error = %e, filename = %filename, "Committed policy failed to compile during reconciliation");
                report.failed.push(filename.clone());
            }
        }
    }

    let result = batch.persist(repository).await;
    batch.cleanup().await;
    result?;

    for filename in persisted.iter().filter(|f| !expected.contains_key(*f)) {
        repository.delete_policy_attachment(filename).await?;
        report.removed.push(filename.clone());
    }

    for _ in &report.regenerated {
        metrics::record_reconcile_action("regenerate");
    }
    for _ in &report.removed {
        metrics::record_reconcile_action("remove");
    }

    if report.is_clean() {
        tracing::debug!(version = %version, attachments = persisted.len(), "Policy attachments consistent");
    } else {
        tracing::info!(
            version = %version,
            regenerated = report.regenerated.len(),
            removed = report.removed.len(),
            failed = report.failed.len(),
            "Policy attachments reconciled"
        );
    }
    Ok(report)
}

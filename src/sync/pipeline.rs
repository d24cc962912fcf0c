//! Schema sync pipeline: snapshot → fragments → merged SDL → broadcast.

use tokio::sync::mpsc;

use crate::observability::metrics;
use crate::repository::ChangeSnapshot;
use crate::sync::broadcast::SchemaBroadcast;
use crate::validation::merge_and_print;

/// What one snapshot did to the published schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The snapshot carried no schema fragments.
    NoSchemas,
    /// Merged text equal to the current value.
    Unchanged,
    Published { sequence: u64 },
    /// Merge failed; the previous value stays published.
    MergeFailed,
}

pub struct SchemaSyncPipeline {
    broadcast: SchemaBroadcast,
}

impl SchemaSyncPipeline {
    pub fn new(broadcast: SchemaBroadcast) -> Self {
        Self { broadcast }
    }

    pub fn process(&self, snapshot: &ChangeSnapshot) -> SyncOutcome {
        let fragments = snapshot.content.schema_fragments();
        if fragments.is_empty() {
            tracing::debug!(version = %snapshot.version, "Snapshot has no schema fragments");
            return SyncOutcome::NoSchemas;
        }

        let sdl = match merge_and_print(&fragments) {
            Ok(sdl) => sdl,
            Err(e) => {
                metrics::record_schema_merge_failure();
                tracing::error!(
                    fatal = true,
                    version = %snapshot.version,
                    fragments = fragments.len(),
                    error = %e,
                    "Committed schema fragments failed to merge"
                );
                return SyncOutcome::MergeFailed;
            }
        };

        match self.broadcast.publish(snapshot.version.clone(), sdl) {
            Some(published) => SyncOutcome::Published {
                sequence: published.sequence,
            },
            None => SyncOutcome::Unchanged,
        }
    }

    /// Consume snapshots until the feed closes.
    pub async fn run(self, mut snapshots: mpsc::Receiver<ChangeSnapshot>) {
        tracing::info!("Schema sync pipeline started");
        while let Some(snapshot) = snapshots.recv().await {
            self.process(&snapshot);
        }
        tracing::info!("Schema sync pipeline stopped");
    }
}

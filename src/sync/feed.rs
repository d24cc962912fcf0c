//! Change feed: every committed version, eventually, in order.
//!
//! # Responsibilities
//! - Merge three triggers: in-process commit notifications, a periodic
//!   `fetch_latest` poll, and filesystem events on the resource file
//! - Forward a snapshot only when it supersedes the last forwarded one
//!
//! # Design Decisions
//! - Notifications are hints; the poll alone guarantees eventual delivery
//! - The watcher observes the parent directory because commits replace the
//!   file by rename

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{broadcast, mpsc};
use tokio::time::MissedTickBehavior;

use crate::repository::{ChangeSnapshot, ResourceRepository, VersionToken};

const SNAPSHOT_CHANNEL_CAPACITY: usize = 16;

pub struct ChangeFeed {
    repository: Arc<ResourceRepository>,
    poll_interval: Duration,
    watch_filesystem: bool,
}

impl ChangeFeed {
    pub fn new(repository: Arc<ResourceRepository>, poll_interval: Duration, watch_filesystem: bool) -> Self {
        Self {
            repository,
            poll_interval,
            watch_filesystem,
        }
    }

    /// Start the feed on the runtime. The receiver closes when `shutdown` fires.
    pub fn spawn(self, shutdown: broadcast::Receiver<()>) -> mpsc::Receiver<ChangeSnapshot> {
        let (tx, rx) = mpsc::channel(SNAPSHOT_CHANNEL_CAPACITY);
        tokio::spawn(self.run(tx, shutdown));
        rx
    }

    async fn run(self, tx: mpsc::Sender<ChangeSnapshot>, mut shutdown: broadcast::Receiver<()>) {
        let mut commits = self.repository.subscribe_commits();
        let (fs_tx, mut fs_rx) = mpsc::unbounded_channel();
        // Dropping the watcher stops the events; keep it for the feed's lifetime.
        let watcher = self.start_watcher(fs_tx);
        let watching = watcher.is_some();

        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut last: Option<VersionToken> = None;
        tracing::info!(poll_interval = ?self.poll_interval, watching, "Change feed started");

        loop {
            let snapshot = tokio::select! {
                _ = shutdown.recv() => break,
                commit = commits.recv() => match commit {
                    Ok(snapshot) => Some(snapshot),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::debug!(skipped, "Commit notifications lagged; fetching latest");
                        self.fetch().await
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                _ = ticker.tick() => self.fetch().await,
                Some(()) = fs_rx.recv(), if watching => {
                    tracing::debug!("Resource file changed on disk");
                    self.fetch().await
                }
            };

            let Some(snapshot) = snapshot else { continue };
            if !supersedes(&snapshot.version, last.as_ref()) {
                continue;
            }
            last = Some(snapshot.version.clone());
            tracing::debug!(version = %snapshot.version, "Forwarding snapshot");
            if tx.send(snapshot).await.is_err() {
                break;
            }
        }

        tracing::info!("Change feed stopped");
    }

    async fn fetch(&self) -> Option<ChangeSnapshot> {
        match self.repository.fetch_latest().await {
            Ok((content, version)) => Some(ChangeSnapshot {
                version,
                content: Arc::new(content),
            }),
            Err(e) => {
                tracing::warn!(error = %e, "Change feed failed to fetch latest configuration");
                None
            }
        }
    }

    fn start_watcher(&self, events: mpsc::UnboundedSender<()>) -> Option<RecommendedWatcher> {
        if !self.watch_filesystem {
            return None;
        }
        let path = self.repository.store().watch_path()?;
        match watch_resource_file(&path, events) {
            Ok(watcher) => {
                tracing::info!(path = %path.display(), "Watching resource file");
                Some(watcher)
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Filesystem watch unavailable; relying on polling");
                None
            }
        }
    }
}

/// Newer generation, or the same generation rewritten out of band.
fn supersedes(candidate: &VersionToken, last: Option<&VersionToken>) -> bool {
    match last {
        None => true,
        Some(last) => {
            candidate.generation > last.generation
                || (candidate.generation == last.generation && candidate.etag != last.etag)
        }
    }
}

fn watch_resource_file(path: &Path, events: mpsc::UnboundedSender<()>) -> notify::Result<RecommendedWatcher> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir)?;
    let file_name = path.file_name().map(|n| n.to_os_string());

    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| match res {
            Ok(event) => {
                let relevant = event.kind.is_modify() || event.kind.is_create() || event.kind.is_remove();
                let ours = event
                    .paths
                    .iter()
                    .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name);
                if relevant && ours {
                    let _ = events.send(());
                }
            }
            Err(e) => tracing::warn!(error = %e, "Watch error"),
        },
        Config::default(),
    )?;
    watcher.watch(&dir, RecursiveMode::NonRecursive)?;
    Ok(watcher)
}

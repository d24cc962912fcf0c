//! Replay-1 multicast of the merged schema.
//!
//! # Responsibilities
//! - Hold the last published value (`ArcSwapOption`, lock-free reads)
//! - Drop a publish whose text equals the current value
//! - Fan out new values to live subscribers over a bounded channel
//!
//! # Design Decisions
//! - Subscribers that fall behind skip straight to the latest value; nothing queues
//! - Every value carries a sequence number so replay and live delivery never repeat

use std::sync::{Arc, Mutex};

use arc_swap::ArcSwapOption;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

use crate::observability::metrics;
use crate::repository::VersionToken;

const LIVE_CHANNEL_CAPACITY: usize = 16;

/// One distinct merged schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishedSchema {
    /// Starts at 1 and grows by one per distinct value.
    pub sequence: u64,
    /// Committed version the value was merged from.
    pub version: VersionToken,
    pub sdl: String,
}

struct Inner {
    latest: ArcSwapOption<PublishedSchema>,
    live: broadcast::Sender<Arc<PublishedSchema>>,
    publish_lock: Mutex<()>,
}

#[derive(Clone)]
pub struct SchemaBroadcast {
    inner: Arc<Inner>,
}

impl SchemaBroadcast {
    pub fn new() -> Self {
        let (live, _) = broadcast::channel(LIVE_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                latest: ArcSwapOption::empty(),
                live,
                publish_lock: Mutex::new(()),
            }),
        }
    }

    /// Publish `sdl` unless it equals the current value. Returns the stored value when published.
    pub fn publish(&self, version: VersionToken, sdl: String) -> Option<Arc<PublishedSchema>> {
        let _guard = self.inner.publish_lock.lock().expect("publish lock poisoned");

        let current = self.inner.latest.load_full();
        if current.as_ref().is_some_and(|c| c.sdl == sdl) {
            tracing::debug!(version = %version, "Merged schema unchanged; not republished");
            return None;
        }

        let published = Arc::new(PublishedSchema {
            sequence: current.map_or(1, |c| c.sequence + 1),
            version,
            sdl,
        });
        self.inner.latest.store(Some(published.clone()));
        // No live subscribers is fine; late joiners get the replay.
        let _ = self.inner.live.send(published.clone());

        metrics::record_schema_publication();
        tracing::info!(
            sequence = published.sequence,
            version = %published.version,
            subscribers = self.inner.live.receiver_count(),
            "Merged schema published"
        );
        Some(published)
    }

    pub fn latest(&self) -> Option<Arc<PublishedSchema>> {
        self.inner.latest.load_full()
    }

    /// Receive the current value first (if any), then every later distinct value.
    pub fn subscribe(&self) -> SchemaSubscription {
        // Subscribe before reading the replay so nothing published in between is missed.
        let live = self.inner.live.subscribe();
        SchemaSubscription {
            replay: self.inner.latest.load_full(),
            live,
            last_seen: 0,
            inner: self.inner.clone(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.live.receiver_count()
    }
}

impl Default for SchemaBroadcast {
    fn default() -> Self {
        Self::new()
    }
}

pub struct SchemaSubscription {
    replay: Option<Arc<PublishedSchema>>,
    live: broadcast::Receiver<Arc<PublishedSchema>>,
    last_seen: u64,
    inner: Arc<Inner>,
}

impl SchemaSubscription {
    /// Next value this subscriber has not seen yet.
    pub async fn recv(&mut self) -> Option<Arc<PublishedSchema>> {
        if let Some(value) = self.replay.take() {
            self.last_seen = value.sequence;
            return Some(value);
        }

        loop {
            match self.live.recv().await {
                Ok(value) if value.sequence <= self.last_seen => continue,
                Ok(value) => {
                    self.last_seen = value.sequence;
                    return Some(value);
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "Schema subscriber lagged; jumping to latest");
                    if let Some(value) = self.inner.latest.load_full() {
                        if value.sequence > self.last_seen {
                            self.last_seen = value.sequence;
                            return Some(value);
                        }
                    }
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn version(generation: u64) -> VersionToken {
        VersionToken {
            generation,
            etag: Some(format!("e{}", generation)),
        }
    }

    #[tokio::test]
    async fn test_identical_text_is_published_once() {
        let broadcast = SchemaBroadcast::new();
        let mut sub = broadcast.subscribe();

        assert!(broadcast.publish(version(1), "type Query".into()).is_some());
        assert!(broadcast.publish(version(2), "type Query".into()).is_none());

        let first = sub.recv().await.unwrap();
        assert_eq!(first.sequence, 1);
        assert!(tokio::time::timeout(Duration::from_millis(50), sub.recv()).await.is_err());
    }

    #[tokio::test]
    async fn test_late_subscriber_gets_replay_then_live() {
        let broadcast = SchemaBroadcast::new();
        broadcast.publish(version(1), "a".into());

        let mut late = broadcast.subscribe();
        let replayed = late.recv().await.unwrap();
        assert_eq!(replayed.sdl, "a");

        broadcast.publish(version(2), "b".into());
        let next = late.recv().await.unwrap();
        assert_eq!((next.sequence, next.sdl.as_str()), (2, "b"));
    }

    #[tokio::test]
    async fn test_replayed_value_is_not_delivered_twice() {
        let broadcast = SchemaBroadcast::new();
        let mut sub = broadcast.subscribe();
        broadcast.publish(version(1), "a".into());

        // Subscribed before the publish: the value arrives live, not as replay.
        assert_eq!(sub.recv().await.unwrap().sequence, 1);

        let mut both = broadcast.subscribe();
        broadcast.publish(version(2), "b".into());
        assert_eq!(both.recv().await.unwrap().sequence, 1);
        assert_eq!(both.recv().await.unwrap().sequence, 2);
        assert!(tokio::time::timeout(Duration::from_millis(50), both.recv()).await.is_err());
    }

    #[tokio::test]
    async fn test_lagging_subscriber_jumps_to_latest() {
        let broadcast = SchemaBroadcast::new();
        let mut slow = broadcast.subscribe();

        for i in 1..=(LIVE_CHANNEL_CAPACITY as u64 + 5) {
            broadcast.publish(version(i), format!("v{}", i));
        }

        let value = slow.recv().await.unwrap();
        assert_eq!(value.sequence, LIVE_CHANNEL_CAPACITY as u64 + 5);
        assert_eq!(broadcast.latest().unwrap().sequence, value.sequence);
    }
}

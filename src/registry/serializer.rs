//! Single mutation slot for the shared aggregate.
//!
//! Waiters are served in arrival order (`tokio::sync::Mutex` is fair). The
//! slot is not reentrant: work running inside `run` must never call `run`
//! again.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Mutex;

use crate::observability::metrics;

#[derive(Debug, Default)]
pub struct UpdateSerializer {
    slot: Mutex<()>,
    waiting: AtomicUsize,
}

impl UpdateSerializer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `work` once every earlier caller has finished.
    pub async fn run<F, Fut, T>(&self, work: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let depth = self.waiting.fetch_add(1, Ordering::SeqCst) + 1;
        metrics::set_update_queue_depth(depth);

        let _guard = self.slot.lock().await;
        let depth = self.waiting.fetch_sub(1, Ordering::SeqCst) - 1;
        metrics::set_update_queue_depth(depth);

        work().await
    }

    /// Callers waiting for the slot (not counting the holder).
    pub fn queue_depth(&self) -> usize {
        self.waiting.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_work_is_serialized_in_arrival_order() {
        let serializer = Arc::new(UpdateSerializer::new());
        let log = Arc::new(std::sync::Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for i in 0..5 {
            let serializer = serializer.clone();
            let log = log.clone();
            handles.push(tokio::spawn(async move {
                serializer
                    .run(move || async move {
                        log.lock().unwrap().push(format!("start {}", i));
                        tokio::time::sleep(Duration::from_millis(5)).await;
                        log.lock().unwrap().push(format!("end {}", i));
                    })
                    .await;
            }));
            // Let each task reach the lock before spawning the next.
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let log = log.lock().unwrap();
        let expected: Vec<String> = (0..5)
            .flat_map(|i| [format!("start {}", i), format!("end {}", i)])
            .collect();
        assert_eq!(*log, expected);
        assert_eq!(serializer.queue_depth(), 0);
    }
}

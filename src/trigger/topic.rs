//! # Topic Workers
//!
//! One bounded queue and one consumer task per topic. Publishing never
//! waits: a full or closed queue is reported back immediately and the
//! message is dropped. Delivery is at-most-once and nothing is persisted,
//! so queued messages are lost if the process exits.
//!
//! Handlers are synchronous and run on the blocking pool. A failing
//! handler is logged and its message discarded; the worker keeps going.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use super::errors::{TriggerError, TriggerResult};

/// Error type handlers may return
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Consumes messages of one topic
pub trait TopicHandler<T>: Send + Sync + 'static {
    fn handle(&self, message: T) -> Result<(), HandlerError>;
}

/// Sending half of a topic
#[derive(Debug)]
pub struct Publisher<T> {
    topic: Arc<str>,
    tx: mpsc::Sender<T>,
}

impl<T> Clone for Publisher<T> {
    fn clone(&self) -> Self {
        Self {
            topic: Arc::clone(&self.topic),
            tx: self.tx.clone(),
        }
    }
}

impl<T: Send + 'static> Publisher<T> {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Enqueue without waiting for the worker
    pub fn publish(&self, message: T) -> TriggerResult<()> {
        match self.tx.try_send(message) {
            Ok(()) => {
                debug!(topic = %self.topic, "Published message");
                Ok(())
            }
            Err(TrySendError::Full(_)) => {
                warn!(topic = %self.topic, "Topic queue full, dropping message");
                Err(TriggerError::QueueFull(self.topic.to_string()))
            }
            Err(TrySendError::Closed(_)) => {
                error!(topic = %self.topic, "Topic worker stopped, dropping message");
                Err(TriggerError::Closed(self.topic.to_string()))
            }
        }
    }
}

/// Counters reported when a worker drains and exits
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WorkerStats {
    pub received: u64,
    pub handled: u64,
    pub failed: u64,
}

/// Start the consumer task for `topic`. The worker exits once every
/// publisher is dropped and the queue is drained.
///
/// Must be called from within a tokio runtime.
pub fn spawn_topic<T, H>(
    topic: &str,
    capacity: usize,
    handler: Arc<H>,
) -> (Publisher<T>, JoinHandle<WorkerStats>)
where
    T: Send + 'static,
    H: TopicHandler<T> + ?Sized,
{
    let (tx, mut rx) = mpsc::channel::<T>(capacity.max(1));
    let topic: Arc<str> = Arc::from(topic);
    let worker_topic = Arc::clone(&topic);

    let worker = tokio::spawn(async move {
        let mut stats = WorkerStats::default();
        while let Some(message) = rx.recv().await {
            stats.received += 1;
            let handler = Arc::clone(&handler);
            match tokio::task::spawn_blocking(move || handler.handle(message)).await {
                Ok(Ok(())) => {
                    stats.handled += 1;
                    debug!(topic = %worker_topic, "Handled message");
                }
                Ok(Err(e)) => {
                    stats.failed += 1;
                    error!(topic = %worker_topic, error = %e, "Handler failed, message discarded");
                }
                Err(e) => {
                    stats.failed += 1;
                    error!(topic = %worker_topic, error = %e, "Handler panicked, message discarded");
                }
            }
        }
        debug!(topic = %worker_topic, received = stats.received, "Topic worker stopped");
        stats
    });

    (Publisher { topic, tx }, worker)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Collect {
        seen: Mutex<Vec<u32>>,
    }

    impl TopicHandler<u32> for Collect {
        fn handle(&self, message: u32) -> Result<(), HandlerError> {
            if message % 2 == 1 {
                return Err(format!("odd message {}", message).into());
            }
            self.seen.lock().unwrap().push(message);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_worker_drains_and_survives_failures() {
        let handler = Arc::new(Collect::default());
        let (publisher, worker) = spawn_topic("numbers", 16, Arc::clone(&handler));

        for n in 0..6 {
            publisher.publish(n).unwrap();
        }
        drop(publisher);

        let stats = worker.await.unwrap();
        assert_eq!(
            stats,
            WorkerStats {
                received: 6,
                handled: 3,
                failed: 3
            }
        );
        assert_eq!(*handler.seen.lock().unwrap(), vec![0, 2, 4]);
    }

    struct Blocked;

    impl TopicHandler<u32> for Blocked {
        fn handle(&self, _: u32) -> Result<(), HandlerError> {
            std::thread::sleep(std::time::Duration::from_millis(200));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_full_queue_is_reported() {
        let (publisher, _worker) = spawn_topic("slow", 1, Arc::new(Blocked));

        let results: Vec<TriggerResult<()>> = (0..8).map(|n| publisher.publish(n)).collect();
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(TriggerError::QueueFull(_)))));
    }

    #[tokio::test]
    async fn test_closed_topic_is_reported() {
        let (publisher, worker) = spawn_topic("gone", 4, Arc::new(Blocked));
        worker.abort();
        let _ = worker.await;

        assert!(matches!(publisher.publish(1), Err(TriggerError::Closed(_))));
    }
}

//! In-memory message store for tests.
//!
//! Each `(topic, partition)` is an append-only vector; each
//! `(app, topic, partition)` keeps a read position, so apps consume
//! independently and a pull advances only its own app.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;

use super::{DataListener, MessageStore, PullRequest, PullResult};
use crate::error::{Error, Result};

#[derive(Default)]
pub struct InMemoryMessageStore {
    logs: DashMap<(String, i32), Vec<Bytes>>,
    /// (app, topic, partition) -> next index to read
    positions: DashMap<(String, String, i32), usize>,
    listener: Mutex<Option<Arc<dyn DataListener>>>,
    injected_failures: Mutex<VecDeque<Error>>,
    pulls: AtomicU64,
}

impl std::fmt::Debug for InMemoryMessageStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryMessageStore")
            .field("partitions", &self.logs.len())
            .field("pulls", &self.pull_count())
            .finish()
    }
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty partition so pulls without a partition visit it.
    pub fn create_partition(&self, topic: &str, partition: i32) {
        self.logs
            .entry((topic.to_string(), partition))
            .or_default();
    }

    /// Append a message and notify the listener.
    pub fn append(&self, topic: &str, partition: i32, message: impl Into<Bytes>) {
        self.logs
            .entry((topic.to_string(), partition))
            .or_default()
            .push(message.into());

        let listener = self
            .listener
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        if let Some(listener) = listener {
            listener.on_data(topic, partition);
        }
    }

    /// Append without notifying, to simulate data landing between a pull and
    /// a long-poll registration.
    pub fn append_silently(&self, topic: &str, partition: i32, message: impl Into<Bytes>) {
        self.logs
            .entry((topic.to_string(), partition))
            .or_default()
            .push(message.into());
    }

    /// Make the next pull fail with `error`.
    pub fn fail_next_pull(&self, error: Error) {
        self.injected_failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(error);
    }

    pub fn pull_count(&self) -> u64 {
        self.pulls.load(Ordering::SeqCst)
    }

    fn partitions_of(&self, topic: &str) -> Vec<i32> {
        let mut partitions: Vec<i32> = self
            .logs
            .iter()
            .filter(|entry| entry.key().0 == topic)
            .map(|entry| entry.key().1)
            .collect();
        partitions.sort_unstable();
        partitions
    }

    fn read_partition(
        &self,
        request: &PullRequest,
        partition: i32,
        budget_count: usize,
        budget_bytes: usize,
    ) -> Vec<Bytes> {
        let Some(log) = self.logs.get(&(request.topic.clone(), partition)) else {
            return Vec::new();
        };
        let mut position = self
            .positions
            .entry((request.app.clone(), request.topic.clone(), partition))
            .or_insert(0);

        let mut out = Vec::new();
        let mut bytes = 0usize;
        while *position < log.len() && out.len() < budget_count {
            let message = &log[*position];
            // always return at least one message, even if oversized
            if !out.is_empty() && bytes + message.len() > budget_bytes {
                break;
            }
            bytes += message.len();
            out.push(message.clone());
            *position += 1;
        }
        out
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn pull(&self, request: &PullRequest) -> Result<PullResult> {
        self.pulls.fetch_add(1, Ordering::SeqCst);

        let injected = self
            .injected_failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        if let Some(error) = injected {
            return Err(error);
        }

        let partitions = match request.partition {
            Some(p) => vec![p],
            None => self.partitions_of(&request.topic),
        };

        let mut buffers = Vec::new();
        for partition in partitions {
            let remaining_count = (request.count as usize).saturating_sub(buffers.len());
            if remaining_count == 0 {
                break;
            }
            let used: usize = buffers.iter().map(Bytes::len).sum();
            let remaining_bytes = request.max_bytes.saturating_sub(used);
            if remaining_bytes == 0 {
                break;
            }
            buffers.extend(self.read_partition(request, partition, remaining_count, remaining_bytes));
        }

        Ok(PullResult::with_buffers(buffers))
    }

    fn set_listener(&self, listener: Arc<dyn DataListener>) {
        *self.listener.lock().unwrap_or_else(|e| e.into_inner()) = Some(listener);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn request(app: &str, topic: &str, partition: Option<i32>, count: u16) -> PullRequest {
        PullRequest {
            consumer_id: format!("c_1_consumer_{app}_{topic}"),
            app: app.to_string(),
            topic: topic.to_string(),
            partition,
            count,
            max_bytes: 1024,
            ack_timeout: Duration::from_secs(30),
        }
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<(String, i32)>>);

    impl DataListener for Recorder {
        fn on_data(&self, topic: &str, partition: i32) {
            self.0.lock().unwrap().push((topic.to_string(), partition));
        }
    }

    #[tokio::test]
    async fn test_pull_advances_per_app() {
        let store = InMemoryMessageStore::new();
        store.append("orders", 0, "m1");
        store.append("orders", 0, "m2");

        let first = store.pull(&request("billing", "orders", None, 1)).await.unwrap();
        assert_eq!(first.buffers, vec![Bytes::from("m1")]);
        let second = store.pull(&request("billing", "orders", None, 10)).await.unwrap();
        assert_eq!(second.buffers, vec![Bytes::from("m2")]);
        assert!(store.pull(&request("billing", "orders", None, 10)).await.unwrap().is_empty());

        let other_app = store.pull(&request("audit", "orders", None, 10)).await.unwrap();
        assert_eq!(other_app.buffers.len(), 2);
    }

    #[tokio::test]
    async fn test_pull_spans_partitions_in_order() {
        let store = InMemoryMessageStore::new();
        store.append("orders", 1, "p1");
        store.append("orders", 0, "p0");

        let result = store.pull(&request("billing", "orders", None, 10)).await.unwrap();
        assert_eq!(result.buffers, vec![Bytes::from("p0"), Bytes::from("p1")]);

        store.append("orders", 1, "p1b");
        let only_zero = store.pull(&request("billing", "orders", Some(0), 10)).await.unwrap();
        assert!(only_zero.is_empty());
    }

    #[tokio::test]
    async fn test_pull_respects_max_bytes() {
        let store = InMemoryMessageStore::new();
        store.append("orders", 0, vec![0u8; 600]);
        store.append("orders", 0, vec![0u8; 600]);

        let result = store.pull(&request("billing", "orders", None, 10)).await.unwrap();
        assert_eq!(result.buffers.len(), 1);
    }

    #[tokio::test]
    async fn test_injected_failure_is_consumed_once() {
        let store = InMemoryMessageStore::new();
        store.fail_next_pull(Error::Storage("disk on fire".into()));

        assert!(store.pull(&request("billing", "orders", None, 1)).await.is_err());
        assert!(store.pull(&request("billing", "orders", None, 1)).await.is_ok());
        assert_eq!(store.pull_count(), 2);
    }

    #[test]
    fn test_listener_notified_on_append_only() {
        let store = InMemoryMessageStore::new();
        let recorder = Arc::new(Recorder::default());
        store.set_listener(recorder.clone());

        store.append("orders", 2, "m");
        store.append_silently("orders", 3, "m");

        assert_eq!(*recorder.0.lock().unwrap(), vec![("orders".to_string(), 2)]);
    }
}

//! The message-queue broker abstraction (spec §4.1).
//!
//! `spec.md` treats the broker as a black box: "a message-queue broker
//! providing FIFO per-named-queue push/pop with TTL". `original_source`
//! backs this with Redis (`lpush`+`expire` / `rpop`-with-poll); this crate
//! expresses the same contract as a `Broker` trait so `MessageQueue` never
//! hard-wires a transport, and ships one implementation, `InMemoryBroker`,
//! used by the single-process server and by every test.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::sync::Mutex;

use crate::error::BrokerError;

/// Default queue TTL (spec §4.1, §6): idle queues self-collect after 300s.
pub const DEFAULT_QUEUE_TTL: Duration = Duration::from_secs(300);

/// FIFO-per-named-queue push/pop with TTL, the minimal contract every
/// `MessageQueue` needs from its transport.
#[async_trait::async_trait]
pub trait Broker: Send + Sync {
    /// Appends `value` to the left of `queue`, refreshing its TTL.
    async fn push(&self, queue: &str, value: Value) -> Result<(), BrokerError>;

    /// Pops one value from the right of `queue`, if present, without
    /// blocking. Returns `Ok(None)` for an empty (or expired/absent) queue.
    async fn try_pop(&self, queue: &str) -> Result<Option<Value>, BrokerError>;

    /// Current queue depth, for diagnostics and tests.
    async fn len(&self, queue: &str) -> usize;
}

struct Entry {
    items: VecDeque<Value>,
    expires_at: Instant,
}

/// An in-process broker backed by a mutex-guarded map of `VecDeque`s. TTL is
/// enforced lazily: an expired queue is treated as empty and dropped on next
/// touch, matching the Redis `EXPIRE` semantics this stands in for.
pub struct InMemoryBroker {
    queues: Mutex<HashMap<String, Entry>>,
    ttl: Duration,
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_TTL)
    }
}

impl InMemoryBroker {
    pub fn new(ttl: Duration) -> Self {
        Self {
            queues: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    fn is_live(entry: &Entry) -> bool {
        Instant::now() < entry.expires_at
    }
}

#[async_trait::async_trait]
impl Broker for InMemoryBroker {
    async fn push(&self, queue: &str, value: Value) -> Result<(), BrokerError> {
        let mut queues = self.queues.lock().await;
        let entry = queues.entry(queue.to_string()).or_insert_with(|| Entry {
            items: VecDeque::new(),
            expires_at: Instant::now() + self.ttl,
        });
        if !Self::is_live(entry) {
            entry.items.clear();
        }
        entry.items.push_front(value);
        entry.expires_at = Instant::now() + self.ttl;
        Ok(())
    }

    async fn try_pop(&self, queue: &str) -> Result<Option<Value>, BrokerError> {
        let mut queues = self.queues.lock().await;
        let Some(entry) = queues.get_mut(queue) else {
            return Ok(None);
        };
        if !Self::is_live(entry) {
            queues.remove(queue);
            return Ok(None);
        }
        Ok(entry.items.pop_back())
    }

    async fn len(&self, queue: &str) -> usize {
        let queues = self.queues.lock().await;
        queues
            .get(queue)
            .filter(|e| Self::is_live(e))
            .map(|e| e.items.len())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn push_then_pop_is_fifo() {
        let broker = InMemoryBroker::default();
        broker.push("q", json!(1)).await.unwrap();
        broker.push("q", json!(2)).await.unwrap();
        assert_eq!(broker.try_pop("q").await.unwrap(), Some(json!(1)));
        assert_eq!(broker.try_pop("q").await.unwrap(), Some(json!(2)));
        assert_eq!(broker.try_pop("q").await.unwrap(), None);
    }

    #[tokio::test]
    async fn expired_queue_behaves_as_empty() {
        let broker = InMemoryBroker::new(Duration::from_millis(10));
        broker.push("q", json!("hi")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(broker.try_pop("q").await.unwrap(), None);
    }

    #[tokio::test]
    async fn len_reports_live_depth() {
        let broker = InMemoryBroker::default();
        assert_eq!(broker.len("q").await, 0);
        broker.push("q", json!(1)).await.unwrap();
        broker.push("q", json!(2)).await.unwrap();
        assert_eq!(broker.len("q").await, 2);
    }
}

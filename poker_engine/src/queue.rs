//! `MessageQueue` and `Channel` (spec §4.1), built over any `Broker`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::Value;

use crate::broker::Broker;
use crate::error::{BrokerError, ChannelError};

/// Poll interval for the cooperative `recv` loop (spec §9 "cooperative recv
/// loop"): a deliberate portability choice over a blocking-pop primitive.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// A single named FIFO queue over a shared broker.
#[derive(Clone)]
pub struct MessageQueue {
    broker: Arc<dyn Broker>,
    name: String,
}

impl MessageQueue {
    pub fn new(broker: Arc<dyn Broker>, name: impl Into<String>) -> Self {
        Self {
            broker,
            name: name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Serializes `msg` to JSON and pushes it, refreshing the queue's TTL.
    pub async fn push(&self, msg: &impl Serialize) -> Result<(), BrokerError> {
        let value = serde_json::to_value(msg)
            .map_err(|e| BrokerError::Transport(format!("encode failure: {e}")))?;
        self.broker.push(&self.name, value).await
    }

    /// Polls for a message until `deadline`, sleeping `POLL_INTERVAL` between
    /// attempts. Fails with `Timeout` once the deadline passes.
    pub async fn pop(&self, deadline: Instant) -> Result<Value, ChannelError> {
        loop {
            if let Some(value) = self.broker.try_pop(&self.name).await? {
                return Ok(value);
            }
            if Instant::now() >= deadline {
                return Err(ChannelError::Timeout);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

/// Pairs two named queues, labeled *in* and *out* from one party's view; the
/// counterparty binds them swapped (spec §4.1).
#[derive(Clone)]
pub struct Channel {
    pub inbound: MessageQueue,
    pub outbound: MessageQueue,
}

impl Channel {
    pub fn new(inbound: MessageQueue, outbound: MessageQueue) -> Self {
        Self { inbound, outbound }
    }

    /// Naming convention from spec §6: `poker:player-{pid}:session-{sid}:{I|O}`.
    pub fn named(broker: Arc<dyn Broker>, player_id: &str, session_id: &str) -> Self {
        let inbound = MessageQueue::new(
            broker.clone(),
            format!("poker:player-{player_id}:session-{session_id}:I"),
        );
        let outbound = MessageQueue::new(
            broker,
            format!("poker:player-{player_id}:session-{session_id}:O"),
        );
        Self::new(inbound, outbound)
    }

    /// The other end of [`Channel::named`]'s pair: this party's inbound is
    /// the room's outbound queue and vice versa. Used by the WebSocket edge
    /// to bind the same two named queues the room already holds, without
    /// routing traffic through the room's own `Channel` value.
    pub fn counterpart(broker: Arc<dyn Broker>, player_id: &str, session_id: &str) -> Self {
        let server = Self::named(broker, player_id, session_id);
        Self::new(server.outbound, server.inbound)
    }

    pub async fn send(&self, msg: &impl Serialize) -> Result<(), BrokerError> {
        self.outbound.push(msg).await
    }

    pub async fn recv(&self, deadline: Instant) -> Result<Value, ChannelError> {
        let value = self.inbound.pop(deadline).await?;
        if value.get("type").and_then(Value::as_str) == Some("disconnect") {
            return Err(ChannelError::Disconnected);
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::InMemoryBroker;
    use serde_json::json;

    #[tokio::test]
    async fn channel_send_is_visible_to_counterparty_recv() {
        let broker: Arc<dyn Broker> = Arc::new(InMemoryBroker::default());
        let server = Channel::named(broker.clone(), "p1", "s1");
        // The counterparty binds the same two queues swapped.
        let client = Channel::new(server.outbound.clone(), server.inbound.clone());

        server.send(&json!({"type": "ping"})).await.unwrap();
        let got = client
            .recv(Instant::now() + Duration::from_millis(50))
            .await
            .unwrap();
        assert_eq!(got["type"], "ping");
    }

    #[tokio::test]
    async fn recv_times_out_on_empty_queue() {
        let broker: Arc<dyn Broker> = Arc::new(InMemoryBroker::default());
        let channel = Channel::named(broker, "p1", "s1");
        let err = channel
            .recv(Instant::now() + Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::Timeout));
    }

    #[tokio::test]
    async fn disconnect_envelope_surfaces_as_channel_error() {
        let broker: Arc<dyn Broker> = Arc::new(InMemoryBroker::default());
        let server = Channel::named(broker.clone(), "p1", "s1");
        let client = Channel::new(server.outbound.clone(), server.inbound.clone());
        client.send(&json!({"type": "disconnect"})).await.unwrap();
        let err = server
            .recv(Instant::now() + Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::Disconnected));
    }
}

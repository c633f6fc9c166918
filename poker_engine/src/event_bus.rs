//! Fan-out of engine events to seated endpoints (spec §4.7), grounded in
//! `GameEventDispatcher`/`GameSubscriber` (`original_source/poker/poker_game.py`,
//! `game_room.py`): the engine raises events without knowing who is
//! listening, and a subscriber decides whether and how to deliver each one.

use std::sync::Arc;

use async_trait::async_trait;

use crate::messages::OutboundEvent;

/// Something that wants to observe every event a hand raises. `Room`
/// implements this to turn events into `Channel::send` calls (broadcast, or
/// targeted when [`OutboundEvent::target`] names a single recipient) and to
/// append them to its replay log.
#[async_trait]
pub trait GameSubscriber: Send + Sync {
    async fn on_event(&self, event: &OutboundEvent);
}

/// Dispatches each raised event to every registered subscriber, in
/// registration order. A hand (or anything else producing events) holds one
/// `EventBus` and never talks to subscribers directly.
#[derive(Default)]
pub struct EventBus {
    subscribers: Vec<Arc<dyn GameSubscriber>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, subscriber: Arc<dyn GameSubscriber>) {
        self.subscribers.push(subscriber);
    }

    /// Delivers `event` to every subscriber in turn. Subscribers are
    /// expected not to panic; a slow subscriber delays the rest, matching
    /// the teacher's single-threaded dispatch loop rather than racing them.
    pub async fn raise(&self, event: OutboundEvent) {
        for subscriber in &self.subscribers {
            subscriber.on_event(&event).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Recorder(Mutex<Vec<String>>);

    #[async_trait]
    impl GameSubscriber for Recorder {
        async fn on_event(&self, event: &OutboundEvent) {
            self.0.lock().unwrap().push(format!("{event:?}"));
        }
    }

    #[tokio::test]
    async fn raise_delivers_to_every_subscriber() {
        let a = Arc::new(Recorder(Mutex::new(Vec::new())));
        let b = Arc::new(Recorder(Mutex::new(Vec::new())));
        let mut bus = EventBus::new();
        bus.subscribe(a.clone());
        bus.subscribe(b.clone());

        bus.raise(OutboundEvent::NewGame {
            game_id: "g1".into(),
        })
        .await;

        assert_eq!(a.0.lock().unwrap().len(), 1);
        assert_eq!(b.0.lock().unwrap().len(), 1);
    }
}

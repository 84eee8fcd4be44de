//! In-memory loopback transport backed by `tokio::sync::broadcast`, used
//! for tests and the CLI's local submit/status path.
//!
//! One broadcast channel per literal topic plus one per wildcard pattern
//! subscribed to, held in `DashMap`s so any number of tasks can subscribe
//! or publish concurrently without a lock around the whole table. A
//! publish fans out to its exact-topic channel (if any) and to every
//! wildcard channel whose pattern matches, mirroring NATS subject
//! matching closely enough for [`crate::topics`]'s wildcard subjects.

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::warn;

use super::{is_wildcard_pattern, topic_matches, Bus, BusMessage, Subscription};
use crate::error::DispatchResult;

/// Exact-topic channels plus a separate table of wildcard-pattern channels,
/// so a `drivers/*/location` subscriber receives publishes to
/// `drivers/d1/location`, `drivers/d2/location`, etc. — the same subject
/// matching a NATS subscription gets natively.
#[derive(Debug)]
pub struct InMemoryBus {
    channels: DashMap<String, broadcast::Sender<BusMessage>>,
    patterns: DashMap<String, broadcast::Sender<BusMessage>>,
    capacity: usize,
}

impl InMemoryBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: DashMap::new(),
            patterns: DashMap::new(),
            capacity,
        }
    }

    fn sender_for(&self, topic: &str) -> broadcast::Sender<BusMessage> {
        self.channels
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }

    fn pattern_sender_for(&self, pattern: &str) -> broadcast::Sender<BusMessage> {
        self.patterns
            .entry(pattern.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new(8192)
    }
}

#[async_trait]
impl Bus for InMemoryBus {
    async fn publish(&self, topic: &str, payload: &[u8]) -> DispatchResult<()> {
        let msg = BusMessage {
            topic: topic.to_string(),
            payload: payload.to_vec(),
        };
        // No receivers yet is not an error: at-least-once delivery only
        // applies to subscribers that exist at publish time.
        if let Some(sender) = self.channels.get(topic) {
            let _ = sender.send(msg.clone());
        }
        for entry in self.patterns.iter() {
            if topic_matches(entry.key(), topic) {
                let _ = entry.value().send(msg.clone());
            }
        }
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> DispatchResult<Box<dyn Subscription>> {
        let receiver = if is_wildcard_pattern(topic) {
            self.pattern_sender_for(topic).subscribe()
        } else {
            self.sender_for(topic).subscribe()
        };
        Ok(Box::new(MemorySubscription {
            topic: topic.to_string(),
            receiver,
        }))
    }
}

struct MemorySubscription {
    topic: String,
    receiver: broadcast::Receiver<BusMessage>,
}

#[async_trait]
impl Subscription for MemorySubscription {
    async fn recv(&mut self) -> Option<BusMessage> {
        loop {
            match self.receiver.recv().await {
                Ok(msg) => return Some(msg),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(topic = %self.topic, skipped, "subscriber lagged, oldest messages dropped");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

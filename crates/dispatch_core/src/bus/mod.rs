//! Pub/sub transport abstraction for the bus topics the engine publishes
//! and subscribes to.
//!
//! A trait-object transport with a byte-payload publish/subscribe surface,
//! retried with backoff, so the engine never depends on a concrete broker
//! client directly — [`InMemoryBus`] for tests and local runs,
//! [`NatsBus`] in production.

mod memory;
mod nats;
mod payload;

pub use memory::InMemoryBus;
pub use nats::NatsBus;
pub use payload::{JobResultPayload, JobStatusPayload, SolicitationPayload};

use async_trait::async_trait;

use crate::error::DispatchResult;

/// One message received from a subscription: the topic it arrived on and
/// its raw JSON payload.
#[derive(Debug, Clone)]
pub struct BusMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// An active subscription. `recv` suspends until a message arrives or the
/// subscription is closed.
#[async_trait]
pub trait Subscription: Send {
    async fn recv(&mut self) -> Option<BusMessage>;
}

/// Opaque pub/sub transport. Implementations retry publish with the
/// exponential backoff in [`crate::config::BusRetryConfig`] and buffer
/// subscribers up to `subscriber_buffer`, discarding the oldest message on
/// overflow with a logged warning.
#[async_trait]
pub trait Bus: Send + Sync {
    async fn publish(&self, topic: &str, payload: &[u8]) -> DispatchResult<()>;

    async fn subscribe(&self, topic: &str) -> DispatchResult<Box<dyn Subscription>>;
}

/// Publishes a JSON-serializable payload to `topic`, per the dual-format
/// convention (legacy and canonical field names populated by the caller
/// before this is invoked).
pub async fn publish_json<T: serde::Serialize + Sync>(bus: &dyn Bus, topic: &str, value: &T) -> DispatchResult<()> {
    let bytes = serde_json::to_vec(value).map_err(|e| crate::error::DispatchError::Publish {
        topic: topic.to_string(),
        source: anyhow::anyhow!(e),
    })?;
    bus.publish(topic, &bytes).await
}

/// True if `topic` is a wildcard subscribe pattern rather than a literal
/// topic, using NATS subject syntax: `*` matches exactly one `/`-delimited
/// token, `>` matches one or more trailing tokens and must be the last one.
pub fn is_wildcard_pattern(topic: &str) -> bool {
    topic.split('/').any(|segment| segment == "*" || segment == ">")
}

/// Matches a published `topic` against a NATS-style subscribe `pattern`.
pub fn topic_matches(pattern: &str, topic: &str) -> bool {
    let mut p = pattern.split('/');
    let mut t = topic.split('/');
    loop {
        match (p.next(), t.next()) {
            (Some(">"), Some(_)) => return true,
            (Some(">"), None) => return false,
            (Some("*"), Some(_)) => continue,
            (Some(pseg), Some(tseg)) => {
                if pseg != tseg {
                    return false;
                }
            }
            (None, None) => return true,
            _ => return false,
        }
    }
}

#[cfg(test)]
mod pattern_tests {
    use super::topic_matches;

    #[test]
    fn single_token_wildcard_matches_one_segment() {
        assert!(topic_matches("drivers/*/location", "drivers/d1/location"));
        assert!(!topic_matches("drivers/*/location", "drivers/d1/sub/location"));
    }

    #[test]
    fn trailing_wildcard_matches_remaining_segments() {
        assert!(topic_matches("pubs/requests/>", "pubs/requests/j1"));
        assert!(topic_matches("pubs/requests/>", "pubs/requests/j1/extra"));
        assert!(!topic_matches("pubs/requests/>", "pubs/requests"));
    }

    #[test]
    fn literal_pattern_requires_exact_match() {
        assert!(topic_matches("taxi/bookings", "taxi/bookings"));
        assert!(!topic_matches("taxi/bookings", "taxi/bookings/extra"));
    }
}

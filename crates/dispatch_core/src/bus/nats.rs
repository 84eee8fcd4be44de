//! Production `Bus` transport backed by `async-nats`.
//!
//! Retries publish with exponential backoff (250ms ->
//! 1s -> 4s, 3 attempts) before surfacing [`DispatchError::Publish`].

use async_trait::async_trait;
use futures::StreamExt;
use tracing::{debug, warn};

use super::{Bus, BusMessage, Subscription};
use crate::config::BusRetryConfig;
use crate::error::{DispatchError, DispatchResult};

pub struct NatsBus {
    client: async_nats::Client,
    retry: BusRetryConfig,
}

impl NatsBus {
    pub async fn connect(url: &str, retry: BusRetryConfig) -> DispatchResult<Self> {
        let client = async_nats::connect(url)
            .await
            .map_err(|e| DispatchError::Subscribe {
                topic: "<connect>".to_string(),
                source: anyhow::anyhow!(e),
            })?;
        Ok(Self { client, retry })
    }
}

#[async_trait]
impl Bus for NatsBus {
    async fn publish(&self, topic: &str, payload: &[u8]) -> DispatchResult<()> {
        let mut delay = self.retry.base_delay;
        let mut last_err = None;
        for attempt in 1..=self.retry.max_attempts {
            match self
                .client
                .publish(topic.to_string(), payload.to_vec().into())
                .await
            {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!(topic, attempt, error = %e, "bus publish attempt failed");
                    last_err = Some(e);
                    if attempt < self.retry.max_attempts {
                        tokio::time::sleep(delay).await;
                        delay *= self.retry.backoff_factor;
                    }
                }
            }
        }
        Err(DispatchError::Publish {
            topic: topic.to_string(),
            source: anyhow::anyhow!(last_err.expect("at least one attempt made")),
        })
    }

    async fn subscribe(&self, topic: &str) -> DispatchResult<Box<dyn Subscription>> {
        let subscriber = self
            .client
            .subscribe(topic.to_string())
            .await
            .map_err(|e| DispatchError::Subscribe {
                topic: topic.to_string(),
                source: anyhow::anyhow!(e),
            })?;
        debug!(topic, "subscribed");
        Ok(Box::new(NatsSubscription { inner: subscriber }))
    }
}

struct NatsSubscription {
    inner: async_nats::Subscriber,
}

#[async_trait]
impl Subscription for NatsSubscription {
    async fn recv(&mut self) -> Option<BusMessage> {
        // `msg.subject` is the concrete subject the message arrived on,
        // which differs from the subscribed pattern for wildcard subjects
        // (e.g. `drivers/*/location` subscribed, `drivers/d1/location`
        // received).
        self.inner.next().await.map(|msg| BusMessage {
            topic: msg.subject.to_string(),
            payload: msg.payload.to_vec(),
        })
    }
}

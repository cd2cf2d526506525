//! NATS JetStream adapter for the event bus port.
//!
//! Records publish to `{topic}.{key}` inside one stream covering
//! `platform.kernel.>`, so every aggregate gets its own subject and
//! per-aggregate ordering holds end to end. The outbox idempotency key
//! travels as `Nats-Msg-Id`, letting the broker drop duplicate republishes
//! inside its dedupe window. The ack sequence is reported as the offset;
//! a JetStream stream has a single logical partition.

use std::future::IntoFuture;
use std::time::Duration;

use async_nats::jetstream::{self, Context};
use async_trait::async_trait;
use serde_json::Value;
use tokio::time::timeout;
use tracing::{debug, info};

use crate::domain::ports::{EventBus, EventBusError, PublishReceipt};

/// Bus adapter configuration.
#[derive(Debug, Clone)]
pub struct BusConfig {
    nats_url: String,
    stream_name: String,
    subjects: Vec<String>,
    max_age: Duration,
    publish_timeout: Duration,
}

impl BusConfig {
    /// Create a configuration with the given NATS URL.
    ///
    /// Defaults: stream `platform-kernel` over `platform.kernel.>`,
    /// 7 day message age limit, 10 second publish timeout.
    pub fn new(nats_url: impl Into<String>) -> Self {
        Self {
            nats_url: nats_url.into(),
            stream_name: "platform-kernel".to_owned(),
            subjects: vec!["platform.kernel.>".to_owned()],
            max_age: Duration::from_secs(7 * 24 * 60 * 60),
            publish_timeout: Duration::from_secs(10),
        }
    }

    /// Override the stream name and subject filter.
    pub fn with_stream(mut self, name: impl Into<String>, subjects: Vec<String>) -> Self {
        self.stream_name = name.into();
        self.subjects = subjects;
        self
    }

    /// Override the per-publish timeout.
    pub fn with_publish_timeout(mut self, timeout: Duration) -> Self {
        self.publish_timeout = timeout;
        self
    }
}

/// JetStream-backed implementation of the `EventBus` port.
pub struct JetStreamEventBus {
    jetstream: Context,
    publish_timeout: Duration,
}

impl JetStreamEventBus {
    /// Connect to NATS and ensure the event stream exists with the
    /// configured subjects.
    pub async fn new(config: BusConfig) -> Result<Self, EventBusError> {
        info!(url = %config.nats_url, "connecting to NATS");
        let client = timeout(Duration::from_secs(5), async_nats::connect(&config.nats_url))
            .await
            .map_err(|_| EventBusError::transient("timed out connecting to NATS"))?
            .map_err(|err| EventBusError::transient(err.to_string()))?;
        let jetstream = jetstream::new(client);

        let stream_config = jetstream::stream::Config {
            name: config.stream_name.clone(),
            subjects: config.subjects.clone(),
            max_age: config.max_age,
            ..Default::default()
        };

        match jetstream.get_stream(&config.stream_name).await {
            Ok(mut existing) => {
                let info = existing
                    .info()
                    .await
                    .map_err(|err| EventBusError::transient(err.to_string()))?;
                if info.config.subjects != config.subjects {
                    info!(stream = %config.stream_name, "updating stream subjects");
                    jetstream
                        .update_stream(stream_config)
                        .await
                        .map_err(|err| EventBusError::permanent(err.to_string()))?;
                }
            }
            Err(_) => {
                info!(stream = %config.stream_name, "creating stream");
                jetstream
                    .create_stream(stream_config)
                    .await
                    .map_err(|err| EventBusError::permanent(err.to_string()))?;
            }
        }

        Ok(Self {
            jetstream,
            publish_timeout: config.publish_timeout,
        })
    }
}

#[async_trait]
impl EventBus for JetStreamEventBus {
    async fn publish(
        &self,
        topic: &str,
        key: &str,
        payload: &Value,
        dedupe_key: &str,
    ) -> Result<PublishReceipt, EventBusError> {
        let subject = format!("{topic}.{key}");
        let bytes = serde_json::to_vec(payload)
            .map_err(|err| EventBusError::permanent(format!("unserialisable payload: {err}")))?;

        let mut headers = async_nats::HeaderMap::new();
        headers.insert("Nats-Msg-Id", dedupe_key);

        let ack_future = timeout(
            self.publish_timeout,
            self.jetstream
                .publish_with_headers(subject.clone(), headers, bytes.into()),
        )
        .await
        .map_err(|_| EventBusError::transient("timed out sending to NATS"))?
        .map_err(|err| EventBusError::transient(err.to_string()))?;

        let ack = timeout(self.publish_timeout, ack_future.into_future())
            .await
            .map_err(|_| EventBusError::transient("timed out waiting for publish ack"))?
            .map_err(|err| EventBusError::transient(err.to_string()))?;

        debug!(%subject, sequence = ack.sequence, duplicate = ack.duplicate, "published");
        Ok(PublishReceipt {
            topic: topic.to_owned(),
            partition: 0,
            offset: ack.sequence as i64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn config_defaults_cover_the_kernel_subject_space() {
        let config = BusConfig::new("nats://localhost:4222");
        assert_eq!(config.stream_name, "platform-kernel");
        assert_eq!(config.subjects, ["platform.kernel.>"]);
        assert_eq!(config.publish_timeout, Duration::from_secs(10));
    }

    #[rstest]
    fn builders_override_stream_and_timeout() {
        let config = BusConfig::new("nats://localhost:4222")
            .with_stream("events", vec!["events.>".to_owned()])
            .with_publish_timeout(Duration::from_secs(2));
        assert_eq!(config.stream_name, "events");
        assert_eq!(config.publish_timeout, Duration::from_secs(2));
    }
}

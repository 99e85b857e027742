//! Redpanda event bus for lab order events.
//!
//! [`RedpandaEventBus`] implements the [`EventBus`] trait from `lab-orders-core` on top of an
//! rdkafka [`FutureProducer`], so it works against Redpanda or any other Kafka-compatible broker.
//!
//! # Message layout
//!
//! | Part     | Content                                          |
//! |----------|--------------------------------------------------|
//! | topic    | the event type, e.g. `critical.alert`            |
//! | key      | the order id, so one order's events stay ordered |
//! | payload  | the JSON envelope, unchanged                     |
//! | header   | `event_type`, for consumers that route on it     |
//!
//! # Delivery
//!
//! A publish resolves once the broker acknowledges the message (per the configured `acks`) or
//! the send timeout expires. With the default `acks=all` an acknowledged critical event has
//! reached every in-sync replica.
//!
//! # Example
//!
//! ```no_run
//! use lab_orders_redpanda::RedpandaEventBus;
//! use std::time::Duration;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let event_bus = RedpandaEventBus::builder()
//!     .brokers("localhost:9092")
//!     .producer_acks("all")
//!     .compression("lz4")
//!     .timeout(Duration::from_secs(5))
//!     .build()?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use lab_orders_core::event::SerializedEvent;
use lab_orders_core::event_bus::{EventBus, EventBusError, PublishFuture};
use rdkafka::config::ClientConfig;
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use std::time::{Duration, Instant};

/// Header carrying the event type on every message.
pub const EVENT_TYPE_HEADER: &str = "event_type";

const DEFAULT_ACKS: &str = "all";
const DEFAULT_COMPRESSION: &str = "none";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Kafka-compatible event bus.
///
/// # Example
///
/// ```no_run
/// use lab_orders_redpanda::RedpandaEventBus;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let event_bus = RedpandaEventBus::new("localhost:9092")?;
/// # Ok(())
/// # }
/// ```
pub struct RedpandaEventBus {
    /// Kafka producer for publishing events
    producer: FutureProducer,
    /// Broker addresses
    brokers: String,
    /// Send timeout
    timeout: Duration,
}

impl RedpandaEventBus {
    /// Create a bus with default settings.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::ConnectionFailed`] if the producer cannot be created.
    pub fn new(brokers: &str) -> Result<Self, EventBusError> {
        Self::builder().brokers(brokers).build()
    }

    /// Create a new builder for configuring the event bus.
    #[must_use]
    pub fn builder() -> RedpandaEventBusBuilder {
        RedpandaEventBusBuilder::default()
    }

    /// Get a reference to the brokers string.
    #[must_use]
    pub fn brokers(&self) -> &str {
        &self.brokers
    }

    /// The send timeout in effect.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn send(&self, topic: &str, event: &SerializedEvent) -> Result<(), EventBusError> {
        if topic.trim().is_empty() {
            return Err(EventBusError::InvalidTopic(
                "topic name must not be blank".to_string(),
            ));
        }

        let headers = OwnedHeaders::new().insert(Header {
            key: EVENT_TYPE_HEADER,
            value: Some(event.event_type.as_str()),
        });
        let record = FutureRecord::to(topic)
            .payload(&event.data)
            .key(&event.key)
            .headers(headers);

        let started = Instant::now();
        let send_result = self
            .producer
            .send(record, Timeout::After(self.timeout))
            .await;
        metrics::histogram!("lab_orders.redpanda.send_duration_seconds", "topic" => topic.to_string())
            .record(started.elapsed().as_secs_f64());

        match send_result {
            Ok((partition, offset)) => {
                tracing::debug!(
                    topic = %topic,
                    partition = partition,
                    offset = offset,
                    key = %event.key,
                    event_type = %event.event_type,
                    "Event published"
                );
                Ok(())
            },
            Err((kafka_error, _)) => {
                tracing::error!(
                    topic = %topic,
                    key = %event.key,
                    error = %kafka_error,
                    "Failed to publish event"
                );
                Err(classify_send_error(topic, &kafka_error))
            },
        }
    }
}

/// Map a producer error onto the bus taxonomy.
fn classify_send_error(topic: &str, error: &KafkaError) -> EventBusError {
    match error.rdkafka_error_code() {
        Some(
            RDKafkaErrorCode::UnknownTopicOrPartition
            | RDKafkaErrorCode::UnknownTopic
            | RDKafkaErrorCode::InvalidTopic,
        ) => EventBusError::InvalidTopic(topic.to_string()),
        Some(
            RDKafkaErrorCode::AllBrokersDown
            | RDKafkaErrorCode::BrokerTransportFailure
            | RDKafkaErrorCode::MessageTimedOut,
        ) => EventBusError::TransportError(format!("{topic}: {error}")),
        _ => EventBusError::PublishFailed {
            topic: topic.to_string(),
            reason: error.to_string(),
        },
    }
}

/// Builder for configuring a [`RedpandaEventBus`].
#[derive(Default)]
pub struct RedpandaEventBusBuilder {
    brokers: Option<String>,
    producer_acks: Option<String>,
    compression: Option<String>,
    timeout: Option<Duration>,
    client_id: Option<String>,
}

impl RedpandaEventBusBuilder {
    /// Set the broker addresses (comma-separated, e.g. `"localhost:9092"`).
    #[must_use]
    pub fn brokers(mut self, brokers: impl Into<String>) -> Self {
        self.brokers = Some(brokers.into());
        self
    }

    /// Set the producer acknowledgment mode.
    ///
    /// - `acks`: "0" (no acks), "1" (leader ack), "all" (all replicas ack)
    ///
    /// Default: "all"
    #[must_use]
    pub fn producer_acks(mut self, acks: impl Into<String>) -> Self {
        self.producer_acks = Some(acks.into());
        self
    }

    /// Set the compression codec: "none", "gzip", "snappy", "lz4" or "zstd".
    ///
    /// Default: "none"
    #[must_use]
    pub fn compression(mut self, compression: impl Into<String>) -> Self {
        self.compression = Some(compression.into());
        self
    }

    /// Set the producer send timeout.
    ///
    /// Default: 5 seconds
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the client id reported to the broker.
    #[must_use]
    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Build the [`RedpandaEventBus`].
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::ConnectionFailed`] if:
    /// - Brokers not set
    /// - Cannot create producer
    /// - Invalid configuration
    pub fn build(self) -> Result<RedpandaEventBus, EventBusError> {
        let brokers = self
            .brokers
            .filter(|b| !b.trim().is_empty())
            .ok_or_else(|| EventBusError::ConnectionFailed("Brokers not configured".to_string()))?;
        let timeout = self.timeout.unwrap_or(DEFAULT_TIMEOUT);
        let acks = self.producer_acks.as_deref().unwrap_or(DEFAULT_ACKS);
        let compression = self.compression.as_deref().unwrap_or(DEFAULT_COMPRESSION);

        let mut producer_config = ClientConfig::new();
        producer_config
            .set("bootstrap.servers", &brokers)
            .set("message.timeout.ms", timeout.as_millis().to_string())
            .set("acks", acks)
            .set("compression.type", compression);
        if let Some(client_id) = &self.client_id {
            producer_config.set("client.id", client_id);
        }

        let producer: FutureProducer = producer_config.create().map_err(|e| {
            EventBusError::ConnectionFailed(format!("Failed to create producer: {e}"))
        })?;

        tracing::info!(
            brokers = %brokers,
            acks = acks,
            compression = compression,
            timeout_ms = timeout.as_millis(),
            "RedpandaEventBus created"
        );

        Ok(RedpandaEventBus {
            producer,
            brokers,
            timeout,
        })
    }
}

impl EventBus for RedpandaEventBus {
    fn publish<'a>(&'a self, topic: &'a str, event: &'a SerializedEvent) -> PublishFuture<'a> {
        Box::pin(self.send(topic, event))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn redpanda_event_bus_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<RedpandaEventBus>();
        assert_sync::<RedpandaEventBus>();
    }

    #[test]
    fn build_requires_brokers() {
        let result = RedpandaEventBus::builder().build();
        assert!(matches!(result, Err(EventBusError::ConnectionFailed(_))));

        let blank = RedpandaEventBus::builder().brokers("  ").build();
        assert!(matches!(blank, Err(EventBusError::ConnectionFailed(_))));
    }

    #[test]
    fn build_does_not_contact_the_broker() {
        // librdkafka connects lazily; an unreachable address still yields a producer.
        let bus = RedpandaEventBus::builder()
            .brokers("127.0.0.1:1")
            .timeout(Duration::from_millis(250))
            .build()
            .unwrap();
        assert_eq!(bus.brokers(), "127.0.0.1:1");
        assert_eq!(bus.timeout(), Duration::from_millis(250));
    }

    #[test]
    fn unknown_topics_are_reported_as_invalid() {
        let err = classify_send_error(
            "critical.alert",
            &KafkaError::MessageProduction(RDKafkaErrorCode::UnknownTopicOrPartition),
        );
        assert_eq!(err, EventBusError::InvalidTopic("critical.alert".to_string()));
    }

    #[test]
    fn timeouts_are_transport_errors() {
        let err = classify_send_error(
            "result.available",
            &KafkaError::MessageProduction(RDKafkaErrorCode::MessageTimedOut),
        );
        assert!(matches!(err, EventBusError::TransportError(_)));
    }

    #[test]
    fn other_rejections_are_publish_failures() {
        let err = classify_send_error(
            "order.created",
            &KafkaError::MessageProduction(RDKafkaErrorCode::MessageSizeTooLarge),
        );
        assert!(matches!(
            err,
            EventBusError::PublishFailed { ref topic, .. } if topic == "order.created"
        ));
    }

    #[tokio::test]
    async fn blank_topic_is_rejected_before_sending() {
        let bus = RedpandaEventBus::new("127.0.0.1:1").unwrap();
        let event = SerializedEvent::new("order.created".into(), "k".into(), b"{}".to_vec());

        let result = bus.publish(" ", &event).await;
        assert!(matches!(result, Err(EventBusError::InvalidTopic(_))));
    }
}

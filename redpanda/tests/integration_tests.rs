//! Integration tests for [`RedpandaEventBus`] against a real Kafka-compatible broker.
//!
//! # Running These Tests
//!
//! These tests are marked as `#[ignore]` by default because they require Docker (for
//! testcontainers) and take a while to start the broker. To run explicitly:
//!
//! ```bash
//! cargo test -p lab-orders-redpanda --test integration_tests -- --ignored
//! ```

#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use futures::StreamExt;
use lab_orders_core::event::SerializedEvent;
use lab_orders_core::event_bus::EventBus;
use lab_orders_redpanda::{EVENT_TYPE_HEADER, RedpandaEventBus};
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::{Headers, Message};
use std::time::Duration;
use testcontainers::ImageExt;
use testcontainers::runners::AsyncRunner;
use testcontainers_modules::kafka::{KAFKA_PORT, Kafka};

fn envelope(event_type: &str, key: &str) -> SerializedEvent {
    let data = serde_json::json!({
        "eventId": uuid::Uuid::new_v4(),
        "eventType": event_type,
        "aggregateId": key,
    });
    SerializedEvent::new(
        event_type.to_string(),
        key.to_string(),
        serde_json::to_vec(&data).expect("encode"),
    )
}

/// Publish warmup events until the broker accepts them, creating the topic on the way.
async fn wait_for_topic(bus: &RedpandaEventBus, topic: &str) {
    let warmup = envelope("warmup", "warmup");
    for attempt in 1..=60 {
        if bus.publish(topic, &warmup).await.is_ok() {
            tokio::time::sleep(Duration::from_secs(2)).await;
            return;
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(attempt != 60, "Broker never accepted a publish to {topic}");
    }
}

fn consumer(brokers: &str, topic: &str) -> StreamConsumer {
    let consumer: StreamConsumer = ClientConfig::new()
        .set("bootstrap.servers", brokers)
        .set("group.id", format!("lab-orders-test-{}", uuid::Uuid::new_v4()))
        .set("auto.offset.reset", "earliest")
        .set("enable.partition.eof", "false")
        .create()
        .expect("Failed to create consumer");
    consumer.subscribe(&[topic]).expect("Failed to subscribe");
    consumer
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_publish_keys_by_order_and_tags_event_type() {
    let kafka = Kafka::default()
        .with_env_var("KAFKA_AUTO_CREATE_TOPICS_ENABLE", "true")
        .start()
        .await
        .expect("Failed to start Kafka container");

    let host = kafka.get_host().await.expect("Failed to get host");
    let port = kafka
        .get_host_port_ipv4(KAFKA_PORT)
        .await
        .expect("Failed to get port");
    let brokers = format!("{host}:{port}");

    let bus = RedpandaEventBus::builder()
        .brokers(&brokers)
        .producer_acks("all")
        .build()
        .expect("Failed to create event bus");
    wait_for_topic(&bus, "critical.alert").await;

    let order_id = uuid::Uuid::new_v4().to_string();
    let event = envelope("critical.alert", &order_id);
    bus.publish("critical.alert", &event)
        .await
        .expect("Failed to publish");

    let consumer = consumer(&brokers, "critical.alert");
    let mut stream = consumer.stream();

    let received = tokio::time::timeout(Duration::from_secs(30), async {
        while let Some(message) = stream.next().await {
            let message = message.expect("Failed to receive");
            if message.key() == Some(order_id.as_bytes()) {
                return message.detach();
            }
        }
        panic!("Consumer stream ended");
    })
    .await
    .expect("Timeout waiting for the event");

    assert_eq!(received.payload(), Some(event.data.as_slice()));
    let headers = received.headers().expect("headers present");
    let header = headers.get(0);
    assert_eq!(header.key, EVENT_TYPE_HEADER);
    assert_eq!(header.value, Some("critical.alert".as_bytes()));
}

//! Recording event bus.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)]

use lab_orders_core::event::{EventEnvelope, EventType, SerializedEvent};
use lab_orders_core::event_bus::{EventBus, EventBusError, PublishFuture};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// A message accepted by [`InMemoryEventBus`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublishedEvent {
    /// Topic it was published to
    pub topic: String,
    /// The encoded envelope
    pub event: SerializedEvent,
}

/// [`EventBus`] that records every publish and can be told to reject a topic.
///
/// # Example
///
/// ```
/// use lab_orders_testing::InMemoryEventBus;
/// use lab_orders_core::event::SerializedEvent;
/// use lab_orders_core::event_bus::EventBus;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let bus = InMemoryEventBus::new();
/// let event = SerializedEvent::new("order.created".into(), "key".into(), b"{}".to_vec());
/// bus.publish("order.created", &event).await?;
/// assert_eq!(bus.published().len(), 1);
///
/// bus.fail_topic("order.created");
/// assert!(bus.publish("order.created", &event).await.is_err());
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemoryEventBus {
    published: Arc<Mutex<Vec<PublishedEvent>>>,
    failing_topics: Arc<Mutex<HashSet<String>>>,
    attempts: Arc<Mutex<usize>>,
}

impl InMemoryEventBus {
    /// Create an empty bus that accepts everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every publish to `topic` until [`Self::recover_topic`].
    pub fn fail_topic(&self, topic: &str) {
        self.failing_topics.lock().unwrap().insert(topic.to_string());
    }

    /// Accept publishes to `topic` again.
    pub fn recover_topic(&self, topic: &str) {
        self.failing_topics.lock().unwrap().remove(topic);
    }

    /// Every accepted publish, oldest first.
    #[must_use]
    pub fn published(&self) -> Vec<PublishedEvent> {
        self.published.lock().unwrap().clone()
    }

    /// Publish calls made, including rejected ones.
    #[must_use]
    pub fn attempts(&self) -> usize {
        *self.attempts.lock().unwrap()
    }

    /// Decoded envelopes of every accepted publish.
    #[must_use]
    pub fn envelopes(&self) -> Vec<EventEnvelope> {
        self.published()
            .iter()
            .map(|p| EventEnvelope::from_serialized(&p.event).unwrap())
            .collect()
    }

    /// Decoded envelopes of one event type.
    #[must_use]
    pub fn envelopes_of(&self, event_type: EventType) -> Vec<EventEnvelope> {
        self.envelopes()
            .into_iter()
            .filter(|e| e.event_type == event_type)
            .collect()
    }

    /// Number of accepted publishes of one event type.
    #[must_use]
    pub fn count(&self, event_type: EventType) -> usize {
        self.envelopes_of(event_type).len()
    }

    /// Forget everything published so far.
    pub fn clear(&self) {
        self.published.lock().unwrap().clear();
        *self.attempts.lock().unwrap() = 0;
    }
}

impl EventBus for InMemoryEventBus {
    fn publish<'a>(&'a self, topic: &'a str, event: &'a SerializedEvent) -> PublishFuture<'a> {
        Box::pin(async move {
            *self
                .attempts
                .lock()
                .map_err(|_| EventBusError::TransportError("bus lock poisoned".into()))? += 1;

            let failing = self
                .failing_topics
                .lock()
                .map_err(|_| EventBusError::TransportError("bus lock poisoned".into()))?
                .contains(topic);
            if failing {
                return Err(EventBusError::PublishFailed {
                    topic: topic.to_string(),
                    reason: "topic configured to fail".to_string(),
                });
            }

            self.published
                .lock()
                .map_err(|_| EventBusError::TransportError("bus lock poisoned".into()))?
                .push(PublishedEvent {
                    topic: topic.to_string(),
                    event: event.clone(),
                });
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rejected_publishes_are_counted_but_not_recorded() {
        let bus = InMemoryEventBus::new();
        let event = SerializedEvent::new("critical.alert".into(), "k".into(), b"{}".to_vec());

        bus.fail_topic("critical.alert");
        assert!(bus.publish("critical.alert", &event).await.is_err());
        bus.recover_topic("critical.alert");
        bus.publish("critical.alert", &event).await.unwrap();

        assert_eq!(bus.attempts(), 2);
        assert_eq!(bus.published().len(), 1);
        assert_eq!(bus.published()[0].topic, "critical.alert");
    }
}

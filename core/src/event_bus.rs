//! Event bus abstraction and the two publishing capabilities built on it.
//!
//! [`EventBus`] is the raw transport: it moves a [`SerializedEvent`] onto a topic. The lifecycle
//! service never sees it directly. It holds one of two capabilities instead:
//!
//! - [`CriticalEventPublisher`] returns a `Result`; the caller must handle a failed publish.
//! - [`AuditEventPublisher`] returns nothing; failures are logged and counted by the
//!   implementation.
//!
//! # Delivery
//!
//! - **At-most-once after commit**: events are published after the store transaction commits,
//!   so a crash or bus outage in between loses the event. Required publishes report the failure
//!   to the caller, who retries the operation. A transactional outbox would close the gap and
//!   is not built yet.
//! - **Fresh ids**: every publish gets a new `eventId`, so a retried operation can announce the
//!   same change twice under different ids
//! - **Ordered per order**: envelopes are keyed by aggregate id
//!
//! # Implementations
//!
//! - `InMemoryEventBus` (in `lab-orders-testing`): records publishes, can be told to fail
//! - `RedpandaEventBus` (in `lab-orders-redpanda`): Kafka-compatible production bus
//! - `BusEventPublisher` (in `lab-orders-runtime`): implements both capabilities over any bus

use crate::event::{AuditEvent, DomainEvent, SerializedEvent};
use crate::types::UserId;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors that can occur during event bus operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventBusError {
    /// Failed to connect to the event bus
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Failed to publish an event to a topic
    #[error("Publish failed for topic '{topic}': {reason}")]
    PublishFailed {
        /// The topic that failed
        topic: String,
        /// The reason for failure
        reason: String,
    },

    /// The event could not be encoded into an envelope
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    /// Topic not found or invalid
    #[error("Invalid topic: {0}")]
    InvalidTopic(String),

    /// Network or transport error
    #[error("Transport error: {0}")]
    TransportError(String),
}

/// Boxed future returned by bus operations.
pub type PublishFuture<'a> = Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + 'a>>;

/// Raw transport for serialized envelopes.
///
/// # Dyn Compatibility
///
/// This trait uses explicit `Pin<Box<dyn Future>>` returns instead of `async fn`
/// so it can be shared as `Arc<dyn EventBus>`.
pub trait EventBus: Send + Sync {
    /// Publish an event to a topic.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::PublishFailed`] if the broker rejects or never acknowledges
    /// the message.
    fn publish<'a>(&'a self, topic: &'a str, event: &'a SerializedEvent) -> PublishFuture<'a>;
}

/// Publishing for events downstream state depends on.
pub trait CriticalEventPublisher: Send + Sync {
    /// Wrap `event` in an envelope and publish it to its topic.
    ///
    /// # Errors
    ///
    /// Returns an [`EventBusError`] if encoding or publishing fails. Callers surface this as
    /// a transient dependency failure.
    fn publish_critical<'a>(
        &'a self,
        event: &'a DomainEvent,
        acting_user: Option<UserId>,
    ) -> PublishFuture<'a>;
}

/// Fire-and-forget publishing for audit trail events.
pub trait AuditEventPublisher: Send + Sync {
    /// Wrap `event` in an envelope and publish it, swallowing any failure.
    fn publish_audit<'a>(
        &'a self,
        event: &'a AuditEvent,
        acting_user: Option<UserId>,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_failures_name_the_topic() {
        let err = EventBusError::PublishFailed {
            topic: "critical.alert".into(),
            reason: "broker unavailable".into(),
        };
        assert_eq!(
            err.to_string(),
            "Publish failed for topic 'critical.alert': broker unavailable"
        );
    }
}

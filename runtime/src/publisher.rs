//! Envelope publishing over an [`EventBus`].
//!
//! [`BusEventPublisher`] implements both capabilities. The lifecycle service is handed the
//! same instance twice, once as `Arc<dyn CriticalEventPublisher>` and once as
//! `Arc<dyn AuditEventPublisher>`; which trait it calls through decides whether a failure
//! reaches the caller.

use crate::metrics::PublishMetrics;
use lab_orders_core::environment::Clock;
use lab_orders_core::event::{
    AuditEvent, DomainEvent, EnvelopeContext, EventEnvelope, LabEvent,
};
use lab_orders_core::event_bus::{
    AuditEventPublisher, CriticalEventPublisher, EventBus, EventBusError, PublishFuture,
};
use lab_orders_core::types::UserId;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

/// Publishes lab events as JSON envelopes, one topic per event type.
#[derive(Clone)]
pub struct BusEventPublisher {
    bus: Arc<dyn EventBus>,
    clock: Arc<dyn Clock>,
    origin_portal: String,
}

impl BusEventPublisher {
    /// Create a publisher stamping `origin_portal` on every envelope.
    #[must_use]
    pub fn new(bus: Arc<dyn EventBus>, clock: Arc<dyn Clock>, origin_portal: impl Into<String>) -> Self {
        Self {
            bus,
            clock,
            origin_portal: origin_portal.into(),
        }
    }

    async fn send<E: LabEvent + Sync>(
        &self,
        event: &E,
        acting_user: Option<UserId>,
    ) -> Result<(), EventBusError> {
        let event_type = event.event_type();
        let context = EnvelopeContext::new(self.origin_portal.clone(), acting_user);
        let envelope = EventEnvelope::wrap(event, &context, self.clock.now())
            .map_err(|e| EventBusError::SerializationFailed(e.to_string()))?;
        let serialized = envelope
            .to_serialized()
            .map_err(|e| EventBusError::SerializationFailed(e.to_string()))?;

        let started = Instant::now();
        self.bus.publish(event_type.topic(), &serialized).await?;
        PublishMetrics::record_publish(event_type, started.elapsed());

        tracing::debug!(
            event_type = %event_type,
            event_id = %envelope.event_id,
            aggregate_id = %envelope.aggregate_id,
            "Event published"
        );
        Ok(())
    }
}

impl CriticalEventPublisher for BusEventPublisher {
    fn publish_critical<'a>(
        &'a self,
        event: &'a DomainEvent,
        acting_user: Option<UserId>,
    ) -> PublishFuture<'a> {
        Box::pin(async move {
            self.send(event, acting_user).await.inspect_err(|e| {
                PublishMetrics::record_publish_error(event.event_type(), "critical");
                tracing::error!(
                    event_type = %event.event_type(),
                    aggregate_id = %event.aggregate_id(),
                    error = %e,
                    "Failed to publish domain event"
                );
            })
        })
    }
}

impl AuditEventPublisher for BusEventPublisher {
    fn publish_audit<'a>(
        &'a self,
        event: &'a AuditEvent,
        acting_user: Option<UserId>,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            if let Err(e) = self.send(event, acting_user).await {
                PublishMetrics::record_publish_error(event.event_type(), "audit");
                tracing::warn!(
                    event_type = %event.event_type(),
                    aggregate_id = %event.aggregate_id(),
                    error = %e,
                    "Dropped audit event"
                );
            }
        })
    }
}

//! Event schemas and the envelope they travel in.
//!
//! Events are split into two families so the type system decides how a publish failure is
//! handled:
//!
//! - [`DomainEvent`]: `order.created`, `result.available`, `critical.alert`. Consumers build
//!   their own state from these, so a failed publish fails the request.
//! - [`AuditEvent`]: `record.accessed`. Read-access trail; a failed publish is logged and
//!   dropped so it can never block a read.
//!
//! Every event is wrapped in an [`EventEnvelope`] and published to the topic named by its
//! event type. Envelopes are JSON so that consumers in any language can read them.
//!
//! # Example
//!
//! ```
//! use lab_orders_core::event::{EnvelopeContext, EventEnvelope, EventType};
//! use lab_orders_core::event::{AuditEvent, RecordAccessed};
//! use lab_orders_core::types::{OrderId, OrderNumber, PatientId, UserId};
//! use chrono::Utc;
//!
//! let event = AuditEvent::RecordAccessed(RecordAccessed {
//!     order_id: OrderId::new(),
//!     order_number: OrderNumber::new("LAB-261019093012-0042"),
//!     patient_id: PatientId::new(),
//!     accessed_by: UserId::new(),
//! });
//! let context = EnvelopeContext::new("lab-portal", None);
//! let envelope = EventEnvelope::wrap(&event, &context, Utc::now()).unwrap();
//! assert_eq!(envelope.event_type, EventType::RecordAccessed);
//! ```

use crate::types::{
    AbnormalFlag, EncounterId, LabOrder, LabTest, OrderId, OrderNumber, PatientId, Priority,
    TestId, UserId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Aggregate type recorded on every envelope.
pub const AGGREGATE_TYPE: &str = "LabOrder";

/// Error types for event operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventError {
    /// Failed to serialize event to bytes.
    #[error("Failed to serialize event: {0}")]
    SerializationError(String),

    /// Failed to deserialize event from bytes.
    #[error("Failed to deserialize event: {0}")]
    DeserializationError(String),
}

/// Event type identifiers. Each is also the topic the event is published to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    /// An order and its tests were created
    #[serde(rename = "order.created")]
    OrderCreated,
    /// Every test on an order has a result
    #[serde(rename = "result.available")]
    ResultAvailable,
    /// A result was flagged CRITICAL
    #[serde(rename = "critical.alert")]
    CriticalAlert,
    /// An order was read by a user
    #[serde(rename = "record.accessed")]
    RecordAccessed,
}

impl EventType {
    /// Wire name and topic.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::OrderCreated => "order.created",
            Self::ResultAvailable => "result.available",
            Self::CriticalAlert => "critical.alert",
            Self::RecordAccessed => "record.accessed",
        }
    }

    /// Topic the event is published to.
    #[must_use]
    pub const fn topic(&self) -> &'static str {
        self.as_str()
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Payloads
// ============================================================================

/// A requested test as described in `order.created`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestedTest {
    /// Test identifier
    pub test_id: TestId,
    /// Coded identifier
    pub test_code: String,
    /// Display name
    pub test_name: String,
    /// Specimen type
    pub specimen_type: Option<String>,
}

impl From<&LabTest> for RequestedTest {
    fn from(test: &LabTest) -> Self {
        Self {
            test_id: test.id,
            test_code: test.test_code.clone(),
            test_name: test.test_name.clone(),
            specimen_type: test.specimen_type.clone(),
        }
    }
}

/// Payload of `order.created`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCreated {
    /// Order identifier
    pub order_id: OrderId,
    /// Order number
    pub order_number: OrderNumber,
    /// Patient
    pub patient_id: PatientId,
    /// Ordering provider
    pub provider_id: UserId,
    /// Encounter
    pub encounter_id: EncounterId,
    /// Urgency
    pub priority: Priority,
    /// Clinical notes
    pub clinical_notes: Option<String>,
    /// Requested tests
    pub tests: Vec<RequestedTest>,
}

impl From<&LabOrder> for OrderCreated {
    fn from(order: &LabOrder) -> Self {
        Self {
            order_id: order.id,
            order_number: order.order_number.clone(),
            patient_id: order.patient_id,
            provider_id: order.provider_id,
            encounter_id: order.encounter_id,
            priority: order.priority,
            clinical_notes: order.clinical_notes.clone(),
            tests: order.tests.iter().map(RequestedTest::from).collect(),
        }
    }
}

/// Payload of `result.available`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultAvailable {
    /// Order identifier
    pub order_id: OrderId,
    /// Order number
    pub order_number: OrderNumber,
    /// Patient
    pub patient_id: PatientId,
    /// Ordering provider
    pub provider_id: UserId,
    /// Any test is CRITICAL
    pub critical_values: bool,
    /// Any result is flagged other than NORMAL
    pub abnormal_results: bool,
    /// Tests in COMPLETED or CRITICAL status
    pub completed_tests: usize,
    /// Tests on the order
    pub total_tests: usize,
    /// When the order became ready
    pub resulted_at: Option<DateTime<Utc>>,
}

impl From<&LabOrder> for ResultAvailable {
    fn from(order: &LabOrder) -> Self {
        Self {
            order_id: order.id,
            order_number: order.order_number.clone(),
            patient_id: order.patient_id,
            provider_id: order.provider_id,
            critical_values: order.has_critical_values(),
            abnormal_results: order.has_abnormal_results(),
            completed_tests: order.tests.iter().filter(|t| t.status.is_terminal()).count(),
            total_tests: order.tests.len(),
            resulted_at: order.resulted_at,
        }
    }
}

/// Payload of `critical.alert`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CriticalAlert {
    /// Order identifier
    pub order_id: OrderId,
    /// Order number
    pub order_number: OrderNumber,
    /// Patient
    pub patient_id: PatientId,
    /// Patient display name, `None` when the directory lookup failed
    pub patient_name: Option<String>,
    /// Provider to notify
    pub provider_id: UserId,
    /// Test identifier
    pub test_id: TestId,
    /// Coded identifier
    pub test_code: String,
    /// Display name
    pub test_name: String,
    /// Result value
    pub value: String,
    /// Unit
    pub unit: String,
    /// Reference range
    pub reference_range: Option<String>,
    /// Flag (always CRITICAL today)
    pub abnormal_flag: AbnormalFlag,
    /// Human-readable reason
    pub reason: String,
}

impl CriticalAlert {
    /// Build the alert for `test_id` on `order`.
    ///
    /// Returns `None` if the test is not on the order or has no result.
    #[must_use]
    pub fn for_test(order: &LabOrder, test_id: TestId, patient_name: Option<String>) -> Option<Self> {
        let test = order.test(test_id)?;
        let result = test.result.as_ref()?;

        let mut reason = format!(
            "Critical value for {} ({}): {} {}",
            test.test_name, test.test_code, result.value, result.unit
        );
        if let Some(range) = &result.reference_range {
            reason.push_str(&format!(" (reference range {range})"));
        }

        Some(Self {
            order_id: order.id,
            order_number: order.order_number.clone(),
            patient_id: order.patient_id,
            patient_name,
            provider_id: order.provider_id,
            test_id,
            test_code: test.test_code.clone(),
            test_name: test.test_name.clone(),
            value: result.value.clone(),
            unit: result.unit.clone(),
            reference_range: result.reference_range.clone(),
            abnormal_flag: result.abnormal_flag,
            reason: reason.trim_end().to_string(),
        })
    }
}

/// Payload of `record.accessed`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordAccessed {
    /// Order identifier
    pub order_id: OrderId,
    /// Order number
    pub order_number: OrderNumber,
    /// Patient whose record was read
    pub patient_id: PatientId,
    /// Reader
    pub accessed_by: UserId,
}

// ============================================================================
// Event families
// ============================================================================

/// Behaviour shared by both event families.
pub trait LabEvent {
    /// Event type (and topic).
    fn event_type(&self) -> EventType;

    /// Order the event is about.
    fn aggregate_id(&self) -> OrderId;

    /// Payload as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::SerializationError`] if the payload cannot be encoded.
    fn payload(&self) -> Result<serde_json::Value, EventError>;
}

fn to_value<T: Serialize>(payload: &T) -> Result<serde_json::Value, EventError> {
    serde_json::to_value(payload).map_err(|e| EventError::SerializationError(e.to_string()))
}

/// Events whose publication must succeed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DomainEvent {
    /// `order.created`
    OrderCreated(OrderCreated),
    /// `result.available`
    ResultAvailable(ResultAvailable),
    /// `critical.alert`
    CriticalAlert(CriticalAlert),
}

impl LabEvent for DomainEvent {
    fn event_type(&self) -> EventType {
        match self {
            Self::OrderCreated(_) => EventType::OrderCreated,
            Self::ResultAvailable(_) => EventType::ResultAvailable,
            Self::CriticalAlert(_) => EventType::CriticalAlert,
        }
    }

    fn aggregate_id(&self) -> OrderId {
        match self {
            Self::OrderCreated(e) => e.order_id,
            Self::ResultAvailable(e) => e.order_id,
            Self::CriticalAlert(e) => e.order_id,
        }
    }

    fn payload(&self) -> Result<serde_json::Value, EventError> {
        match self {
            Self::OrderCreated(e) => to_value(e),
            Self::ResultAvailable(e) => to_value(e),
            Self::CriticalAlert(e) => to_value(e),
        }
    }
}

/// Events published fire-and-forget.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuditEvent {
    /// `record.accessed`
    RecordAccessed(RecordAccessed),
}

impl LabEvent for AuditEvent {
    fn event_type(&self) -> EventType {
        match self {
            Self::RecordAccessed(_) => EventType::RecordAccessed,
        }
    }

    fn aggregate_id(&self) -> OrderId {
        match self {
            Self::RecordAccessed(e) => e.order_id,
        }
    }

    fn payload(&self) -> Result<serde_json::Value, EventError> {
        match self {
            Self::RecordAccessed(e) => to_value(e),
        }
    }
}

// ============================================================================
// Envelope
// ============================================================================

/// Who caused an event and through which portal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnvelopeContext {
    /// Portal the request came through, e.g. `lab-portal`
    pub origin_portal: String,
    /// Acting user, if known
    pub acting_user_id: Option<UserId>,
}

impl EnvelopeContext {
    /// Create a context.
    #[must_use]
    pub fn new(origin_portal: impl Into<String>, acting_user_id: Option<UserId>) -> Self {
        Self {
            origin_portal: origin_portal.into(),
            acting_user_id,
        }
    }
}

/// Structured message published to the bus.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    /// Fresh for every publish
    pub event_id: Uuid,
    /// Event type
    pub event_type: EventType,
    /// Order the event is about
    pub aggregate_id: OrderId,
    /// Always [`AGGREGATE_TYPE`]
    pub aggregate_type: String,
    /// When the envelope was created
    pub timestamp: DateTime<Utc>,
    /// Acting user
    pub acting_user_id: Option<UserId>,
    /// Originating portal
    pub origin_portal: String,
    /// Kind-specific payload
    pub payload: serde_json::Value,
}

impl EventEnvelope {
    /// Wrap an event with a fresh event id.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::SerializationError`] if the payload cannot be encoded.
    pub fn wrap<E: LabEvent + ?Sized>(
        event: &E,
        context: &EnvelopeContext,
        timestamp: DateTime<Utc>,
    ) -> Result<Self, EventError> {
        Ok(Self {
            event_id: Uuid::new_v4(),
            event_type: event.event_type(),
            aggregate_id: event.aggregate_id(),
            aggregate_type: AGGREGATE_TYPE.to_string(),
            timestamp,
            acting_user_id: context.acting_user_id,
            origin_portal: context.origin_portal.clone(),
            payload: event.payload()?,
        })
    }

    /// Encode for the bus. The key is the aggregate id so one order's events stay ordered.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::SerializationError`] if encoding fails.
    pub fn to_serialized(&self) -> Result<SerializedEvent, EventError> {
        let data =
            serde_json::to_vec(self).map_err(|e| EventError::SerializationError(e.to_string()))?;
        Ok(SerializedEvent::new(
            self.event_type.as_str().to_string(),
            self.aggregate_id.to_string(),
            data,
        ))
    }

    /// Decode an envelope received from the bus.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::DeserializationError`] if the bytes are not an envelope.
    pub fn from_serialized(event: &SerializedEvent) -> Result<Self, EventError> {
        serde_json::from_slice(&event.data)
            .map_err(|e| EventError::DeserializationError(e.to_string()))
    }

    /// Decode the payload into its concrete type.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::DeserializationError`] if the payload has a different shape.
    pub fn payload_as<T: serde::de::DeserializeOwned>(&self) -> Result<T, EventError> {
        serde_json::from_value(self.payload.clone())
            .map_err(|e| EventError::DeserializationError(e.to_string()))
    }
}

/// An encoded envelope ready for the bus.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SerializedEvent {
    /// Event type (e.g. `critical.alert`)
    pub event_type: String,
    /// Partition key
    pub key: String,
    /// JSON-encoded [`EventEnvelope`]
    pub data: Vec<u8>,
}

impl SerializedEvent {
    /// Create a new serialized event.
    #[must_use]
    pub const fn new(event_type: String, key: String, data: Vec<u8>) -> Self {
        Self {
            event_type,
            key,
            data,
        }
    }
}

impl fmt::Display for SerializedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SerializedEvent {{ type: {}, key: {}, size: {} bytes }}",
            self.event_type,
            self.key,
            self.data.len()
        )
    }
}

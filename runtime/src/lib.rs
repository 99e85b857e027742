//! # Lab Orders Runtime
//!
//! The lifecycle service and the machinery around it.
//!
//! ## Core Components
//!
//! - **[`LabOrderService`]**: order creation, result ingestion and reads
//! - **[`order_number::OrderNumberGenerator`]**: unique order numbers with bounded retries
//! - **[`publisher::BusEventPublisher`]**: JSON envelopes over any `EventBus`
//! - **[`notifier::NotifierGuard`]**: timeout and logging around the workflow notifier
//! - **[`retry`]** and **[`metrics`]**: shared by the adapters
//!
//! ## Example
//!
//! ```ignore
//! use lab_orders_runtime::{LabOrderEnvironment, LabOrderService, ServiceSettings};
//!
//! let service = LabOrderService::new(environment, ServiceSettings::default());
//! let order = service.create_order(request, Some(provider)).await?;
//! let order = service
//!     .submit_result(order.id, ResultSubmission::new(test_id, "95", "mg/dL"), Some(tech))
//!     .await?;
//! ```

pub mod lifecycle;

/// Prometheus metrics for observability
pub mod metrics;

/// Best-effort workflow notifications
pub mod notifier;

pub mod order_number;

pub mod publisher;

/// Retry logic with exponential backoff
pub mod retry;

pub use lifecycle::{LabOrderEnvironment, LabOrderService, ServiceSettings};
pub use publisher::BusEventPublisher;

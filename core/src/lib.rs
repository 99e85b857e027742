//! # Lab Orders Core
//!
//! Domain types, lifecycle rules and collaborator traits for laboratory order processing.
//!
//! This crate performs no I/O. It describes what an order is, how a result submission changes
//! it, what gets published about it, and which collaborators the lifecycle service needs.
//! Runtime wiring lives in `lab-orders-runtime`; adapters live in the postgres, redpanda and
//! service crates.
//!
//! ## Core Concepts
//!
//! - **Order**: a requisition of one or more tests for one patient encounter
//! - **Tally**: the order status is derived from its tests' statuses and nothing else
//! - **Capabilities**: must-succeed and fire-and-forget publishing are separate traits
//! - **Environment**: every external dependency is injected behind a trait
//!
//! ## Example
//!
//! ```
//! use lab_orders_core::lifecycle::{apply_result, build_order};
//! use lab_orders_core::types::*;
//! use chrono::Utc;
//!
//! let mut order = build_order(
//!     OrderId::new(),
//!     OrderNumber::new("LAB-261019093012-0042"),
//!     NewOrder {
//!         patient_id: PatientId::new(),
//!         provider_id: UserId::new(),
//!         encounter_id: EncounterId::new(),
//!         priority: Priority::Routine,
//!         clinical_notes: None,
//!         tests: vec![NewTest::new("2345-7", "Glucose")],
//!     },
//!     Utc::now(),
//! );
//!
//! let test_id = order.tests[0].id;
//! let applied = apply_result(
//!     &mut order,
//!     &ResultSubmission::new(test_id, "95", "mg/dL"),
//!     UserId::new(),
//!     Utc::now(),
//! )
//! .unwrap();
//!
//! assert!(applied.became_ready);
//! assert_eq!(order.status, OrderStatus::ResultReady);
//! ```

pub use chrono::{DateTime, Utc};

pub mod error;
pub mod event;
pub mod event_bus;
pub mod lifecycle;
pub mod patient;
pub mod status;
pub mod store;
pub mod types;
pub mod workflow;

pub use error::{LabOrderError, Result};

/// Environment module - Dependency injection traits
///
/// All external dependencies are abstracted behind traits and injected into the service.
/// The remaining collaborator traits live next to the types they exchange
/// ([`crate::store::OrderStore`], [`crate::event_bus::CriticalEventPublisher`],
/// [`crate::workflow::WorkflowNotifier`], [`crate::patient::PatientDirectory`]).
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Wall clock.
    #[derive(Clone, Copy, Debug, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}

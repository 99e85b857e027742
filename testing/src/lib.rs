//! # Lab Orders Testing
//!
//! Testing utilities for laboratory order processing.
//!
//! This crate provides:
//! - In-memory implementations of every collaborator trait
//! - A fixed clock for deterministic timestamps
//! - Fixtures for common orders and tests
//!
//! ## Example
//!
//! ```ignore
//! use lab_orders_testing::*;
//!
//! #[tokio::test]
//! async fn test_order_flow() {
//!     let store = InMemoryOrderStore::new();
//!     let bus = InMemoryEventBus::new();
//!     let service = build_service(&store, &bus);
//!
//!     let order = service.create_order(fixtures::metabolic_panel(provider), Some(provider)).await?;
//!     assert_eq!(bus.count(EventType::OrderCreated), 1);
//! }
//! ```

use chrono::{DateTime, Utc};
use lab_orders_core::environment::Clock;

pub mod event_bus;
pub mod fixtures;
pub mod order_store;
pub mod patient;
pub mod workflow;

/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, Utc};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use lab_orders_testing::mocks::FixedClock;
    /// use lab_orders_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// Never in practice; the timestamp is a literal.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }
}

// Re-export commonly used items
pub use event_bus::{InMemoryEventBus, PublishedEvent};
pub use mocks::{FixedClock, test_clock};
pub use order_store::InMemoryOrderStore;
pub use patient::MockPatientDirectory;
pub use workflow::{MockWorkflowNotifier, NotifierBehavior};

//! Order store abstraction.
//!
//! The store owns persistence of the order aggregate (order row, test rows, result rows) and
//! provides the unit of atomicity for result ingestion.
//!
//! # Implementations
//!
//! - `PostgresOrderStore` (in `lab-orders-postgres`): production, row-locked transactions
//! - `InMemoryOrderStore` (in `lab-orders-testing`): fast, deterministic tests
//!
//! # Concurrency
//!
//! [`OrderStore::record_result`] must serialize concurrent calls for the same order. Two
//! submissions against different tests of one order must never both observe a pending test
//! that the other is resolving; otherwise the order can stall short of `RESULT_READY` or be
//! announced ready twice.

use crate::error::LabOrderError;
use crate::lifecycle::{ResultApplied, TransitionError};
use crate::types::{LabOrder, OrderId, OrderNumber, OrderStatus, ResultSubmission, UserId};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// No order with this identifier.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// The order number is already taken.
    #[error("Order number already exists: {0}")]
    DuplicateOrderNumber(OrderNumber),

    /// The submission could not be applied; the transaction was rolled back.
    #[error(transparent)]
    Transition(#[from] TransitionError),

    /// Database connection or query error.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// A stored row could not be mapped back into the domain model.
    #[error("Corrupt row: {0}")]
    CorruptRow(String),
}

impl From<StoreError> for LabOrderError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::OrderNotFound(_) => Self::NotFound(err.to_string()),
            StoreError::Transition(inner) => inner.into(),
            StoreError::DuplicateOrderNumber(_)
            | StoreError::DatabaseError(_)
            | StoreError::CorruptRow(_) => Self::Storage(err.to_string()),
        }
    }
}

/// Outcome of a committed result transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordedResult {
    /// The order after commit, tests and results loaded
    pub order: LabOrder,
    /// What the submission changed
    pub applied: ResultApplied,
}

/// Boxed future returned by store operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Persistence for lab orders.
///
/// # Dyn Compatibility
///
/// Methods return boxed futures so the store can be shared as `Arc<dyn OrderStore>`.
pub trait OrderStore: Send + Sync {
    /// Persist a new order and all its tests in one atomic write.
    ///
    /// # Errors
    ///
    /// - [`StoreError::DuplicateOrderNumber`] if the order number is taken
    /// - [`StoreError::DatabaseError`] if the write fails
    fn insert_order<'a>(&'a self, order: &'a LabOrder) -> StoreFuture<'a, ()>;

    /// Load an order with its tests and results.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DatabaseError`] or [`StoreError::CorruptRow`] on failure.
    fn get_order(&self, order_id: OrderId) -> StoreFuture<'_, Option<LabOrder>>;

    /// Whether an order number is already in use.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DatabaseError`] if the query fails.
    fn order_number_exists<'a>(&'a self, order_number: &'a OrderNumber) -> StoreFuture<'a, bool>;

    /// Next value of a monotonic sequence, used when random order numbers keep colliding.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DatabaseError`] if the sequence cannot be advanced.
    fn next_order_sequence(&self) -> StoreFuture<'_, u64>;

    /// Orders in any of `statuses`, oldest first, with tests and results loaded.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DatabaseError`] or [`StoreError::CorruptRow`] on failure.
    fn list_orders_by_status<'a>(
        &'a self,
        statuses: &'a [OrderStatus],
    ) -> StoreFuture<'a, Vec<LabOrder>>;

    /// Record one result atomically.
    ///
    /// Locks the order, applies [`crate::lifecycle::apply_result`], persists the result upsert,
    /// the test transition and the recomputed order status, and commits. Any error rolls the
    /// whole transaction back.
    ///
    /// # Errors
    ///
    /// - [`StoreError::OrderNotFound`] if the order does not exist
    /// - [`StoreError::Transition`] if the submission cannot be applied
    /// - [`StoreError::DatabaseError`] if the transaction fails
    fn record_result(
        &self,
        order_id: OrderId,
        submission: ResultSubmission,
        verified_by: UserId,
        now: DateTime<Utc>,
    ) -> StoreFuture<'_, RecordedResult>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TestId;

    #[test]
    fn store_errors_map_onto_the_service_taxonomy() {
        let missing = StoreError::OrderNotFound(OrderId::new());
        assert!(matches!(LabOrderError::from(missing), LabOrderError::NotFound(_)));

        let wrong_test = StoreError::Transition(TransitionError::TestNotFound {
            order_id: OrderId::new(),
            test_id: TestId::new(),
        });
        assert!(matches!(LabOrderError::from(wrong_test), LabOrderError::NotFound(_)));

        let db = StoreError::DatabaseError("connection reset".into());
        assert!(matches!(LabOrderError::from(db), LabOrderError::Storage(_)));
    }
}

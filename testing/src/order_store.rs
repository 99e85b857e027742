//! In-memory order store.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)]

use chrono::{DateTime, Utc};
use lab_orders_core::lifecycle::apply_result;
use lab_orders_core::store::{OrderStore, RecordedResult, StoreError, StoreFuture};
use lab_orders_core::types::{
    LabOrder, OrderId, OrderNumber, OrderStatus, ResultSubmission, UserId,
};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
struct Inner {
    orders: HashMap<OrderId, LabOrder>,
    numbers: HashSet<OrderNumber>,
    sequence: u64,
    forced_duplicates: usize,
}

/// `HashMap`-backed [`OrderStore`].
///
/// A single lock guards every operation, so a result submission's read-modify-write is
/// serialized against every other write exactly as a row lock would serialize it.
///
/// # Example
///
/// ```
/// use lab_orders_testing::{InMemoryOrderStore, fixtures};
/// use lab_orders_core::store::OrderStore;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = InMemoryOrderStore::new();
/// let order = fixtures::persisted_order();
/// store.insert_order(&order).await?;
/// assert!(store.get_order(order.id).await?.is_some());
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemoryOrderStore {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryOrderStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::DatabaseError("store lock poisoned".to_string()))
    }

    /// Mark an order number as taken without storing an order.
    pub fn reserve_order_number(&self, number: impl Into<String>) {
        self.inner
            .lock()
            .unwrap()
            .numbers
            .insert(OrderNumber::new(number));
    }

    /// Make the next `count` inserts fail with [`StoreError::DuplicateOrderNumber`], as if a
    /// concurrent writer took the number between the existence check and the insert.
    pub fn fail_next_inserts_with_duplicate(&self, count: usize) {
        self.inner.lock().unwrap().forced_duplicates = count;
    }

    /// Set the current value of the order-number sequence.
    pub fn set_sequence(&self, value: u64) {
        self.inner.lock().unwrap().sequence = value;
    }

    /// Number of stored orders.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().orders.len()
    }

    /// Whether no order has been stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of a stored order.
    #[must_use]
    pub fn snapshot(&self, order_id: OrderId) -> Option<LabOrder> {
        self.inner.lock().unwrap().orders.get(&order_id).cloned()
    }

    /// Overwrite a stored order, e.g. to put it in a status the service never produces.
    pub fn replace(&self, order: LabOrder) {
        let mut inner = self.inner.lock().unwrap();
        inner.numbers.insert(order.order_number.clone());
        inner.orders.insert(order.id, order);
    }
}

impl OrderStore for InMemoryOrderStore {
    fn insert_order<'a>(&'a self, order: &'a LabOrder) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let mut inner = self.lock()?;
            if inner.forced_duplicates > 0 {
                inner.forced_duplicates -= 1;
                return Err(StoreError::DuplicateOrderNumber(order.order_number.clone()));
            }
            if !inner.numbers.insert(order.order_number.clone()) {
                return Err(StoreError::DuplicateOrderNumber(order.order_number.clone()));
            }
            inner.orders.insert(order.id, order.clone());
            Ok(())
        })
    }

    fn get_order(&self, order_id: OrderId) -> StoreFuture<'_, Option<LabOrder>> {
        Box::pin(async move { Ok(self.lock()?.orders.get(&order_id).cloned()) })
    }

    fn order_number_exists<'a>(&'a self, order_number: &'a OrderNumber) -> StoreFuture<'a, bool> {
        Box::pin(async move { Ok(self.lock()?.numbers.contains(order_number)) })
    }

    fn next_order_sequence(&self) -> StoreFuture<'_, u64> {
        Box::pin(async move {
            let mut inner = self.lock()?;
            inner.sequence += 1;
            Ok(inner.sequence)
        })
    }

    fn list_orders_by_status<'a>(
        &'a self,
        statuses: &'a [OrderStatus],
    ) -> StoreFuture<'a, Vec<LabOrder>> {
        Box::pin(async move {
            let inner = self.lock()?;
            let mut orders: Vec<LabOrder> = inner
                .orders
                .values()
                .filter(|o| statuses.contains(&o.status))
                .cloned()
                .collect();
            orders.sort_by(|a, b| {
                a.created_at
                    .cmp(&b.created_at)
                    .then_with(|| a.order_number.cmp(&b.order_number))
            });
            Ok(orders)
        })
    }

    fn record_result(
        &self,
        order_id: OrderId,
        submission: ResultSubmission,
        verified_by: UserId,
        now: DateTime<Utc>,
    ) -> StoreFuture<'_, RecordedResult> {
        Box::pin(async move {
            let mut inner = self.lock()?;
            let mut order = inner
                .orders
                .get(&order_id)
                .cloned()
                .ok_or(StoreError::OrderNotFound(order_id))?;

            // Work on a copy so a failed transition leaves the stored order untouched.
            let applied = apply_result(&mut order, &submission, verified_by, now)?;
            inner.orders.insert(order_id, order.clone());

            Ok(RecordedResult { order, applied })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use lab_orders_core::lifecycle::TransitionError;
    use lab_orders_core::types::TestId;

    #[tokio::test]
    async fn duplicate_order_numbers_are_rejected() {
        let store = InMemoryOrderStore::new();
        let first = fixtures::persisted_order();
        let mut second = fixtures::persisted_order();
        second.order_number = first.order_number.clone();

        store.insert_order(&first).await.unwrap();
        let err = store.insert_order(&second).await.unwrap_err();
        assert_eq!(err, StoreError::DuplicateOrderNumber(first.order_number));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn forced_duplicates_are_consumed() {
        let store = InMemoryOrderStore::new();
        store.fail_next_inserts_with_duplicate(1);
        let order = fixtures::persisted_order();

        assert!(store.insert_order(&order).await.is_err());
        assert!(store.insert_order(&order).await.is_ok());
    }

    #[tokio::test]
    async fn failed_transition_leaves_order_unchanged() {
        let store = InMemoryOrderStore::new();
        let order = fixtures::persisted_order();
        store.insert_order(&order).await.unwrap();

        let err = store
            .record_result(
                order.id,
                lab_orders_core::types::ResultSubmission::new(TestId::new(), "1", "g/L"),
                UserId::new(),
                Utc::now(),
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            StoreError::Transition(TransitionError::TestNotFound { .. })
        ));
        assert_eq!(store.snapshot(order.id), Some(order));
    }

    #[tokio::test]
    async fn sequence_is_monotonic() {
        let store = InMemoryOrderStore::new();
        store.set_sequence(41);
        assert_eq!(store.next_order_sequence().await.unwrap(), 42);
        assert_eq!(store.next_order_sequence().await.unwrap(), 43);
    }
}

//! Human-readable order numbers.
//!
//! Candidates look like `LAB-261019093012-0042`: a second-resolution timestamp plus a
//! four-digit random suffix. Each candidate is checked against the store. After
//! `max_attempts` collisions the generator stops guessing and takes the next value of the
//! store's sequence instead (`LAB-261019-S00000042`), so generation always terminates.

use crate::metrics::OrderNumberMetrics;
use lab_orders_core::LabOrderError;
use lab_orders_core::environment::Clock;
use lab_orders_core::store::OrderStore;
use lab_orders_core::types::OrderNumber;
use rand::Rng;
use std::sync::Arc;

/// Default number of random candidates tried before falling back to the sequence.
pub const DEFAULT_MAX_ATTEMPTS: usize = 5;

/// Source of the four-digit suffix.
pub trait SuffixSource: Send + Sync {
    /// A value in `0..10_000`.
    fn next_suffix(&self) -> u16;
}

/// Uniformly random suffixes.
#[derive(Clone, Copy, Debug, Default)]
pub struct RandomSuffix;

impl SuffixSource for RandomSuffix {
    fn next_suffix(&self) -> u16 {
        rand::thread_rng().gen_range(0..10_000)
    }
}

/// Generates unique order numbers.
#[derive(Clone)]
pub struct OrderNumberGenerator {
    store: Arc<dyn OrderStore>,
    clock: Arc<dyn Clock>,
    suffixes: Arc<dyn SuffixSource>,
    max_attempts: usize,
}

impl OrderNumberGenerator {
    /// Generator with random suffixes and [`DEFAULT_MAX_ATTEMPTS`].
    #[must_use]
    pub fn new(store: Arc<dyn OrderStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            suffixes: Arc::new(RandomSuffix),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Set how many random candidates are tried (at least one).
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Replace the suffix source.
    #[must_use]
    pub fn with_suffix_source(mut self, suffixes: Arc<dyn SuffixSource>) -> Self {
        self.suffixes = suffixes;
        self
    }

    /// Produce an order number that is not in the store at the time of the call.
    ///
    /// The insert can still lose a race to a concurrent writer; callers retry on
    /// a duplicate-number error.
    ///
    /// # Errors
    ///
    /// Returns [`LabOrderError::Storage`] if the store cannot be queried or if even the
    /// sequence-based number is already taken.
    pub async fn generate(&self) -> Result<OrderNumber, LabOrderError> {
        let now = self.clock.now();
        let stamp = now.format("%y%m%d%H%M%S").to_string();

        for attempt in 1..=self.max_attempts {
            let candidate = OrderNumber::new(format!(
                "LAB-{stamp}-{:04}",
                self.suffixes.next_suffix() % 10_000
            ));
            if !self.store.order_number_exists(&candidate).await? {
                return Ok(candidate);
            }
            OrderNumberMetrics::record_collision();
            tracing::debug!(attempt, order_number = %candidate, "Order number collision");
        }

        let sequence = self.store.next_order_sequence().await?;
        let fallback = OrderNumber::new(format!("LAB-{}-S{sequence:08}", now.format("%y%m%d")));
        OrderNumberMetrics::record_fallback();
        tracing::warn!(
            attempts = self.max_attempts,
            order_number = %fallback,
            "Random order numbers exhausted, using sequence"
        );

        if self.store.order_number_exists(&fallback).await? {
            return Err(LabOrderError::Storage(format!(
                "could not allocate a unique order number; sequence value {fallback} is taken"
            )));
        }
        Ok(fallback)
    }
}

//! The lab order lifecycle service.
//!
//! [`LabOrderService`] is the imperative shell around the pure rules in
//! `lab_orders_core::lifecycle`: it checks the caller, lets the store run the transaction,
//! then fans the outcome out to the workflow notifier and the event bus.
//!
//! # Publication guarantees
//!
//! | Event              | When                                   | On failure              |
//! |--------------------|----------------------------------------|-------------------------|
//! | `order.created`    | after the order is inserted            | call fails (retryable)  |
//! | `result.available` | on any submission leaving it ready     | call fails (retryable)  |
//! | `critical.alert`   | on every CRITICAL submission           | call fails (retryable)  |
//! | `record.accessed`  | on `get_order` with an acting user     | logged and dropped      |
//!
//! A failed publish after commit leaves the state change in place. The error says so, and
//! retrying the submission re-runs the upsert and publishes again: `result.available` follows
//! the committed status rather than the transition, so a retry still announces readiness.

use crate::metrics::LifecycleMetrics;
use crate::notifier::{DEFAULT_NOTIFIER_TIMEOUT, NotifierGuard};
use crate::order_number::{DEFAULT_MAX_ATTEMPTS, OrderNumberGenerator, SuffixSource};
use lab_orders_core::environment::Clock;
use lab_orders_core::event::{
    AuditEvent, CriticalAlert, DomainEvent, OrderCreated, RecordAccessed, ResultAvailable,
};
use lab_orders_core::event_bus::{AuditEventPublisher, CriticalEventPublisher, EventBusError};
use lab_orders_core::lifecycle::{build_order, validate_new_order, validate_submission};
use lab_orders_core::patient::PatientDirectory;
use lab_orders_core::store::{OrderStore, RecordedResult, StoreError};
use lab_orders_core::types::{
    LabOrder, NewOrder, OrderId, OrderStatus, ResultSubmission, TestId, UserId,
};
use lab_orders_core::workflow::{WorkflowNotification, WorkflowNotifier};
use lab_orders_core::{LabOrderError, Result};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Collaborators of the lifecycle service.
#[derive(Clone)]
pub struct LabOrderEnvironment {
    /// Transactional order persistence
    pub store: Arc<dyn OrderStore>,
    /// Must-succeed publishing
    pub events: Arc<dyn CriticalEventPublisher>,
    /// Fire-and-forget publishing
    pub audit: Arc<dyn AuditEventPublisher>,
    /// External workflow engine
    pub notifier: Arc<dyn WorkflowNotifier>,
    /// Patient names for critical alerts
    pub patients: Arc<dyn PatientDirectory>,
    /// Time source
    pub clock: Arc<dyn Clock>,
}

/// Tunables of the lifecycle service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceSettings {
    /// Random order-number candidates tried before the sequence fallback; also bounds
    /// insert retries after a lost race
    pub order_number_attempts: usize,
    /// Upper bound on one workflow notification
    pub notifier_timeout: Duration,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            order_number_attempts: DEFAULT_MAX_ATTEMPTS,
            notifier_timeout: DEFAULT_NOTIFIER_TIMEOUT,
        }
    }
}

/// Creates orders, ingests results and serves reads.
#[derive(Clone)]
pub struct LabOrderService {
    env: LabOrderEnvironment,
    settings: ServiceSettings,
    numbers: OrderNumberGenerator,
    notifier: NotifierGuard,
}

fn bus_unavailable(err: &EventBusError) -> LabOrderError {
    LabOrderError::TransientDependency(err.to_string())
}

impl LabOrderService {
    /// Create a service.
    #[must_use]
    pub fn new(env: LabOrderEnvironment, settings: ServiceSettings) -> Self {
        let numbers = OrderNumberGenerator::new(Arc::clone(&env.store), Arc::clone(&env.clock))
            .with_max_attempts(settings.order_number_attempts);
        let notifier = NotifierGuard::new(Arc::clone(&env.notifier), settings.notifier_timeout);
        Self {
            env,
            settings,
            numbers,
            notifier,
        }
    }

    /// Replace the order-number suffix source.
    #[must_use]
    pub fn with_suffix_source(mut self, suffixes: Arc<dyn SuffixSource>) -> Self {
        self.numbers = self.numbers.with_suffix_source(suffixes);
        self
    }

    /// Create an order and its tests.
    ///
    /// # Errors
    ///
    /// - [`LabOrderError::Authorization`] if `actor` is present and is not the ordering provider
    /// - [`LabOrderError::Validation`] if the order has no tests or a test is malformed
    /// - [`LabOrderError::Storage`] if no unique order number could be allocated or the insert fails
    /// - [`LabOrderError::TransientDependency`] if `order.created` could not be published; the
    ///   order has been stored
    #[tracing::instrument(skip(self, request), fields(provider_id = %request.provider_id))]
    pub async fn create_order(&self, request: NewOrder, actor: Option<UserId>) -> Result<LabOrder> {
        if let Some(actor) = actor {
            if actor != request.provider_id {
                tracing::warn!(actor = %actor, "Order creation rejected: actor is not the provider");
                return Err(LabOrderError::Authorization(
                    "only the ordering provider may create this order".to_string(),
                ));
            }
        }
        validate_new_order(&request)?;

        let order_number = self.numbers.generate().await?;
        let mut order = build_order(OrderId::new(), order_number, request, self.env.clock.now());

        let mut attempt = 1;
        loop {
            match self.env.store.insert_order(&order).await {
                Ok(()) => break,
                Err(StoreError::DuplicateOrderNumber(taken))
                    if attempt < self.settings.order_number_attempts =>
                {
                    tracing::warn!(attempt, order_number = %taken, "Lost order number race, regenerating");
                    order.order_number = self.numbers.generate().await?;
                    attempt += 1;
                },
                Err(e) => return Err(e.into()),
            }
        }

        LifecycleMetrics::record_created(order.priority);
        tracing::info!(
            order_id = %order.id,
            order_number = %order.order_number,
            tests = order.tests.len(),
            priority = %order.priority,
            "Lab order created"
        );

        self.env
            .events
            .publish_critical(&DomainEvent::OrderCreated(OrderCreated::from(&order)), actor)
            .await
            .map_err(|e| bus_unavailable(&e))?;

        Ok(order)
    }

    /// Record one test result.
    ///
    /// The store applies the result under the order lock. After commit the workflow notifier
    /// is told (best-effort), `result.available` is published if the order is now
    /// `RESULT_READY`, and `critical.alert` is published if the submission was flagged CRITICAL.
    ///
    /// # Errors
    ///
    /// - [`LabOrderError::Authorization`] if no acting user is given
    /// - [`LabOrderError::Validation`] if the value is blank or the order is closed
    /// - [`LabOrderError::NotFound`] if the order or the test does not exist
    /// - [`LabOrderError::Storage`] if the transaction fails
    /// - [`LabOrderError::TransientDependency`] if a required event could not be published; the
    ///   result has been stored
    #[tracing::instrument(skip(self, submission), fields(test_id = %submission.test_id))]
    pub async fn submit_result(
        &self,
        order_id: OrderId,
        submission: ResultSubmission,
        actor: Option<UserId>,
    ) -> Result<LabOrder> {
        let actor = actor.ok_or_else(|| {
            LabOrderError::Authorization("submitting a result requires an acting user".to_string())
        })?;
        validate_submission(&submission)?;

        let started = Instant::now();
        let RecordedResult { order, applied } = self
            .env
            .store
            .record_result(order_id, submission, actor, self.env.clock.now())
            .await?;

        tracing::info!(
            order_id = %order.id,
            order_number = %order.order_number,
            test_id = %applied.test_id,
            abnormal_flag = %applied.abnormal_flag,
            order_status = %order.status,
            pending = applied.tally.pending,
            "Result recorded"
        );

        let notification =
            WorkflowNotification::result_completed(order.id, order.status, applied.abnormal_flag);
        self.notifier.deliver(&order, applied.test_id, &notification).await;

        // Attempt every required publish before reporting the first failure.
        let mut first_failure: Option<LabOrderError> = None;

        if order.status == OrderStatus::ResultReady {
            let event = DomainEvent::ResultAvailable(ResultAvailable::from(&order));
            if let Err(e) = self.env.events.publish_critical(&event, Some(actor)).await {
                first_failure.get_or_insert(bus_unavailable(&e));
            }
        }

        if applied.critical {
            match self.critical_alert(&order, applied.test_id).await {
                Ok(alert) => {
                    let event = DomainEvent::CriticalAlert(alert);
                    match self.env.events.publish_critical(&event, Some(actor)).await {
                        Ok(()) => LifecycleMetrics::record_critical_alert(),
                        Err(e) => {
                            first_failure.get_or_insert(bus_unavailable(&e));
                        },
                    }
                },
                Err(e) => {
                    first_failure.get_or_insert(e);
                },
            }
        }

        LifecycleMetrics::record_result(applied.abnormal_flag, applied.became_ready, started.elapsed());

        match first_failure {
            Some(err) => Err(err),
            None => Ok(order),
        }
    }

    /// Orders that still have work outstanding (NEW or `IN_PROGRESS`), oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`LabOrderError::Storage`] if the store cannot be read.
    pub async fn list_pending_orders(&self) -> Result<Vec<LabOrder>> {
        Ok(self
            .env
            .store
            .list_orders_by_status(&OrderStatus::PENDING)
            .await?)
    }

    /// Load one order. When `actor` is present the read is recorded on the audit trail.
    ///
    /// # Errors
    ///
    /// - [`LabOrderError::NotFound`] if the order does not exist
    /// - [`LabOrderError::Storage`] if the store cannot be read
    pub async fn get_order(&self, order_id: OrderId, actor: Option<UserId>) -> Result<LabOrder> {
        let order = self
            .env
            .store
            .get_order(order_id)
            .await?
            .ok_or_else(|| LabOrderError::NotFound(format!("order {order_id}")))?;

        if let Some(actor) = actor {
            let event = AuditEvent::RecordAccessed(RecordAccessed {
                order_id: order.id,
                order_number: order.order_number.clone(),
                patient_id: order.patient_id,
                accessed_by: actor,
            });
            self.env.audit.publish_audit(&event, Some(actor)).await;
        }

        Ok(order)
    }

    async fn critical_alert(&self, order: &LabOrder, test_id: TestId) -> Result<CriticalAlert> {
        let patient_name = match self.env.patients.patient_name(order.patient_id).await {
            Ok(name) => Some(name),
            Err(e) => {
                LifecycleMetrics::record_patient_lookup_failure();
                tracing::warn!(
                    order_id = %order.id,
                    patient_id = %order.patient_id,
                    error = %e,
                    "Patient lookup failed; sending critical alert without a name"
                );
                None
            },
        };

        CriticalAlert::for_test(order, test_id, patient_name).ok_or_else(|| {
            LabOrderError::Storage(format!(
                "critical result for test {test_id} missing from order {} after commit",
                order.id
            ))
        })
    }
}

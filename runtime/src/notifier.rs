//! Best-effort delivery of workflow notifications.

use crate::metrics::NotifierMetrics;
use lab_orders_core::types::{LabOrder, TestId};
use lab_orders_core::workflow::{NotifierError, WorkflowNotification, WorkflowNotifier};
use std::sync::Arc;
use std::time::Duration;

/// Default upper bound on one notification, retries included.
pub const DEFAULT_NOTIFIER_TIMEOUT: Duration = Duration::from_millis(3000);

/// Wraps a [`WorkflowNotifier`] with a timeout and turns every failure into a log line.
///
/// Failures are logged at `error` with the order id, order number, test id and order status,
/// which is everything needed to replay the notification by hand.
#[derive(Clone)]
pub struct NotifierGuard {
    notifier: Arc<dyn WorkflowNotifier>,
    timeout: Duration,
}

impl NotifierGuard {
    /// Create a guard.
    #[must_use]
    pub fn new(notifier: Arc<dyn WorkflowNotifier>, timeout: Duration) -> Self {
        Self { notifier, timeout }
    }

    /// Send `notification` about `test_id` on `order`, never failing.
    ///
    /// Returns the error that was logged, if any.
    pub async fn deliver(
        &self,
        order: &LabOrder,
        test_id: TestId,
        notification: &WorkflowNotification,
    ) -> Option<NotifierError> {
        let outcome = match tokio::time::timeout(self.timeout, self.notifier.notify(notification)).await {
            Ok(result) => result,
            Err(_) => Err(NotifierError::Timeout(self.timeout)),
        };

        let err = outcome.err()?;
        let reason = if matches!(err, NotifierError::Timeout(_)) {
            "timeout"
        } else {
            "error"
        };
        NotifierMetrics::record_failure(reason);
        tracing::error!(
            order_id = %order.id,
            order_number = %order.order_number,
            test_id = %test_id,
            order_status = %notification.metadata.order_status,
            abnormal_flag = %notification.metadata.abnormal_flag,
            error = %err,
            "Workflow notification failed; replay manually"
        );
        Some(err)
    }
}

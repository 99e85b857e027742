//! Workflow notifier abstraction.
//!
//! After every committed result the service tells the external workflow engine that a unit of
//! work finished. The call is best-effort: a [`NotifierError`] is logged with enough context to
//! replay the notification by hand and never reaches the caller of `submit_result`.

use crate::types::{AbnormalFlag, OrderId, OrderStatus};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;

/// Status sent for a completed unit of work.
pub const COMPLETED: &str = "COMPLETED";

/// Errors returned by a workflow notifier.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotifierError {
    /// The notifier could not be reached.
    #[error("Notifier unreachable: {0}")]
    Unreachable(String),

    /// The notifier answered with a non-success status.
    #[error("Notifier rejected notification with status {status}: {body}")]
    Rejected {
        /// HTTP status code
        status: u16,
        /// Response body, possibly truncated
        body: String,
    },

    /// The call did not finish within the allotted time.
    #[error("Notifier timed out after {0:?}")]
    Timeout(Duration),
}

impl NotifierError {
    /// Whether another attempt may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Unreachable(_) | Self::Timeout(_) => true,
            Self::Rejected { status, .. } => *status == 429 || *status >= 500,
        }
    }
}

/// Metadata attached to a result notification.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationMetadata {
    /// Order status after the submission committed
    pub order_status: OrderStatus,
    /// Flag of the submitted result
    pub abnormal_flag: AbnormalFlag,
}

/// Body of a workflow notification.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowNotification {
    /// Order the work belongs to
    pub target_order_id: OrderId,
    /// Always [`COMPLETED`] for result submissions
    pub status: String,
    /// Order status and flag
    pub metadata: NotificationMetadata,
}

impl WorkflowNotification {
    /// Notification for a committed result.
    #[must_use]
    pub fn result_completed(
        order_id: OrderId,
        order_status: OrderStatus,
        abnormal_flag: AbnormalFlag,
    ) -> Self {
        Self {
            target_order_id: order_id,
            status: COMPLETED.to_string(),
            metadata: NotificationMetadata {
                order_status,
                abnormal_flag,
            },
        }
    }
}

/// External workflow engine.
pub trait WorkflowNotifier: Send + Sync {
    /// Deliver one notification.
    ///
    /// # Errors
    ///
    /// Returns a [`NotifierError`] if delivery fails.
    fn notify<'a>(
        &'a self,
        notification: &'a WorkflowNotification,
    ) -> Pin<Box<dyn Future<Output = Result<(), NotifierError>> + Send + 'a>>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn notification_wire_shape() {
        let order_id = OrderId::new();
        let n = WorkflowNotification::result_completed(
            order_id,
            OrderStatus::ResultReady,
            AbnormalFlag::Critical,
        );
        let json = serde_json::to_value(&n).unwrap();
        assert_eq!(json["targetOrderId"], serde_json::json!(order_id.to_string()));
        assert_eq!(json["status"], "COMPLETED");
        assert_eq!(json["metadata"]["orderStatus"], "RESULT_READY");
        assert_eq!(json["metadata"]["abnormalFlag"], "CRITICAL");
    }

    #[test]
    fn server_errors_are_transient_client_errors_are_not() {
        let rejected = |status| NotifierError::Rejected {
            status,
            body: String::new(),
        };
        assert!(rejected(503).is_transient());
        assert!(rejected(429).is_transient());
        assert!(!rejected(400).is_transient());
        assert!(NotifierError::Unreachable("refused".into()).is_transient());
    }
}

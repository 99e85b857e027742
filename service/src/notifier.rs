//! HTTP workflow notifier.

use lab_orders_core::workflow::{NotifierError, WorkflowNotification, WorkflowNotifier};
use lab_orders_runtime::retry::{RetryPolicy, retry_with_predicate};
use reqwest::Client;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// Longest response body kept in a [`NotifierError::Rejected`].
const MAX_ERROR_BODY: usize = 512;

/// Posts notifications to `{base_url}/notifications`.
///
/// Transient failures (connection errors, per-attempt timeouts, 429 and 5xx) are retried with
/// the configured backoff. The caller bounds the whole exchange with its own timeout.
#[derive(Clone, Debug)]
pub struct HttpWorkflowNotifier {
    client: Client,
    endpoint: String,
    request_timeout: Duration,
    retry: RetryPolicy,
}

impl HttpWorkflowNotifier {
    /// Create a notifier.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        base_url: &str,
        request_timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/notifications", base_url.trim_end_matches('/')),
            request_timeout,
            retry,
        })
    }

    /// Where notifications are posted.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn send_once(&self, notification: &WorkflowNotification) -> Result<(), NotifierError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(notification)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    NotifierError::Timeout(self.request_timeout)
                } else {
                    NotifierError::Unreachable(e.to_string())
                }
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let mut body = response.text().await.unwrap_or_default();
        if body.len() > MAX_ERROR_BODY {
            let mut cut = MAX_ERROR_BODY;
            while !body.is_char_boundary(cut) {
                cut -= 1;
            }
            body.truncate(cut);
        }
        Err(NotifierError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

impl WorkflowNotifier for HttpWorkflowNotifier {
    fn notify<'a>(
        &'a self,
        notification: &'a WorkflowNotification,
    ) -> Pin<Box<dyn Future<Output = Result<(), NotifierError>> + Send + 'a>> {
        Box::pin(async move {
            retry_with_predicate(
                &self.retry,
                "workflow_notifier",
                || self.send_once(notification),
                NotifierError::is_transient,
            )
            .await?;

            tracing::debug!(
                order_id = %notification.target_order_id,
                order_status = %notification.metadata.order_status,
                "Workflow notified"
            );
            Ok(())
        })
    }
}

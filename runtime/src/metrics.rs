//! Prometheus metrics for the lab order service.
//!
//! Recorders are zero-sized structs grouped by concern. They write through the global
//! `metrics` recorder, so they are no-ops until a [`MetricsServer`] has been started.
//!
//! # Example
//!
//! ```rust,no_run
//! use lab_orders_runtime::metrics::MetricsServer;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//! println!("{}", server.render().unwrap_or_default());
//! # Ok(())
//! # }
//! ```

use lab_orders_core::event::EventType;
use lab_orders_core::types::{AbnormalFlag, Priority};
use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

pub use metrics::{counter, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus exporter.
///
/// Installs the global recorder. `addr` is where the host process exposes [`Self::render`]
/// for scraping.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server.
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Install the recorder.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError::Build`] if the exporter cannot be configured, or
    /// [`MetricsError::Install`] if it cannot be installed. A recorder that is already
    /// installed (as happens when tests share a process) is not an error.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!(addr = %self.addr, "Metrics exporter installed");
                Ok(())
            },
            Err(e) => {
                let message = e.to_string();
                if message.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(message))
                }
            },
        }
    }

    /// Address the scrape endpoint is expected on.
    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus text format.
    ///
    /// Returns `None` if this server did not install the recorder.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

fn register_metrics() {
    describe_counter!("lab_orders_created_total", "Orders created, by priority");
    describe_counter!(
        "lab_orders_results_submitted_total",
        "Results recorded, by abnormal flag"
    );
    describe_counter!(
        "lab_orders_result_ready_total",
        "Orders that transitioned into RESULT_READY"
    );
    describe_counter!("lab_orders_critical_alerts_total", "Critical alerts published");
    describe_histogram!(
        "lab_orders_submit_duration_seconds",
        "Time to record a result, including post-commit fan-out"
    );

    describe_counter!(
        "lab_orders_order_number_collisions_total",
        "Generated order numbers that were already taken"
    );
    describe_counter!(
        "lab_orders_order_number_fallbacks_total",
        "Order numbers drawn from the fallback sequence"
    );

    describe_counter!(
        "lab_orders_events_published_total",
        "Envelopes accepted by the event bus, by event type"
    );
    describe_counter!(
        "lab_orders_event_publish_errors_total",
        "Failed publishes, by event type and capability"
    );
    describe_histogram!(
        "lab_orders_event_publish_duration_seconds",
        "Time taken to publish one envelope"
    );

    describe_counter!(
        "lab_orders_notifier_failures_total",
        "Workflow notifications that failed or timed out, by reason"
    );
    describe_counter!(
        "lab_orders_patient_lookup_failures_total",
        "Patient name lookups that failed while building a critical alert"
    );

    describe_counter!("retry_attempts_total", "Retries, by target service");
    describe_counter!(
        "retry_successes_total",
        "Calls that succeeded after at least one retry"
    );
    describe_counter!(
        "retry_exhausted_total",
        "Calls that failed after exhausting retries"
    );
}

/// Order lifecycle metrics recorder.
pub struct LifecycleMetrics;

impl LifecycleMetrics {
    /// Record a created order.
    pub fn record_created(priority: Priority) {
        counter!("lab_orders_created_total", "priority" => priority.as_str()).increment(1);
    }

    /// Record a committed result.
    pub fn record_result(flag: AbnormalFlag, became_ready: bool, duration: Duration) {
        counter!("lab_orders_results_submitted_total", "flag" => flag.as_str()).increment(1);
        if became_ready {
            counter!("lab_orders_result_ready_total").increment(1);
        }
        histogram!("lab_orders_submit_duration_seconds").record(duration.as_secs_f64());
    }

    /// Record a published critical alert.
    pub fn record_critical_alert() {
        counter!("lab_orders_critical_alerts_total").increment(1);
    }

    /// Record a failed patient lookup.
    pub fn record_patient_lookup_failure() {
        counter!("lab_orders_patient_lookup_failures_total").increment(1);
    }
}

/// Order number generator metrics recorder.
pub struct OrderNumberMetrics;

impl OrderNumberMetrics {
    /// Record a candidate that was already taken.
    pub fn record_collision() {
        counter!("lab_orders_order_number_collisions_total").increment(1);
    }

    /// Record a number drawn from the sequence.
    pub fn record_fallback() {
        counter!("lab_orders_order_number_fallbacks_total").increment(1);
    }
}

/// Event publishing metrics recorder.
pub struct PublishMetrics;

impl PublishMetrics {
    /// Record an accepted publish.
    pub fn record_publish(event_type: EventType, duration: Duration) {
        counter!("lab_orders_events_published_total", "event_type" => event_type.as_str())
            .increment(1);
        histogram!("lab_orders_event_publish_duration_seconds").record(duration.as_secs_f64());
    }

    /// Record a failed publish.
    ///
    /// `capability` is `critical` or `audit`.
    pub fn record_publish_error(event_type: EventType, capability: &'static str) {
        counter!(
            "lab_orders_event_publish_errors_total",
            "event_type" => event_type.as_str(),
            "capability" => capability
        )
        .increment(1);
    }
}

/// Workflow notifier metrics recorder.
pub struct NotifierMetrics;

impl NotifierMetrics {
    /// Record a failed notification. `reason` is `error` or `timeout`.
    pub fn record_failure(reason: &'static str) {
        counter!("lab_orders_notifier_failures_total", "reason" => reason).increment(1);
    }
}

/// Retry metrics recorder.
pub struct RetryMetrics;

impl RetryMetrics {
    /// Record a retry attempt.
    pub fn record_attempt(target: &'static str) {
        counter!("retry_attempts_total", "target" => target).increment(1);
    }

    /// Record a successful retry.
    pub fn record_success(target: &'static str) {
        counter!("retry_successes_total", "target" => target).increment(1);
    }

    /// Record exhausted retries.
    pub fn record_exhausted(target: &'static str) {
        counter!("retry_exhausted_total", "target" => target).increment(1);
    }
}

//! Wiring of the production collaborators.

use crate::config::Config;
use crate::notifier::HttpWorkflowNotifier;
use crate::patient::HttpPatientDirectory;
use lab_orders_core::environment::{Clock, SystemClock};
use lab_orders_core::event_bus::EventBusError;
use lab_orders_postgres::{PostgresOrderStore, PostgresSetupError};
use lab_orders_redpanda::RedpandaEventBus;
use lab_orders_runtime::metrics::{MetricsError, MetricsServer};
use lab_orders_runtime::{BusEventPublisher, LabOrderEnvironment, LabOrderService};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while assembling the application.
#[derive(Error, Debug)]
pub enum BootstrapError {
    /// The database pool could not be opened or the schema could not be applied.
    #[error(transparent)]
    Database(#[from] PostgresSetupError),

    /// The event bus producer could not be created.
    #[error("Event bus: {0}")]
    EventBus(#[from] EventBusError),

    /// An HTTP client could not be built.
    #[error("HTTP client: {0}")]
    Http(#[from] reqwest::Error),

    /// The metrics recorder could not be installed.
    #[error("Metrics: {0}")]
    Metrics(#[from] MetricsError),
}

/// A fully wired application.
pub struct Application {
    /// The lifecycle service
    pub service: LabOrderService,
    /// The order store, for administrative tasks
    pub store: PostgresOrderStore,
    /// The installed metrics exporter
    pub metrics: MetricsServer,
}

/// Open a pool against the configured database.
///
/// # Errors
///
/// Returns [`BootstrapError::Database`] if the database is unreachable.
pub async fn connect_store(config: &Config) -> Result<PostgresOrderStore, BootstrapError> {
    Ok(PostgresOrderStore::connect(&config.database.url, &config.pool_settings()).await?)
}

/// Build the lifecycle service and its collaborators from `config`.
///
/// # Errors
///
/// Returns a [`BootstrapError`] naming the collaborator that could not be created.
pub async fn build(config: &Config) -> Result<Application, BootstrapError> {
    let mut metrics = MetricsServer::new(config.service.metrics_addr);
    metrics.start()?;

    let store = connect_store(config).await?;

    let bus = RedpandaEventBus::builder()
        .brokers(&config.redpanda.brokers)
        .producer_acks(&config.redpanda.acks)
        .compression(&config.redpanda.compression)
        .timeout(Duration::from_millis(config.redpanda.publish_timeout_ms))
        .client_id(&config.redpanda.client_id)
        .build()?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let publisher = Arc::new(BusEventPublisher::new(
        Arc::new(bus),
        Arc::clone(&clock),
        config.service.origin_portal.clone(),
    ));

    let notifier = HttpWorkflowNotifier::new(
        &config.notifier.url,
        Duration::from_millis(config.notifier.request_timeout_ms),
        config.notifier_retry_policy(),
    )?;
    let patients = HttpPatientDirectory::new(
        &config.patient_directory.url,
        Duration::from_millis(config.patient_directory.timeout_ms),
    )?;

    let env = LabOrderEnvironment {
        store: Arc::new(store.clone()),
        events: publisher.clone(),
        audit: publisher,
        notifier: Arc::new(notifier),
        patients: Arc::new(patients),
        clock,
    };

    tracing::info!(
        origin_portal = %config.service.origin_portal,
        brokers = %config.redpanda.brokers,
        notifier = %config.notifier.url,
        "Lab order service assembled"
    );

    Ok(Application {
        service: LabOrderService::new(env, config.service_settings()),
        store,
        metrics,
    })
}

//! # Lab Orders Service
//!
//! Everything needed to run the lifecycle service as a process:
//!
//! - **[`config`]**: environment configuration
//! - **[`telemetry`]**: tracing subscriber setup
//! - **[`notifier::HttpWorkflowNotifier`]** and **[`patient::HttpPatientDirectory`]**: the
//!   HTTP collaborators
//! - **[`bootstrap`]**: assembles a `LabOrderService` over Postgres, Redpanda and HTTP
//!
//! ## Example
//!
//! ```ignore
//! use lab_orders_service::{bootstrap, config::Config, telemetry};
//!
//! let _ = dotenvy::dotenv();
//! let config = Config::from_env()?;
//! telemetry::init_tracing(&config.service.log_level)?;
//! let app = bootstrap::build(&config).await?;
//! let pending = app.service.list_pending_orders().await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod bootstrap;
pub mod config;
pub mod notifier;
pub mod patient;
pub mod telemetry;

pub use config::Config;

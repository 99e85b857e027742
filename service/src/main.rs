//! `lab-orders` command line.
//!
//! ```text
//! lab-orders migrate   apply database migrations
//! lab-orders pending   print pending orders as JSON lines, oldest first
//! ```

use lab_orders_service::{Config, bootstrap, telemetry};

const USAGE: &str = "usage: lab-orders <migrate|pending>";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();

    let config = Config::from_env()?;
    telemetry::init_tracing(&config.service.log_level)?;

    let command = std::env::args().nth(1).unwrap_or_default();
    match command.as_str() {
        "migrate" => {
            let store = bootstrap::connect_store(&config).await?;
            store.migrate().await?;
            tracing::info!("Migrations applied");
        },
        "pending" => {
            let app = bootstrap::build(&config).await?;
            let orders = app.service.list_pending_orders().await?;
            tracing::info!(count = orders.len(), "Pending orders loaded");
            for order in &orders {
                println!("{}", serde_json::to_string(order)?);
            }
        },
        other => {
            eprintln!("{USAGE}");
            return Err(format!("unknown command: {other:?}").into());
        },
    }

    Ok(())
}

/// Standalone consumer: runs only the receive job.
/// Run with: cargo run --bin consumer
use anyhow::{Context, Result};
use sqs_send_receive::app::{self, Role};
use sqs_send_receive::telemetry::{init_telemetry, TelemetryConfig};
use sqs_send_receive::AppConfig;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::from_env().context("Failed to load configuration")?;
    let _telemetry = init_telemetry(TelemetryConfig::from(&config))
        .context("Failed to initialize telemetry")?;

    app::run(&config, Role::Consumer)
        .await
        .context("Receive job failed")?;

    Ok(())
}

/// Standalone producer: runs only the send job.
/// Run with: cargo run --bin producer
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

    app::run(&config, Role::Producer)
        .await
        .context("Send job failed")?;

    Ok(())
}

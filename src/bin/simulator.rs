//! sensor-simulator: posts a synthetic reading to the ingestion server on a
//! fixed interval. Uses the `[simulator]` section of server.toml.

use anyhow::{Context, Result};
use sensor_ingest::{config::ServerConfig, logging, simulator::Simulator};

#[tokio::main]
async fn main() -> Result<()> {
    let config = ServerConfig::load_or_default()?;
    logging::init(&config.logging);

    println!("Starting sensor simulator.");
    println!(
        "Sending data to {} every {:.0} minutes.",
        config.simulator.target_url,
        config.simulator.interval_seconds as f64 / 60.0
    );
    println!("Press CTRL+C to stop.");

    let simulator = Simulator::new(config.simulator).context("failed to build HTTP client")?;
    simulator
        .run(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await;
    Ok(())
}

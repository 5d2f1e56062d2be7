//! ==============================================================================
//! simulator.rs - synthetic sensor node
//! ==============================================================================
//!
//! purpose:
//!     stands in for a real sensor: every `interval_seconds` it makes up a
//!     plausible reading and POSTs it to the ingestion endpoint, the same way
//!     a field node pushes to the hub.
//!
//! delivery failures (refused connection, timeout, non-200) are logged and
//! the loop carries on with the next tick. nothing is queued for resend.
//!
//! relationships:
//!     - used by: bin/simulator.rs
//!     - talks to: server.rs (POST /sensor)
//!
//! ==============================================================================

use crate::config::SimulatorConfig;
use crate::domain::SensorPayload;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum SimulatorError {
    #[error("could not connect to {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("server answered {status}: {body}")]
    Rejected {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

/// round to two decimal places
fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// temperature 18-28, humidity 50-75, dust 10-25
pub fn generate_payload<R: Rng + ?Sized>(sensor_id: &str, rng: &mut R) -> SensorPayload {
    SensorPayload {
        sensor_id: sensor_id.to_string(),
        temperature: round2(rng.gen_range(18.0..28.0)),
        humidity: round2(rng.gen_range(50.0..75.0)),
        dust: round2(rng.gen_range(10.0..25.0)),
        latency: None,
    }
}

pub struct Simulator {
    client: reqwest::Client,
    config: SimulatorConfig,
}

impl Simulator {
    pub fn new(config: SimulatorConfig) -> Result<Self, SimulatorError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;
        Ok(Self { client, config })
    }

    /// POST one payload; returns the server's response body on 200
    pub async fn send(&self, payload: &SensorPayload) -> Result<String, SimulatorError> {
        let response = self
            .client
            .post(&self.config.target_url)
            .json(payload)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| self.classify(e))?;
        if status != reqwest::StatusCode::OK {
            return Err(SimulatorError::Rejected { status, body });
        }
        Ok(body)
    }

    fn classify(&self, e: reqwest::Error) -> SimulatorError {
        if e.is_timeout() {
            SimulatorError::Timeout(Duration::from_secs(self.config.timeout_seconds))
        } else if e.is_connect() {
            SimulatorError::Connect { url: self.config.target_url.clone(), source: e }
        } else {
            SimulatorError::Http(e)
        }
    }

    /// generate + send once, logging the outcome
    pub async fn tick(&self) -> Result<SensorPayload, SimulatorError> {
        let payload = generate_payload(&self.config.sensor_id, &mut rand::thread_rng());
        match self.send(&payload).await {
            Ok(body) => {
                info!(
                    sensor = %payload.sensor_id,
                    temperature = payload.temperature,
                    humidity = payload.humidity,
                    dust = payload.dust,
                    "Data sent successfully; server replied {}",
                    body.trim()
                );
                Ok(payload)
            }
            Err(e @ SimulatorError::Connect { .. }) => {
                error!("{}. Is the ingestion server running?", e);
                Err(e)
            }
            Err(e) => {
                warn!("Error sending data: {}", e);
                Err(e)
            }
        }
    }

    /// tick every `interval_seconds` until `shutdown` resolves
    pub async fn run<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let interval = Duration::from_secs(self.config.interval_seconds.max(1));
        info!(
            "Sending data to {} every {}s",
            self.config.target_url,
            interval.as_secs()
        );

        let mut ticker = tokio::time::interval(interval);
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Simulator interrupted, stopping");
                    return;
                }
                _ = ticker.tick() => {
                    let _ = self.tick().await;
                }
            }
        }
    }
}

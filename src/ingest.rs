//! ==============================================================================
//! ingest.rs - POST /sensor pipeline
//! ==============================================================================
//!
//! purpose:
//!     turns a raw request body into stored rows and a liveness update.
//!
//! flow:
//!
//! ```text
//!     body bytes ─► validate ─► stamp (server clock) ─► persist ─► record liveness
//!                       │                                  │
//!                       └── 400 ───────────────────────────┴── 500
//! ```
//!
//! liveness is only touched after the store accepted the write, so a sensor
//! is never reported online for a reading that was lost.
//!
//! relationships:
//!     - used by: server.rs (POST /sensor)
//!     - uses: domain.rs (payload validation), storage (writes), liveness.rs
//!
//! ==============================================================================

use crate::domain::{PayloadError, Reading, SensorPayload};
use crate::liveness::SharedLiveness;
use crate::storage::{ReadingStore, StorageError};
use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Payload(#[from] PayloadError),

    #[error("failed to store reading: {0}")]
    Storage(#[from] StorageError),
}

pub struct Ingestor {
    store: Arc<dyn ReadingStore>,
    liveness: SharedLiveness,
    show_sensor_data: bool,
}

impl Ingestor {
    pub fn new(store: Arc<dyn ReadingStore>, liveness: SharedLiveness, show_sensor_data: bool) -> Self {
        Self { store, liveness, show_sensor_data }
    }

    pub async fn ingest(&self, body: &[u8]) -> Result<Reading, IngestError> {
        let payload = SensorPayload::from_json(body).inspect_err(|e| {
            warn!("Malformed payload received: {}. Error: {}", String::from_utf8_lossy(body), e);
        })?;

        let (reading, latency) = payload.stamp(Utc::now());

        match &latency {
            Some(sample) => self.store.insert_reading_with_latency(&reading, sample).await?,
            None => self.store.insert_reading(&reading).await?,
        }

        self.liveness.write().await.record(&reading.sensor_id, reading.timestamp);

        if self.show_sensor_data {
            info!(
                "Inserted data from sensor '{}': Temp={}, Hum={}, Dust={}, Latency={:?}",
                reading.sensor_id,
                reading.temperature,
                reading.humidity,
                reading.dust,
                latency.as_ref().map(|l| l.latency),
            );
        }

        Ok(reading)
    }
}

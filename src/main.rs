//! ==============================================================================
//! main.rs - sensor ingestion server entry point
//! ==============================================================================
//!
//! purpose:
//!     the hub that field sensors (and the simulator) push readings to.
//!
//! responsibilities:
//!     - load server.toml and install logging
//!     - connect to TimescaleDB, waiting for it if it is still starting
//!     - create the reading / latency hypertables
//!     - serve /, /status and /sensor until SIGINT or SIGTERM
//!     - close the database connection on the way out, whatever the reason
//!
//! architecture:
//!
//! ```text
//!     ┌──────────────────────────────────────────────────────────┐
//!     │                  rust server (this file)                  │
//!     │   ┌──────────────┐        ┌──────────────────────────┐    │
//!     │   │ POST /sensor │        │ GET /status              │    │
//!     │   └──────┬───────┘        └────────────┬─────────────┘    │
//!     │          │ ingest.rs                   │ status.rs        │
//!     │          ▼                             ▼                  │
//!     │   ┌──────────────┐  record   ┌──────────────────────┐     │
//!     │   │   storage    │ ───────►  │ liveness (RwLock map) │     │
//!     │   └──────┬───────┘           └──────────────────────┘     │
//!     └──────────┼───────────────────────────────────────────────┘
//!                │ one connection, Mutex-serialized
//!                ▼
//!         ┌──────────────┐
//!         │ TimescaleDB  │  sensor_data, sensor_latency
//!         └──────────────┘
//! ```
//!
//! ==============================================================================

use anyhow::{Context, Result};
use sensor_ingest::config::{ServerConfig, StorageBackend};
use sensor_ingest::ingest::Ingestor;
use sensor_ingest::liveness::LivenessTracker;
use sensor_ingest::server::{self, AppState};
use sensor_ingest::status::StatusReporter;
use sensor_ingest::storage::{MemoryStore, PgStore, ReadingStore};
use sensor_ingest::{logging, shutdown};
use std::sync::Arc;
use tracing::{error, info};

// ==============================================================================
// main entry point
// ==============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    // startup banner
    println!("===========================================================");
    println!("  Sensor Ingestion Server");
    println!("  readings -> TimescaleDB, liveness -> /status");
    println!("===========================================================");

    // step 1: load configuration
    let config = ServerConfig::load_or_default()?;
    logging::init(&config.logging);
    config.print_summary();

    // step 2: connect to the store (blocks until the database answers)
    let store: Arc<dyn ReadingStore> = match config.database.backend {
        StorageBackend::Postgres => Arc::new(
            PgStore::connect(&config.database)
                .await
                .context("failed to connect to the database")?,
        ),
        StorageBackend::Memory => Arc::new(MemoryStore::new()),
    };

    // step 3: everything after the connection exists runs inside `run`, so
    // the connection is closed on both the signal path and the error path
    let outcome = run(&config, store.clone()).await;
    store.close().await;

    if let Err(e) = &outcome {
        error!("Server stopped with error: {:#}", e);
    }
    outcome
}

async fn run(config: &ServerConfig, store: Arc<dyn ReadingStore>) -> Result<()> {
    store.initialize().await.context("failed to initialize database schema")?;

    let liveness = LivenessTracker::shared();
    let state = AppState {
        ingestor: Arc::new(Ingestor::new(
            store,
            liveness.clone(),
            config.logging.show_sensor_data,
        )),
        reporter: Arc::new(StatusReporter::new(liveness, config.liveness.max_age_seconds)),
    };

    info!("Server started");
    server::serve(config.server.bind_target(), state, shutdown::wait_for_signal()).await
}

//! ==============================================================================
//! sensor-ingest - telemetry endpoint library
//! ==============================================================================
//!
//! modules, leaves first:
//!     - config:    server.toml schema and loader
//!     - logging:   tracing subscriber setup
//!     - domain:    Reading / LatencySample / request payload validation
//!     - storage:   ReadingStore trait, TimescaleDB and in-memory backends
//!     - liveness:  last-seen map and online/offline classification
//!     - ingest:    POST /sensor pipeline (validate, stamp, persist, record)
//!     - status:    GET /status rendering
//!     - server:    axum router and serve loop
//!     - shutdown:  termination signal handling
//!     - simulator: synthetic sensor node posting to the server
//!
//! ==============================================================================

pub mod config;
pub mod domain;
pub mod ingest;
pub mod liveness;
pub mod logging;
pub mod server;
pub mod shutdown;
pub mod simulator;
pub mod status;
pub mod storage;

//! ==============================================================================
//! storage - Reading Store Abstraction
//! ==============================================================================
//!
//! purpose:
//!     one interface for persisting readings and latency samples, with two
//!     backends behind it:
//!     - postgres.rs: TimescaleDB over a single long-lived connection
//!     - memory.rs: in-process tables for development runs and tests
//!
//! relationships:
//!     - used by: ingest.rs (writes), main.rs (connect / initialize / close)
//!
//! every write commits before returning. nothing is batched or retried here;
//! a failed write is the caller's to report.
//!
//! ==============================================================================

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::{is_already_hypertable, PgStore};

use crate::domain::{LatencySample, Reading};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("gave up connecting after {attempts} attempts: {source}")]
    ConnectExhausted {
        attempts: u32,
        #[source]
        source: sqlx::Error,
    },

    #[error("store connection is closed")]
    Closed,
}

#[async_trait]
pub trait ReadingStore: Send + Sync {
    /// create tables and hypertables; safe to run on every start
    async fn initialize(&self) -> Result<(), StorageError>;

    async fn insert_reading(&self, reading: &Reading) -> Result<(), StorageError>;

    async fn insert_latency(&self, sample: &LatencySample) -> Result<(), StorageError>;

    /// both rows or neither
    async fn insert_reading_with_latency(
        &self,
        reading: &Reading,
        sample: &LatencySample,
    ) -> Result<(), StorageError>;

    /// release the underlying connection; later writes fail with `Closed`
    async fn close(&self);
}

use super::{ReadingStore, StorageError};
use crate::domain::{LatencySample, Reading};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

#[derive(Debug, Default)]
struct Tables {
    readings: Vec<Reading>,
    latencies: Vec<LatencySample>,
}

/// in-process store used when no database is configured
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    closed: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        tracing::info!("Using in-memory reading store (nothing is persisted)");
        Self::default()
    }

    pub fn readings(&self) -> Vec<Reading> {
        self.lock().readings.clone()
    }

    pub fn latencies(&self) -> Vec<LatencySample> {
        self.lock().latencies.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Tables> {
        // a panic while holding the lock cannot leave a half-written row
        self.tables.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn ensure_open(&self) -> Result<(), StorageError> {
        if self.is_closed() {
            return Err(StorageError::Closed);
        }
        Ok(())
    }
}

#[async_trait]
impl ReadingStore for MemoryStore {
    async fn initialize(&self) -> Result<(), StorageError> {
        self.ensure_open()
    }

    async fn insert_reading(&self, reading: &Reading) -> Result<(), StorageError> {
        self.ensure_open()?;
        tracing::debug!("[MEMORY] insert reading for {}", reading.sensor_id);
        self.lock().readings.push(reading.clone());
        Ok(())
    }

    async fn insert_latency(&self, sample: &LatencySample) -> Result<(), StorageError> {
        self.ensure_open()?;
        tracing::debug!("[MEMORY] insert latency for {}", sample.sensor_id);
        self.lock().latencies.push(sample.clone());
        Ok(())
    }

    async fn insert_reading_with_latency(
        &self,
        reading: &Reading,
        sample: &LatencySample,
    ) -> Result<(), StorageError> {
        self.ensure_open()?;
        let mut tables = self.lock();
        tables.readings.push(reading.clone());
        tables.latencies.push(sample.clone());
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

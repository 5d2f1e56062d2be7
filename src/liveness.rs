//! ==============================================================================
//! liveness.rs - last-seen tracking per sensor
//! ==============================================================================
//!
//! purpose:
//!     remembers when each sensor last delivered a persisted reading and
//!     classifies sensors as online/offline against a staleness threshold.
//!
//! relationships:
//!     - written by: ingest.rs (after a reading is stored)
//!     - read by: status.rs (GET /status)
//!
//! the map lives in process memory only. a restart forgets every sensor until
//! it reports again.
//!
//! ==============================================================================

use chrono::{DateTime, TimeDelta, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

/// handle shared between the ingestion path (writer) and status (reader)
pub type SharedLiveness = Arc<RwLock<LivenessTracker>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Online,
    Offline,
}

impl Liveness {
    pub fn as_flag(self) -> u8 {
        match self {
            Liveness::Online => 1,
            Liveness::Offline => 0,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LivenessError {
    #[error("staleness threshold of {0}s is out of range")]
    ThresholdOutOfRange(u64),

    #[error("deadline for last-seen {0} is out of range")]
    DeadlineOutOfRange(DateTime<Utc>),
}

#[derive(Debug, Default, Clone)]
pub struct LivenessTracker {
    last_seen: HashMap<String, DateTime<Utc>>,
}

impl LivenessTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedLiveness {
        Arc::new(RwLock::new(Self::new()))
    }

    /// advance the last-seen instant for `sensor_id`
    ///
    /// concurrent ingests may finish out of stamp order; an older instant
    /// never replaces a newer one.
    pub fn record(&mut self, sensor_id: &str, at: DateTime<Utc>) {
        match self.last_seen.get_mut(sensor_id) {
            Some(seen) => {
                if at > *seen {
                    *seen = at;
                }
            }
            None => {
                self.last_seen.insert(sensor_id.to_string(), at);
            }
        }
    }

    pub fn last_seen(&self, sensor_id: &str) -> Option<DateTime<Utc>> {
        self.last_seen.get(sensor_id).copied()
    }

    pub fn len(&self) -> usize {
        self.last_seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_seen.is_empty()
    }

    /// classify every known sensor relative to `now`
    ///
    /// each sensor is classified on its own: one failing entry does not
    /// affect the others.
    pub fn snapshot(
        &self,
        now: DateTime<Utc>,
        max_age_seconds: u64,
    ) -> BTreeMap<String, Result<Liveness, LivenessError>> {
        self.last_seen
            .iter()
            .map(|(sensor, seen)| (sensor.clone(), classify(*seen, now, max_age_seconds)))
            .collect()
    }
}

/// online iff `now - last_seen <= max_age_seconds`
///
/// evaluated as `now <= last_seen + max_age` so the arithmetic can be checked.
pub fn classify(
    last_seen: DateTime<Utc>,
    now: DateTime<Utc>,
    max_age_seconds: u64,
) -> Result<Liveness, LivenessError> {
    let max_age = i64::try_from(max_age_seconds)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .ok_or(LivenessError::ThresholdOutOfRange(max_age_seconds))?;
    let deadline = last_seen
        .checked_add_signed(max_age)
        .ok_or(LivenessError::DeadlineOutOfRange(last_seen))?;

    if now <= deadline {
        Ok(Liveness::Online)
    } else {
        Ok(Liveness::Offline)
    }
}

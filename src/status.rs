//! GET /status rendering: sensor id -> 1 (online) / 0 (offline).

use crate::liveness::{Liveness, LivenessError, SharedLiveness};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tracing::error;

pub struct StatusReporter {
    liveness: SharedLiveness,
    max_age_seconds: u64,
}

impl StatusReporter {
    pub fn new(liveness: SharedLiveness, max_age_seconds: u64) -> Self {
        Self { liveness, max_age_seconds }
    }

    pub async fn report(&self, now: DateTime<Utc>) -> BTreeMap<String, u8> {
        let snapshot = self.liveness.read().await.snapshot(now, self.max_age_seconds);
        render(snapshot)
    }
}

/// a sensor whose status could not be computed is reported offline
pub fn render(snapshot: BTreeMap<String, Result<Liveness, LivenessError>>) -> BTreeMap<String, u8> {
    snapshot
        .into_iter()
        .map(|(sensor, status)| {
            let flag = match status {
                Ok(liveness) => liveness.as_flag(),
                Err(e) => {
                    error!("Error computing status for sensor {}: {}", sensor, e);
                    Liveness::Offline.as_flag()
                }
            };
            (sensor, flag)
        })
        .collect()
}

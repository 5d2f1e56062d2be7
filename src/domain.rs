use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// keys every ingestion payload must carry, in the order they are reported
pub const REQUIRED_KEYS: [&str; 4] = ["sensor", "temperature", "humidity", "dust"];

/// legacy clients send `-1` when they have no latency measurement
pub const LATENCY_ABSENT_SENTINEL: f64 = -1.0;

const LATENCY_KEYS: [&str; 2] = ["latencia", "latency"];

/// one persisted sensor observation
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct Reading {
    /// server-assigned instant, never taken from the client
    pub timestamp: DateTime<Utc>,
    /// unique sensor identifier (e.g., "sensor_simulado")
    pub sensor_id: String,
    /// temperature in celsius
    pub temperature: f64,
    /// relative humidity (0-100%)
    pub humidity: f64,
    /// dust concentration
    pub dust: f64,
}

/// round-trip latency reported alongside a reading
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct LatencySample {
    pub timestamp: DateTime<Utc>,
    pub sensor_id: String,
    pub latency: f64,
}

#[derive(Debug, Error, PartialEq)]
pub enum PayloadError {
    #[error("invalid JSON body: {0}")]
    Malformed(String),

    #[error("payload must be a JSON object")]
    NotAnObject,

    #[error("invalid JSON. missing keys: {}", quote_keys(.0))]
    MissingKeys(Vec<&'static str>),

    #[error("field '{field}' {expected}")]
    InvalidField {
        field: &'static str,
        expected: &'static str,
    },
}

fn quote_keys(keys: &[&str]) -> String {
    keys.iter().map(|k| format!("'{}'", k)).collect::<Vec<_>>().join(", ")
}

/// validated body of `POST /sensor`
///
/// also what the simulator serializes, so both sides agree on field names.
#[derive(Clone, Serialize, Debug, PartialEq)]
pub struct SensorPayload {
    #[serde(rename = "sensor")]
    pub sensor_id: String,
    pub temperature: f64,
    pub humidity: f64,
    pub dust: f64,
    #[serde(rename = "latencia", skip_serializing_if = "Option::is_none")]
    pub latency: Option<f64>,
}

impl SensorPayload {
    /// parse and validate a raw request body
    ///
    /// absent and `null` are the same thing for every key. all missing
    /// required keys are reported together.
    pub fn from_json(body: &[u8]) -> Result<Self, PayloadError> {
        let value: Value =
            serde_json::from_slice(body).map_err(|e| PayloadError::Malformed(e.to_string()))?;
        let object = value.as_object().ok_or(PayloadError::NotAnObject)?;

        let missing: Vec<&'static str> = REQUIRED_KEYS
            .iter()
            .copied()
            .filter(|key| present(object, key).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(PayloadError::MissingKeys(missing));
        }

        let sensor_id = match present(object, "sensor").and_then(Value::as_str) {
            Some(id) if !id.trim().is_empty() => id.to_string(),
            _ => {
                return Err(PayloadError::InvalidField {
                    field: "sensor",
                    expected: "must be a non-empty string",
                })
            }
        };

        Ok(Self {
            sensor_id,
            temperature: number(object, "temperature")?,
            humidity: number(object, "humidity")?,
            dust: number(object, "dust")?,
            latency: latency(object)?,
        })
    }

    /// attach the server timestamp, producing the rows to persist
    pub fn stamp(self, at: DateTime<Utc>) -> (Reading, Option<LatencySample>) {
        let latency = self.latency.map(|latency| LatencySample {
            timestamp: at,
            sensor_id: self.sensor_id.clone(),
            latency,
        });
        let reading = Reading {
            timestamp: at,
            sensor_id: self.sensor_id,
            temperature: self.temperature,
            humidity: self.humidity,
            dust: self.dust,
        };
        (reading, latency)
    }
}

fn present<'a>(object: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    object.get(key).filter(|v| !v.is_null())
}

fn number(object: &Map<String, Value>, field: &'static str) -> Result<f64, PayloadError> {
    present(object, field)
        .and_then(Value::as_f64)
        .ok_or(PayloadError::InvalidField { field, expected: "must be a number" })
}

fn latency(object: &Map<String, Value>) -> Result<Option<f64>, PayloadError> {
    for key in LATENCY_KEYS {
        if let Some(value) = present(object, key) {
            let latency = value.as_f64().ok_or(PayloadError::InvalidField {
                field: "latencia",
                expected: "must be a number",
            })?;
            if latency == LATENCY_ABSENT_SENTINEL {
                return Ok(None);
            }
            return Ok(Some(latency));
        }
    }
    Ok(None)
}

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::{TimeDelta, Utc};
use sensor_ingest::domain::{LatencySample, Reading};
use sensor_ingest::ingest::Ingestor;
use sensor_ingest::liveness::{LivenessTracker, SharedLiveness};
use sensor_ingest::server::{router, AppState, BANNER};
use sensor_ingest::status::StatusReporter;
use sensor_ingest::storage::{MemoryStore, ReadingStore, StorageError};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt; // for `oneshot`

struct Harness {
    app: Router,
    store: Arc<MemoryStore>,
    liveness: SharedLiveness,
}

fn harness() -> Harness {
    let store = Arc::new(MemoryStore::new());
    let liveness = LivenessTracker::shared();
    let app = app_with(store.clone(), liveness.clone());
    Harness { app, store, liveness }
}

fn app_with(store: Arc<dyn ReadingStore>, liveness: SharedLiveness) -> Router {
    router(AppState {
        ingestor: Arc::new(Ingestor::new(store, liveness.clone(), false)),
        reporter: Arc::new(StatusReporter::new(liveness, 1800)),
    })
}

async fn post_sensor(app: &Router, body: Value) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/sensor")
                .header("Content-Type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Vec<u8>) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, bytes.to_vec())
}

#[tokio::test]
async fn valid_post_stores_exactly_one_row() {
    let h = harness();
    let before = Utc::now();

    let (status, body) = post_sensor(
        &h.app,
        json!({"sensor": "s1", "temperature": 23.4, "humidity": 61.2, "dust": 15.5}),
    )
    .await;
    let after = Utc::now();

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "ok"}));

    let readings = h.store.readings();
    assert_eq!(readings.len(), 1);
    let row = &readings[0];
    assert_eq!(row.sensor_id, "s1");
    assert_eq!(row.temperature, 23.4);
    assert_eq!(row.humidity, 61.2);
    assert_eq!(row.dust, 15.5);
    assert!(row.timestamp >= before && row.timestamp <= after);
}

#[tokio::test]
async fn missing_required_field_is_rejected_without_write() {
    let h = harness();
    let complete = json!({"sensor": "s1", "temperature": 20.0, "humidity": 50.0, "dust": 10.0});

    for key in ["sensor", "temperature", "humidity", "dust"] {
        let mut partial = complete.clone();
        partial.as_object_mut().unwrap().remove(key);

        let (status, body) = post_sensor(&h.app, partial).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "missing {}", key);
        assert_eq!(body["status"], "error");
        assert!(
            body["message"].as_str().unwrap().contains(&format!("missing keys: '{}'", key)),
            "message was {}",
            body["message"]
        );
    }

    assert!(h.store.readings().is_empty());
    assert!(h.liveness.read().await.is_empty());
}

#[tokio::test]
async fn malformed_json_is_bad_request() {
    let h = harness();
    let response = h
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/sensor")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(h.store.readings().is_empty());
}

#[tokio::test]
async fn status_reports_sensor_online_after_post() {
    let h = harness();
    let (status, _) = post_sensor(
        &h.app,
        json!({"sensor": "s1", "temperature": 20.0, "humidity": 50.0, "dust": 10.0}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = get(&h.app, "/status").await;
    assert_eq!(status, StatusCode::OK);
    let report: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(report, json!({"s1": 1}));
}

#[tokio::test]
async fn status_applies_staleness_threshold() {
    let h = harness();
    let now = Utc::now();
    {
        let mut tracker = h.liveness.write().await;
        tracker.record("stale", now - TimeDelta::seconds(1801));
        // margin for the time between here and the handler's clock read
        tracker.record("fresh", now - TimeDelta::seconds(1700));
    }

    let (_, body) = get(&h.app, "/status").await;
    let report: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(report, json!({"stale": 0, "fresh": 1}));
}

#[tokio::test]
async fn latency_sentinel_writes_only_the_reading() {
    let h = harness();
    let (status, _) = post_sensor(
        &h.app,
        json!({"sensor": "s1", "temperature": 20.0, "humidity": 50.0, "dust": 10.0, "latencia": -1}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(h.store.readings().len(), 1);
    assert!(h.store.latencies().is_empty());
}

#[tokio::test]
async fn latency_value_writes_both_rows() {
    let h = harness();
    let (status, _) = post_sensor(
        &h.app,
        json!({"sensor": "s1", "temperature": 20.0, "humidity": 50.0, "dust": 10.0, "latencia": 3.5}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let readings = h.store.readings();
    let latencies = h.store.latencies();
    assert_eq!(readings.len(), 1);
    assert_eq!(latencies.len(), 1);
    assert_eq!(latencies[0].timestamp, readings[0].timestamp);
    assert_eq!(latencies[0].sensor_id, readings[0].sensor_id);
    assert_eq!(latencies[0].latency, 3.5);
}

#[tokio::test]
async fn rapid_posts_update_only_their_own_sensor() {
    let h = harness();
    for sensor in ["a", "b", "c"] {
        let (status, _) = post_sensor(
            &h.app,
            json!({"sensor": sensor, "temperature": 20.0, "humidity": 50.0, "dust": 10.0}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let readings = h.store.readings();
    let tracker = h.liveness.read().await;
    assert_eq!(tracker.len(), 3);
    for reading in &readings {
        assert_eq!(tracker.last_seen(&reading.sensor_id), Some(reading.timestamp));
    }
}

#[tokio::test]
async fn banner_is_plain_text() {
    let h = harness();
    let response = h
        .app
        .clone()
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "text/plain");
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], BANNER.as_bytes());
}

#[tokio::test]
async fn banner_does_not_depend_on_the_store() {
    let store = Arc::new(MemoryStore::new());
    store.close().await;
    let app = app_with(store, LivenessTracker::shared());

    let (status, _) = get(&app, "/").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn unknown_path_is_not_found() {
    let h = harness();
    let (status, _) = get(&h.app, "/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

struct FailingStore;

#[async_trait]
impl ReadingStore for FailingStore {
    async fn initialize(&self) -> Result<(), StorageError> {
        Ok(())
    }

    async fn insert_reading(&self, _: &Reading) -> Result<(), StorageError> {
        Err(StorageError::Closed)
    }

    async fn insert_latency(&self, _: &LatencySample) -> Result<(), StorageError> {
        Err(StorageError::Closed)
    }

    async fn insert_reading_with_latency(
        &self,
        _: &Reading,
        _: &LatencySample,
    ) -> Result<(), StorageError> {
        Err(StorageError::Closed)
    }

    async fn close(&self) {}
}

#[tokio::test]
async fn storage_failure_is_internal_error_and_sensor_stays_unknown() {
    let liveness = LivenessTracker::shared();
    let app = app_with(Arc::new(FailingStore), liveness.clone());

    let (status, body) = post_sensor(
        &app,
        json!({"sensor": "s1", "temperature": 20.0, "humidity": 50.0, "dust": 10.0}),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["message"], "Internal server error");

    let (_, body) = get(&app, "/status").await;
    let report: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(report, json!({}));
}

/// memory store that takes a while to accept each reading
struct SlowStore {
    inner: MemoryStore,
}

#[async_trait]
impl ReadingStore for SlowStore {
    async fn initialize(&self) -> Result<(), StorageError> {
        self.inner.initialize().await
    }

    async fn insert_reading(&self, reading: &Reading) -> Result<(), StorageError> {
        tokio::time::sleep(Duration::from_millis(200)).await;
        self.inner.insert_reading(reading).await
    }

    async fn insert_latency(&self, sample: &LatencySample) -> Result<(), StorageError> {
        self.inner.insert_latency(sample).await
    }

    async fn insert_reading_with_latency(
        &self,
        reading: &Reading,
        sample: &LatencySample,
    ) -> Result<(), StorageError> {
        tokio::time::sleep(Duration::from_millis(200)).await;
        self.inner.insert_reading_with_latency(reading, sample).await
    }

    async fn close(&self) {
        self.inner.close().await
    }
}

#[tokio::test]
async fn abandoned_request_still_completes_ingestion() {
    let store = Arc::new(SlowStore { inner: MemoryStore::new() });
    let liveness = LivenessTracker::shared();
    let app = app_with(store.clone(), liveness.clone());

    let request = Request::builder()
        .method("POST")
        .uri("/sensor")
        .header("Content-Type", "application/json")
        .body(Body::from(
            json!({"sensor": "s1", "temperature": 20.0, "humidity": 50.0, "dust": 10.0}).to_string(),
        ))
        .unwrap();

    // client gives up before the store answers; the handler future is dropped
    let outcome = tokio::time::timeout(Duration::from_millis(50), app.oneshot(request)).await;
    assert!(outcome.is_err());

    tokio::time::sleep(Duration::from_millis(400)).await;

    let readings = store.inner.readings();
    assert_eq!(readings.len(), 1);
    assert_eq!(liveness.read().await.last_seen("s1"), Some(readings[0].timestamp));
}

// ==============================================================================
// web server
// ==============================================================================
//
//     GET  /        -> text banner (never touches the store)
//     GET  /status  -> {"sensor_id": 0|1, ...}
//     POST /sensor  -> {"status": "ok"} | 400 | 500
//     anything else -> 404

use crate::domain::PayloadError;
use crate::ingest::{IngestError, Ingestor};
use crate::status::StatusReporter;
use anyhow::Result;
use axum::{
    body::Bytes,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde_json::json;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use tokio::net::{TcpListener, ToSocketAddrs};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};

pub const BANNER: &str = "Sensor server is up. POST readings to /sensor.";

#[derive(Clone)]
pub struct AppState {
    pub ingestor: Arc<Ingestor>,
    pub reporter: Arc<StatusReporter>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(banner_handler))
        .route("/status", get(status_handler))
        .route("/sensor", post(sensor_handler))
        .fallback(not_found_handler)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve until `shutdown` resolves, then let in-flight requests finish.
pub async fn serve<A, F>(addr: A, state: AppState, shutdown: F) -> Result<()>
where
    A: ToSocketAddrs,
    F: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(addr).await?;
    info!("HTTP server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    info!("HTTP server stopped");
    Ok(())
}

async fn banner_handler() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/plain")], BANNER)
}

async fn status_handler(State(state): State<AppState>) -> Json<BTreeMap<String, u8>> {
    Json(state.reporter.report(Utc::now()).await)
}

async fn sensor_handler(State(state): State<AppState>, body: Bytes) -> Response {
    // detached so a client hanging up cannot cut the write off mid-way
    let ingestor = state.ingestor.clone();
    let task = tokio::spawn(async move { ingestor.ingest(&body).await });

    match task.await {
        Ok(Ok(_)) => Json(json!({"status": "ok"})).into_response(),
        Ok(Err(e)) => e.into_response(),
        Err(e) => {
            error!("Ingestion task failed: {}", e);
            error_body(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        }
    }
}

async fn not_found_handler() -> impl IntoResponse {
    error_body(StatusCode::NOT_FOUND, "Not found. Use the /sensor endpoint")
}

fn error_body(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({"status": "error", "message": message}))).into_response()
}

impl IntoResponse for IngestError {
    fn into_response(self) -> Response {
        match &self {
            IngestError::Payload(PayloadError::MissingKeys(_)) => {
                let message = format!(
                    "{}. required keys: 'sensor', 'temperature', 'humidity', 'dust'",
                    self
                );
                error_body(StatusCode::BAD_REQUEST, &message)
            }
            IngestError::Payload(e) => error_body(StatusCode::BAD_REQUEST, &e.to_string()),
            IngestError::Storage(e) => {
                error!("Unexpected error: {}", e);
                error_body(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        }
    }
}

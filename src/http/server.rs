//! HTTP debug server for the delta consumer
//!
//! Lets an operator trigger runs by hand. Every run still goes through the processing
//! queue, so a manual run never overlaps with a scheduled one.

use crate::{
    api::consumer_api::DeltaConsumer,
    execution::{ProcessingQueue, Trigger},
};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::{sync::Arc, time::Duration};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

/// Generic success response
#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub msg: String,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Shared application state
pub struct AppState {
    pub consumer: Arc<DeltaConsumer>,
    pub queue: Arc<ProcessingQueue>,
    pub service_name: String,
    pub flush_grace_period: Duration,
}

/// Custom error type for API errors
pub enum ApiError {
    QueueFull(Trigger),
    InternalError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::QueueFull(trigger) => {
                (StatusCode::SERVICE_UNAVAILABLE, format!("Could not queue {}, try again later", trigger))
            }
            ApiError::InternalError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(ErrorResponse { error: message });
        (status, body).into_response()
    }
}

impl From<crate::Error> for ApiError {
    fn from(err: crate::Error) -> Self {
        ApiError::InternalError(err.to_string())
    }
}

/// Create the HTTP server with all routes
pub fn create_server(state: AppState) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .route("/", get(hello))
        .route("/initial-sync-jobs", post(start_initial_sync).delete(delete_initial_sync_jobs))
        .route("/delta-sync-jobs", post(start_delta_sync))
        .route("/delta-cleanup-jobs", post(start_delta_cleanup))
        .route("/flush", post(flush))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(Arc::new(state))
}

async fn hello(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    format!("Hello, you have reached {}! I'm doing just fine :)", state.service_name)
}

fn enqueue(state: &AppState, trigger: Trigger, msg: &str) -> Result<Json<SuccessResponse>, ApiError> {
    if state.queue.submit(trigger) {
        Ok(Json(SuccessResponse { msg: msg.to_string() }))
    } else {
        Err(ApiError::QueueFull(trigger))
    }
}

/// POST /initial-sync-jobs
async fn start_initial_sync(State(state): State<Arc<AppState>>) -> Result<Json<SuccessResponse>, ApiError> {
    enqueue(&state, Trigger::InitialSync, "Started initial sync job")
}

/// DELETE /initial-sync-jobs - Remove every initial sync job
async fn delete_initial_sync_jobs(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let removed = state.consumer.delete_initial_sync_jobs().await?;
    Ok(Json(SuccessResponse { msg: format!("Initial sync jobs cleaned ({} removed)", removed) }))
}

/// POST /delta-sync-jobs
async fn start_delta_sync(State(state): State<Arc<AppState>>) -> Result<Json<SuccessResponse>, ApiError> {
    enqueue(&state, Trigger::DeltaSync, "Started delta sync job")
}

/// POST /delta-cleanup-jobs
async fn start_delta_cleanup(State(state): State<Arc<AppState>>) -> Result<Json<SuccessResponse>, ApiError> {
    enqueue(&state, Trigger::Cleanup, "Started delta cleanup job")
}

/// POST /flush - Remove all jobs and the landing zone after a grace period
async fn flush(State(state): State<Arc<AppState>>) -> Json<SuccessResponse> {
    let grace = state.flush_grace_period;
    let msg = format!(
        "This call will flush the initial sync jobs, the delta sync jobs and, if applicable, the landing \
         zone. Dispatched data is not touched. You have {} seconds to stop the service if this was not \
         your intention.",
        grace.as_secs()
    );
    warn!("{}", msg);

    let queue = Arc::clone(&state.queue);
    tokio::spawn(async move {
        tokio::time::sleep(grace).await;
        info!("grace period over, queueing flush");
        queue.submit(Trigger::Flush);
    });
    Json(SuccessResponse { msg })
}

/// Start the HTTP server
pub async fn start_server(addr: &str, state: AppState) -> Result<(), Box<dyn std::error::Error>> {
    let app = create_server(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr, "delta consumer HTTP server listening");
    info!("  GET    /                    - Hello");
    info!("  POST   /initial-sync-jobs   - Start an initial sync");
    info!("  DELETE /initial-sync-jobs   - Remove initial sync jobs");
    info!("  POST   /delta-sync-jobs     - Start a delta sync");
    info!("  POST   /delta-cleanup-jobs  - Start a delta cleanup");
    info!("  POST   /flush               - Remove all jobs and the landing zone");

    axum::serve(listener, app).await?;

    Ok(())
}

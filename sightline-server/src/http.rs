//! HTTP surface

use crate::error::{IngestError, StoreError};
use crate::history::HistoryStore;
use crate::ingest::DetectionIngestor;
use crate::upload;
use axum::{
    extract::{multipart::MultipartRejection, DefaultBodyLimit, Multipart, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use sightline_core::config::Environment;
use sightline_core::{ApiResponse, DetectionResult, HealthReport, ServiceDescriptor};
use std::any::Any;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// Version reported by the service descriptor.
pub const API_VERSION: &str = "1.0.0";

pub const DEFAULT_LIST_LIMIT: usize = 10;
pub const MAX_LIST_LIMIT: usize = 1000;

const EMPTY_COLLECTION_MESSAGE: &str =
    "No detections found. Collection will be created when first detection is saved.";

#[derive(Clone)]
pub struct ApiState {
    pub ingestor: Arc<DetectionIngestor>,
    pub history: Arc<dyn HistoryStore>,
    pub upload_dir: Arc<PathBuf>,
    pub max_upload_bytes: usize,
    pub environment: Environment,
}

impl ApiState {
    /// Error details are only exposed outside production.
    fn details(&self, message: impl ToString) -> Option<String> {
        if self.environment.is_production() {
            Some("Internal server error".to_string())
        } else {
            Some(message.to_string())
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub limit: Option<String>,
}

/// Result of interpreting the `limit` query parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListLimit {
    Limit(usize),
    Invalid(i64),
}

/// Leading-integer parse: missing, zero or non-numeric input falls back to
/// the default, negative values are rejected, large values are capped.
pub fn parse_limit(raw: Option<&str>) -> ListLimit {
    let raw = match raw.map(str::trim) {
        Some(raw) if !raw.is_empty() => raw,
        _ => return ListLimit::Limit(DEFAULT_LIST_LIMIT),
    };

    let (negative, digits) = match raw.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, raw.strip_prefix('+').unwrap_or(raw)),
    };
    let digits: String = digits.chars().take_while(|c| c.is_ascii_digit()).collect();
    let value = match digits.parse::<i64>() {
        Ok(value) if negative => -value,
        Ok(value) => value,
        Err(_) if digits.is_empty() => return ListLimit::Limit(DEFAULT_LIST_LIMIT),
        Err(_) if negative => i64::MIN,
        Err(_) => i64::MAX,
    };

    match value {
        0 => ListLimit::Limit(DEFAULT_LIST_LIMIT),
        v if v < 0 => ListLimit::Invalid(v),
        v => ListLimit::Limit((v as u64).min(MAX_LIST_LIMIT as u64) as usize),
    }
}

/// Create HTTP router with all API routes
pub fn create_router(state: ApiState) -> Router {
    let production = state.environment.is_production();
    let body_limit = state.max_upload_bytes;

    Router::new()
        // A known path with the wrong method is still an unknown endpoint.
        .route("/", get(root_handler).fallback(not_found_handler))
        .route("/api/vision/detect", post(detect_handler).fallback(not_found_handler))
        .route("/api/vision/detections", get(list_detections_handler).fallback(not_found_handler))
        .route("/api/vision/detections/:id", get(get_detection_handler).fallback(not_found_handler))
        .route("/api/vision/health", get(health_handler).fallback(not_found_handler))
        .fallback(not_found_handler)
        .with_state(state)
        .layer(CatchPanicLayer::custom(move |panic: Box<dyn Any + Send + 'static>| {
            panic_response(panic, production)
        }))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(DefaultBodyLimit::max(body_limit))
}

async fn root_handler() -> impl IntoResponse {
    Json(ServiceDescriptor::new(API_VERSION))
}

async fn health_handler() -> impl IntoResponse {
    Json(HealthReport::ok())
}

async fn not_found_handler() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "Endpoint not found" })))
}

async fn detect_handler(
    State(state): State<ApiState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let mut multipart = match multipart {
        Ok(multipart) => multipart,
        Err(rejection) => {
            warn!("Rejected detect request: {}", rejection);
            return ingest_failure(&state, IngestError::NoFileProvided);
        }
    };

    let staged = match upload::stage_image(&mut multipart, &state.upload_dir).await {
        Ok(staged) => staged,
        Err(e) => return ingest_failure(&state, e),
    };

    match state.ingestor.ingest(staged).await {
        Ok(result) => (StatusCode::OK, Json(ApiResponse::ok(result))).into_response(),
        Err(e) => ingest_failure(&state, e),
    }
}

fn ingest_failure(state: &ApiState, err: IngestError) -> Response {
    let status = err.status();
    let body: ApiResponse<DetectionResult> = match &err {
        IngestError::NoFileProvided => ApiResponse::failure(err.to_string()),
        IngestError::MalformedUpload(msg) | IngestError::PayloadTooLarge(msg) => {
            ApiResponse::failure(err.to_string()).with_details(Some(msg.clone()))
        }
        IngestError::Staging(_) | IngestError::Detection(_) => {
            ApiResponse::failure("Failed to process image").with_details(state.details(&err))
        }
    };
    (status, Json(body)).into_response()
}

async fn list_detections_handler(
    State(state): State<ApiState>,
    Query(params): Query<ListParams>,
) -> Response {
    let limit = match parse_limit(params.limit.as_deref()) {
        ListLimit::Limit(limit) => limit,
        ListLimit::Invalid(value) => {
            let err = StoreError::InvalidQuery(format!("limit must not be negative, got {}", value));
            return store_failure(&state, &err, err.list_status(), err.summary());
        }
    };

    info!("Fetching {} detections from the {} history store", limit, state.history.name());

    match state.history.list_recent(limit).await {
        Ok(items) if items.is_empty() => {
            let exists = match state.history.collection_exists().await {
                Ok(exists) => exists,
                Err(e) => {
                    warn!("Could not check detection collection: {}", e);
                    true
                }
            };
            let mut body = ApiResponse::list(items);
            if !exists {
                body = body.with_message(EMPTY_COLLECTION_MESSAGE);
            }
            (StatusCode::OK, Json(body)).into_response()
        }
        Ok(items) => {
            info!("Fetched {} detections", items.len());
            (StatusCode::OK, Json(ApiResponse::list(items))).into_response()
        }
        Err(e) => {
            error!("History store error: {}", e);
            store_failure(&state, &e, e.list_status(), e.summary())
        }
    }
}

async fn get_detection_handler(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Response {
    match state.history.get_by_id(&id).await {
        Ok(record) => (StatusCode::OK, Json(ApiResponse::ok(record))).into_response(),
        Err(StoreError::NotFound(_)) => {
            let body: ApiResponse<DetectionResult> = ApiResponse::failure("Detection not found");
            (StatusCode::NOT_FOUND, Json(body)).into_response()
        }
        Err(e) => {
            error!("History store error for {}: {}", id, e);
            let summary = match &e {
                StoreError::Unavailable(_) | StoreError::PermissionDenied(_) | StoreError::InvalidQuery(_) => {
                    e.summary()
                }
                _ => "Failed to fetch detection",
            };
            store_failure(&state, &e, e.lookup_status(), summary)
        }
    }
}

fn store_failure(state: &ApiState, err: &StoreError, status: StatusCode, summary: &str) -> Response {
    let body: ApiResponse<DetectionResult> = ApiResponse::failure(summary)
        .with_error_code(err.code())
        .with_details(state.details(err));
    (status, Json(body)).into_response()
}

fn panic_response(panic: Box<dyn Any + Send + 'static>, production: bool) -> Response {
    let message = if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };
    error!("Handler panicked: {}", message);

    let mut body = json!({ "success": false, "error": "Something went wrong!" });
    if !production {
        body["details"] = json!(message);
    }
    (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
}

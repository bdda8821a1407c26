use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{LeakLensSys, handlers};

/// Headroom on top of the file limit for multipart boundaries and the other form fields.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

pub fn api_router(sys: Arc<LeakLensSys>) -> Router {
    let upload_limit = sys.config().max_file_bytes + MULTIPART_OVERHEAD_BYTES;
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health::health_live))
        .route("/api/v1/status", get(handlers::status::api_status))
        .route(
            "/api/v1/check/single",
            post(handlers::single::check_single),
        )
        .route(
            "/api/v1/check/batch",
            post(handlers::batch::submit_batch).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route(
            "/api/v1/check/batch/{job_id}/status",
            get(handlers::batch::batch_status),
        )
        .route(
            "/api/v1/check/batch/{job_id}",
            delete(handlers::batch::delete_batch),
        )
        .with_state(sys)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

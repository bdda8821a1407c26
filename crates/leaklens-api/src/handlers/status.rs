use std::sync::Arc;

use axum::{Json, extract::State};
use leaklens_common::{
    time::{format_rfc3339, now},
    types::{ApiStatusResponse, UpstreamStatus},
};
use tracing::warn;

use crate::LeakLensSys;

/// Liveness of this service plus reachability of the upstream classifier.
pub async fn api_status(State(sys): State<Arc<LeakLensSys>>) -> Json<ApiStatusResponse> {
    let upstream = match sys.classifier().check_connection().await {
        Ok(()) => UpstreamStatus {
            status: "ok".to_string(),
            message: "Upstream leak check service reachable".to_string(),
        },
        Err(err) => {
            warn!(error = %err, "upstream connectivity check failed");
            UpstreamStatus {
                status: "error".to_string(),
                message: err.to_string(),
            }
        }
    };

    Json(ApiStatusResponse {
        status: "ok".to_string(),
        timestamp: format_rfc3339(&now()),
        google_api_status: upstream,
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

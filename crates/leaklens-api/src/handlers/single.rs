use std::sync::Arc;

use axum::{Json, extract::State, extract::rejection::JsonRejection};
use leaklens_batch::{
    Credential,
    classifier::classify_with_timeout,
    types::{LEAKED_MESSAGE, NOT_LEAKED_MESSAGE},
};
use leaklens_common::types::{SingleCheckRequest, SingleCheckResponse};
use tracing::debug;

use crate::{LeakLensSys, handlers::ApiError};

/// Classifies one credential inline, bypassing the batch engine.
pub async fn check_single(
    State(sys): State<Arc<LeakLensSys>>,
    payload: Result<Json<SingleCheckRequest>, JsonRejection>,
) -> Result<Json<SingleCheckResponse>, ApiError> {
    let Json(request) = payload.map_err(|err| ApiError::invalid_input(err.body_text()))?;
    let username = request.username.trim();
    let password = request.password.trim();
    if username.is_empty() || password.is_empty() {
        return Err(ApiError::invalid_input("username and password are required"));
    }

    let credential = Credential::new(username, password);
    let is_leaked = classify_with_timeout(
        sys.classifier().as_ref(),
        &credential,
        sys.config().classify_timeout,
    )
    .await?;
    debug!(is_leaked, "single credential checked");

    Ok(Json(SingleCheckResponse {
        username: request.username,
        is_leaked,
        message: (if is_leaked { LEAKED_MESSAGE } else { NOT_LEAKED_MESSAGE }).to_string(),
    }))
}

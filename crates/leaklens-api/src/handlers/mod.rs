pub mod batch;
pub mod health;
pub mod single;
pub mod status;

use axum::{Json, http::StatusCode, response::IntoResponse};
use leaklens_common::{error::LeakLensError, types::ErrorResponse};
use tracing::error;

pub struct ApiError(pub LeakLensError);

impl From<LeakLensError> for ApiError {
    fn from(value: LeakLensError) -> Self {
        Self(value)
    }
}

impl ApiError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self(LeakLensError::InvalidInput(message.into()))
    }

    pub fn status_code(&self) -> StatusCode {
        match self.0 {
            LeakLensError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            LeakLensError::NotFound(_) => StatusCode::NOT_FOUND,
            LeakLensError::JobBusy(_)
            | LeakLensError::JobClosed(_)
            | LeakLensError::TaskAlreadySettled { .. } => StatusCode::CONFLICT,
            LeakLensError::Classifier(_) | LeakLensError::Upstream(_) => StatusCode::BAD_GATEWAY,
            LeakLensError::JobFailed(_) | LeakLensError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = %self.0, "request failed");
        }

        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
                code: self.0.error_code().to_string(),
            }),
        )
            .into_response()
    }
}

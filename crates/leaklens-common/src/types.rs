//! Wire types shared by the HTTP API and the polling client.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialStatus {
    Pending,
    Checked,
    Error,
}

/// One credential row as shown to clients. The password is always masked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialResult {
    pub credential: String,
    pub status: CredentialStatus,
    pub is_leaked: Option<bool>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total_processed: usize,
    pub total_leaked: usize,
    pub total_not_leaked: usize,
    pub total_errors: usize,
    pub completed: bool,
    pub progress_percentage: f64,
}

impl BatchSummary {
    /// `100 * processed / total`, clamped to `[0, 100]`, with `0/0` defined as `0`.
    pub fn percentage(processed: usize, total: usize) -> f64 {
        if total == 0 {
            return 0.0;
        }
        let value = (processed as f64 / total as f64) * 100.0;
        if value.is_finite() { value.clamp(0.0, 100.0) } else { 0.0 }
    }

    pub fn is_consistent(&self) -> bool {
        self.total_processed == self.total_leaked + self.total_not_leaked + self.total_errors
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSnapshot {
    pub summary: BatchSummary,
    pub results: Vec<CredentialResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchAccepted {
    pub job_id: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SingleCheckRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SingleCheckResponse {
    pub username: String,
    pub is_leaked: bool,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamStatus {
    pub status: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiStatusResponse {
    pub status: String,
    pub timestamp: String,
    pub google_api_status: UpstreamStatus,
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

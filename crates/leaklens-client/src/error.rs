use leaklens_common::types::ErrorResponse;
use thiserror::Error;

pub const NETWORK_ERROR: &str = "NETWORK_ERROR";
pub const FILE_TOO_LARGE: &str = "FILE_TOO_LARGE";
pub const DECODE_ERROR: &str = "DECODE_ERROR";
pub const NOT_FOUND: &str = "NOT_FOUND";

/// Failure seen by the client: either the server's `{ error, code }` body or a local fault.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{error} ({code})")]
pub struct ClientError {
    pub error: String,
    pub code: String,
}

impl ClientError {
    pub fn new(error: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: code.into(),
        }
    }

    pub fn network(error: impl Into<String>) -> Self {
        Self::new(error, NETWORK_ERROR)
    }

    pub fn is_network(&self) -> bool {
        self.code == NETWORK_ERROR
    }

    pub fn is_not_found(&self) -> bool {
        self.code == NOT_FOUND
    }
}

impl From<ErrorResponse> for ClientError {
    fn from(value: ErrorResponse) -> Self {
        Self::new(value.error, value.code)
    }
}

pub type ClientResult<T> = std::result::Result<T, ClientError>;

pub mod error;
pub mod time;
pub mod types;

pub use error::{LeakLensError, Result};
pub use types::{
    ApiStatusResponse, BatchAccepted, BatchSnapshot, BatchSummary, CredentialResult,
    CredentialStatus, ErrorResponse, SingleCheckRequest, SingleCheckResponse, UpstreamStatus,
};

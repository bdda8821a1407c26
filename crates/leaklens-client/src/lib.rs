pub mod api;
pub mod error;
pub mod polling;
pub mod progress;

pub use api::{BatchApi, HttpApiClient};
pub use error::ClientError;
pub use polling::{Phase, PhaseView, PollUpdate, PollingController, PollingSettings};
pub use progress::{Eta, ProgressEstimator};

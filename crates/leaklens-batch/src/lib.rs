pub mod classifier;
pub mod config;
pub mod job;
pub mod maintenance;
pub mod parser;
pub mod processor;
pub mod store;
pub mod types;

pub use classifier::CredentialClassifier;
pub use config::BatchConfig;
pub use job::{BatchJob, Credential, CredentialTask, JobCounters};
pub use processor::JobProcessor;
pub use store::JobStore;
pub use types::{JobState, TaskOutcome};

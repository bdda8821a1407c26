use thiserror::Error;

#[derive(Debug, Error)]
pub enum LeakLensError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("job not found: {0}")]
    NotFound(String),
    #[error("job {0} already has an active processor")]
    JobBusy(String),
    #[error("job {0} is no longer accepting results")]
    JobClosed(String),
    #[error("task {index} of job {job_id} was already settled")]
    TaskAlreadySettled { job_id: String, index: usize },
    #[error("job failed: {0}")]
    JobFailed(String),
    #[error("classifier error: {0}")]
    Classifier(String),
    #[error("upstream service error: {0}")]
    Upstream(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl LeakLensError {
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::NotFound(_) => "NOT_FOUND",
            Self::JobBusy(_) => "JOB_BUSY",
            Self::JobClosed(_) => "JOB_CLOSED",
            Self::TaskAlreadySettled { .. } => "TASK_ALREADY_SETTLED",
            Self::JobFailed(_) => "JOB_FAILED",
            Self::Classifier(_) | Self::Upstream(_) => "EXTERNAL_SERVICE_ERROR",
            Self::Internal(_) => "INTERNAL_SERVER_ERROR",
        }
    }

    /// True for errors that mean a processor should stop touching the job.
    pub fn is_job_gone(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::JobClosed(_))
    }
}

pub type Result<T> = std::result::Result<T, LeakLensError>;

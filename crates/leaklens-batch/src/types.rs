use serde::{Deserialize, Serialize};

pub const LEAKED_MESSAGE: &str = "Credential found in a known data breach";
pub const NOT_LEAKED_MESSAGE: &str = "Credential not found in our breach database";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    Pending,
    Processing,
    Completed,
    Abandoned,
    Failed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Abandoned | Self::Failed)
    }
}

/// Result of classifying a single credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Leaked,
    NotLeaked,
    Error(String),
}

impl TaskOutcome {
    pub fn message(&self) -> &str {
        match self {
            Self::Leaked => LEAKED_MESSAGE,
            Self::NotLeaked => NOT_LEAKED_MESSAGE,
            Self::Error(message) => message,
        }
    }
}

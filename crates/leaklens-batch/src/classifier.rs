use std::time::Duration;

use async_trait::async_trait;
use leaklens_common::error::{LeakLensError, Result};

use crate::job::Credential;

/// Decides whether one credential appears in a known breach.
///
/// `Ok(true)` means leaked, `Ok(false)` not leaked; an `Err` is a transient fault
/// (timeout, upstream 5xx) that the caller records against the task.
#[async_trait]
pub trait CredentialClassifier: Send + Sync {
    async fn classify(&self, credential: &Credential) -> Result<bool>;

    /// Reachability of whatever sits behind the classifier.
    async fn check_connection(&self) -> Result<()> {
        Ok(())
    }
}

pub async fn classify_with_timeout(
    classifier: &dyn CredentialClassifier,
    credential: &Credential,
    timeout: Duration,
) -> Result<bool> {
    match tokio::time::timeout(timeout, classifier.classify(credential)).await {
        Ok(result) => result,
        Err(_) => Err(LeakLensError::Classifier(format!(
            "classifier timed out after {}ms",
            timeout.as_millis()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use leaklens_common::error::{LeakLensError, Result};

    use super::{CredentialClassifier, classify_with_timeout};
    use crate::job::Credential;

    struct Sleepy;

    #[async_trait]
    impl CredentialClassifier for Sleepy {
        async fn classify(&self, _credential: &Credential) -> Result<bool> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(true)
        }
    }

    #[tokio::test]
    async fn slow_classifier_times_out() {
        let err = classify_with_timeout(
            &Sleepy,
            &Credential::new("a", "b"),
            Duration::from_millis(20),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, LeakLensError::Classifier(message) if message.contains("timed out")));
    }
}

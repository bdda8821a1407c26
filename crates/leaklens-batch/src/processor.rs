use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use futures::future::join_all;
use leaklens_common::error::{LeakLensError, Result};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use crate::{
    classifier::{CredentialClassifier, classify_with_timeout},
    config::BatchConfig,
    job::Credential,
    store::JobStore,
    types::{JobState, TaskOutcome},
};

/// Retries allowed per task after the first failed attempt.
const MAX_RETRIES: usize = 1;

#[derive(Debug, Clone)]
pub struct ProcessorSettings {
    pub workers: usize,
    pub classify_timeout: Duration,
    pub retry_backoff: Duration,
}

impl From<&BatchConfig> for ProcessorSettings {
    fn from(config: &BatchConfig) -> Self {
        Self {
            workers: config.workers.max(1),
            classify_timeout: config.classify_timeout,
            retry_backoff: config.retry_backoff,
        }
    }
}

/// Drives a job's pending tasks through the classifier with a fixed-size worker pool.
#[derive(Clone)]
pub struct JobProcessor {
    store: JobStore,
    classifier: Arc<dyn CredentialClassifier>,
    settings: ProcessorSettings,
}

struct WorkQueue {
    tasks: Vec<(usize, Credential)>,
    cursor: AtomicUsize,
    stopped: AtomicBool,
}

impl WorkQueue {
    fn claim(&self) -> Option<&(usize, Credential)> {
        if self.stopped.load(Ordering::Acquire) {
            return None;
        }
        self.tasks.get(self.cursor.fetch_add(1, Ordering::AcqRel))
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
    }
}

impl JobProcessor {
    pub fn new(
        store: JobStore,
        classifier: Arc<dyn CredentialClassifier>,
        settings: ProcessorSettings,
    ) -> Self {
        Self {
            store,
            classifier,
            settings,
        }
    }

    pub fn classifier(&self) -> Arc<dyn CredentialClassifier> {
        Arc::clone(&self.classifier)
    }

    pub fn spawn(&self, job_id: String) -> JoinHandle<()> {
        let processor = self.clone();
        tokio::spawn(async move {
            match processor.run(&job_id).await {
                Ok(state) => debug!(job_id = %job_id, ?state, "batch processor finished"),
                Err(err) => debug!(job_id = %job_id, error = %err, "batch processor stopped"),
            }
        })
    }

    /// Processes the job until every task settled or the job leaves the active states.
    pub async fn run(&self, job_id: &str) -> Result<JobState> {
        self.store.attach_writer(job_id)?;
        let result = self.drive(job_id).await;
        self.store.detach_writer(job_id);

        match result {
            Ok(state) => Ok(state),
            Err(err) if err.is_job_gone() => {
                info!(job_id = %job_id, error = %err, "batch job closed while processing");
                Err(err)
            }
            Err(err) => {
                error!(job_id = %job_id, error = %err, "batch processing fault");
                if let Err(fail_err) = self.store.fail(job_id, err.to_string()) {
                    warn!(job_id = %job_id, error = %fail_err, "could not mark job failed");
                }
                Err(err)
            }
        }
    }

    async fn drive(&self, job_id: &str) -> Result<JobState> {
        let queue = WorkQueue {
            tasks: self.store.pending_tasks(job_id)?,
            cursor: AtomicUsize::new(0),
            stopped: AtomicBool::new(false),
        };
        let worker_count = self.settings.workers.min(queue.tasks.len()).max(1);
        info!(
            job_id = %job_id,
            pending = queue.tasks.len(),
            workers = worker_count,
            "batch processing started"
        );

        let outcomes = join_all((0..worker_count).map(|worker| self.work(job_id, worker, &queue))).await;
        outcomes.into_iter().collect::<Result<Vec<()>>>()?;

        if queue.stopped.load(Ordering::Acquire) {
            return self.store.state(job_id);
        }

        self.store.complete(job_id)?;
        Ok(JobState::Completed)
    }

    async fn work(&self, job_id: &str, worker: usize, queue: &WorkQueue) -> Result<()> {
        while let Some((index, credential)) = queue.claim() {
            let outcome = self.classify_with_retry(*index, credential).await;
            match self.store.advance(job_id, *index, outcome) {
                Ok(counters) => trace!(
                    job_id = %job_id,
                    worker,
                    index,
                    processed = counters.processed,
                    total = counters.total,
                    "task settled"
                ),
                Err(err) if err.is_job_gone() => {
                    debug!(job_id = %job_id, worker, error = %err, "stopping worker");
                    queue.stop();
                    return Ok(());
                }
                Err(err) => {
                    queue.stop();
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    async fn classify_with_retry(&self, index: usize, credential: &Credential) -> TaskOutcome {
        let mut last_error = LeakLensError::Classifier("classifier was not called".to_string());
        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                tokio::time::sleep(self.settings.retry_backoff).await;
            }

            match classify_with_timeout(
                self.classifier.as_ref(),
                credential,
                self.settings.classify_timeout,
            )
            .await
            {
                Ok(true) => return TaskOutcome::Leaked,
                Ok(false) => return TaskOutcome::NotLeaked,
                Err(err) => {
                    debug!(index, attempt, error = %err, "classification attempt failed");
                    last_error = err;
                }
            }
        }
        TaskOutcome::Error(format!("Error: {last_error}"))
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        sync::{
            Arc, Mutex,
            atomic::{AtomicUsize, Ordering},
        },
        time::Duration,
    };

    use async_trait::async_trait;
    use chrono::Utc;
    use leaklens_common::{
        error::{LeakLensError, Result},
        types::CredentialStatus,
    };

    use super::{JobProcessor, ProcessorSettings};
    use crate::{
        classifier::CredentialClassifier,
        config::BatchConfig,
        job::Credential,
        store::JobStore,
        types::{JobState, TaskOutcome},
    };

    /// Answers by username: `leak*` leaked, `fail*` errors, `flaky*` errors once, `slow*` hangs.
    #[derive(Default)]
    struct ScriptedClassifier {
        calls: Mutex<HashMap<String, usize>>,
        total_calls: AtomicUsize,
    }

    impl ScriptedClassifier {
        fn calls_for(&self, username: &str) -> usize {
            self.calls.lock().unwrap().get(username).copied().unwrap_or(0)
        }
    }

    #[async_trait]
    impl CredentialClassifier for ScriptedClassifier {
        async fn classify(&self, credential: &Credential) -> Result<bool> {
            self.total_calls.fetch_add(1, Ordering::SeqCst);
            let attempt = {
                let mut calls = self.calls.lock().unwrap();
                let entry = calls.entry(credential.username.clone()).or_default();
                *entry += 1;
                *entry
            };
            tokio::time::sleep(Duration::from_millis(1)).await;

            let name = credential.username.as_str();
            if name.starts_with("slow") {
                tokio::time::sleep(Duration::from_secs(30)).await;
            }
            if name.starts_with("fail") || (name.starts_with("flaky") && attempt == 1) {
                return Err(LeakLensError::Classifier("upstream returned 503".to_string()));
            }
            Ok(name.starts_with("leak"))
        }
    }

    fn settings() -> ProcessorSettings {
        ProcessorSettings {
            workers: 4,
            classify_timeout: Duration::from_millis(50),
            retry_backoff: Duration::from_millis(1),
        }
    }

    fn setup(usernames: &[&str]) -> (JobStore, Arc<ScriptedClassifier>, JobProcessor, String) {
        let store = JobStore::new(&BatchConfig::default());
        let id = store
            .create(usernames.iter().map(|u| Credential::new(*u, "pw")).collect())
            .unwrap();
        let classifier = Arc::new(ScriptedClassifier::default());
        let processor = JobProcessor::new(store.clone(), classifier.clone(), settings());
        (store, classifier, processor, id)
    }

    #[tokio::test]
    async fn mixed_batch_completes_with_expected_counts() {
        let (store, _, processor, id) = setup(&["leaked-user", "clean-user", "fail-user"]);

        assert_eq!(processor.run(&id).await.unwrap(), JobState::Completed);

        let snapshot = store.get(&id).unwrap();
        assert_eq!(snapshot.summary.total_processed, 3);
        assert_eq!(snapshot.summary.total_leaked, 1);
        assert_eq!(snapshot.summary.total_not_leaked, 1);
        assert_eq!(snapshot.summary.total_errors, 1);
        assert!(snapshot.summary.completed);
        assert_eq!(snapshot.summary.progress_percentage, 100.0);
        assert_eq!(snapshot.results[2].status, CredentialStatus::Error);
        assert!(snapshot.results[2].message.as_deref().unwrap().contains("503"));
    }

    #[tokio::test]
    async fn failing_task_is_retried_once() {
        let (store, classifier, processor, id) = setup(&["fail-a", "flaky-b"]);
        processor.run(&id).await.unwrap();

        assert_eq!(classifier.calls_for("fail-a"), 2);
        assert_eq!(classifier.calls_for("flaky-b"), 2);
        let counters = store.counters(&id).unwrap();
        assert_eq!(counters.errors, 1);
        assert_eq!(counters.not_leaked, 1);
    }

    #[tokio::test]
    async fn slow_classifier_is_recorded_as_timeout() {
        let (store, _, processor, id) = setup(&["slow-one", "leak-two"]);
        processor.run(&id).await.unwrap();

        let snapshot = store.get(&id).unwrap();
        let message = snapshot.results[0].message.clone().unwrap();
        assert!(message.contains("timed out"), "{message}");
        assert_eq!(snapshot.summary.total_leaked, 1);
    }

    #[tokio::test]
    async fn every_task_is_classified_exactly_once() {
        let usernames: Vec<String> = (0..250).map(|i| format!("user-{i}")).collect();
        let refs: Vec<&str> = usernames.iter().map(String::as_str).collect();
        let (store, classifier, processor, id) = setup(&refs);

        processor.run(&id).await.unwrap();

        assert_eq!(classifier.total_calls.load(Ordering::SeqCst), 250);
        assert!(usernames.iter().all(|u| classifier.calls_for(u) == 1));
        let snapshot = store.get(&id).unwrap();
        assert_eq!(snapshot.summary.total_processed, 250);
        assert!(snapshot.results.iter().all(|r| r.status == CredentialStatus::Checked));
    }

    #[tokio::test]
    async fn maximum_batch_completes_without_pending_tasks() {
        let store = JobStore::new(&BatchConfig::default());
        let id = store
            .create((0..10_000).map(|i| Credential::new(format!("u{i}"), "pw")).collect())
            .unwrap();

        struct Immediate;
        #[async_trait]
        impl CredentialClassifier for Immediate {
            async fn classify(&self, credential: &Credential) -> Result<bool> {
                Ok(credential.username.ends_with('7'))
            }
        }

        let processor = JobProcessor::new(store.clone(), Arc::new(Immediate), settings());
        processor.run(&id).await.unwrap();

        let snapshot = store.get(&id).unwrap();
        assert!(snapshot.summary.completed);
        assert_eq!(snapshot.summary.total_processed, 10_000);
        assert_eq!(snapshot.summary.total_leaked, 1_000);
        assert!(snapshot.results.iter().all(|r| r.status != CredentialStatus::Pending));
    }

    #[tokio::test]
    async fn second_processor_is_rejected_while_first_runs() {
        let (store, _, processor, id) = setup(&["slow-a"]);
        store.attach_writer(&id).unwrap();

        assert!(matches!(processor.run(&id).await, Err(LeakLensError::JobBusy(_))));
        store.detach_writer(&id);
        assert_eq!(processor.run(&id).await.unwrap(), JobState::Completed);
    }

    #[tokio::test]
    async fn abandoned_job_stops_processing() {
        let (store, _, processor, id) = setup(&["slow-a", "slow-b", "slow-c", "slow-d", "slow-e"]);
        let handle = processor.spawn(id.clone());

        tokio::time::sleep(Duration::from_millis(10)).await;
        let abandoned =
            store.sweep_abandoned(Utc::now() + chrono::Duration::hours(1), chrono::Duration::minutes(5));
        assert_eq!(abandoned, vec![id.clone()]);

        handle.await.unwrap();
        assert_eq!(store.state(&id).unwrap(), JobState::Abandoned);
        assert_eq!(store.get(&id).unwrap().summary.total_processed, 0);
    }

    /// Settles the task itself before answering, so the worker's own advance collides.
    struct Interfering {
        store: JobStore,
        job_id: String,
    }

    #[async_trait]
    impl CredentialClassifier for Interfering {
        async fn classify(&self, _credential: &Credential) -> Result<bool> {
            self.store.advance(&self.job_id, 0, TaskOutcome::Leaked)?;
            Ok(false)
        }
    }

    #[tokio::test]
    async fn store_fault_fails_job_and_keeps_original_error() {
        let store = JobStore::new(&BatchConfig::default());
        let id = store.create(vec![Credential::new("a", "pw")]).unwrap();
        let classifier = Interfering {
            store: store.clone(),
            job_id: id.clone(),
        };
        let processor = JobProcessor::new(store.clone(), Arc::new(classifier), settings());

        let err = processor.run(&id).await.unwrap_err();
        assert!(matches!(err, LeakLensError::TaskAlreadySettled { index: 0, .. }));
        assert_eq!(store.state(&id).unwrap(), JobState::Failed);
        assert!(matches!(store.get(&id), Err(LeakLensError::JobFailed(_))));
    }

    #[tokio::test]
    async fn rerunning_a_completed_job_is_a_noop() {
        let (store, classifier, processor, id) = setup(&["leak-a"]);
        processor.run(&id).await.unwrap();

        assert!(matches!(processor.run(&id).await, Err(LeakLensError::JobClosed(_))));
        assert_eq!(classifier.total_calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.counters(&id).unwrap().processed, 1);
    }
}

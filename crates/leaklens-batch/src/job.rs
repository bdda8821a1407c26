use std::fmt;

use chrono::{DateTime, Duration, Utc};
use leaklens_common::{
    error::{LeakLensError, Result},
    types::{BatchSnapshot, BatchSummary, CredentialResult, CredentialStatus},
};
use serde::Serialize;

use crate::types::{JobState, TaskOutcome};

const PASSWORD_MASK: &str = "••••••••";

#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub username: String,
    pub password: String,
}

impl Credential {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn masked(&self) -> String {
        format!("{}:{PASSWORD_MASK}", self.username)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("password", &PASSWORD_MASK)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct CredentialTask {
    credential: Credential,
    status: CredentialStatus,
    is_leaked: bool,
    message: Option<String>,
}

impl CredentialTask {
    pub fn pending(credential: Credential) -> Self {
        Self {
            credential,
            status: CredentialStatus::Pending,
            is_leaked: false,
            message: None,
        }
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    pub fn status(&self) -> CredentialStatus {
        self.status
    }

    pub fn is_leaked(&self) -> bool {
        self.is_leaked
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    fn settle(&mut self, outcome: &TaskOutcome) {
        self.status = match outcome {
            TaskOutcome::Error(_) => CredentialStatus::Error,
            TaskOutcome::Leaked | TaskOutcome::NotLeaked => CredentialStatus::Checked,
        };
        self.is_leaked = *outcome == TaskOutcome::Leaked;
        self.message = Some(outcome.message().to_string());
    }

    pub fn to_result(&self) -> CredentialResult {
        CredentialResult {
            credential: self.credential.masked(),
            status: self.status,
            is_leaked: (self.status == CredentialStatus::Checked).then_some(self.is_leaked),
            message: self.message.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct JobCounters {
    pub total: usize,
    pub leaked: usize,
    pub not_leaked: usize,
    pub errors: usize,
    pub processed: usize,
}

impl JobCounters {
    pub fn is_done(&self) -> bool {
        self.processed == self.total
    }
}

/// A submitted batch and its lifecycle. Lives inside the [`JobStore`](crate::JobStore),
/// which serializes every mutation through a per-job lock.
#[derive(Debug)]
pub struct BatchJob {
    id: String,
    tasks: Vec<CredentialTask>,
    created_at: DateTime<Utc>,
    last_activity_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    state: JobState,
    counters: JobCounters,
    error: Option<String>,
    writer_attached: bool,
}

impl BatchJob {
    pub fn new(id: impl Into<String>, credentials: Vec<Credential>, now: DateTime<Utc>) -> Self {
        let tasks: Vec<CredentialTask> =
            credentials.into_iter().map(CredentialTask::pending).collect();
        let counters = JobCounters {
            total: tasks.len(),
            ..JobCounters::default()
        };

        Self {
            id: id.into(),
            tasks,
            created_at: now,
            last_activity_at: now,
            finished_at: None,
            state: JobState::Pending,
            counters,
            error: None,
            writer_attached: false,
        }
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn counters(&self) -> JobCounters {
        self.counters
    }

    pub fn tasks(&self) -> &[CredentialTask] {
        &self.tasks
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_activity_at(&self) -> DateTime<Utc> {
        self.last_activity_at
    }

    pub fn attach_writer(&mut self, now: DateTime<Utc>) -> Result<()> {
        if self.state.is_terminal() {
            return Err(LeakLensError::JobClosed(self.id.clone()));
        }
        if self.writer_attached {
            return Err(LeakLensError::JobBusy(self.id.clone()));
        }

        self.writer_attached = true;
        self.state = JobState::Processing;
        self.last_activity_at = now;
        Ok(())
    }

    pub fn detach_writer(&mut self) {
        self.writer_attached = false;
    }

    pub fn pending_tasks(&self) -> Vec<(usize, Credential)> {
        self.tasks
            .iter()
            .enumerate()
            .filter(|(_, task)| task.status == CredentialStatus::Pending)
            .map(|(index, task)| (index, task.credential.clone()))
            .collect()
    }

    pub fn advance(
        &mut self,
        index: usize,
        outcome: &TaskOutcome,
        now: DateTime<Utc>,
    ) -> Result<JobCounters> {
        if self.state.is_terminal() {
            return Err(LeakLensError::JobClosed(self.id.clone()));
        }

        let task = self.tasks.get_mut(index).ok_or_else(|| {
            LeakLensError::InvalidInput(format!(
                "task index {index} out of range for job {}",
                self.id
            ))
        })?;
        if task.status != CredentialStatus::Pending {
            return Err(LeakLensError::TaskAlreadySettled {
                job_id: self.id.clone(),
                index,
            });
        }

        task.settle(outcome);
        match outcome {
            TaskOutcome::Leaked => self.counters.leaked += 1,
            TaskOutcome::NotLeaked => self.counters.not_leaked += 1,
            TaskOutcome::Error(_) => self.counters.errors += 1,
        }
        self.counters.processed += 1;
        self.last_activity_at = now;
        if self.state == JobState::Pending {
            self.state = JobState::Processing;
        }

        Ok(self.counters)
    }

    /// Moves the job to `Completed`. Returns `false` when it already was.
    pub fn complete(&mut self, now: DateTime<Utc>) -> Result<bool> {
        match self.state {
            JobState::Completed => return Ok(false),
            JobState::Abandoned | JobState::Failed => {
                return Err(LeakLensError::JobClosed(self.id.clone()));
            }
            JobState::Pending | JobState::Processing => {}
        }
        if !self.counters.is_done() {
            return Err(LeakLensError::InvalidInput(format!(
                "job {} still has {} pending tasks",
                self.id,
                self.counters.total - self.counters.processed
            )));
        }

        self.state = JobState::Completed;
        self.finished_at = Some(now);
        Ok(true)
    }

    pub fn abandon_if_idle(&mut self, now: DateTime<Utc>, idle_threshold: Duration) -> bool {
        if self.state.is_terminal() || now - self.last_activity_at <= idle_threshold {
            return false;
        }

        self.state = JobState::Abandoned;
        self.finished_at = Some(now);
        true
    }

    pub fn fail(&mut self, message: impl Into<String>, now: DateTime<Utc>) -> bool {
        if self.state.is_terminal() {
            return false;
        }

        self.state = JobState::Failed;
        self.error = Some(message.into());
        self.finished_at = Some(now);
        true
    }

    pub fn is_evictable(&self, now: DateTime<Utc>, retention: Duration, hard_ttl: Duration) -> bool {
        if now - self.created_at >= hard_ttl {
            return true;
        }
        match self.finished_at {
            Some(finished_at) if self.state.is_terminal() => now - finished_at >= retention,
            _ => false,
        }
    }

    pub fn snapshot(&self) -> Result<BatchSnapshot> {
        match self.state {
            JobState::Failed => Err(LeakLensError::JobFailed(
                self.error
                    .clone()
                    .unwrap_or_else(|| format!("job {} failed", self.id)),
            )),
            // Partial work of an abandoned job is not trustworthy; it reads like a job that never ran.
            JobState::Abandoned => Ok(BatchSnapshot {
                summary: BatchSummary {
                    completed: true,
                    ..BatchSummary::default()
                },
                results: Vec::new(),
            }),
            JobState::Pending | JobState::Processing | JobState::Completed => Ok(BatchSnapshot {
                summary: BatchSummary {
                    total_processed: self.counters.processed,
                    total_leaked: self.counters.leaked,
                    total_not_leaked: self.counters.not_leaked,
                    total_errors: self.counters.errors,
                    completed: self.state == JobState::Completed,
                    progress_percentage: BatchSummary::percentage(
                        self.counters.processed,
                        self.counters.total,
                    ),
                },
                results: self.tasks.iter().map(CredentialTask::to_result).collect(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use leaklens_common::{error::LeakLensError, types::CredentialStatus};

    use super::{BatchJob, Credential};
    use crate::types::{JobState, TaskOutcome};

    fn job(size: usize) -> BatchJob {
        let credentials = (0..size)
            .map(|i| Credential::new(format!("user{i}@example.com"), "hunter2"))
            .collect();
        BatchJob::new("job-1", credentials, Utc::now())
    }

    #[test]
    fn advance_settles_each_task_once() {
        let mut job = job(2);
        let now = Utc::now();
        job.advance(0, &TaskOutcome::Leaked, now).unwrap();

        let err = job.advance(0, &TaskOutcome::NotLeaked, now).unwrap_err();
        assert!(matches!(err, LeakLensError::TaskAlreadySettled { index: 0, .. }));
        assert_eq!(job.counters().processed, 1);
        assert_eq!(job.counters().leaked, 1);
        assert_eq!(job.tasks()[0].status(), CredentialStatus::Checked);
    }

    #[test]
    fn completion_is_idempotent() {
        let mut job = job(1);
        let now = Utc::now();
        job.advance(0, &TaskOutcome::Error("boom".to_string()), now).unwrap();

        assert!(job.complete(now).unwrap());
        assert!(!job.complete(now).unwrap());
        assert_eq!(job.state(), JobState::Completed);
        assert_eq!(job.counters().processed, 1);
        assert_eq!(job.counters().errors, 1);
    }

    #[test]
    fn complete_rejects_pending_tasks() {
        let mut job = job(2);
        assert!(job.complete(Utc::now()).is_err());
        assert_eq!(job.state(), JobState::Pending);
    }

    #[test]
    fn abandoned_snapshot_hides_partial_work() {
        let mut job = job(3);
        let start = job.last_activity_at();
        job.advance(0, &TaskOutcome::Leaked, start).unwrap();

        assert!(job.abandon_if_idle(start + Duration::minutes(10), Duration::minutes(5)));
        let snapshot = job.snapshot().unwrap();
        assert!(snapshot.summary.completed);
        assert_eq!(snapshot.summary.total_processed, 0);
        assert_eq!(snapshot.summary.total_leaked, 0);
        assert_eq!(snapshot.summary.progress_percentage, 0.0);
        assert!(snapshot.results.is_empty());

        let err = job.advance(1, &TaskOutcome::Leaked, start).unwrap_err();
        assert!(matches!(err, LeakLensError::JobClosed(_)));
    }

    #[test]
    fn terminal_states_do_not_transition() {
        let mut job = job(1);
        let now = Utc::now();
        assert!(job.fail("store fault", now));
        assert!(!job.abandon_if_idle(now + Duration::hours(1), Duration::minutes(1)));
        assert!(!job.fail("again", now));
        assert!(matches!(job.snapshot(), Err(LeakLensError::JobFailed(message)) if message == "store fault"));
    }

    #[test]
    fn writer_claim_is_exclusive() {
        let mut job = job(1);
        let now = Utc::now();
        job.attach_writer(now).unwrap();
        assert_eq!(job.state(), JobState::Processing);
        assert!(matches!(job.attach_writer(now), Err(LeakLensError::JobBusy(_))));

        job.detach_writer();
        job.attach_writer(now).unwrap();
    }

    #[test]
    fn results_mask_passwords() {
        let mut job = job(1);
        job.advance(0, &TaskOutcome::NotLeaked, Utc::now()).unwrap();
        let result = &job.snapshot().unwrap().results[0];
        assert_eq!(result.credential, "user0@example.com:••••••••");
        assert_eq!(result.is_leaked, Some(false));
        assert!(!format!("{:?}", job.tasks()[0].credential()).contains("hunter2"));
    }

    #[test]
    fn eviction_respects_retention_and_hard_ttl() {
        let mut job = job(1);
        let created = job.created_at();
        let retention = Duration::hours(1);
        let hard_ttl = Duration::hours(24);

        assert!(!job.is_evictable(created + Duration::hours(2), retention, hard_ttl));
        assert!(job.is_evictable(created + Duration::hours(25), retention, hard_ttl));

        job.advance(0, &TaskOutcome::Leaked, created).unwrap();
        job.complete(created).unwrap();
        assert!(!job.is_evictable(created + Duration::minutes(30), retention, hard_ttl));
        assert!(job.is_evictable(created + Duration::minutes(61), retention, hard_ttl));
    }
}

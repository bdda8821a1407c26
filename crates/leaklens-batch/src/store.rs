use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, RwLock},
};

use chrono::{DateTime, Duration, Utc};
use leaklens_common::{
    error::{LeakLensError, Result},
    time::{now, to_chrono},
    types::BatchSnapshot,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    config::BatchConfig,
    job::{BatchJob, Credential, JobCounters},
    types::{JobState, TaskOutcome},
};

/// In-process registry of batch jobs.
///
/// The table lock is only held long enough to find a job; all reads and writes of a
/// job happen under that job's own mutex, so a snapshot never observes counters
/// mid-update.
#[derive(Clone)]
pub struct JobStore {
    jobs: Arc<RwLock<HashMap<String, Arc<Mutex<BatchJob>>>>>,
    max_tasks: usize,
    retention: Duration,
    hard_ttl: Duration,
}

impl JobStore {
    pub fn new(config: &BatchConfig) -> Self {
        Self {
            jobs: Arc::new(RwLock::new(HashMap::new())),
            max_tasks: config.max_tasks,
            retention: to_chrono(config.retention),
            hard_ttl: to_chrono(config.hard_ttl),
        }
    }

    pub fn create(&self, credentials: Vec<Credential>) -> Result<String> {
        if credentials.is_empty() {
            return Err(LeakLensError::InvalidInput(
                "no valid username:password lines found".to_string(),
            ));
        }
        if credentials.len() > self.max_tasks {
            return Err(LeakLensError::InvalidInput(format!(
                "batch of {} credentials exceeds the limit of {}",
                credentials.len(),
                self.max_tasks
            )));
        }

        let id = Uuid::new_v4().to_string();
        let total = credentials.len();
        let job = BatchJob::new(id.clone(), credentials, now());
        self.jobs_write()?
            .insert(id.clone(), Arc::new(Mutex::new(job)));

        info!(job_id = %id, total, "batch job created");
        Ok(id)
    }

    pub fn get(&self, id: &str) -> Result<BatchSnapshot> {
        self.with_job(id, |job| job.snapshot())
    }

    pub fn state(&self, id: &str) -> Result<JobState> {
        self.with_job(id, |job| Ok(job.state()))
    }

    pub fn counters(&self, id: &str) -> Result<JobCounters> {
        self.with_job(id, |job| Ok(job.counters()))
    }

    pub fn attach_writer(&self, id: &str) -> Result<()> {
        self.with_job(id, |job| job.attach_writer(now()))
    }

    pub fn detach_writer(&self, id: &str) {
        if let Err(err) = self.with_job(id, |job| {
            job.detach_writer();
            Ok(())
        }) {
            debug!(job_id = %id, error = %err, "writer detach skipped");
        }
    }

    pub fn pending_tasks(&self, id: &str) -> Result<Vec<(usize, Credential)>> {
        self.with_job(id, |job| Ok(job.pending_tasks()))
    }

    pub fn advance(&self, id: &str, index: usize, outcome: TaskOutcome) -> Result<JobCounters> {
        self.with_job(id, |job| job.advance(index, &outcome, now()))
    }

    /// Marks a fully processed job as completed; calling it again is a no-op.
    pub fn complete(&self, id: &str) -> Result<bool> {
        let transitioned = self.with_job(id, |job| job.complete(now()))?;
        if transitioned {
            let counters = self.counters(id)?;
            info!(
                job_id = %id,
                processed = counters.processed,
                leaked = counters.leaked,
                errors = counters.errors,
                "batch job completed"
            );
        }
        Ok(transitioned)
    }

    pub fn fail(&self, id: &str, message: impl Into<String>) -> Result<bool> {
        let message = message.into();
        let failed = self.with_job(id, |job| Ok(job.fail(message.clone(), now())))?;
        if failed {
            warn!(job_id = %id, error = %message, "batch job failed");
        }
        Ok(failed)
    }

    /// Abandons every unfinished job without a task completion for longer than `idle_threshold`.
    pub fn sweep_abandoned(&self, now: DateTime<Utc>, idle_threshold: Duration) -> Vec<String> {
        let mut abandoned = Vec::new();
        for (id, job) in self.entries() {
            let Ok(mut job) = lock_job(&job) else {
                warn!(job_id = %id, "skipping poisoned job during abandonment sweep");
                continue;
            };
            if job.abandon_if_idle(now, idle_threshold) {
                warn!(
                    job_id = %id,
                    processed = job.counters().processed,
                    total = job.counters().total,
                    "batch job abandoned after inactivity"
                );
                abandoned.push(id);
            }
        }
        abandoned
    }

    /// Removes the job if it is past its retention window or hard TTL.
    pub fn evict(&self, id: &str, now: DateTime<Utc>) -> Result<bool> {
        let mut jobs = self.jobs_write()?;
        let job = jobs
            .get(id)
            .ok_or_else(|| LeakLensError::NotFound(id.to_string()))?;
        let evictable = lock_job(job)?.is_evictable(now, self.retention, self.hard_ttl);
        if evictable {
            jobs.remove(id);
            debug!(job_id = %id, "batch job evicted");
        }
        Ok(evictable)
    }

    pub fn evict_expired(&self, now: DateTime<Utc>) -> usize {
        let ids: Vec<String> = self.entries().into_iter().map(|(id, _)| id).collect();
        ids.iter()
            .filter(|id| matches!(self.evict(id, now), Ok(true)))
            .count()
    }

    pub fn remove(&self, id: &str) -> Result<()> {
        self.jobs_write()?
            .remove(id)
            .map(|_| info!(job_id = %id, "batch job removed"))
            .ok_or_else(|| LeakLensError::NotFound(id.to_string()))
    }

    pub fn len(&self) -> usize {
        self.jobs_read().map(|jobs| jobs.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn with_job<T>(&self, id: &str, f: impl FnOnce(&mut BatchJob) -> Result<T>) -> Result<T> {
        let job = self
            .jobs_read()?
            .get(id)
            .cloned()
            .ok_or_else(|| LeakLensError::NotFound(id.to_string()))?;
        let mut guard = lock_job(&job)?;
        f(&mut guard)
    }

    fn entries(&self) -> Vec<(String, Arc<Mutex<BatchJob>>)> {
        match self.jobs_read() {
            Ok(jobs) => jobs
                .iter()
                .map(|(id, job)| (id.clone(), Arc::clone(job)))
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    fn jobs_read(
        &self,
    ) -> Result<std::sync::RwLockReadGuard<'_, HashMap<String, Arc<Mutex<BatchJob>>>>> {
        self.jobs
            .read()
            .map_err(|_| LeakLensError::Internal("job table lock poisoned".to_string()))
    }

    fn jobs_write(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<String, Arc<Mutex<BatchJob>>>>> {
        self.jobs
            .write()
            .map_err(|_| LeakLensError::Internal("job table lock poisoned".to_string()))
    }
}

fn lock_job(job: &Mutex<BatchJob>) -> Result<MutexGuard<'_, BatchJob>> {
    job.lock()
        .map_err(|_| LeakLensError::Internal("job lock poisoned".to_string()))
}

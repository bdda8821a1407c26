use std::{
    sync::{Arc, Mutex, MutexGuard},
    time::{Duration, Instant},
};

use leaklens_common::types::{BatchSnapshot, BatchSummary};
use tokio::{sync::watch, task::JoinHandle, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    api::BatchApi,
    error::ClientResult,
    progress::{Eta, ProgressEstimator, estimate_line_count},
};

pub const ABANDONED_MESSAGE: &str = "The job was abandoned due to inactivity. Please try again.";
pub const LEAVE_WARNING: &str =
    "You have an active credential check in progress. Are you sure you want to leave?";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Uploading,
    Initializing,
    Processing,
    Done,
    Abandoned,
    Error(String),
}

impl Phase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Abandoned | Self::Error(_))
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Uploading | Self::Initializing | Self::Processing)
    }

    pub fn view(&self) -> Option<PhaseView> {
        match self {
            Self::Idle => None,
            Self::Uploading => Some(PhaseView::Uploading),
            Self::Initializing => Some(PhaseView::Initializing),
            Self::Processing => Some(PhaseView::Processing),
            Self::Done | Self::Abandoned => Some(PhaseView::Completed),
            Self::Error(_) => Some(PhaseView::Error),
        }
    }
}

/// What a progress screen renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseView {
    Uploading,
    Initializing,
    Processing,
    Completed,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PollUpdate {
    pub job_id: Option<String>,
    pub phase: Phase,
    pub snapshot: Option<BatchSnapshot>,
    pub progress_percentage: f64,
    pub eta: Eta,
    /// Credentials per second over the recent polls.
    pub throughput: Option<f64>,
    pub poll_count: u64,
    pub message: Option<String>,
    /// Line count guessed from the upload, until the server reports real numbers.
    pub estimated_total: Option<usize>,
}

impl PollUpdate {
    fn idle() -> Self {
        Self {
            job_id: None,
            phase: Phase::Idle,
            snapshot: None,
            progress_percentage: 0.0,
            eta: Eta::Calculating,
            throughput: None,
            poll_count: 0,
            message: None,
            estimated_total: None,
        }
    }

    pub fn is_abandoned(&self) -> bool {
        self.phase == Phase::Abandoned
    }
}

#[derive(Debug, Clone)]
pub struct PollingSettings {
    pub interval: Duration,
    pub max_network_failures: u32,
}

impl Default for PollingSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_network_failures: 5,
        }
    }
}

#[derive(Default)]
struct Session {
    generation: u64,
    cancel: Option<CancellationToken>,
    task: Option<JoinHandle<()>>,
}

impl Session {
    /// Stops the current poll task, if any, and invalidates its updates.
    fn stop(&mut self) -> u64 {
        self.generation += 1;
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.generation
    }
}

struct Shared {
    session: Mutex<Session>,
    updates: watch::Sender<PollUpdate>,
}

impl Shared {
    fn session(&self) -> MutexGuard<'_, Session> {
        match self.session.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Publishes only while `generation` is still the live session.
    fn publish(&self, generation: u64, update: PollUpdate) -> bool {
        let session = self.session();
        if session.generation != generation {
            return false;
        }
        self.updates.send_replace(update);
        true
    }
}

/// Drives one batch job at a time from upload to a terminal phase.
///
/// Polling runs in a spawned task that owns a cancellation token; each tick awaits
/// its fetch before the next one starts. `reset` and `track` bump the session
/// generation, so a stale task can never publish over a newer session.
pub struct PollingController {
    api: Arc<dyn BatchApi>,
    settings: PollingSettings,
    shared: Arc<Shared>,
}

impl PollingController {
    pub fn new(api: Arc<dyn BatchApi>, settings: PollingSettings) -> Self {
        let (updates, _) = watch::channel(PollUpdate::idle());
        Self {
            api,
            settings,
            shared: Arc::new(Shared {
                session: Mutex::new(Session::default()),
                updates,
            }),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<PollUpdate> {
        self.shared.updates.subscribe()
    }

    pub fn current(&self) -> PollUpdate {
        self.shared.updates.borrow().clone()
    }

    pub fn phase(&self) -> Phase {
        self.shared.updates.borrow().phase.clone()
    }

    pub fn job_id(&self) -> Option<String> {
        self.shared.updates.borrow().job_id.clone()
    }

    pub fn should_warn_before_leaving(&self) -> Option<&'static str> {
        self.phase().is_active().then_some(LEAVE_WARNING)
    }

    /// Uploads a credential file and starts tracking the job it creates.
    pub async fn submit(&self, file_name: &str, contents: Vec<u8>) -> ClientResult<String> {
        let estimated_total = estimate_line_count(&contents);
        let generation = {
            let mut session = self.shared.session();
            let generation = session.stop();
            self.shared.updates.send_replace(PollUpdate {
                phase: Phase::Uploading,
                estimated_total: Some(estimated_total),
                ..PollUpdate::idle()
            });
            generation
        };

        match self.api.upload_batch(file_name, contents).await {
            Ok(accepted) => {
                info!(job_id = %accepted.job_id, estimated_total, "batch accepted");
                self.start(accepted.job_id.clone(), Some(estimated_total), Some(generation));
                Ok(accepted.job_id)
            }
            Err(err) => {
                warn!(code = %err.code, error = %err.error, "batch upload failed");
                self.shared.publish(
                    generation,
                    PollUpdate {
                        phase: Phase::Error(err.error.clone()),
                        message: Some(err.error.clone()),
                        estimated_total: Some(estimated_total),
                        ..PollUpdate::idle()
                    },
                );
                Err(err)
            }
        }
    }

    /// Starts polling an existing job, replacing any current session.
    pub fn track(&self, job_id: impl Into<String>) {
        self.start(job_id.into(), None, None);
    }

    pub fn reset(&self) {
        let mut session = self.shared.session();
        session.stop();
        self.shared.updates.send_replace(PollUpdate::idle());
        debug!("polling reset");
    }

    /// `expected_generation` is set by `submit`; if a reset happened during the
    /// upload, the new job is left untracked.
    fn start(&self, job_id: String, estimated_total: Option<usize>, expected_generation: Option<u64>) {
        let mut session = self.shared.session();
        if let Some(expected) = expected_generation
            && session.generation != expected
        {
            debug!(job_id = %job_id, "session replaced during upload; not tracking");
            return;
        }

        let generation = session.stop();
        let cancel = CancellationToken::new();
        self.shared.updates.send_replace(PollUpdate {
            job_id: Some(job_id.clone()),
            phase: Phase::Initializing,
            estimated_total,
            ..PollUpdate::idle()
        });

        let poll = PollTask {
            api: self.api.clone(),
            settings: self.settings.clone(),
            shared: self.shared.clone(),
            generation,
            job_id,
            estimated_total,
        };
        session.task = Some(tokio::spawn(poll.run(cancel.clone())));
        session.cancel = Some(cancel);
    }
}

impl Drop for PollingController {
    fn drop(&mut self) {
        self.shared.session().stop();
    }
}

struct PollTask {
    api: Arc<dyn BatchApi>,
    settings: PollingSettings,
    shared: Arc<Shared>,
    generation: u64,
    job_id: String,
    estimated_total: Option<usize>,
}

impl PollTask {
    async fn run(self, cancel: CancellationToken) {
        let mut estimator = ProgressEstimator::new();
        let mut interval = tokio::time::interval(self.settings.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut phase = Phase::Initializing;
        let mut snapshot: Option<BatchSnapshot> = None;
        let mut poll_count = 0u64;
        let mut network_failures = 0u32;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {}
            }

            poll_count += 1;
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                result = self.api.batch_status(&self.job_id) => result,
            };

            let now = Instant::now();
            let mut message = None;
            match result {
                Ok(next) => {
                    network_failures = 0;
                    estimator.observe(now, &next.summary);
                    phase = next_phase(&phase, &next.summary);
                    if phase == Phase::Abandoned {
                        message = Some(ABANDONED_MESSAGE.to_string());
                    }
                    snapshot = Some(next);
                }
                Err(err) if err.is_network() => {
                    network_failures += 1;
                    warn!(
                        job_id = %self.job_id,
                        failures = network_failures,
                        error = %err.error,
                        "status poll failed"
                    );
                    if network_failures >= self.settings.max_network_failures {
                        phase = Phase::Error(err.error.clone());
                    }
                    message = Some(err.error);
                }
                Err(err) => {
                    warn!(job_id = %self.job_id, code = %err.code, "polling stopped");
                    phase = Phase::Error(err.error.clone());
                    message = Some(err.error);
                }
            }

            let update = PollUpdate {
                job_id: Some(self.job_id.clone()),
                phase: phase.clone(),
                snapshot: snapshot.clone(),
                progress_percentage: estimator.percentage(),
                eta: estimator.eta(now),
                throughput: estimator.throughput(),
                poll_count,
                message,
                estimated_total: self.estimated_total,
            };
            if !self.shared.publish(self.generation, update) || phase.is_terminal() {
                break;
            }
        }

        debug!(job_id = %self.job_id, poll_count, ?phase, "poll task finished");
    }
}

/// Client-side phase after a successful snapshot.
///
/// Jobs are never created empty, so a completed job with nothing processed was
/// abandoned by the server.
fn next_phase(current: &Phase, summary: &BatchSummary) -> Phase {
    if summary.completed {
        if summary.total_processed == 0 {
            return Phase::Abandoned;
        }
        return Phase::Done;
    }
    match current {
        Phase::Initializing if summary.total_processed == 0 => Phase::Initializing,
        _ => Phase::Processing,
    }
}

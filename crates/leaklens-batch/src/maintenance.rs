use chrono::{DateTime, Duration, Utc};
use leaklens_common::time::{now, to_chrono};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{config::BatchConfig, store::JobStore};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    pub abandoned: Vec<String>,
    pub evicted: usize,
}

pub fn run_maintenance_once(
    store: &JobStore,
    now: DateTime<Utc>,
    idle_threshold: Duration,
) -> MaintenanceReport {
    let abandoned = store.sweep_abandoned(now, idle_threshold);
    let evicted = store.evict_expired(now);
    MaintenanceReport { abandoned, evicted }
}

/// Runs the abandonment sweep and eviction on a fixed interval until `cancel` fires.
pub fn spawn_maintenance(
    store: JobStore,
    config: &BatchConfig,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    let period = config.sweep_interval;
    let idle_threshold = to_chrono(config.idle_threshold);

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {}
            }

            let report = run_maintenance_once(&store, now(), idle_threshold);
            if !report.abandoned.is_empty() || report.evicted > 0 {
                info!(
                    abandoned = report.abandoned.len(),
                    evicted = report.evicted,
                    remaining = store.len(),
                    "job maintenance pass"
                );
            }
        }
        debug!("job maintenance stopped");
    })
}

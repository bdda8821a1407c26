use std::{
    collections::VecDeque,
    fmt,
    time::{Duration, Instant},
};

use leaklens_common::types::BatchSummary;

/// Below this percentage there is too little signal for an ETA.
pub const ETA_MIN_PERCENTAGE: f64 = 1.0;
/// How much of an upload is read to guess its line count before the server answers.
pub const ESTIMATE_PREFIX_BYTES: usize = 100 * 1024;
const MAX_SAMPLES: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Eta {
    Calculating,
    AlmostDone,
    Remaining(Duration),
}

impl fmt::Display for Eta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Calculating => f.write_str("Calculating…"),
            Self::AlmostDone => f.write_str("almost done"),
            Self::Remaining(remaining) => {
                let seconds = remaining.as_secs_f64();
                if seconds < 60.0 {
                    write!(f, "about {} seconds", seconds.ceil() as u64)
                } else {
                    write!(f, "about {} minutes", (seconds / 60.0).ceil() as u64)
                }
            }
        }
    }
}

/// Turns successive job snapshots into a steady percentage and an ETA.
///
/// The percentage always comes from the server; the client never divides by its own
/// guess of the total. Within one session the displayed value never goes backwards.
#[derive(Debug, Default)]
pub struct ProgressEstimator {
    first_sample_at: Option<Instant>,
    samples: VecDeque<(Instant, usize)>,
    percentage: f64,
}

impl ProgressEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, now: Instant, summary: &BatchSummary) -> f64 {
        self.first_sample_at.get_or_insert(now);
        if self.samples.len() == MAX_SAMPLES {
            self.samples.pop_front();
        }
        self.samples.push_back((now, summary.total_processed));

        let reported = if summary.progress_percentage.is_finite() {
            summary.progress_percentage.clamp(0.0, 100.0)
        } else {
            0.0
        };
        self.percentage = self.percentage.max(reported);
        self.percentage
    }

    pub fn percentage(&self) -> f64 {
        self.percentage
    }

    pub fn first_sample_at(&self) -> Option<Instant> {
        self.first_sample_at
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    pub fn eta(&self, now: Instant) -> Eta {
        let Some(first_sample_at) = self.first_sample_at else {
            return Eta::Calculating;
        };
        if self.percentage < ETA_MIN_PERCENTAGE {
            return Eta::Calculating;
        }

        let elapsed = now.saturating_duration_since(first_sample_at).as_secs_f64();
        if elapsed <= 0.0 {
            return Eta::Calculating;
        }

        let estimated_total = elapsed / (self.percentage / 100.0);
        let remaining = estimated_total - elapsed;
        if !remaining.is_finite() || remaining <= 0.0 {
            return Eta::AlmostDone;
        }
        Eta::Remaining(Duration::from_secs_f64(remaining))
    }

    /// Items per second across the retained samples.
    pub fn throughput(&self) -> Option<f64> {
        let (first_at, first_count) = *self.samples.front()?;
        let (last_at, last_count) = *self.samples.back()?;
        let seconds = last_at.saturating_duration_since(first_at).as_secs_f64();
        if seconds <= 0.0 {
            return None;
        }
        Some(last_count.saturating_sub(first_count) as f64 / seconds)
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Counts non-empty lines in the start of an upload. Only a display hint until the
/// first snapshot arrives.
pub fn estimate_line_count(contents: &[u8]) -> usize {
    let prefix = &contents[..contents.len().min(ESTIMATE_PREFIX_BYTES)];
    String::from_utf8_lossy(prefix)
        .lines()
        .filter(|line| !line.trim().is_empty())
        .count()
}

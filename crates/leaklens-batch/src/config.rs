use std::{str::FromStr, time::Duration};

use tracing::warn;

pub const DEFAULT_MAX_TASKS: usize = 10_000;
pub const DEFAULT_MAX_FILE_BYTES: usize = 10 * 1024 * 1024;

/// Engine limits and timings. Every knob can be overridden through a `LEAKLENS_*` variable.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub max_tasks: usize,
    pub max_file_bytes: usize,
    pub workers: usize,
    pub classify_timeout: Duration,
    pub retry_backoff: Duration,
    pub idle_threshold: Duration,
    pub retention: Duration,
    pub hard_ttl: Duration,
    pub sweep_interval: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_tasks: DEFAULT_MAX_TASKS,
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
            workers: 5,
            classify_timeout: Duration::from_secs(10),
            retry_backoff: Duration::from_millis(250),
            idle_threshold: Duration::from_secs(5 * 60),
            retention: Duration::from_secs(60 * 60),
            hard_ttl: Duration::from_secs(24 * 60 * 60),
            sweep_interval: Duration::from_secs(15),
        }
    }
}

impl BatchConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let millis = |key: &str, default: Duration| {
            Duration::from_millis(parse_or(&lookup, key, default.as_millis() as u64))
        };
        let secs = |key: &str, default: Duration| {
            Duration::from_secs(parse_or(&lookup, key, default.as_secs()))
        };

        Self {
            max_tasks: parse_or(&lookup, "LEAKLENS_MAX_TASKS", defaults.max_tasks),
            max_file_bytes: parse_or(&lookup, "LEAKLENS_MAX_FILE_BYTES", defaults.max_file_bytes),
            workers: parse_or(&lookup, "LEAKLENS_WORKERS", defaults.workers).max(1),
            classify_timeout: millis("LEAKLENS_CLASSIFY_TIMEOUT_MS", defaults.classify_timeout),
            retry_backoff: millis("LEAKLENS_RETRY_BACKOFF_MS", defaults.retry_backoff),
            idle_threshold: secs("LEAKLENS_IDLE_THRESHOLD_SECS", defaults.idle_threshold),
            retention: secs("LEAKLENS_RETENTION_SECS", defaults.retention),
            hard_ttl: secs("LEAKLENS_HARD_TTL_SECS", defaults.hard_ttl),
            sweep_interval: secs("LEAKLENS_SWEEP_INTERVAL_SECS", defaults.sweep_interval),
        }
    }
}

fn parse_or<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    let Some(raw) = lookup(key) else {
        return default;
    };
    let raw = raw.trim();
    if raw.is_empty() {
        return default;
    }

    match raw.parse() {
        Ok(value) => value,
        Err(_) => {
            warn!(key, value = %raw, "ignoring unparsable configuration value");
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, time::Duration};

    use super::BatchConfig;

    #[test]
    fn overrides_apply_and_garbage_falls_back() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("LEAKLENS_WORKERS", "12"),
            ("LEAKLENS_CLASSIFY_TIMEOUT_MS", "1500"),
            ("LEAKLENS_IDLE_THRESHOLD_SECS", "not-a-number"),
        ]);
        let config = BatchConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.workers, 12);
        assert_eq!(config.classify_timeout, Duration::from_millis(1500));
        assert_eq!(config.idle_threshold, BatchConfig::default().idle_threshold);
        assert_eq!(config.max_tasks, 10_000);
    }

    #[test]
    fn worker_count_never_zero() {
        let config = BatchConfig::from_lookup(|key| {
            (key == "LEAKLENS_WORKERS").then(|| "0".to_string())
        });
        assert_eq!(config.workers, 1);
    }
}

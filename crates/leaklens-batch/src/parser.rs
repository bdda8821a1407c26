use leaklens_common::error::{LeakLensError, Result};
use tracing::debug;

use crate::{config::BatchConfig, job::Credential};

/// Parses an uploaded `username:password` file into credentials, in file order.
///
/// Blank lines are ignored and malformed lines are skipped. The file is rejected
/// outright when it exceeds the configured byte or line limits.
pub fn parse_credentials(bytes: &[u8], config: &BatchConfig) -> Result<Vec<Credential>> {
    if bytes.len() > config.max_file_bytes {
        return Err(LeakLensError::InvalidInput(format!(
            "file exceeds {} byte limit",
            config.max_file_bytes
        )));
    }

    let text = String::from_utf8_lossy(bytes);
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();

    if lines.is_empty() {
        return Err(LeakLensError::InvalidInput("file is empty".to_string()));
    }
    if lines.len() > config.max_tasks {
        return Err(LeakLensError::InvalidInput(format!(
            "file contains more than {} lines",
            config.max_tasks
        )));
    }

    let credentials: Vec<Credential> = lines.iter().filter_map(|line| parse_line(line)).collect();
    let skipped = lines.len() - credentials.len();
    if skipped > 0 {
        debug!(skipped, "skipped malformed credential lines");
    }

    Ok(credentials)
}

pub fn parse_line(line: &str) -> Option<Credential> {
    let (username, password) = line.split_once(':')?;
    if password.contains(':') {
        return None;
    }

    let username = username.trim();
    let password = password.trim();
    if username.is_empty() || password.is_empty() {
        return None;
    }

    Some(Credential::new(username, password))
}

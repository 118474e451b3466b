//! Start-storm protection for the daemon itself.
//!
//! If the daemon is relaunched more than a handful of times inside a short
//! window (crash loop, over-eager process manager), each extra start sleeps
//! a little longer before the supervisor loop begins.

use chrono::{DateTime, Utc};
use fs_err as fs;
use serde::{Deserialize, Serialize};
use std::cmp;
use std::path::Path;
use std::thread;
use std::time::Duration;
use tracing::warn;

const WINDOW_SECS: i64 = 120;
const FREE_STARTS: usize = 3;
const DELAY_STEP_SECS: u64 = 10;
const DELAY_MAX_SECS: u64 = 60;

#[derive(Default, Serialize, Deserialize)]
struct StartHistory {
    starts: Vec<String>,
}

pub fn apply_startup_backoff(path: &Path) {
    let now = Utc::now();
    let mut history = load_history(path).unwrap_or_default();
    let delay = throttle_delay(now, &mut history);

    if let Err(err) = save_history(path, &history) {
        warn!(error = %err, "Failed to persist daemon start history");
    }

    if let Some(secs) = delay {
        warn!(
            starts = history.starts.len(),
            delay_secs = secs,
            "Daemon start backoff engaged"
        );
        thread::sleep(Duration::from_secs(secs));
    }
}

fn throttle_delay(now: DateTime<Utc>, history: &mut StartHistory) -> Option<u64> {
    history.starts.retain(|value| {
        parse_timestamp(value)
            .map(|ts| now.signed_duration_since(ts).num_seconds() <= WINDOW_SECS)
            .unwrap_or(false)
    });
    history.starts.push(now.to_rfc3339());

    let extra = history.starts.len().checked_sub(FREE_STARTS + 1)? as u64;
    Some(cmp::min(
        DELAY_STEP_SECS.saturating_mul(extra + 1),
        DELAY_MAX_SECS,
    ))
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn load_history(path: &Path) -> Result<StartHistory, String> {
    let data = match fs::read(path) {
        Ok(data) => data,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Ok(StartHistory::default())
        }
        Err(err) => return Err(format!("Failed to read start history: {}", err)),
    };
    serde_json::from_slice(&data).map_err(|err| format!("Failed to parse start history: {}", err))
}

fn save_history(path: &Path, history: &StartHistory) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|err| format!("Failed to create start history dir: {}", err))?;
    }
    let payload = serde_json::to_vec_pretty(history)
        .map_err(|err| format!("Failed to serialize start history: {}", err))?;
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, payload)
        .map_err(|err| format!("Failed to write start history: {}", err))?;
    fs::rename(&tmp_path, path).map_err(|err| format!("Failed to commit start history: {}", err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    #[test]
    fn free_starts_incur_no_delay() {
        let now = Utc::now();
        let mut history = StartHistory {
            starts: vec![
                (now - ChronoDuration::seconds(10)).to_rfc3339(),
                (now - ChronoDuration::seconds(20)).to_rfc3339(),
            ],
        };
        assert_eq!(throttle_delay(now, &mut history), None);
        assert_eq!(history.starts.len(), 3);
    }

    #[test]
    fn extra_starts_back_off_incrementally() {
        let now = Utc::now();
        let mut history = StartHistory {
            starts: vec![
                (now - ChronoDuration::seconds(10)).to_rfc3339(),
                (now - ChronoDuration::seconds(20)).to_rfc3339(),
                (now - ChronoDuration::seconds(30)).to_rfc3339(),
            ],
        };
        assert_eq!(throttle_delay(now, &mut history), Some(DELAY_STEP_SECS));
    }

    #[test]
    fn delay_is_capped() {
        let now = Utc::now();
        let starts = (0..12)
            .map(|index| (now - ChronoDuration::seconds(index)).to_rfc3339())
            .collect();
        let mut history = StartHistory { starts };
        assert_eq!(throttle_delay(now, &mut history), Some(DELAY_MAX_SECS));
    }

    #[test]
    fn stale_starts_fall_out_of_the_window() {
        let now = Utc::now();
        let mut history = StartHistory {
            starts: vec![
                (now - ChronoDuration::seconds(WINDOW_SECS + 10)).to_rfc3339(),
                (now - ChronoDuration::seconds(WINDOW_SECS + 20)).to_rfc3339(),
                "not-a-timestamp".to_string(),
            ],
        };
        assert_eq!(throttle_delay(now, &mut history), None);
        assert_eq!(history.starts.len(), 1);
    }
}

//! Oracle transcript persistence and FIFO retention.
//!
//! Transcript file names sort in creation order (zero-padded cycle number
//! then timestamp), so retention is a name sort plus a prefix delete.

use crate::error::{Result, WardenError};
use crate::oracle::{Analysis, Snapshot};
use chrono::{DateTime, Utc};
use fs_err as fs;
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Serialize)]
struct TranscriptDoc<'a> {
    recorded_at: String,
    cycle: u64,
    snapshot: &'a Snapshot,
    analysis: &'a Analysis,
}

/// Writes one analysis transcript and returns its path.
pub fn write_transcript(
    dir: &Path,
    cycle: u64,
    now: DateTime<Utc>,
    snapshot: &Snapshot,
    analysis: &Analysis,
) -> Result<PathBuf> {
    fs::create_dir_all(dir).map_err(|err| WardenError::io("create analyses dir", err))?;
    let file_name = format!(
        "analysis-{:010}-{}.json",
        cycle,
        now.format("%Y%m%dT%H%M%SZ")
    );
    let path = dir.join(file_name);
    let doc = TranscriptDoc {
        recorded_at: now.to_rfc3339(),
        cycle,
        snapshot,
        analysis,
    };
    let payload = serde_json::to_vec_pretty(&doc)
        .map_err(|err| WardenError::json("serialize transcript", err))?;
    fs::write(&path, payload).map_err(|err| WardenError::io("write transcript", err))?;
    Ok(path)
}

/// Deletes the oldest transcripts beyond `keep`, FIFO by creation order.
/// Returns how many were removed. A missing directory holds nothing.
pub fn enforce_retention(dir: &Path, keep: usize) -> Result<usize> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(err) => return Err(WardenError::io("read analyses dir", err)),
    };

    let mut transcripts: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.extension().is_some_and(|ext| ext == "json")
                && path
                    .file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| name.starts_with("analysis-"))
        })
        .collect();

    if transcripts.len() <= keep {
        return Ok(0);
    }

    transcripts.sort();
    let excess = transcripts.len() - keep;
    let mut removed = 0;
    for path in transcripts.into_iter().take(excess) {
        match fs::remove_file(&path) {
            Ok(()) => removed += 1,
            // Already gone is the outcome we wanted.
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(WardenError::io("remove transcript", err)),
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::PersistentState;
    use chrono::Duration;

    fn at(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .expect("parse")
            .with_timezone(&Utc)
    }

    fn snapshot(now: DateTime<Utc>) -> Snapshot {
        Snapshot::capture(now, &[], &PersistentState::default(), Vec::new())
    }

    #[test]
    fn writes_sortable_transcript_names() {
        let temp = tempfile::tempdir().expect("temp dir");
        let now = at("2026-03-01T10:00:00Z");
        let path = write_transcript(
            temp.path(),
            7,
            now,
            &snapshot(now),
            &Analysis::default(),
        )
        .expect("write");
        assert_eq!(
            path.file_name().and_then(|name| name.to_str()),
            Some("analysis-0000000007-20260301T100000Z.json")
        );
    }

    #[test]
    fn retention_keeps_the_newest_k() {
        let temp = tempfile::tempdir().expect("temp dir");
        let base = at("2026-03-01T10:00:00Z");
        for cycle in 1..=8u64 {
            let now = base + Duration::seconds(cycle as i64);
            write_transcript(temp.path(), cycle, now, &snapshot(now), &Analysis::default())
                .expect("write");
        }

        let removed = enforce_retention(temp.path(), 3).expect("retention");
        assert_eq!(removed, 5);

        let mut names: Vec<String> = fs::read_dir(temp.path())
            .expect("read dir")
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .collect();
        names.sort();
        assert_eq!(names.len(), 3);
        assert!(names[0].starts_with("analysis-0000000006"));
        assert!(names[2].starts_with("analysis-0000000008"));
    }

    #[test]
    fn retention_under_limit_is_a_no_op() {
        let temp = tempfile::tempdir().expect("temp dir");
        let now = at("2026-03-01T10:00:00Z");
        write_transcript(temp.path(), 1, now, &snapshot(now), &Analysis::default())
            .expect("write");
        assert_eq!(enforce_retention(temp.path(), 3).expect("retention"), 0);
        assert_eq!(enforce_retention(&temp.path().join("absent"), 3).expect("missing dir"), 0);
    }

    #[test]
    fn retention_ignores_foreign_files() {
        let temp = tempfile::tempdir().expect("temp dir");
        fs::write(temp.path().join("README.md"), "notes").expect("write");
        fs::write(temp.path().join("other.json"), "{}").expect("write");
        assert_eq!(enforce_retention(temp.path(), 0).expect("retention"), 0);
        assert!(temp.path().join("README.md").exists());
        assert!(temp.path().join("other.json").exists());
    }
}

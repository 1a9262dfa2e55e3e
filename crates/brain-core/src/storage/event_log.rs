//! Event Log (§3 Event log entry, §6)
//!
//! Append-only JSONL log of every mutation (`indexed`, `merged`, `promoted`,
//! `forgotten`, ...), one [`crate::model::EventLogEntry`] per line. Used by
//! C12's regression harness to replay history and by C11 to audit merges.
//!
//! Appends take an advisory exclusive lock via `fs2` for the duration of the
//! write so two processes sharing a data directory don't interleave partial
//! lines. Rotation is size-threshold based: once the log exceeds
//! `rotate_after_bytes`, it's renamed aside with a numeric suffix and a fresh
//! file is started.

use crate::error::StoreError;
use crate::model::EventLogEntry;
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

pub struct EventLog {
    path: PathBuf,
    rotate_after_bytes: u64,
}

impl EventLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            rotate_after_bytes: 64 * 1024 * 1024,
        }
    }

    pub fn with_rotate_after_bytes(mut self, bytes: u64) -> Self {
        self.rotate_after_bytes = bytes;
        self
    }

    pub fn append(&self, entry: &EventLogEntry) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        file.lock_exclusive()
            .map_err(|e| StoreError::Init(format!("event log lock failed: {e}")))?;

        let line = serde_json::to_string(entry)
            .map_err(|e| StoreError::Init(format!("event log serialize failed: {e}")))?;
        let write_result = writeln!(file, "{line}");

        let _ = FileExt::unlock(&file);
        write_result?;

        if file.metadata()?.len() > self.rotate_after_bytes {
            self.rotate()?;
        }

        Ok(())
    }

    fn rotate(&self) -> Result<(), StoreError> {
        let mut suffix = 1;
        loop {
            let candidate = self.path.with_extension(format!("{suffix}.jsonl"));
            if !candidate.exists() {
                std::fs::rename(&self.path, &candidate)?;
                return Ok(());
            }
            suffix += 1;
        }
    }

    /// Replay every entry currently on disk, in append order.
    pub fn replay(&self) -> Result<Vec<EventLogEntry>, StoreError> {
        Self::read_entries(&self.path)
    }

    fn read_entries(path: &Path) -> Result<Vec<EventLogEntry>, StoreError> {
        if !path.exists() {
            return Ok(vec![]);
        }
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let mut entries = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let entry: EventLogEntry = serde_json::from_str(&line)
                .map_err(|e| StoreError::Init(format!("corrupt event log line: {e}")))?;
            entries.push(entry);
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EventLogEntry;

    fn entry(kind: &str, subject: &str) -> EventLogEntry {
        EventLogEntry {
            ts: chrono::Utc::now(),
            kind: kind.to_string(),
            subject_id: subject.to_string(),
            old: None,
            new: None,
            session_id: None,
        }
    }

    #[test]
    fn append_then_replay_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let log = EventLog::new(dir.path().join("events.jsonl"));
        log.append(&entry("indexed", "mem-1")).unwrap();
        log.append(&entry("promoted", "mem-1")).unwrap();

        let replayed = log.replay().unwrap();
        assert_eq!(replayed.len(), 2);
        assert_eq!(replayed[0].kind, "indexed");
        assert_eq!(replayed[1].kind, "promoted");
    }

    #[test]
    fn replay_on_missing_file_returns_empty() {
        let dir = tempfile::tempdir().unwrap();
        let log = EventLog::new(dir.path().join("missing.jsonl"));
        assert!(log.replay().unwrap().is_empty());
    }

    #[test]
    fn rotation_moves_oversized_log_aside() {
        let dir = tempfile::tempdir().unwrap();
        let log = EventLog::new(dir.path().join("events.jsonl")).with_rotate_after_bytes(1);
        log.append(&entry("indexed", "mem-1")).unwrap();
        log.append(&entry("indexed", "mem-2")).unwrap();

        assert!(dir.path().join("events.1.jsonl").exists());
    }
}

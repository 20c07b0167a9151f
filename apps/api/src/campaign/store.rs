//! Snapshot store — one JSON file per job for the active queue and one for
//! the conducted-interview collection. The full snapshot is rewritten after
//! every mutation and rehydrated when a campaign is opened; timestamps round
//! trip through RFC 3339 text.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use uuid::Uuid;

use crate::campaign::models::{CompletedInterview, QueueEntry};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

/// File-backed snapshot store rooted at the configured data directory.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    data_dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let data_dir = data_dir.into();
        fs::create_dir_all(&data_dir)?;
        Ok(Self { data_dir })
    }

    fn queue_path(&self, job_id: Uuid) -> PathBuf {
        self.data_dir.join(format!("queue-{job_id}.json"))
    }

    fn interviews_path(&self, job_id: Uuid) -> PathBuf {
        self.data_dir.join(format!("interviews-{job_id}.json"))
    }

    pub fn load_queue(&self, job_id: Uuid) -> Result<Vec<QueueEntry>, StoreError> {
        load_snapshot(&self.queue_path(job_id))
    }

    /// Rewrites the queue snapshot; an empty queue removes the file.
    pub fn save_queue(&self, job_id: Uuid, entries: &[QueueEntry]) -> Result<(), StoreError> {
        if entries.is_empty() {
            remove_if_present(&self.queue_path(job_id))
        } else {
            write_snapshot(&self.queue_path(job_id), entries)
        }
    }

    pub fn load_interviews(&self, job_id: Uuid) -> Result<Vec<CompletedInterview>, StoreError> {
        load_snapshot(&self.interviews_path(job_id))
    }

    pub fn save_interviews(
        &self,
        job_id: Uuid,
        interviews: &[CompletedInterview],
    ) -> Result<(), StoreError> {
        write_snapshot(&self.interviews_path(job_id), interviews)
    }
}

fn load_snapshot<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Vec<T>, StoreError> {
    match fs::read(path) {
        Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}

/// Write to a sibling temp file and rename, so a crash mid-write never
/// leaves a truncated snapshot behind.
fn write_snapshot<T: serde::Serialize>(path: &Path, items: &[T]) -> Result<(), StoreError> {
    let bytes = serde_json::to_vec_pretty(items)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

fn remove_if_present(path: &Path) -> Result<(), StoreError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::campaign::models::{CallStatus, Candidate};
    use chrono::Utc;

    fn entry(status: CallStatus) -> QueueEntry {
        let mut entry = QueueEntry::new(Candidate {
            name: "Alan Turing".to_string(),
            phone: "+14155550123".to_string(),
            email: "alan@example.com".to_string(),
            score: Some(99),
            experience: None,
            education: None,
            notes: None,
        });
        entry.status = status;
        if status.is_launched() {
            entry.call_id = Some("call-abc".to_string());
            entry.started_at = Some(Utc::now());
        }
        if status.is_terminal() {
            entry.ended_at = Some(Utc::now());
        }
        entry
    }

    #[test]
    fn test_load_missing_snapshot_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path()).unwrap();
        assert!(store.load_queue(Uuid::new_v4()).unwrap().is_empty());
        assert!(store.load_interviews(Uuid::new_v4()).unwrap().is_empty());
    }

    #[test]
    fn test_queue_round_trip_is_observationally_identical() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path()).unwrap();
        let job_id = Uuid::new_v4();
        let entries = vec![entry(CallStatus::Queued), entry(CallStatus::NoAnswer)];

        store.save_queue(job_id, &entries).unwrap();
        let loaded = store.load_queue(job_id).unwrap();

        assert_eq!(loaded.len(), 2);
        for (before, after) in entries.iter().zip(&loaded) {
            assert_eq!(before.id, after.id);
            assert_eq!(before.status, after.status);
            assert_eq!(before.call_id, after.call_id);
            // Timestamps reconstruct to equal instants through RFC 3339 text.
            assert_eq!(before.started_at, after.started_at);
            assert_eq!(before.ended_at, after.ended_at);
        }
    }

    #[test]
    fn test_empty_queue_deletes_snapshot_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path()).unwrap();
        let job_id = Uuid::new_v4();

        store.save_queue(job_id, &[entry(CallStatus::Queued)]).unwrap();
        assert!(dir.path().join(format!("queue-{job_id}.json")).exists());

        store.save_queue(job_id, &[]).unwrap();
        assert!(!dir.path().join(format!("queue-{job_id}.json")).exists());

        // Deleting an already-absent snapshot is a no-op.
        store.save_queue(job_id, &[]).unwrap();
    }

    #[test]
    fn test_snapshots_are_keyed_per_job() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path()).unwrap();
        let job_a = Uuid::new_v4();
        let job_b = Uuid::new_v4();

        store.save_queue(job_a, &[entry(CallStatus::Queued)]).unwrap();
        assert!(store.load_queue(job_b).unwrap().is_empty());
        assert_eq!(store.load_queue(job_a).unwrap().len(), 1);
    }
}

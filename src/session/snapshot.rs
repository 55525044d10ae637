//! Client-local progress snapshots. Never authoritative: a snapshot is only
//! used when it belongs to the attempt that was just started or resumed.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::dto::test_dto::PublicTest;
use crate::error::Result;

use super::controller::PendingSubmission;

pub fn snapshot_key(test_id: i64) -> String {
    format!("testProgress_{}", test_id)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    pub test_id: i64,
    pub attempt_id: i64,
    pub current_question: usize,
    pub answers: BTreeMap<i64, u8>,
    pub time_left: u32,
    pub ts: DateTime<Utc>,
    /// Set once a submission has been frozen; a reload resumes submitting it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending: Option<PendingSubmission>,
}

/// Progress recovered from a matching snapshot, already clamped to the test.
#[derive(Debug, Clone, PartialEq)]
pub struct RestoredProgress {
    pub current_question: usize,
    pub answers: BTreeMap<i64, u8>,
    pub time_left: u32,
}

impl ProgressSnapshot {
    pub fn matches(&self, test_id: i64, attempt_id: i64) -> bool {
        self.test_id == test_id && self.attempt_id == attempt_id
    }

    /// Clamps the saved position and time to the test and drops answers that
    /// do not fit its questions.
    pub fn restore(&self, test: &PublicTest) -> RestoredProgress {
        let last_index = test.questions.len().saturating_sub(1);
        let answers = self
            .answers
            .iter()
            .filter(|(question_id, option)| {
                test.question(**question_id)
                    .map(|q| usize::from(**option) < q.options.len())
                    .unwrap_or(false)
            })
            .map(|(question_id, option)| (*question_id, *option))
            .collect();

        RestoredProgress {
            current_question: self.current_question.min(last_index),
            answers,
            time_left: self.time_left.min(test.duration_seconds()),
        }
    }
}

/// Durable per-test key/value slot for snapshots.
pub trait SnapshotStore: Send + Sync {
    fn load(&self, test_id: i64) -> Result<Option<ProgressSnapshot>>;
    fn save(&self, snapshot: &ProgressSnapshot) -> Result<()>;
    fn remove(&self, test_id: i64) -> Result<()>;
}

/// One JSON file per test under a directory.
pub struct FileSnapshotStore {
    dir: PathBuf,
}

impl FileSnapshotStore {
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn path_for(&self, test_id: i64) -> PathBuf {
        self.dir.join(format!("{}.json", snapshot_key(test_id)))
    }
}

impl SnapshotStore for FileSnapshotStore {
    fn load(&self, test_id: i64) -> Result<Option<ProgressSnapshot>> {
        let raw = match fs::read(self.path_for(test_id)) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_slice(&raw)?))
    }

    fn save(&self, snapshot: &ProgressSnapshot) -> Result<()> {
        let path = self.path_for(snapshot.test_id);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec(snapshot)?)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove(&self, test_id: i64) -> Result<()> {
        match fs::remove_file(self.path_for(test_id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[derive(Default)]
pub struct MemorySnapshotStore {
    slots: Mutex<HashMap<i64, ProgressSnapshot>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn slots(&self) -> std::sync::MutexGuard<'_, HashMap<i64, ProgressSnapshot>> {
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn load(&self, test_id: i64) -> Result<Option<ProgressSnapshot>> {
        Ok(self.slots().get(&test_id).cloned())
    }

    fn save(&self, snapshot: &ProgressSnapshot) -> Result<()> {
        self.slots().insert(snapshot.test_id, snapshot.clone());
        Ok(())
    }

    fn remove(&self, test_id: i64) -> Result<()> {
        self.slots().remove(&test_id);
        Ok(())
    }
}

impl<T: SnapshotStore + ?Sized> SnapshotStore for std::sync::Arc<T> {
    fn load(&self, test_id: i64) -> Result<Option<ProgressSnapshot>> {
        (**self).load(test_id)
    }

    fn save(&self, snapshot: &ProgressSnapshot) -> Result<()> {
        (**self).save(snapshot)
    }

    fn remove(&self, test_id: i64) -> Result<()> {
        (**self).remove(test_id)
    }
}

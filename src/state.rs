//! StateStore. Per-parser progress persisted as JSON so a `resume` run
//! picks up after the last completed file instead of re-reading the whole
//! snapshot. Writes go to a temp file and get renamed into place, so a
//! crash mid-write never leaves a truncated state file behind.

use crate::error::StateError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Pending,
    Running,
    Done,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParserState {
    pub status: Status,
    pub files_discovered: usize,
    pub files_processed: usize,
    pub last_file: Option<String>,
    pub records: u64,
    pub errors: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Default for ParserState {
    fn default() -> Self {
        Self {
            status: Status::Pending,
            files_discovered: 0,
            files_processed: 0,
            last_file: None,
            records: 0,
            errors: 0,
            started_at: None,
            updated_at: None,
            finished_at: None,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct State {
    pub parsers: HashMap<String, ParserState>,
}

pub struct StateStore {
    path: PathBuf,
    /// serialises every read-modify-write against the state file so
    /// concurrently running parsers never clobber each other's entries.
    lock: Mutex<()>,
}

impl StateStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    /// loads persisted state, or an empty one if the file doesn't exist
    /// yet (the first `start` of a fresh run).
    pub fn load(&self) -> Result<State, StateError> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) => {
                serde_json::from_str(&text).map_err(|source| StateError::Parse {
                    path: self.path.clone(),
                    source,
                })
            }
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => Ok(State::default()),
            Err(source) => Err(StateError::Read {
                path: self.path.clone(),
                source,
            }),
        }
    }

    /// writes `state` atomically by writing to a sibling `.tmp` file and
    /// renaming it over the real path.
    pub fn save(&self, state: &State) -> Result<(), StateError> {
        let tmp = self.path.with_extension("tmp");
        let text = serde_json::to_string_pretty(state).expect("State serialises infallibly");
        std::fs::write(&tmp, text).map_err(|source| StateError::Write {
            path: tmp.clone(),
            source,
        })?;
        std::fs::rename(&tmp, &self.path).map_err(|source| StateError::Write {
            path: self.path.clone(),
            source,
        })
    }

    /// reads the current entry for `name`, applies `f` to it, and writes
    /// the whole state back under the store's lock. This is the only
    /// path parsers should use to persist progress: caching a `State`
    /// snapshot across an `await` and saving it later loses updates made
    /// by other parsers running concurrently.
    pub fn update(
        &self,
        name: &str,
        f: impl FnOnce(&mut ParserState),
    ) -> Result<ParserState, StateError> {
        let _guard = self.lock.lock().expect("state store mutex poisoned");
        let mut state = self.load()?;
        let mut progress = state.parsers.remove(name).unwrap_or_default();
        f(&mut progress);
        state.parsers.insert(name.to_string(), progress.clone());
        self.save(&state)?;
        Ok(progress)
    }

    /// removes the state file entirely. The database itself is untouched.
    pub fn delete(&self) -> Result<(), StateError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StateError::Write {
                path: self.path.clone(),
                source,
            }),
        }
    }

    /// demotes any parser left `running` from a previous crash back to
    /// `pending` so `resume` restarts it from its last completed file
    /// rather than assuming it finished.
    pub fn prepare_resume(&self) -> Result<State, StateError> {
        let mut state = self.load()?;
        for parser in state.parsers.values_mut() {
            if parser.status == Status::Running {
                parser.status = Status::Pending;
            }
        }
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("state.json"));
        let mut state = State::default();
        state.parsers.insert(
            "topics".to_string(),
            ParserState {
                status: Status::Done,
                files_discovered: 3,
                files_processed: 3,
                records: 4242,
                ..Default::default()
            },
        );
        store.save(&state).unwrap();
        let loaded = store.load().unwrap();
        assert_eq!(loaded.parsers["topics"].status, Status::Done);
        assert_eq!(loaded.parsers["topics"].records, 4242);
    }

    #[test]
    fn missing_state_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("absent.json"));
        let state = store.load().unwrap();
        assert!(state.parsers.is_empty());
    }

    #[test]
    fn resume_demotes_running_to_pending() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("state.json"));
        let mut state = State::default();
        state.parsers.insert(
            "works".to_string(),
            ParserState {
                status: Status::Running,
                files_processed: 2,
                ..Default::default()
            },
        );
        store.save(&state).unwrap();
        let resumed = store.prepare_resume().unwrap();
        assert_eq!(resumed.parsers["works"].status, Status::Pending);
        assert_eq!(resumed.parsers["works"].files_processed, 2);
    }

    #[test]
    fn update_preserves_other_entries() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("state.json"));
        store
            .update("topics", |p| {
                p.files_processed = 1;
            })
            .unwrap();
        store
            .update("concepts", |p| {
                p.files_processed = 2;
            })
            .unwrap();
        let state = store.load().unwrap();
        assert_eq!(state.parsers["topics"].files_processed, 1);
        assert_eq!(state.parsers["concepts"].files_processed, 2);
    }
}

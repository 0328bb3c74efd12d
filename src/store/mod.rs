//! Decision Store: the sole owner of persisted decisions, the
//! change log and the error log. Everything here goes through one
//! `DecisionStore` instance constructed once at process start and threaded
//! through the orchestrator.
//!
//! Crash safety comes from write-temp-then-rename-then-fsync plus a
//! rotating set of backups, so a torn write never corrupts the live
//! document beyond recovery.

mod lock;

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::constants::{
    MAX_CHANGE_LOG_ENTRIES, MAX_ERROR_LOG_ENTRIES, MAX_STATE_BACKUPS, STATE_BACKUPS_DIR_NAME,
    STATE_FILE_NAME, STATE_FORMAT_VERSION, STATE_LOCK_FILE_NAME,
};
use crate::error::{KaiError, Result};
use crate::model::{ChangeLogEntry, Decision, ErrorLogEntry};

pub use lock::StateLock;

/// The on-disk document. `decisions` is
/// keyed by movie id, then by category name, so a movie can carry
/// decisions from several rubrics at once.
#[derive(Clone, Debug, Serialize, Deserialize)]
struct StateDocument {
    version: String,
    state_format_version: u32,
    last_update: chrono::DateTime<Utc>,
    decisions: HashMap<i64, HashMap<String, Decision>>,
    changes: VecDeque<ChangeLogEntry>,
    errors: VecDeque<ErrorLogEntry>,
}

impl Default for StateDocument {
    fn default() -> Self {
        StateDocument {
            version: env!("CARGO_PKG_VERSION").to_string(),
            state_format_version: STATE_FORMAT_VERSION,
            last_update: Utc::now(),
            decisions: HashMap::new(),
            changes: VecDeque::new(),
            errors: VecDeque::new(),
        }
    }
}

pub struct DecisionStore {
    state_dir: PathBuf,
    state_path: PathBuf,
    backups_dir: PathBuf,
    doc: StateDocument,
    /// Held for the lifetime of the store; released on drop.
    _lock: StateLock,
    /// Reset at the start of every run; distinct from
    /// the persistent, bounded `doc.changes`/`doc.errors` rings.
    run_changes: Vec<ChangeLogEntry>,
    run_errors: Vec<ErrorLogEntry>,
}

impl DecisionStore {
    /// Open the store rooted at `state_dir`, creating the directory and
    /// its backups subdirectory if needed, acquiring the exclusive lock,
    /// and loading existing state ( `load()`).
    pub fn open(state_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(state_dir)
            .map_err(|e| KaiError::StateDirUnwritable(format!("{}: {e}", state_dir.display())))?;
        let backups_dir = state_dir.join(STATE_BACKUPS_DIR_NAME);
        std::fs::create_dir_all(&backups_dir)
            .map_err(|e| KaiError::StateDirUnwritable(format!("{}: {e}", backups_dir.display())))?;

        let lock = StateLock::acquire(&state_dir.join(STATE_LOCK_FILE_NAME))?;
        let state_path = state_dir.join(STATE_FILE_NAME);

        let mut store = DecisionStore {
            state_dir: state_dir.to_path_buf(),
            state_path,
            backups_dir,
            doc: StateDocument::default(),
            _lock: lock,
            run_changes: Vec::new(),
            run_errors: Vec::new(),
        };
        store.load()?;
        Ok(store)
    }

    /// Read state from disk into memory. Absent file → empty state.
    /// Corrupt file → restore from the newest backup that parses, else
    /// empty state with an error-log entry.
    fn load(&mut self) -> Result<()> {
        if !self.state_path.exists() {
            self.doc = StateDocument::default();
            return Ok(());
        }

        let bytes = std::fs::read(&self.state_path)?;
        match serde_json::from_slice::<StateDocument>(&bytes) {
            Ok(doc) => {
                self.doc = doc;
                self.check_format_version();
                Ok(())
            }
            Err(parse_err) => {
                tracing::warn!(error = %parse_err, "state file is corrupt; attempting backup restore");
                match self.restore_newest_backup() {
                    Some(doc) => {
                        self.doc = doc;
                        self.log_error("store.load", "state file corrupt; restored from backup");
                        Ok(())
                    }
                    None => {
                        self.doc = StateDocument::default();
                        self.log_error(
                            "store.load",
                            &format!("state file corrupt and no usable backup: {parse_err}"),
                        );
                        Ok(())
                    }
                }
            }
        }
    }

    fn check_format_version(&mut self) {
        if self.doc.state_format_version != STATE_FORMAT_VERSION {
            tracing::warn!(
                found = self.doc.state_format_version,
                expected = STATE_FORMAT_VERSION,
                "state_format_version mismatch; leaving state untouched"
            );
        }
    }

    fn restore_newest_backup(&self) -> Option<StateDocument> {
        let mut backups: Vec<PathBuf> = std::fs::read_dir(&self.backups_dir)
            .ok()?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .collect();
        backups.sort();
        backups.reverse();
        for path in backups {
            if let Ok(bytes) = std::fs::read(&path) {
                if let Ok(doc) = serde_json::from_slice::<StateDocument>(&bytes) {
                    return Some(doc);
                }
            }
        }
        None
    }

    /// Write atomically (temp file + fsync + rename) and rotate backups,
    /// keeping the newest five without ever removing the file just
    /// written ( `save()`, durability invariant).
    pub fn save(&mut self) -> Result<()> {
        self.doc.last_update = Utc::now();
        let bytes = serde_json::to_vec_pretty(&self.doc)?;

        let tmp_path = self.state_path.with_extension("json.tmp");
        {
            let mut tmp = std::fs::File::create(&tmp_path)?;
            use std::io::Write;
            tmp.write_all(&bytes)?;
            tmp.sync_all()?;
        }
        std::fs::rename(&tmp_path, &self.state_path)?;

        self.write_backup(&bytes)?;
        self.rotate_backups()?;
        Ok(())
    }

    fn write_backup(&self, bytes: &[u8]) -> Result<()> {
        let stamp = Utc::now().format("%Y%m%dT%H%M%S%.3fZ");
        let name = format!("kometa_state_{stamp}.json");
        let path = self.backups_dir.join(name);
        std::fs::write(&path, bytes)?;
        Ok(())
    }

    fn rotate_backups(&self) -> Result<()> {
        let mut backups: Vec<PathBuf> = std::fs::read_dir(&self.backups_dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .collect();
        backups.sort();
        while backups.len() > MAX_STATE_BACKUPS {
            let oldest = backups.remove(0);
            let _ = std::fs::remove_file(oldest);
        }
        Ok(())
    }

    pub fn get_decision(&self, movie_id: i64, category: &str) -> Option<&Decision> {
        self.doc.decisions.get(&movie_id)?.get(category)
    }

    pub fn get_decisions_for_movie(&self, movie_id: i64) -> Vec<&Decision> {
        self.doc
            .decisions
            .get(&movie_id)
            .map(|by_category| by_category.values().collect())
            .unwrap_or_default()
    }

    pub fn set_decision(&mut self, decision: Decision) {
        self.doc
            .decisions
            .entry(decision.movie_id)
            .or_default()
            .insert(decision.category_name.clone(), decision);
    }

    /// Start a new run's per-run accumulators; the persistent bounded
    /// rings are untouched.
    pub fn begin_run(&mut self) {
        self.run_changes.clear();
        self.run_errors.clear();
    }

    pub fn log_change(&mut self, entry: ChangeLogEntry) {
        self.run_changes.push(entry.clone());
        self.doc.changes.push_back(entry);
        while self.doc.changes.len() > MAX_CHANGE_LOG_ENTRIES {
            self.doc.changes.pop_front();
        }
    }

    pub fn log_error(&mut self, context: &str, message: &str) {
        let entry = ErrorLogEntry {
            timestamp: Utc::now(),
            context: context.to_string(),
            message: message.to_string(),
        };
        self.run_errors.push(entry.clone());
        self.doc.errors.push_back(entry);
        while self.doc.errors.len() > MAX_ERROR_LOG_ENTRIES {
            self.doc.errors.pop_front();
        }
    }

    pub fn run_changes(&self) -> &[ChangeLogEntry] {
        &self.run_changes
    }

    pub fn run_errors(&self) -> &[ErrorLogEntry] {
        &self.run_errors
    }

    pub fn changes(&self) -> impl Iterator<Item = &ChangeLogEntry> {
        self.doc.changes.iter()
    }

    pub fn errors(&self) -> impl Iterator<Item = &ErrorLogEntry> {
        self.doc.errors.iter()
    }

    /// Empty the in-memory state and persist it ( `reset()`).
    pub fn reset(&mut self) -> Result<()> {
        self.doc = StateDocument::default();
        self.run_changes.clear();
        self.run_errors.clear();
        self.save()
    }

    /// Pretty JSON of the full state document, for `--dump-state`.
    pub fn dump(&self) -> String {
        serde_json::to_string_pretty(&self.doc).unwrap_or_else(|_| "{}".to_string())
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ChangeAction;

    fn sample_decision(movie_id: i64, category: &str) -> Decision {
        Decision {
            movie_id,
            category_name: category.to_string(),
            include: true,
            confidence: 0.9,
            fingerprint: "fp".to_string(),
            label: format!("KAI-{category}"),
            timestamp: Utc::now(),
            reasoning: None,
            detailed_analysis: None,
        }
    }

    #[test]
    fn save_then_reload_round_trips_decisions() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut store = DecisionStore::open(dir.path()).unwrap();
            store.set_decision(sample_decision(1, "horror"));
            store.save().unwrap();
        }
        let store = DecisionStore::open(dir.path()).unwrap();
        assert!(store.get_decision(1, "horror").is_some());
    }

    #[test]
    fn second_open_fails_while_first_is_held() {
        let dir = tempfile::tempdir().unwrap();
        let _first = DecisionStore::open(dir.path()).unwrap();
        let second = DecisionStore::open(dir.path());
        assert!(second.is_err());
    }

    #[test]
    fn corrupt_state_file_falls_back_to_empty_with_error_logged() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(STATE_BACKUPS_DIR_NAME)).unwrap();
        std::fs::write(dir.path().join(STATE_FILE_NAME), b"not json").unwrap();
        let store = DecisionStore::open(dir.path()).unwrap();
        assert_eq!(store.errors().count(), 1);
    }

    #[test]
    fn change_log_ring_is_bounded() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = DecisionStore::open(dir.path()).unwrap();
        for i in 0..(MAX_CHANGE_LOG_ENTRIES + 10) {
            store.log_change(ChangeLogEntry {
                timestamp: Utc::now(),
                movie_id: i as i64,
                title: "X".into(),
                category: "horror".into(),
                action: ChangeAction::Added,
                label: "KAI-horror".into(),
            });
        }
        assert_eq!(store.changes().count(), MAX_CHANGE_LOG_ENTRIES);
    }

    #[test]
    fn reset_clears_decisions_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = DecisionStore::open(dir.path()).unwrap();
        store.set_decision(sample_decision(1, "horror"));
        store.save().unwrap();
        store.reset().unwrap();
        assert!(store.get_decision(1, "horror").is_none());
        drop(store);
        let reopened = DecisionStore::open(dir.path()).unwrap();
        assert!(reopened.get_decision(1, "horror").is_none());
    }

    #[test]
    fn begin_run_clears_run_scoped_accumulators_only() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = DecisionStore::open(dir.path()).unwrap();
        store.log_error("ctx", "boom");
        assert_eq!(store.run_errors().len(), 1);
        store.begin_run();
        assert_eq!(store.run_errors().len(), 0);
        assert_eq!(store.errors().count(), 1);
    }
}

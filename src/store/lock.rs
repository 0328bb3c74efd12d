//! Exclusive advisory lock on the state directory, so two concurrent
//! invocations of the process never interleave writes to the same
//! decision store.

use std::fs::{File, OpenOptions};
use std::path::Path;

use fs2::FileExt;

use crate::error::{KaiError, Result};

/// Holds the lock file open for as long as this guard lives; the lock is
/// released when it is dropped (process exit also releases it).
pub struct StateLock {
    _file: File,
}

impl StateLock {
    /// Try to acquire the exclusive lock at `path`, creating the file if
    /// necessary. Returns [`KaiError::StateLocked`] immediately if another
    /// process already holds it.
    pub fn acquire(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(path)?;
        file.try_lock_exclusive().map_err(|_| {
            KaiError::StateLocked(format!(
                "state directory is locked by another run ({})",
                path.display()
            ))
        })?;
        Ok(StateLock { _file: file })
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self._file);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_fails_while_first_is_held() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kometa_state.lock");
        let first = StateLock::acquire(&path).unwrap();
        let second = StateLock::acquire(&path);
        assert!(second.is_err());
        drop(first);
        assert!(StateLock::acquire(&path).is_ok());
    }
}

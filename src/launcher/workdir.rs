//! Scoped process working directory.
//!
//! The working directory is process-global, so every change goes through one
//! lock that stays held for the lifetime of the guard. Restoration happens in
//! `Drop`, which also covers early returns and panics.

use std::path::{Path, PathBuf};
use tokio::sync::{Mutex, MutexGuard};

static CWD_LOCK: Mutex<()> = Mutex::const_new(());

pub struct WorkingDirGuard {
    original: PathBuf,
    _lock: MutexGuard<'static, ()>,
}

impl WorkingDirGuard {
    /// Save the current directory and switch to `dir`. On error nothing changed.
    pub async fn enter(dir: &Path) -> std::io::Result<Self> {
        let lock = CWD_LOCK.lock().await;
        let original = std::env::current_dir()?;
        std::env::set_current_dir(dir)?;
        tracing::debug!("Entered {} (was {})", dir.display(), original.display());
        Ok(Self {
            original,
            _lock: lock,
        })
    }

    pub fn original(&self) -> &Path {
        &self.original
    }
}

impl Drop for WorkingDirGuard {
    fn drop(&mut self) {
        if let Err(e) = std::env::set_current_dir(&self.original) {
            tracing::error!(
                "Failed to restore working directory {}: {}",
                self.original.display(),
                e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // The only unit test in this crate that moves the process working directory.
    #[tokio::test]
    async fn test_guard_enters_and_restores() {
        let before = std::env::current_dir().unwrap();
        let dir = tempfile::tempdir().unwrap();

        {
            let guard = WorkingDirGuard::enter(dir.path()).await.unwrap();
            assert_eq!(
                std::env::current_dir().unwrap().canonicalize().unwrap(),
                dir.path().canonicalize().unwrap()
            );
            assert_eq!(guard.original(), before.as_path());
        }
        assert_eq!(std::env::current_dir().unwrap(), before);

        let missing = dir.path().join("missing");
        assert!(WorkingDirGuard::enter(&missing).await.is_err());
        assert_eq!(std::env::current_dir().unwrap(), before);
    }
}

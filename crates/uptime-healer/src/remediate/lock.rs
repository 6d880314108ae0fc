//! Per-repository remediation lock.
//!
//! A lock file in the work root, created with `create_new` so only one
//! process can hold it. A lock older than the stale age is assumed to belong
//! to a crashed run and is replaced.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tracing::{debug, warn};

/// Age after which an existing lock file is ignored.
pub const STALE_AFTER: Duration = Duration::from_secs(60 * 60);

/// Held remediation lock. Released on drop.
#[derive(Debug)]
pub struct RemediationLock {
    path: PathBuf,
}

impl RemediationLock {
    /// Lock file location for a repository key such as `owner-repo`.
    #[must_use]
    pub fn path_for(work_root: &Path, key: &str) -> PathBuf {
        work_root.join(format!(".{key}.remediation.lock"))
    }

    /// Try to take the lock. Returns `Ok(None)` when another run holds it.
    pub fn acquire(work_root: &Path, key: &str, stale_after: Duration) -> io::Result<Option<Self>> {
        std::fs::create_dir_all(work_root)?;
        let path = Self::path_for(work_root, key);

        for _ in 0..2 {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    writeln!(
                        file,
                        "pid={} acquired_at={}",
                        std::process::id(),
                        chrono::Utc::now().to_rfc3339()
                    )?;
                    debug!(path = %path.display(), "Remediation lock acquired");
                    return Ok(Some(Self { path }));
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    if !is_stale(&path, stale_after) {
                        return Ok(None);
                    }
                    warn!(path = %path.display(), "Replacing stale remediation lock");
                    match std::fs::remove_file(&path) {
                        Ok(()) => {}
                        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                        Err(e) => return Err(e),
                    }
                }
                Err(e) => return Err(e),
            }
        }

        // Another process re-created the lock between removal and retry.
        Ok(None)
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RemediationLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "Failed to release remediation lock");
        } else {
            debug!(path = %self.path.display(), "Remediation lock released");
        }
    }
}

fn is_stale(path: &Path, stale_after: Duration) -> bool {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|modified| SystemTime::now().duration_since(modified).ok())
        .is_some_and(|age| age >= stale_after)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_is_exclusive_until_dropped() {
        let dir = tempfile::tempdir().unwrap();

        let first = RemediationLock::acquire(dir.path(), "acme-site", STALE_AFTER)
            .unwrap()
            .expect("first acquire succeeds");
        assert!(first.path().exists());

        assert!(RemediationLock::acquire(dir.path(), "acme-site", STALE_AFTER)
            .unwrap()
            .is_none());

        // Different repository, different lock.
        assert!(RemediationLock::acquire(dir.path(), "acme-other", STALE_AFTER)
            .unwrap()
            .is_some());

        let path = first.path().to_path_buf();
        drop(first);
        assert!(!path.exists());
        assert!(RemediationLock::acquire(dir.path(), "acme-site", STALE_AFTER)
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_stale_lock_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(RemediationLock::path_for(dir.path(), "acme-site"), "pid=1").unwrap();

        assert!(RemediationLock::acquire(dir.path(), "acme-site", STALE_AFTER)
            .unwrap()
            .is_none());
        assert!(RemediationLock::acquire(dir.path(), "acme-site", Duration::ZERO)
            .unwrap()
            .is_some());
    }
}

//! Lock files serializing read-modify-write cycles on shared documents.
//!
//! The orchestrator and the overseer are separate processes writing the same
//! JSON documents. Each writer takes `<document>.lock` (created with
//! `create_new`) for the duration of one load → mutate → save cycle. Locks
//! left behind by a crashed writer are evicted once they are older than
//! [`STALE_LOCK_SECS`].

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};
use tracing::warn;
use uuid::Uuid;

/// Locks older than this are assumed abandoned.
pub const STALE_LOCK_SECS: u64 = 30;

/// Default acquisition timeout.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_millis(2_000);

/// Lock file guarding one document.
#[derive(Debug, Clone)]
pub struct DocumentLock {
    lock_path: PathBuf,
    timeout: Duration,
}

impl DocumentLock {
    /// Lock for the document at `document_path` (lock file is `<path>.lock`).
    #[must_use]
    pub fn for_document(document_path: &Path, timeout: Duration) -> Self {
        let mut name = document_path.as_os_str().to_owned();
        name.push(".lock");
        Self {
            lock_path: PathBuf::from(name),
            timeout,
        }
    }

    /// Path of the lock file.
    pub fn path(&self) -> &Path {
        &self.lock_path
    }

    /// Acquire the lock, waiting up to the configured timeout.
    ///
    /// # Errors
    ///
    /// Returns an `io::Error` when the lock directory cannot be created, the
    /// lock file cannot be created for a reason other than contention, or
    /// the timeout elapses.
    pub fn acquire(&self) -> std::io::Result<LockGuard> {
        if let Some(parent) = self.lock_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let started = Instant::now();
        loop {
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&self.lock_path)
            {
                Ok(mut file) => {
                    let _ = write!(file, "{}", std::process::id());
                    return Ok(LockGuard {
                        path: self.lock_path.clone(),
                    });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    evict_stale_lock(&self.lock_path);
                    if started.elapsed() > self.timeout {
                        return Err(std::io::Error::new(
                            std::io::ErrorKind::TimedOut,
                            format!("timed out waiting for lock {}", self.lock_path.display()),
                        ));
                    }
                    std::thread::sleep(Duration::from_millis(2));
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Acquire the lock, or log and return `None` so the caller can proceed
    /// unlocked rather than fail.
    pub fn acquire_or_warn(&self) -> Option<LockGuard> {
        match self.acquire() {
            Ok(guard) => Some(guard),
            Err(e) => {
                warn!("proceeding without document lock: {e}");
                None
            }
        }
    }
}

fn is_stale(path: &Path) -> bool {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|modified| SystemTime::now().duration_since(modified).ok())
        .is_some_and(|age| age > Duration::from_secs(STALE_LOCK_SECS))
}

/// Remove the lock at `lock_path` if it is stale.
///
/// The lock is first renamed to a unique side path, so the only file deleted
/// is the one this call moved. Between the age check and the rename another
/// waiter may have evicted the stale lock and a new holder created a fresh
/// one; in that case the moved file is fresh and is linked back into place.
fn evict_stale_lock(lock_path: &Path) {
    if is_stale(lock_path) {
        sideline(lock_path);
    }
}

fn sideline(lock_path: &Path) {
    let aside = side_path_for(lock_path);
    if std::fs::rename(lock_path, &aside).is_err() {
        // Already moved or removed by another waiter.
        return;
    }
    if is_stale(&aside) {
        warn!("evicting stale lock {}", lock_path.display());
    } else if let Err(e) = std::fs::hard_link(&aside, lock_path) {
        warn!("could not restore live lock {}: {e}", lock_path.display());
    }
    let _ = std::fs::remove_file(&aside);
}

fn side_path_for(lock_path: &Path) -> PathBuf {
    let mut name = lock_path.as_os_str().to_owned();
    name.push(format!(".{}.stale", Uuid::new_v4().simple()));
    PathBuf::from(name)
}

/// Held lock; the lock file is removed on drop.
#[derive(Debug)]
pub struct LockGuard {
    path: PathBuf,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

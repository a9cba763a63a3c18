use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use fd_lock::{RwLock, RwLockWriteGuard};

use crate::config::WriterConfig;
use crate::{Error, Result};

/// Location of the lock sentinel for a writer configuration.
///
/// The sentinel is a hidden empty file named `.__<basename>.lock`, beside
/// the log file unless a dedicated lock directory is configured. Its only
/// purpose is to carry the inter-process lock; its contents are irrelevant.
pub fn sentinel_path(config: &WriterConfig) -> PathBuf {
    let base = config
        .path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = format!(".__{base}.lock");
    let dir = config
        .lock_file_directory
        .clone()
        .or_else(|| config.path.parent().map(Path::to_path_buf))
        .unwrap_or_default();
    dir.join(name)
}

/// Exclusive inter-process lock carried by the sentinel file.
///
/// Advisory (`flock`) on POSIX, mandatory (`LockFileEx`) on Windows.
/// Acquisition returns a guard; dropping the guard releases the lock, and a
/// failing unlock never surfaces to the caller. The sentinel file itself is
/// shared infrastructure: it is created lazily by whichever writer gets
/// there first and is never unlinked.
pub struct SentinelLock {
    lock: RwLock<File>,
    pid: u32,
}

impl SentinelLock {
    /// Open (creating if needed) the sentinel for `config`.
    ///
    /// The sentinel is made group read/write explicitly, outside any umask
    /// narrowing, so writers running as different users of one group can
    /// share it. It is infrastructure, not log data; the configured `chmod`
    /// does not apply to it.
    pub fn open(config: &WriterConfig) -> Result<Self> {
        let path = sentinel_path(config);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            // May fail when another user created the sentinel first; the
            // lock itself still works.
            if let Err(err) =
                std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o660))
            {
                tracing::debug!(path = %path.display(), error = %err, "could not widen sentinel permissions");
            }
            if let Some((uid, gid)) = config.owner {
                let _ = std::os::unix::fs::chown(&path, Some(uid), Some(gid));
            }
        }
        Ok(Self {
            lock: RwLock::new(file),
            pid: std::process::id(),
        })
    }

    /// Block until the exclusive lock is held.
    pub fn acquire(&mut self) -> io::Result<RwLockWriteGuard<'_, File>> {
        self.lock.write()
    }

    /// Non-blocking acquisition, for coordination probes that must not wait
    /// behind a writer mid-rotation.
    pub fn try_acquire(&mut self) -> Result<RwLockWriteGuard<'_, File>> {
        self.lock.try_write().map_err(|err| {
            if err.kind() == io::ErrorKind::WouldBlock {
                Error::LockAcquisitionFailed
            } else {
                Error::Io(err)
            }
        })
    }

    /// Pid of the process that opened this handle. A mismatch with the
    /// current pid means the handle crossed a `fork` and must be reopened
    /// before use; the child inherits the descriptor but not the lock
    /// ownership.
    pub fn pid(&self) -> u32 {
        self.pid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinel_beside_log_file() {
        let config = WriterConfig::new("/var/log/app.log");
        assert_eq!(
            sentinel_path(&config),
            PathBuf::from("/var/log/.__app.log.lock")
        );
    }

    #[test]
    fn test_sentinel_name_keeps_full_basename() {
        let config = WriterConfig::new("/var/log/server");
        assert_eq!(
            sentinel_path(&config),
            PathBuf::from("/var/log/.__server.lock")
        );
    }

    #[test]
    fn test_sentinel_in_dedicated_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = WriterConfig::new("/var/log/app.log").with_lock_file_directory(dir.path());
        assert_eq!(
            sentinel_path(&config),
            dir.path().join(".__app.log.lock")
        );
    }

    #[test]
    fn test_exclusive_across_handles() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = WriterConfig::new(dir.path().join("app.log"));

        let mut first = SentinelLock::open(&config).expect("open first");
        let mut second = SentinelLock::open(&config).expect("open second");

        let held = first.acquire().expect("acquire");
        assert!(matches!(
            second.try_acquire(),
            Err(Error::LockAcquisitionFailed)
        ));

        drop(held);
        assert!(second.try_acquire().is_ok());
    }

    #[test]
    fn test_sentinel_created_lazily() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = WriterConfig::new(dir.path().join("app.log"));
        let sentinel = sentinel_path(&config);
        assert!(!sentinel.exists());

        let _lock = SentinelLock::open(&config).expect("open");
        assert!(sentinel.exists());
    }
}

use std::fs::{File, Metadata, OpenOptions};
use std::io;
use std::path::Path;

use crate::config::WriterConfig;

/// Identity of an on-disk file, used to detect that the path has been
/// rotated away from underneath a held handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FileId {
    #[cfg(unix)]
    dev: u64,
    #[cfg(unix)]
    ino: u64,
    #[cfg(windows)]
    created: u64,
}

impl FileId {
    #[cfg(unix)]
    pub fn of(meta: &Metadata) -> Self {
        use std::os::unix::fs::MetadataExt;
        Self {
            dev: meta.dev(),
            ino: meta.ino(),
        }
    }

    // Stable std exposes no by-handle file index on Windows; the creation
    // time changes when the path is recreated, which is the event this
    // identity has to catch.
    #[cfg(windows)]
    pub fn of(meta: &Metadata) -> Self {
        use std::os::windows::fs::MetadataExt;
        Self {
            created: meta.creation_time(),
        }
    }
}

/// The open active-file handle plus the identity it was opened under.
#[derive(Debug)]
pub(crate) struct LogStream {
    pub file: File,
    pub id: FileId,
}

impl LogStream {
    pub fn metadata(&self) -> io::Result<Metadata> {
        self.file.metadata()
    }
}

/// Open the active file in append mode, creating it if absent. `truncate`
/// discards existing content first (the `write` open mode, first open only);
/// the handle still appends afterwards so writers sharing the file cannot
/// clobber each other's offsets.
pub(crate) fn open_stream(config: &WriterConfig, truncate: bool) -> io::Result<LogStream> {
    let existed = config.path.exists();

    #[cfg(unix)]
    let _umask = config.umask.map(UmaskGuard::set);
    let file = OpenOptions::new()
        .append(true)
        .create(true)
        .open(&config.path)?;
    if truncate {
        file.set_len(0)?;
    }

    if !existed {
        apply_created_file_attrs(config, &config.path)?;
    }

    let id = FileId::of(&file.metadata()?);
    Ok(LogStream { file, id })
}

/// Make `stream` point at the file currently reachable at the configured
/// path. A held handle whose identity no longer matches the path is stale
/// (another writer rotated the file) and is closed and replaced.
pub(crate) fn ensure_current<'a>(
    config: &WriterConfig,
    stream: &'a mut Option<LogStream>,
    truncate_pending: &mut bool,
) -> io::Result<&'a mut LogStream> {
    let on_disk = std::fs::metadata(&config.path)
        .ok()
        .map(|meta| FileId::of(&meta));
    let current = match stream.take() {
        Some(current) if on_disk == Some(current.id) => current,
        // Stale or never opened; the old handle (if any) closes here.
        _ => {
            let truncate = std::mem::take(truncate_pending);
            open_stream(config, truncate)?
        }
    };
    Ok(stream.insert(current))
}

/// Apply configured ownership and mode to a file this writer just created.
#[cfg(unix)]
pub(crate) fn apply_created_file_attrs(config: &WriterConfig, path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    if let Some((uid, gid)) = config.owner {
        std::os::unix::fs::chown(path, Some(uid), Some(gid))?;
    }
    if let Some(mode) = config.chmod {
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))?;
    }
    Ok(())
}

#[cfg(not(unix))]
pub(crate) fn apply_created_file_attrs(_config: &WriterConfig, _path: &Path) -> io::Result<()> {
    Ok(())
}

/// Scoped umask override; restores the previous mask on drop.
#[cfg(unix)]
struct UmaskGuard {
    previous: libc::mode_t,
}

#[cfg(unix)]
impl UmaskGuard {
    fn set(mask: u32) -> Self {
        let previous = unsafe { libc::umask(mask as libc::mode_t) };
        Self { previous }
    }
}

#[cfg(unix)]
impl Drop for UmaskGuard {
    fn drop(&mut self) {
        unsafe {
            libc::umask(self.previous);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_open_creates_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = WriterConfig::new(dir.path().join("app.log"));

        let stream = open_stream(&config, false).expect("open");
        assert!(config.path.exists());
        assert_eq!(stream.metadata().unwrap().len(), 0);
    }

    #[test]
    fn test_truncate_discards_existing_content() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = WriterConfig::new(dir.path().join("app.log"));
        std::fs::write(&config.path, b"old content\n").unwrap();

        let stream = open_stream(&config, true).expect("open");
        assert_eq!(stream.metadata().unwrap().len(), 0);
    }

    #[test]
    fn test_stale_handle_is_reopened() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = WriterConfig::new(dir.path().join("app.log"));

        let mut stream = Some(open_stream(&config, false).expect("open"));
        let original_id = stream.as_ref().unwrap().id;

        // Simulate a rotation by another writer: the path now names a
        // different file.
        std::fs::rename(&config.path, dir.path().join("app.log.1")).unwrap();
        std::fs::write(&config.path, b"").unwrap();

        let mut truncate_pending = false;
        let current = ensure_current(&config, &mut stream, &mut truncate_pending).expect("reopen");
        assert_ne!(current.id, original_id);
    }

    #[test]
    fn test_current_handle_is_kept() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = WriterConfig::new(dir.path().join("app.log"));

        let mut stream = Some(open_stream(&config, false).expect("open"));
        stream.as_mut().unwrap().file.write_all(b"line\n").unwrap();
        let original_id = stream.as_ref().unwrap().id;

        let mut truncate_pending = false;
        let current = ensure_current(&config, &mut stream, &mut truncate_pending).expect("keep");
        assert_eq!(current.id, original_id);
        assert_eq!(current.metadata().unwrap().len(), 5);
    }

    #[test]
    fn test_truncate_pending_consumed_once() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = WriterConfig::new(dir.path().join("app.log"));
        std::fs::write(&config.path, b"old\n").unwrap();

        let mut stream = None;
        let mut truncate_pending = true;
        {
            let current =
                ensure_current(&config, &mut stream, &mut truncate_pending).expect("open");
            assert_eq!(current.metadata().unwrap().len(), 0);
            current.file.write_all(b"new\n").unwrap();
        }
        assert!(!truncate_pending);

        // A reopen after rotation appends instead of truncating again.
        stream = None;
        let current = ensure_current(&config, &mut stream, &mut truncate_pending).expect("reopen");
        assert_eq!(current.metadata().unwrap().len(), 4);
    }

    #[cfg(unix)]
    #[test]
    fn test_chmod_applied_to_created_file() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().expect("tempdir");
        let config = WriterConfig::new(dir.path().join("app.log")).with_chmod(0o640);

        open_stream(&config, false).expect("open");
        let mode = std::fs::metadata(&config.path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o640);
    }
}

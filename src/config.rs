use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::encode::{Encoding, UnicodePolicy};
use crate::rotation::RolloverPolicy;
use crate::{Error, Result};

/// How the active file is opened the first time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OpenMode {
    /// Append to whatever is already in the file.
    #[default]
    Append,
    /// Truncate on the first open only. Reopens after a rotation, or after a
    /// stale handle is detected, always append.
    Write,
}

/// Callback mapping a default rotated file name to the name actually used.
///
/// The callback must be pure and deterministic: every writer sharing the
/// file derives the backup set from it on every rotation, and two writers
/// disagreeing about a name would corrupt the shift cascade. It must not
/// emit log records itself.
#[derive(Clone)]
pub struct Namer(Arc<dyn Fn(PathBuf) -> PathBuf + Send + Sync>);

impl Namer {
    pub fn new(namer: impl Fn(PathBuf) -> PathBuf + Send + Sync + 'static) -> Self {
        Self(Arc::new(namer))
    }

    pub(crate) fn apply(&self, default_name: PathBuf) -> PathBuf {
        (self.0)(default_name)
    }
}

impl fmt::Debug for Namer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Namer(..)")
    }
}

/// Configuration of one rotating writer. Immutable after construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriterConfig {
    /// Path of the active log file.
    pub path: PathBuf,
    /// How the file is opened the first time.
    #[serde(default)]
    pub mode: OpenMode,
    /// Number of rotated files to retain, named `path.1` (newest) through
    /// `path.N`. 0 discards rotated content instead of renaming it.
    #[serde(default)]
    pub backup_count: u32,
    /// Text encoding of records.
    #[serde(default)]
    pub encoding: Encoding,
    /// How unmappable characters are handled when encoding.
    #[serde(default)]
    pub unicode_error_policy: UnicodePolicy,
    /// Compress rotated files with gzip.
    #[serde(default)]
    pub use_gzip: bool,
    /// `(uid, gid)` applied to newly created files. Unix only.
    #[serde(default)]
    pub owner: Option<(u32, u32)>,
    /// File mode applied to newly created files. Unix only.
    #[serde(default)]
    pub chmod: Option<u32>,
    /// Process umask override while creating files. Unix only.
    #[serde(default)]
    pub umask: Option<u32>,
    /// Defer the first open to the first emit.
    #[serde(default)]
    pub delay: bool,
    /// Replacement for `\n` inside the record body. `None` or an empty
    /// string leaves the record untouched; anything else must match
    /// `terminator`.
    #[serde(default)]
    pub newline: Option<String>,
    /// Bytes appended after every record.
    #[serde(default = "default_terminator")]
    pub terminator: String,
    /// Directory for the lock sentinel when it must not live beside the log
    /// file, e.g. on a filesystem that does not support locking.
    #[serde(default)]
    pub lock_file_directory: Option<PathBuf>,
    /// Keep the file and lock handles open between emits. Disable on
    /// networked filesystems that misbehave when a held-open file is
    /// renamed.
    #[serde(default = "default_keep_file_open")]
    pub keep_file_open: bool,
    /// Override for rotated file names.
    #[serde(skip)]
    pub namer: Option<Namer>,
    /// When to roll the active file over.
    #[serde(default)]
    pub policy: RolloverPolicy,
}

impl WriterConfig {
    /// Create a configuration for `path` with defaults: append mode, no
    /// rotation, UTF-8, handles kept open.
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            mode: OpenMode::default(),
            backup_count: 0,
            encoding: Encoding::default(),
            unicode_error_policy: UnicodePolicy::default(),
            use_gzip: false,
            owner: None,
            chmod: None,
            umask: None,
            delay: false,
            newline: None,
            terminator: default_terminator(),
            lock_file_directory: None,
            keep_file_open: default_keep_file_open(),
            namer: None,
            policy: RolloverPolicy::default(),
        }
    }

    /// Set the open mode.
    pub fn with_mode(mut self, mode: OpenMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the number of rotated files to retain.
    pub fn with_backup_count(mut self, backup_count: u32) -> Self {
        self.backup_count = backup_count;
        self
    }

    /// Set the record encoding and its error policy.
    pub fn with_encoding(mut self, encoding: Encoding, policy: UnicodePolicy) -> Self {
        self.encoding = encoding;
        self.unicode_error_policy = policy;
        self
    }

    /// Compress rotated files.
    pub fn with_gzip(mut self, use_gzip: bool) -> Self {
        self.use_gzip = use_gzip;
        self
    }

    /// Set the owner applied to newly created files.
    pub fn with_owner(mut self, uid: u32, gid: u32) -> Self {
        self.owner = Some((uid, gid));
        self
    }

    /// Set the file mode applied to newly created files.
    pub fn with_chmod(mut self, mode: u32) -> Self {
        self.chmod = Some(mode);
        self
    }

    /// Set the umask override used while creating files.
    pub fn with_umask(mut self, umask: u32) -> Self {
        self.umask = Some(umask);
        self
    }

    /// Defer the first open to the first emit.
    pub fn with_delay(mut self, delay: bool) -> Self {
        self.delay = delay;
        self
    }

    /// Set the newline translation applied inside the record body.
    pub fn with_newline(mut self, newline: impl Into<String>) -> Self {
        self.newline = Some(newline.into());
        self
    }

    /// Set the record terminator.
    pub fn with_terminator(mut self, terminator: impl Into<String>) -> Self {
        self.terminator = terminator.into();
        self
    }

    /// Place the lock sentinel in a dedicated directory.
    pub fn with_lock_file_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.lock_file_directory = Some(dir.into());
        self
    }

    /// Keep or close the handles between emits.
    pub fn with_keep_file_open(mut self, keep: bool) -> Self {
        self.keep_file_open = keep;
        self
    }

    /// Set the rotated-file naming override.
    pub fn with_namer(mut self, namer: Namer) -> Self {
        self.namer = Some(namer);
        self
    }

    /// Set the rollover policy.
    pub fn with_policy(mut self, policy: RolloverPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Validate the configuration. Called once at writer construction; this
    /// is the only place [`Error::Config`] is raised.
    pub fn validate(&self) -> Result<()> {
        if self.path.file_name().is_none() {
            return Err(Error::Config(format!(
                "log path {} has no file name",
                self.path.display()
            )));
        }
        if let Some(newline) = &self.newline
            && !newline.is_empty()
            && *newline != self.terminator
        {
            return Err(Error::Config(format!(
                "conflicting newline {newline:?} and terminator {:?}",
                self.terminator
            )));
        }
        if let Some(dir) = &self.lock_file_directory
            && !dir.is_dir()
        {
            return Err(Error::Config(format!(
                "lock file directory {} does not exist",
                dir.display()
            )));
        }
        #[cfg(not(feature = "gzip"))]
        if self.use_gzip {
            return Err(Error::Config(
                "use_gzip requires the `gzip` feature".to_string(),
            ));
        }
        self.policy.validate()
    }
}

fn default_terminator() -> String {
    if cfg!(windows) { "\r\n" } else { "\n" }.to_string()
}

fn default_keep_file_open() -> bool {
    true
}

/// Configuration for the tracing integration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Enable console logging
    #[serde(default)]
    pub console: bool,
    /// Log level (e.g., "info", "debug")
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format ("text" or "json")
    #[serde(default = "default_format")]
    pub format: String,
    /// Show target/module in logs
    #[serde(default)]
    pub target: bool,
    /// Show thread IDs in logs
    #[serde(default)]
    pub thread_ids: bool,
    /// Show thread names in logs
    #[serde(default)]
    pub thread_names: bool,
    /// File logging configuration
    pub file: Option<WriterConfig>,
}

impl LogConfig {
    /// Create a new LogConfig with defaults
    pub fn new() -> Self {
        Self {
            console: false,
            level: default_log_level(),
            format: default_format(),
            target: false,
            thread_ids: false,
            thread_names: false,
            file: None,
        }
    }

    /// Enable console logging
    pub fn with_console(mut self, console: bool) -> Self {
        self.console = console;
        self
    }

    /// Set log level
    pub fn with_level(mut self, level: String) -> Self {
        self.level = level;
        self
    }

    /// Set log format
    pub fn with_format(mut self, format: String) -> Self {
        self.format = format;
        self
    }

    /// Show target/module in logs
    pub fn with_target(mut self, target: bool) -> Self {
        self.target = target;
        self
    }

    /// Show thread IDs in logs
    pub fn with_thread_ids(mut self, thread_ids: bool) -> Self {
        self.thread_ids = thread_ids;
        self
    }

    /// Show thread names in logs
    pub fn with_thread_names(mut self, thread_names: bool) -> Self {
        self.thread_names = thread_names;
        self
    }

    /// Set file logging configuration
    pub fn with_file(mut self, file: WriterConfig) -> Self {
        self.file = Some(file);
        self
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_format() -> String {
    "text".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_writer_config_defaults() {
        let config = WriterConfig::new("test.log");
        assert_eq!(config.path, PathBuf::from("test.log"));
        assert_eq!(config.mode, OpenMode::Append);
        assert_eq!(config.backup_count, 0);
        assert_eq!(config.encoding, Encoding::Utf8);
        assert_eq!(config.unicode_error_policy, UnicodePolicy::Ignore);
        assert!(!config.use_gzip);
        assert!(!config.delay);
        assert!(config.keep_file_open);
        assert_eq!(config.policy, RolloverPolicy::Never);
        #[cfg(not(windows))]
        assert_eq!(config.terminator, "\n");
    }

    #[test]
    fn test_writer_config_chaining() {
        let config = WriterConfig::new("app.log")
            .with_mode(OpenMode::Write)
            .with_backup_count(5)
            .with_gzip(true)
            .with_chmod(0o640)
            .with_keep_file_open(false)
            .with_policy(RolloverPolicy::size(1024));
        assert_eq!(config.mode, OpenMode::Write);
        assert_eq!(config.backup_count, 5);
        assert!(config.use_gzip);
        assert_eq!(config.chmod, Some(0o640));
        assert!(!config.keep_file_open);
        assert_eq!(config.policy, RolloverPolicy::size(1024));
    }

    #[test]
    fn test_validate_accepts_defaults() {
        assert!(WriterConfig::new("test.log").validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_conflicting_newline() {
        let config = WriterConfig::new("test.log")
            .with_terminator("\n")
            .with_newline("\r\n");
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_validate_accepts_matching_newline() {
        let config = WriterConfig::new("test.log")
            .with_terminator("\r\n")
            .with_newline("\r\n");
        assert!(config.validate().is_ok());

        let config = WriterConfig::new("test.log").with_newline("");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_missing_lock_directory() {
        let config =
            WriterConfig::new("test.log").with_lock_file_directory("/nonexistent/lock/dir");
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_namer_is_applied() {
        let namer = Namer::new(|default| {
            let mut name = default.into_os_string();
            name.push(".bak");
            PathBuf::from(name)
        });
        assert_eq!(
            namer.apply(PathBuf::from("app.log.1")),
            PathBuf::from("app.log.1.bak")
        );
    }

    #[test]
    fn test_log_config_defaults() {
        let config = LogConfig::new();
        assert!(!config.console);
        assert_eq!(config.level, "info");
        assert_eq!(config.format, "text");
        assert!(config.file.is_none());
    }

    #[test]
    fn test_log_config_with_file() {
        let config = LogConfig::new().with_file(WriterConfig::new("test.log"));
        assert!(config.file.is_some());
        assert_eq!(
            config.file.as_ref().unwrap().path,
            PathBuf::from("test.log")
        );
    }
}

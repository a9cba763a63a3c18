//! Builder pattern for configuring and opening a rotating writer.
//!
//! This module provides a convenient builder API for assembling a
//! [`WriterConfig`] and opening the writer in a single chain of calls.
//!
//! # Example
//!
//! ```rust,no_run
//! use sharedlog::{RolloverPolicy, WriterBuilder};
//!
//! let writer = WriterBuilder::new("/var/log/app.log")
//!     .with_policy(RolloverPolicy::size(10 * 1024 * 1024))
//!     .with_backup_count(5)
//!     .with_gzip(true)
//!     .open()
//!     .expect("failed to open log writer");
//!
//! writer.emit("service started").expect("emit failed");
//! ```

use std::path::PathBuf;

use crate::Result;
use crate::config::{Namer, OpenMode, WriterConfig};
use crate::encode::{Encoding, UnicodePolicy};
use crate::rotation::RolloverPolicy;
use crate::writer::RotatingWriter;

/// A builder for configuring and opening a [`RotatingWriter`].
#[derive(Debug, Clone)]
pub struct WriterBuilder {
    config: WriterConfig,
}

impl WriterBuilder {
    /// Create a builder for the given log file path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            config: WriterConfig::new(path),
        }
    }

    /// Create a builder from an existing configuration.
    pub fn from_config(config: WriterConfig) -> Self {
        Self { config }
    }

    /// Set the first-open mode.
    pub fn with_mode(mut self, mode: OpenMode) -> Self {
        self.config = self.config.with_mode(mode);
        self
    }

    /// Set the rollover policy.
    pub fn with_policy(mut self, policy: RolloverPolicy) -> Self {
        self.config = self.config.with_policy(policy);
        self
    }

    /// Set the number of rotated files to retain.
    pub fn with_backup_count(mut self, backup_count: u32) -> Self {
        self.config = self.config.with_backup_count(backup_count);
        self
    }

    /// Compress rotated files.
    pub fn with_gzip(mut self, use_gzip: bool) -> Self {
        self.config = self.config.with_gzip(use_gzip);
        self
    }

    /// Set the record encoding and its error policy.
    pub fn with_encoding(mut self, encoding: Encoding, policy: UnicodePolicy) -> Self {
        self.config = self.config.with_encoding(encoding, policy);
        self
    }

    /// Set the owner applied to newly created files.
    pub fn with_owner(mut self, uid: u32, gid: u32) -> Self {
        self.config = self.config.with_owner(uid, gid);
        self
    }

    /// Set the file mode applied to newly created files.
    pub fn with_chmod(mut self, mode: u32) -> Self {
        self.config = self.config.with_chmod(mode);
        self
    }

    /// Set the umask override used while creating files.
    pub fn with_umask(mut self, umask: u32) -> Self {
        self.config = self.config.with_umask(umask);
        self
    }

    /// Defer the first open to the first emit.
    pub fn with_delay(mut self, delay: bool) -> Self {
        self.config = self.config.with_delay(delay);
        self
    }

    /// Set the record terminator.
    pub fn with_terminator(mut self, terminator: impl Into<String>) -> Self {
        self.config = self.config.with_terminator(terminator);
        self
    }

    /// Set the newline translation applied inside the record body.
    pub fn with_newline(mut self, newline: impl Into<String>) -> Self {
        self.config = self.config.with_newline(newline);
        self
    }

    /// Place the lock sentinel in a dedicated directory.
    pub fn with_lock_file_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config = self.config.with_lock_file_directory(dir);
        self
    }

    /// Keep or close the handles between emits.
    pub fn with_keep_file_open(mut self, keep: bool) -> Self {
        self.config = self.config.with_keep_file_open(keep);
        self
    }

    /// Set the rotated-file naming override.
    pub fn with_namer(mut self, namer: Namer) -> Self {
        self.config = self.config.with_namer(namer);
        self
    }

    /// Get the configuration without opening a writer.
    pub fn build(self) -> WriterConfig {
        self.config
    }

    /// Open the writer with the configured settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the file cannot
    /// be created.
    pub fn open(self) -> Result<RotatingWriter> {
        RotatingWriter::new(self.config)
    }
}

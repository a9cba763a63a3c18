//! # Sharedlog
//!
//! A multi-process-safe rotating log file writer.
//!
//! Any number of cooperating processes (and threads within them) can append
//! records to a single log file. Every emit takes an exclusive lock on an
//! on-disk sentinel file, so records never interleave and rotation happens
//! at most once per threshold crossing, no matter how many writers race it.
//! A writer holding a handle that another process has rotated away detects
//! the stale handle by file identity and transparently reopens.
//!
//! ## Features
//!
//! - Size-based, time-based, and combined rollover policies
//! - Numbered backups (`app.log.1` newest), optionally gzip-compressed
//! - Inter-process exclusion via an advisory (POSIX) or mandatory (Windows)
//!   file lock on a sentinel file
//! - Record preservation over size limits: the record that crosses the
//!   threshold is always written in full
//! - Integration with the `tracing` ecosystem
//!
//! ## Example
//!
//! ```rust,no_run
//! use sharedlog::{RolloverPolicy, WriterBuilder};
//!
//! let writer = WriterBuilder::new("logs/app.log")
//!     .with_policy(RolloverPolicy::size(10 * 1024 * 1024))
//!     .with_backup_count(5)
//!     .open()?;
//!
//! writer.emit("service started")?;
//! # Ok::<(), sharedlog::Error>(())
//! ```
//!
//! Writers are per-process: construct one in each process that shares the
//! file. The lock sentinel on disk is the only cross-process state.

pub mod builder;
pub mod config;
pub mod encode;
pub mod error;
pub mod lock;
pub mod rotation;
pub mod writer;

mod handle;

#[cfg(feature = "tracing-integration")]
pub mod tracing_init;

pub use builder::WriterBuilder;
pub use config::{LogConfig, Namer, OpenMode, WriterConfig};
pub use encode::{Encoding, UnicodePolicy};
pub use error::{Error, Result};
pub use rotation::{RolloverPolicy, RolloverUnit, Schedule};
pub use writer::RotatingWriter;

#[cfg(feature = "tracing-integration")]
pub use tracing_init::{WriterHandle, init_logging};

/// Start building a writer for `path`.
pub fn builder(path: impl Into<std::path::PathBuf>) -> WriterBuilder {
    WriterBuilder::new(path)
}

use thiserror::Error as ThisError;

/// Errors that can occur while configuring or driving a writer
#[derive(ThisError, Debug)]
pub enum Error {
    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Configuration is invalid. Raised at construction time only.
    #[error("Configuration error: {0}")]
    Config(String),
    /// The rename/shift/compress cascade failed. The handles are closed and
    /// will be reopened on the next emit; the record itself has still been
    /// written where possible.
    #[error("Rotation error: {0}")]
    Rotation(#[source] std::io::Error),
    /// A character in the record is not representable in the configured
    /// encoding and the policy is strict.
    #[error("Encoding error: {ch:?} is not representable in {encoding}")]
    Encoding { encoding: &'static str, ch: char },
    /// Non-blocking acquisition found the sentinel locked by another writer.
    #[error("Lock is held by another writer")]
    LockAcquisitionFailed,
    /// Emit was re-entered on the same thread while the writer state was in
    /// use, e.g. from a namer callback that logs.
    #[error("Reentrant emit while the writer state is in use")]
    ReentrantEmit,
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

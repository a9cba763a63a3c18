use std::borrow::Cow;
use std::cell::RefCell;
use std::io::{self, Write};
use std::process;

use parking_lot::ReentrantMutex;

use crate::config::{OpenMode, WriterConfig};
use crate::encode;
use crate::handle::{self, LogStream};
use crate::lock::SentinelLock;
use crate::rotation::{self, PolicyState};
use crate::{Error, Result};

/// Multi-process-safe rotating writer for one log file.
///
/// Every emit runs the full protocol: take the in-process lock, take the
/// inter-process lock on the sentinel file, validate the held handle against
/// the on-disk identity, consult the rollover policy, rotate if due, write
/// the record and terminator, flush, release. Records from cooperating
/// writers never interleave, and rotation happens at most once per
/// threshold crossing no matter how many writers race it.
///
/// A writer is per-process state: construct one in each process (sharing a
/// configuration), never move one across a process boundary. Threads within
/// a process share a single instance; the in-process mutex serializes them
/// for the duration of the protocol.
pub struct RotatingWriter {
    config: WriterConfig,
    inner: ReentrantMutex<RefCell<Inner>>,
}

struct Inner {
    stream: Option<LogStream>,
    lock: Option<SentinelLock>,
    policy: PolicyState,
    truncate_pending: bool,
}

impl RotatingWriter {
    /// Create a writer for `config.path`, creating the parent directory if
    /// necessary. Unless `delay` is set, the active file is opened (and
    /// created) immediately; the sentinel is opened lazily on first emit.
    pub fn new(config: WriterConfig) -> Result<Self> {
        config.validate()?;

        if let Some(parent) = config.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let mut truncate_pending = config.mode == OpenMode::Write;
        let mut stream = None;
        if !config.delay {
            let truncate = std::mem::take(&mut truncate_pending);
            stream = Some(handle::open_stream(&config, truncate)?);
        }
        let policy = PolicyState::new(&config);

        Ok(Self {
            config,
            inner: ReentrantMutex::new(RefCell::new(Inner {
                stream,
                lock: None,
                policy,
                truncate_pending,
            })),
        })
    }

    /// The configuration this writer was built with.
    pub fn config(&self) -> &WriterConfig {
        &self.config
    }

    /// Append one text record followed by the configured terminator.
    ///
    /// Newline translation and encoding happen before any lock is taken, so
    /// a strict-policy encoding failure costs nothing but the record. A
    /// failed rotation still writes the record to a re-opened active file
    /// and then reports [`Error::Rotation`]: records are preserved at all
    /// cost, the size ceiling is not.
    pub fn emit(&self, record: &str) -> Result<()> {
        let translated = self.translate_newlines(record);
        let payload = encode::encode_record(
            &translated,
            self.config.encoding,
            self.config.unicode_error_policy,
        )?;
        self.write_locked(&payload, true)
    }

    /// Append one pre-encoded record. No terminator is appended; the caller
    /// owns the framing. This is the path the [`io::Write`] impl uses.
    pub fn emit_bytes(&self, record: &[u8]) -> Result<()> {
        self.write_locked(record, false)
    }

    /// Flush the held handle to the OS, if one is open. An `fsync`-class
    /// durability guarantee is not promised.
    pub fn flush(&self) -> Result<()> {
        let outer = self.inner.lock();
        let mut inner = outer.try_borrow_mut().map_err(|_| Error::ReentrantEmit)?;
        if let Some(stream) = &mut inner.stream {
            stream.file.flush()?;
        }
        Ok(())
    }

    /// Close both handles. The sentinel file stays on disk: it is shared
    /// infrastructure for every cooperating writer. The writer remains
    /// usable; the next emit reopens what it needs.
    pub fn close(&self) {
        let outer = self.inner.lock();
        if let Ok(mut inner) = outer.try_borrow_mut() {
            if let Some(stream) = &mut inner.stream {
                let _ = stream.file.flush();
            }
            inner.stream = None;
            inner.lock = None;
        }
    }

    fn translate_newlines<'a>(&self, record: &'a str) -> Cow<'a, str> {
        match &self.config.newline {
            Some(newline) if !newline.is_empty() && newline != "\n" => {
                Cow::Owned(record.replace('\n', newline))
            }
            _ => Cow::Borrowed(record),
        }
    }

    fn write_locked(&self, payload: &[u8], with_terminator: bool) -> Result<()> {
        let outer = self.inner.lock();
        let mut inner = outer.try_borrow_mut().map_err(|_| Error::ReentrantEmit)?;
        let inner = &mut *inner;

        let mut lock = match inner.lock.take() {
            Some(lock) => {
                if lock.pid() == process::id() {
                    lock
                } else {
                    // Forked child: the inherited descriptor does not carry
                    // lock ownership. Start over with fresh handles.
                    inner.stream = None;
                    drop(lock);
                    SentinelLock::open(&self.config)?
                }
            }
            None => SentinelLock::open(&self.config)?,
        };

        let result = self.emit_under_lock(
            &mut lock,
            &mut inner.stream,
            &mut inner.policy,
            &mut inner.truncate_pending,
            payload,
            with_terminator,
        );

        if self.config.keep_file_open {
            inner.lock = Some(lock);
        }
        // Otherwise the sentinel handle closes here, after the lock has been
        // released, the same way teardown unlocks before closing the lock
        // file.
        result
    }

    /// Steps 1 through 7 of the emit protocol. The OS lock guard lives for
    /// the whole body, so every early return releases it, and the release
    /// (step 8) is the last action: with `keep_file_open` off, the active
    /// handle is closed while the lock is still held. A handle left open
    /// past the release would let the next locker rename the path out from
    /// underneath it.
    fn emit_under_lock(
        &self,
        lock: &mut SentinelLock,
        stream_slot: &mut Option<LogStream>,
        policy: &mut PolicyState,
        truncate_pending: &mut bool,
        payload: &[u8],
        with_terminator: bool,
    ) -> Result<()> {
        let _held = lock.acquire()?;

        let result =
            self.write_and_maybe_rotate(stream_slot, policy, truncate_pending, payload, with_terminator);

        if !self.config.keep_file_open {
            *stream_slot = None;
        }

        result
    }

    /// Steps 2 through 6: validate the handle, consult the policy, rotate
    /// if due, write and flush. The caller holds the inter-process lock.
    fn write_and_maybe_rotate(
        &self,
        stream_slot: &mut Option<LogStream>,
        policy: &mut PolicyState,
        truncate_pending: &mut bool,
        payload: &[u8],
        with_terminator: bool,
    ) -> Result<()> {
        let terminator: &[u8] = if with_terminator {
            self.config.terminator.as_bytes()
        } else {
            b""
        };
        let incoming = (payload.len() + terminator.len()) as u64;

        let rollover_due = {
            let stream = handle::ensure_current(&self.config, stream_slot, truncate_pending)?;
            let meta = stream.metadata()?;
            policy.should_rollover(&self.config, meta.len(), meta.modified().ok(), incoming)
        };

        let mut rotation_error = None;
        if rollover_due {
            // The handle must be closed before the rename; Windows refuses
            // to rename open files.
            *stream_slot = None;
            match rotation::perform_rollover(&self.config) {
                Ok(()) => policy.advance(&self.config),
                Err(err) => rotation_error = Some(Error::Rotation(err)),
            }
        }

        // Reopen after the rotation, successful or not, and write: the
        // record goes to disk either way.
        let stream = handle::ensure_current(&self.config, stream_slot, truncate_pending)?;
        stream.file.write_all(payload)?;
        if !terminator.is_empty() {
            stream.file.write_all(terminator)?;
        }
        stream.file.flush()?;

        match rotation_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl Write for RotatingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.emit_bytes(buf).map_err(io::Error::other)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        RotatingWriter::flush(self).map_err(io::Error::other)
    }
}

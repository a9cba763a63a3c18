use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime, Time, Weekday};

use crate::config::WriterConfig;
use crate::{Error, Result};

/// Rollover policy for the active file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RolloverPolicy {
    /// Never roll over.
    #[default]
    Never,
    /// Roll over when the next record would push the file past `max_bytes`.
    /// 0 disables the check. The record that crosses the threshold is still
    /// written in full, so the final file may exceed `max_bytes`.
    Size { max_bytes: u64 },
    /// Roll over at schedule boundaries.
    Timed { schedule: Schedule },
    /// Roll over at schedule boundaries or when the size threshold is
    /// crossed, whichever comes first.
    Both { schedule: Schedule, max_bytes: u64 },
}

impl RolloverPolicy {
    /// Create a size-based policy.
    pub fn size(max_bytes: u64) -> Self {
        Self::Size { max_bytes }
    }

    /// Create a time-based policy.
    pub fn timed(schedule: Schedule) -> Self {
        Self::Timed { schedule }
    }

    /// Create a combined time-and-size policy.
    pub fn both(schedule: Schedule, max_bytes: u64) -> Self {
        Self::Both { schedule, max_bytes }
    }

    /// The size threshold, 0 when no size component is configured.
    pub fn max_bytes(&self) -> u64 {
        match self {
            Self::Never | Self::Timed { .. } => 0,
            Self::Size { max_bytes } | Self::Both { max_bytes, .. } => *max_bytes,
        }
    }

    /// The schedule, when a time component is configured.
    pub fn schedule(&self) -> Option<&Schedule> {
        match self {
            Self::Never | Self::Size { .. } => None,
            Self::Timed { schedule } | Self::Both { schedule, .. } => Some(schedule),
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        match self.schedule() {
            Some(schedule) => schedule.validate(),
            None => Ok(()),
        }
    }
}

/// Unit of a time-based rollover boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RolloverUnit {
    /// Every `interval` seconds.
    Seconds,
    /// Every `interval` minutes.
    Minutes,
    /// Every `interval` hours.
    Hours,
    /// Every `interval` days.
    Days,
    /// Weekly on the given day, 0 = Monday through 6 = Sunday.
    Weekday(u8),
    /// Daily at the configured wall-clock time (00:00 by default).
    Midnight,
}

impl FromStr for RolloverUnit {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let upper = s.to_ascii_uppercase();
        match upper.as_str() {
            "S" => Ok(Self::Seconds),
            "M" => Ok(Self::Minutes),
            "H" => Ok(Self::Hours),
            "D" => Ok(Self::Days),
            "MIDNIGHT" => Ok(Self::Midnight),
            _ => {
                if let Some(day) = upper.strip_prefix('W')
                    && let Ok(day) = day.parse::<u8>()
                    && day <= 6
                {
                    return Ok(Self::Weekday(day));
                }
                Err(Error::Config(format!("unknown rollover unit {s:?}")))
            }
        }
    }
}

/// When time-based rollovers happen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    /// Boundary unit.
    pub when: RolloverUnit,
    /// Multiplier for the interval units; ignored for `Weekday` and
    /// `Midnight`, which anchor on the wall clock.
    #[serde(default = "default_interval")]
    pub interval: u32,
    /// Anchor wall-clock boundaries on UTC instead of local time.
    #[serde(default)]
    pub utc: bool,
    /// Time of day for `Weekday` and `Midnight` boundaries.
    #[serde(default)]
    pub at_time: Option<Time>,
}

impl Schedule {
    /// Create a schedule for the given unit with an interval of 1, local
    /// time, boundaries at midnight.
    pub fn new(when: RolloverUnit) -> Self {
        Self {
            when,
            interval: default_interval(),
            utc: false,
            at_time: None,
        }
    }

    /// Set the interval multiplier.
    pub fn with_interval(mut self, interval: u32) -> Self {
        self.interval = interval;
        self
    }

    /// Anchor wall-clock boundaries on UTC.
    pub fn with_utc(mut self, utc: bool) -> Self {
        self.utc = utc;
        self
    }

    /// Set the time of day for wall-clock boundaries.
    pub fn with_at_time(mut self, at_time: Time) -> Self {
        self.at_time = Some(at_time);
        self
    }

    fn validate(&self) -> Result<()> {
        if self.interval == 0 {
            return Err(Error::Config("rollover interval must be positive".into()));
        }
        if let RolloverUnit::Weekday(day) = self.when
            && day > 6
        {
            return Err(Error::Config(format!(
                "weekday must be 0 (Monday) through 6 (Sunday), got {day}"
            )));
        }
        Ok(())
    }

    /// Current time in the schedule's reference clock.
    pub(crate) fn now(&self) -> OffsetDateTime {
        if self.utc {
            OffsetDateTime::now_utc()
        } else {
            OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
        }
    }

    /// The next boundary strictly after `base`.
    pub fn next_rollover(&self, base: OffsetDateTime) -> OffsetDateTime {
        match self.when {
            RolloverUnit::Seconds => base + Duration::seconds(self.interval as i64),
            RolloverUnit::Minutes => base + Duration::minutes(self.interval as i64),
            RolloverUnit::Hours => base + Duration::hours(self.interval as i64),
            RolloverUnit::Days => base + Duration::days(self.interval as i64),
            RolloverUnit::Midnight => self.next_wall_clock(base, None),
            RolloverUnit::Weekday(day) => self.next_wall_clock(base, Some(weekday(day))),
        }
    }

    fn next_wall_clock(&self, base: OffsetDateTime, day: Option<Weekday>) -> OffsetDateTime {
        let at = self.at_time.unwrap_or(Time::MIDNIGHT);
        // Evaluate the boundary in the schedule's reference clock, comparing
        // as absolute instants.
        let mut candidate = base.to_offset(self.now().offset()).replace_time(at);
        while candidate <= base || day.is_some_and(|d| candidate.date().weekday() != d) {
            candidate += Duration::days(1);
        }
        candidate
    }
}

fn default_interval() -> u32 {
    1
}

fn weekday(day: u8) -> Weekday {
    match day {
        0 => Weekday::Monday,
        1 => Weekday::Tuesday,
        2 => Weekday::Wednesday,
        3 => Weekday::Thursday,
        4 => Weekday::Friday,
        5 => Weekday::Saturday,
        _ => Weekday::Sunday,
    }
}

/// Per-writer rollover state.
///
/// The next-boundary timestamp is process-local; coordination with other
/// writers happens through the re-check under the lock.
#[derive(Debug)]
pub(crate) struct PolicyState {
    next_rollover_at: Option<OffsetDateTime>,
}

impl PolicyState {
    /// Anchor the boundary chain. An existing file anchors on its mtime so
    /// that restarts keep the schedule instead of resetting it.
    pub fn new(config: &WriterConfig) -> Self {
        let next_rollover_at = config.policy.schedule().map(|schedule| {
            let base = std::fs::metadata(&config.path)
                .and_then(|meta| meta.modified())
                .map(OffsetDateTime::from)
                .unwrap_or_else(|_| schedule.now());
            schedule.next_rollover(base)
        });
        Self { next_rollover_at }
    }

    /// Decide, with the inter-process lock held, whether this writer must
    /// perform a rollover before writing `incoming` more bytes.
    ///
    /// `file_len` and `file_mtime` describe the validated active handle. The
    /// size check goes through the live metadata, never an accumulator, so
    /// it stays correct across external file replacement.
    pub fn should_rollover(
        &mut self,
        config: &WriterConfig,
        file_len: u64,
        file_mtime: Option<SystemTime>,
        incoming: u64,
    ) -> bool {
        let max_bytes = config.policy.max_bytes();
        if max_bytes > 0 && file_len + incoming > max_bytes {
            return true;
        }

        let (Some(schedule), Some(next_at)) =
            (config.policy.schedule(), self.next_rollover_at.as_mut())
        else {
            return false;
        };
        let now = schedule.now();
        if now < *next_at {
            return false;
        }
        if let Some(mtime) = file_mtime {
            let mtime = OffsetDateTime::from(mtime);
            if mtime >= *next_at {
                // The file was written at or past our recorded boundary:
                // another writer already rotated while we waited on the
                // lock. Re-anchor on the observed state and only rotate if a
                // later boundary has also been crossed.
                *next_at = schedule.next_rollover(mtime);
                return now >= *next_at;
            }
        }
        true
    }

    /// Advance past a rollover that just completed.
    pub fn advance(&mut self, config: &WriterConfig) {
        if let Some(schedule) = config.policy.schedule() {
            self.next_rollover_at = Some(schedule.next_rollover(schedule.now()));
        }
    }
}

/// Perform the rename/shift/compress cascade.
///
/// The caller holds the inter-process lock and has already closed the
/// active handle (Windows refuses to rename open files). Reopening the
/// fresh active file is also the caller's job.
pub(crate) fn perform_rollover(config: &WriterConfig) -> io::Result<()> {
    if config.backup_count == 0 {
        // Nothing is retained; the rotated content is discarded outright.
        return match std::fs::remove_file(&config.path) {
            Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err),
            _ => Ok(()),
        };
    }

    // The oldest backup falls off before anything shifts into its slot.
    remove_backup(&rotated_name(config, config.backup_count))?;

    for index in (1..config.backup_count).rev() {
        shift_backup(&rotated_name(config, index), &rotated_name(config, index + 1))?;
    }

    let first = rotated_name(config, 1);
    match std::fs::rename(&config.path, &first) {
        Ok(()) => {
            #[cfg(feature = "gzip")]
            if config.use_gzip {
                compress_backup(config, &first);
            }
        }
        // The active file can legitimately be gone here: a racing writer
        // rotated it away and the re-check still found a rollover due.
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => return Err(err),
    }
    Ok(())
}

/// Default rotated name for 1-based age rank `index`, with the namer
/// override applied. The `.gz` suffix is appended after the namer runs.
pub(crate) fn rotated_name(config: &WriterConfig, index: u32) -> PathBuf {
    let default_name = PathBuf::from(format!("{}.{index}", config.path.display()));
    match &config.namer {
        Some(namer) => namer.apply(default_name),
        None => default_name,
    }
}

fn gz_name(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".gz");
    PathBuf::from(name)
}

fn remove_backup(path: &Path) -> io::Result<()> {
    for victim in [path.to_path_buf(), gz_name(path)] {
        match std::fs::remove_file(&victim) {
            Err(err) if err.kind() != io::ErrorKind::NotFound => return Err(err),
            _ => {}
        }
    }
    Ok(())
}

/// Move one backup slot up an index. The compressed variant wins when both
/// exist; a plain file can be left behind by a failed compression.
fn shift_backup(source: &Path, dest: &Path) -> io::Result<()> {
    let source_gz = gz_name(source);
    if source_gz.exists() {
        remove_backup(dest)?;
        std::fs::rename(&source_gz, gz_name(dest))?;
    } else if source.exists() {
        remove_backup(dest)?;
        std::fs::rename(source, dest)?;
    }
    Ok(())
}

/// Compress a freshly promoted backup in place. Best effort: on failure the
/// uncompressed file stays behind as evidence and the rotation still counts.
#[cfg(feature = "gzip")]
fn compress_backup(config: &WriterConfig, path: &Path) {
    if let Err(err) = compress_file(config, path) {
        tracing::warn!(path = %path.display(), error = %err, "compressing rotated file failed");
    }
}

#[cfg(feature = "gzip")]
fn compress_file(config: &WriterConfig, path: &Path) -> io::Result<()> {
    use std::io::{BufReader, BufWriter, Write};

    use flate2::Compression;
    use flate2::write::GzEncoder;

    let target = gz_name(path);
    let mut reader = BufReader::new(std::fs::File::open(path)?);
    let writer = BufWriter::new(std::fs::File::create(&target)?);
    let mut encoder = GzEncoder::new(writer, Compression::default());
    io::copy(&mut reader, &mut encoder)?;
    let mut writer = encoder.finish()?;
    writer.flush()?;
    crate::handle::apply_created_file_attrs(config, &target)?;
    std::fs::remove_file(path)?;
    Ok(())
}

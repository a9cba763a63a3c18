//! Integration with the `tracing` ecosystem.
//!
//! [`WriterHandle`] adapts a [`RotatingWriter`] to
//! `tracing_subscriber`'s `MakeWriter`, so every formatted event runs the
//! full emit-under-lock protocol. There is no background queue: the event is
//! durable (to the OS) when the tracing macro returns.

use std::io::{self, Write};
use std::sync::Arc;

use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LogConfig;
use crate::writer::RotatingWriter;
use crate::{Error, Result};

/// Cloneable handle routing `tracing` output through a shared
/// [`RotatingWriter`], one event per record.
#[derive(Clone)]
pub struct WriterHandle(Arc<RotatingWriter>);

impl WriterHandle {
    pub fn new(writer: RotatingWriter) -> Self {
        Self(Arc::new(writer))
    }

    /// The underlying writer.
    pub fn writer(&self) -> &RotatingWriter {
        &self.0
    }
}

impl Write for WriterHandle {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.emit_bytes(buf).map_err(io::Error::other)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush().map_err(io::Error::other)
    }
}

impl<'a> MakeWriter<'a> for WriterHandle {
    type Writer = WriterHandle;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Initialize global logging with the given configuration and optional CLI
/// verbosity override.
pub fn init_logging(config: &LogConfig, cli_verbose: Option<u8>) -> Result<()> {
    let log_spec = effective_log_spec(config, cli_verbose);
    let env_filter = EnvFilter::try_new(&log_spec).map_err(|e| Error::Config(e.to_string()))?;

    match (config.console, config.file.as_ref()) {
        (true, Some(file_config)) => init_console_and_file(config, file_config, env_filter),
        (true, None) => init_console_only(config, env_filter),
        (false, Some(file_config)) => init_file_only(config, file_config, env_filter),
        (false, None) => init_no_logging(env_filter),
    }
}

/// Initialize console and file logging.
fn init_console_and_file(
    config: &LogConfig,
    file_config: &crate::config::WriterConfig,
    env_filter: EnvFilter,
) -> Result<()> {
    let fmt_layer_builder = tracing_subscriber::fmt::layer()
        .with_target(config.target)
        .with_thread_ids(config.thread_ids)
        .with_thread_names(config.thread_names);

    let fmt_layer = if config.format == "json" {
        fmt_layer_builder.json().boxed()
    } else {
        fmt_layer_builder.boxed()
    };

    let handle = WriterHandle::new(RotatingWriter::new(file_config.clone())?);
    let file_layer_builder = tracing_subscriber::fmt::layer()
        .with_writer(handle)
        .with_ansi(false);

    let file_layer = if config.format == "json" {
        file_layer_builder.json().boxed()
    } else {
        file_layer_builder.boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| Error::Config(e.to_string()))?;

    Ok(())
}

/// Initialize console-only logging.
fn init_console_only(config: &LogConfig, env_filter: EnvFilter) -> Result<()> {
    let fmt_layer_builder = tracing_subscriber::fmt::layer()
        .with_target(config.target)
        .with_thread_ids(config.thread_ids)
        .with_thread_names(config.thread_names);

    let fmt_layer = if config.format == "json" {
        fmt_layer_builder.json().boxed()
    } else {
        fmt_layer_builder.boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| Error::Config(e.to_string()))?;

    Ok(())
}

/// Initialize file-only logging.
fn init_file_only(
    config: &LogConfig,
    file_config: &crate::config::WriterConfig,
    env_filter: EnvFilter,
) -> Result<()> {
    let handle = WriterHandle::new(RotatingWriter::new(file_config.clone())?);
    let file_layer_builder = tracing_subscriber::fmt::layer()
        .with_writer(handle)
        .with_ansi(false);

    let file_layer = if config.format == "json" {
        file_layer_builder.json().boxed()
    } else {
        file_layer_builder.boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .try_init()
        .map_err(|e| Error::Config(e.to_string()))?;

    Ok(())
}

/// Initialize with no output (for testing or when logging is disabled).
fn init_no_logging(env_filter: EnvFilter) -> Result<()> {
    tracing_subscriber::registry()
        .with(env_filter)
        .try_init()
        .map_err(|e| Error::Config(e.to_string()))?;

    Ok(())
}

/// Determine the effective log specification, considering config and CLI overrides.
fn effective_log_spec(config: &LogConfig, cli_verbose: Option<u8>) -> String {
    // RUST_LOG takes precedence over everything
    if let Ok(rust_log) = std::env::var("RUST_LOG")
        && !rust_log.is_empty()
    {
        return rust_log;
    }

    // CLI verbose flag overrides config level
    if let Some(verbose) = cli_verbose {
        return match verbose {
            0 => config.level.clone(),
            1 => "debug".to_string(),
            _ => "trace".to_string(),
        };
    }

    if config.level.is_empty() {
        "info".to_string()
    } else {
        config.level.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogConfig;

    #[test]
    fn rust_log_overrides_config_level() {
        let prev = std::env::var_os("RUST_LOG");
        unsafe {
            std::env::set_var("RUST_LOG", "trace");
        }
        let cfg = LogConfig {
            level: "info".to_string(),
            ..Default::default()
        };

        assert_eq!(effective_log_spec(&cfg, None), "trace");

        unsafe {
            match prev {
                Some(v) => std::env::set_var("RUST_LOG", v),
                None => std::env::remove_var("RUST_LOG"),
            }
        }
    }

    #[test]
    fn cfg_level_used_when_no_rust_log() {
        let prev = std::env::var("RUST_LOG").ok();
        unsafe {
            std::env::set_var("RUST_LOG", "");
        }
        let cfg = LogConfig {
            level: "warn".to_string(),
            ..Default::default()
        };

        assert_eq!(effective_log_spec(&cfg, None), "warn");
        assert_eq!(effective_log_spec(&cfg, Some(0)), "warn");
        assert_eq!(effective_log_spec(&cfg, Some(1)), "debug");
        assert_eq!(effective_log_spec(&cfg, Some(3)), "trace");

        unsafe {
            if let Some(v) = prev {
                std::env::set_var("RUST_LOG", v);
            }
        }
    }

    #[test]
    fn test_effective_log_spec_with_empty_config_level() {
        let cfg = LogConfig {
            level: "".to_string(),
            ..Default::default()
        };
        assert_eq!(effective_log_spec(&cfg, None), "info");
    }

    #[test]
    fn init_logging_succeeds_with_defaults() {
        let cfg = LogConfig::default();
        // This may fail if logging is already initialized, but should not panic
        let _ = init_logging(&cfg, None);
    }

    #[test]
    fn test_init_logging_file_only() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg = LogConfig {
            console: false,
            file: Some(crate::config::WriterConfig::new(dir.path().join("app.log"))),
            ..Default::default()
        };
        let result = init_logging(&cfg, None);
        // May fail if already initialized, but shouldn't panic
        assert!(result.is_ok() || result.is_err());
    }
}

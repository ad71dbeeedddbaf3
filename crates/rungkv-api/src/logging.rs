//! Logging configuration for RungKV
//!
//! The engine reports opens, ratchet steps, marker moves, flushes and
//! compactions through `tracing`. This module installs a subscriber for
//! applications that don't bring their own.

use rungkv_core::{Error, Result};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log output destination
#[derive(Debug, Clone)]
pub enum LogOutput {
    /// Output to stdout
    Stdout,
    /// Output to a daily-rotated file
    File(PathBuf),
    /// Output to both stdout and file
    Both(PathBuf),
    /// Output captured by the test harness
    Test,
}

/// Log format style
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable multi-line format
    Pretty,
    /// Compact single-line format
    Compact,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Filter directive, e.g. `info` or `rungkv_storage=debug`.
    /// `RUST_LOG` takes precedence when set.
    pub level: String,
    /// Output destination
    pub output: LogOutput,
    /// Format style
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            output: LogOutput::Stdout,
            format: LogFormat::Pretty,
        }
    }
}

impl LogConfig {
    /// Info level to stdout
    pub fn info() -> Self {
        Self::default()
    }

    /// Debug level to stdout; shows every migration step
    pub fn debug() -> Self {
        Self {
            level: "debug".to_string(),
            ..Default::default()
        }
    }

    /// Warn level to stdout
    pub fn warn() -> Self {
        Self {
            level: "warn".to_string(),
            ..Default::default()
        }
    }

    /// Debug level, compact lines, captured by `cargo test`
    pub fn for_tests() -> Self {
        Self {
            level: "debug".to_string(),
            output: LogOutput::Test,
            format: LogFormat::Compact,
        }
    }

    /// Set log output to a rotated file
    pub fn with_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.output = LogOutput::File(path.into());
        self
    }

    /// Set log output to both stdout and a rotated file
    pub fn with_both<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.output = LogOutput::Both(path.into());
        self
    }

    /// Set log format
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Set log level filter
    pub fn with_level<S: Into<String>>(mut self, level: S) -> Self {
        self.level = level.into();
        self
    }

    fn env_filter(&self) -> Result<EnvFilter> {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&self.level))
            .map_err(|e| Error::InvalidOperation(format!("invalid log filter: {}", e)))
    }

    /// Install this configuration as the global subscriber.
    ///
    /// Returns the file writer's guard when logging to a file; keep it alive
    /// or buffered lines are lost. Fails if the filter does not parse or a
    /// global subscriber is already installed.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use rungkv::logging::LogConfig;
    ///
    /// let _guard = LogConfig::info().with_file("./logs/rungkv.log").try_init()?;
    /// # Ok::<(), rungkv::Error>(())
    /// ```
    pub fn try_init(self) -> Result<Option<WorkerGuard>> {
        let env_filter = self.env_filter()?;
        let registry = tracing_subscriber::registry().with(env_filter);
        let compact = self.format == LogFormat::Compact;

        let (result, guard) = match self.output {
            LogOutput::Stdout if compact => {
                (registry.with(fmt::layer().compact()).try_init(), None)
            }
            LogOutput::Stdout => (registry.with(fmt::layer().pretty()).try_init(), None),
            LogOutput::Test => (
                registry
                    .with(fmt::layer().compact().with_test_writer())
                    .try_init(),
                None,
            ),
            LogOutput::File(path) => {
                let (writer, guard) = file_writer(&path);
                let result = if compact {
                    registry
                        .with(fmt::layer().with_writer(writer).with_ansi(false).compact())
                        .try_init()
                } else {
                    registry
                        .with(fmt::layer().with_writer(writer).with_ansi(false))
                        .try_init()
                };
                (result, Some(guard))
            }
            LogOutput::Both(path) => {
                let (writer, guard) = file_writer(&path);
                let result = registry
                    .with(fmt::layer())
                    .with(fmt::layer().with_writer(writer).with_ansi(false))
                    .try_init();
                (result, Some(guard))
            }
        };

        result.map_err(|e| Error::InvalidOperation(format!("logging already initialized: {}", e)))?;
        Ok(guard)
    }

    /// Like [`try_init`](Self::try_init), but reports failure on stderr
    /// instead of returning it.
    pub fn init(self) -> Option<WorkerGuard> {
        match self.try_init() {
            Ok(guard) => guard,
            Err(e) => {
                eprintln!("rungkv: {}", e);
                None
            }
        }
    }
}

fn file_writer(path: &Path) -> (NonBlocking, WorkerGuard) {
    let appender = tracing_appender::rolling::daily(
        path.parent().unwrap_or_else(|| Path::new(".")),
        path.file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("rungkv.log"),
    );
    tracing_appender::non_blocking(appender)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_config_defaults() {
        let config = LogConfig::default();
        assert_eq!(config.level, "info");
        assert!(matches!(config.output, LogOutput::Stdout));
    }

    #[test]
    fn test_log_config_builders() {
        let config = LogConfig::debug()
            .with_file("/tmp/rungkv.log")
            .with_format(LogFormat::Compact);
        assert_eq!(config.level, "debug");
        assert!(matches!(config.output, LogOutput::File(_)));
        assert_eq!(config.format, LogFormat::Compact);

        let config = LogConfig::for_tests().with_level("rungkv_storage=trace");
        assert!(matches!(config.output, LogOutput::Test));
        assert_eq!(config.level, "rungkv_storage=trace");
    }

    #[test]
    fn test_second_init_fails() {
        // The first call may lose to another test in this binary; the
        // second can never succeed.
        let _ = LogConfig::for_tests().try_init();
        let err = LogConfig::for_tests().try_init().unwrap_err();
        assert!(matches!(err, Error::InvalidOperation(_)));
    }
}

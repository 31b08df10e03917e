//! Log level control.
//!
//! All diagnostics go through `tracing`. The dispatcher only needs to change
//! the active verbosity after options are merged, so [`Logger`] wraps a
//! reload handle over a [`LevelFilter`] instead of owning any output itself.
//!
//! A detached logger (see [`Logger::detached`]) tracks the level without
//! touching the global subscriber, which is what tests and embedders use.

use std::cell::Cell;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::reload;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::Registry;

/// Verbosity accepted by the `log-level` option, quietest first.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Quiet,
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// The level forced by the `debug` option.
    pub const MOST_VERBOSE: LogLevel = LogLevel::Trace;

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Quiet => "quiet",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }

    pub fn to_level_filter(self) -> LevelFilter {
        match self {
            LogLevel::Quiet => LevelFilter::OFF,
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown log level `{0}` (expected quiet, error, warn, info, debug or trace)")]
pub struct UnknownLogLevel(pub String);

impl FromStr for LogLevel {
    type Err = UnknownLogLevel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "quiet" | "off" => Ok(LogLevel::Quiet),
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            _ => Err(UnknownLogLevel(s.to_string())),
        }
    }
}

type LevelHandle = reload::Handle<LevelFilter, Registry>;

/// Handle on the process log level and colour preference.
pub struct Logger {
    level: Cell<LogLevel>,
    use_color: Cell<bool>,
    handle: Option<LevelHandle>,
}

impl Logger {
    /// Installs the global `tracing` subscriber and returns a handle to it.
    ///
    /// Output goes to stderr so command results on stdout stay clean.
    pub fn install(level: LogLevel, use_color: bool) -> Result<Self, TryInitError> {
        let (filter, handle) = reload::Layer::new(level.to_level_filter());
        let output = tracing_subscriber::fmt::layer()
            .with_target(false)
            .without_time()
            .with_ansi(use_color)
            .with_writer(std::io::stderr);

        tracing_subscriber::registry().with(filter).with(output).try_init()?;

        console::set_colors_enabled(use_color);
        console::set_colors_enabled_stderr(use_color);

        Ok(Self {
            level: Cell::new(level),
            use_color: Cell::new(use_color),
            handle: Some(handle),
        })
    }

    /// A logger that records level changes without a subscriber behind it.
    pub fn detached(level: LogLevel) -> Self {
        Self {
            level: Cell::new(level),
            use_color: Cell::new(false),
            handle: None,
        }
    }

    pub fn level(&self) -> LogLevel {
        self.level.get()
    }

    pub fn set_level(&self, level: LogLevel) {
        self.level.set(level);
        if let Some(handle) = &self.handle {
            if let Err(e) = handle.reload(level.to_level_filter()) {
                tracing::warn!(error = %e, "failed to change log level");
            }
        }
    }

    pub fn use_color(&self) -> bool {
        self.use_color.get()
    }

    pub fn set_use_color(&self, use_color: bool) {
        self.use_color.set(use_color);
        if self.handle.is_some() {
            console::set_colors_enabled(use_color);
            console::set_colors_enabled_stderr(use_color);
        }
    }

    /// Reports `message` and terminates the process with a non-zero status.
    pub fn fatal(&self, message: impl fmt::Display) -> ! {
        tracing::error!("{}", message);
        if self.handle.is_none() || self.level() == LogLevel::Quiet {
            eprintln!("{}", message);
        }
        std::process::exit(1)
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::detached(LogLevel::default())
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("level", &self.level.get())
            .field("use_color", &self.use_color.get())
            .field("installed", &self.handle.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_levels() {
        assert_eq!("info".parse::<LogLevel>(), Ok(LogLevel::Info));
        assert_eq!("DEBUG".parse::<LogLevel>(), Ok(LogLevel::Debug));
        assert_eq!("quiet".parse::<LogLevel>(), Ok(LogLevel::Quiet));
        assert_eq!("warning".parse::<LogLevel>(), Ok(LogLevel::Warn));
        assert!("chatty".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_ordering_quietest_first() {
        assert!(LogLevel::Quiet < LogLevel::Error);
        assert!(LogLevel::Info < LogLevel::Debug);
        assert_eq!(
            [LogLevel::Quiet, LogLevel::Trace, LogLevel::Info]
                .into_iter()
                .max(),
            Some(LogLevel::MOST_VERBOSE)
        );
    }

    #[test]
    fn test_quiet_turns_output_off() {
        assert_eq!(LogLevel::Quiet.to_level_filter(), LevelFilter::OFF);
        assert_eq!(LogLevel::Trace.to_level_filter(), LevelFilter::TRACE);
    }

    #[test]
    fn test_detached_logger_tracks_level() {
        let logger = Logger::detached(LogLevel::Info);
        logger.set_level(LogLevel::Debug);
        assert_eq!(logger.level(), LogLevel::Debug);

        logger.set_use_color(true);
        assert!(logger.use_color());
    }
}

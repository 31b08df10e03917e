//! Command-line surface.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use hyperloop_dispatch::{host_platform, keys, LogLevel, OptionsRecord};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PlatformName {
    Ios,
    Android,
    Windows,
}

impl PlatformName {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlatformName::Ios => "ios",
            PlatformName::Android => "android",
            PlatformName::Windows => "windows",
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "hyperloop", version, about = "Run platform build commands", long_about = None)]
pub struct Cli {
    /// Target platform (defaults by host OS)
    #[arg(long, value_enum)]
    pub platform: Option<PlatformName>,

    /// Platform directory (defaults to $HYPERLOOP_HOME/platforms/<platform>)
    #[arg(long, value_name = "DIR")]
    pub platform_dir: Option<PathBuf>,

    /// Application name
    #[arg(long)]
    pub name: Option<String>,

    /// Project source directory
    #[arg(long, value_name = "DIR")]
    pub src: Option<String>,

    /// Build output directory
    #[arg(long, value_name = "DIR")]
    pub dest: Option<String>,

    /// Log everything
    #[arg(long)]
    pub debug: bool,

    /// quiet, error, warn, info, debug or trace
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Disable coloured output
    #[arg(long)]
    pub no_colors: bool,

    /// Extra option; the value is parsed as JSON when it can be
    #[arg(short = 'o', long = "option", value_name = "KEY=VALUE", value_parser = parse_option)]
    pub options: Vec<(String, Value)>,

    /// Directory of commands shared by every platform
    #[arg(long, value_name = "DIR")]
    pub commands_dir: Option<PathBuf>,

    /// Command to run
    pub command: String,

    /// Arguments passed through to the command
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,
}

impl Cli {
    pub fn platform_name(&self) -> &'static str {
        self.platform
            .map(|p| p.as_str())
            .unwrap_or_else(host_platform)
    }

    /// Log level to start with, before the run's options are known.
    pub fn initial_log_level(&self) -> LogLevel {
        if self.debug {
            LogLevel::MOST_VERBOSE
        } else {
            self.log_level.unwrap_or_default()
        }
    }

    /// Options the user actually gave, so defaults and config can fill the rest.
    ///
    /// Named flags win over `--option` pairs for the same key.
    pub fn caller_options(&self) -> OptionsRecord {
        let mut options: OptionsRecord = self.options.iter().cloned().collect();

        if let Some(platform) = self.platform {
            options.set(keys::PLATFORM, platform.as_str());
        }
        if let Some(name) = &self.name {
            options.set(keys::NAME, name.as_str());
        }
        if let Some(src) = &self.src {
            options.set(keys::SRC, src.as_str());
        }
        if let Some(dest) = &self.dest {
            options.set(keys::DEST, dest.as_str());
        }
        if self.debug {
            options.set(keys::DEBUG, true);
        }
        if let Some(level) = self.log_level {
            options.set(keys::LOG_LEVEL, level.as_str());
        }
        if self.no_colors {
            options.set(keys::COLORS, false);
        }
        options
    }
}

fn parse_option(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got `{raw}`"))?;
    if key.is_empty() {
        return Err(format!("missing option name in `{raw}`"));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

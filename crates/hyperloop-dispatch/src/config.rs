//! Configuration loading.
//!
//! The dispatcher treats configuration as a black box: a [`ConfigLoader`]
//! receives the options gathered so far and returns the complete record with
//! configured values layered underneath. The default [`FileConfigLoader`]
//! reads a YAML mapping from the project directory.
//!
//! # Config File Resolution
//!
//! | Priority | Path |
//! |----------|------|
//! | 1 (highest) | `<work_dir>/.hyperloop/config.yaml` |
//! | 2 (lowest) | `<work_dir>/.hyperloop/config.yml` |
//!
//! Only the first file found is read. A project without either file gets its
//! options back unchanged.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde_json::Value;
use thiserror::Error;

use crate::options::OptionsRecord;

/// Directory under the project root holding hyperloop's own files.
pub const CONFIG_DIR: &str = ".hyperloop";

/// Recognized config file names in priority order.
pub const CONFIG_FILES: &[&str] = &["config.yaml", "config.yml"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid YAML in {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("{} must contain a mapping of option names to values", path.display())]
    NotAMapping { path: PathBuf },
}

/// Layers configured values under a set of options.
pub trait ConfigLoader {
    /// Returns `options` with configured values filled into the keys it
    /// leaves unset. Keys already present in `options` must be kept as-is.
    fn load(&self, work_dir: &Path, options: OptionsRecord) -> Result<OptionsRecord, ConfigError>;
}

/// Reads `.hyperloop/config.yaml` from the project directory.
#[derive(Debug, Clone, Default)]
pub struct FileConfigLoader;

impl FileConfigLoader {
    pub fn new() -> Self {
        Self
    }

    /// Returns the config file that would be read for `work_dir`, if any.
    pub fn locate(work_dir: &Path) -> Option<PathBuf> {
        let dir = work_dir.join(CONFIG_DIR);
        CONFIG_FILES
            .iter()
            .map(|name| dir.join(name))
            .find(|path| path.is_file())
    }
}

impl ConfigLoader for FileConfigLoader {
    fn load(&self, work_dir: &Path, options: OptionsRecord) -> Result<OptionsRecord, ConfigError> {
        let Some(path) = Self::locate(work_dir) else {
            tracing::debug!(dir = %work_dir.display(), "no config file found");
            return Ok(options);
        };

        tracing::debug!(path = %path.display(), "loading config");
        let configured = read_yaml_mapping(&path)?;

        let mut options = options;
        options.fill_from(&configured);
        Ok(options)
    }
}

/// A loader that configures nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoConfig;

impl ConfigLoader for NoConfig {
    fn load(&self, _work_dir: &Path, options: OptionsRecord) -> Result<OptionsRecord, ConfigError> {
        Ok(options)
    }
}

/// Parses a YAML file whose top level must be a mapping.
///
/// An empty file is an empty mapping.
pub fn read_yaml_mapping(path: &Path) -> Result<OptionsRecord, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let value: Value = serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    match value {
        Value::Null => Ok(OptionsRecord::new()),
        Value::Object(map) => Ok(OptionsRecord::from(map)),
        _ => Err(ConfigError::NotAMapping {
            path: path.to_path_buf(),
        }),
    }
}

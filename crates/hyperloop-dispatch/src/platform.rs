//! Build target platforms.

use std::path::{Path, PathBuf};

use crate::config::{read_yaml_mapping, ConfigError};
use crate::options::OptionsRecord;

/// Subdirectory of a platform (or project) holding hook manifests.
pub const HOOKS_DIR: &str = "hooks";

/// Subdirectory of a platform holding command directories.
pub const COMMANDS_DIR: &str = "commands";

/// Optional file in a platform directory supplying its default options.
pub const PLATFORM_DEFAULTS_FILE: &str = "defaults.yaml";

/// A target build environment such as `ios`, `android` or `windows`.
///
/// The directory is where the platform's own commands and hooks live.
#[derive(Debug, Clone, PartialEq)]
pub struct Platform {
    name: String,
    directory: PathBuf,
    default_options: Option<OptionsRecord>,
}

impl Platform {
    pub fn new(name: impl Into<String>, directory: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            directory: directory.into(),
            default_options: None,
        }
    }

    /// Loads a platform from its directory, reading `defaults.yaml` if present.
    pub fn from_dir(
        name: impl Into<String>,
        directory: impl Into<PathBuf>,
    ) -> Result<Self, ConfigError> {
        let platform = Self::new(name, directory);
        let defaults_path = platform.directory.join(PLATFORM_DEFAULTS_FILE);
        if defaults_path.is_file() {
            let defaults = read_yaml_mapping(&defaults_path)?;
            return Ok(platform.with_default_options(defaults));
        }
        Ok(platform)
    }

    pub fn with_default_options(mut self, defaults: OptionsRecord) -> Self {
        self.default_options = Some(defaults);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn default_options(&self) -> Option<&OptionsRecord> {
        self.default_options.as_ref()
    }

    pub fn commands_dir(&self) -> PathBuf {
        self.directory.join(COMMANDS_DIR)
    }

    pub fn hooks_dir(&self) -> PathBuf {
        self.directory.join(HOOKS_DIR)
    }
}

//! Locating the installation and its platform directories.
//!
//! ```text
//! $HYPERLOOP_HOME/
//! ├── commands/            # shared by every platform (optional)
//! └── platforms/
//!     ├── android/
//!     │   ├── commands/
//!     │   ├── hooks/
//!     │   └── defaults.yaml
//!     └── ios/
//! ```
//!
//! `HYPERLOOP_HOME` defaults to the directory holding the executable.

use std::env;
use std::path::{Path, PathBuf};

use anyhow::Context;
use hyperloop_dispatch::COMMANDS_DIR;

pub const HOME_ENV: &str = "HYPERLOOP_HOME";

const PLATFORMS_DIR: &str = "platforms";

pub fn home_dir() -> anyhow::Result<PathBuf> {
    if let Some(home) = env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(home));
    }
    let exe = env::current_exe().context("failed to locate the hyperloop executable")?;
    exe.parent()
        .map(Path::to_path_buf)
        .with_context(|| format!("{} has no parent directory", exe.display()))
}

pub fn platform_dir(home: &Path, name: &str) -> PathBuf {
    home.join(PLATFORMS_DIR).join(name)
}

/// The shared commands directory, when the installation has one.
pub fn common_commands_dir(home: &Path) -> Option<PathBuf> {
    let dir = home.join(COMMANDS_DIR);
    dir.is_dir().then_some(dir)
}

//! Command discovery.
//!
//! [`CommandRegistry`] finds the commands available for a platform and
//! caches the result for the lifetime of the registry.
//!
//! # Discovery Roots
//!
//! Roots are searched in precedence order; the first root to claim a name
//! wins:
//!
//! | Priority | Root |
//! |----------|------|
//! | 1 (highest) | `<platform dir>/commands/<name>/command.yaml` |
//! | 2 | `<common commands dir>/<name>/command.yaml`, if configured |
//! | 3 (lowest) | compiled-in built-in commands |
//!
//! Within a directory, command directories are visited in name order.
//! Subdirectories without an entry point are skipped.
//!
//! # Cache Lifecycle
//!
//! The registry starts uninitialized. The first successful [`discover`]
//! populates it and every later call returns the same table, whichever
//! platform it is given. A process that needs a second platform's commands
//! needs a second registry.
//!
//! [`discover`]: CommandRegistry::discover

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use once_cell::unsync::OnceCell;
use thiserror::Error;

use crate::command::{Command, CommandDescriptor, CommandOrigin};
use crate::platform::Platform;
use crate::script::{ManifestError, ScriptCommand};

/// Discovered commands by name.
pub type CommandTable = BTreeMap<String, Rc<CommandDescriptor>>;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("commands have not been discovered yet; pass a platform to discover them")]
    NotDiscovered,

    #[error("failed to read commands directory {}: {source}", path.display())]
    ReadDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Manifest(#[from] ManifestError),
}

/// Finds and caches commands.
pub struct CommandRegistry {
    common_dir: Option<PathBuf>,
    builtins: Vec<Rc<dyn Command>>,
    table: OnceCell<Rc<CommandTable>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self {
            common_dir: None,
            builtins: Vec::new(),
            table: OnceCell::new(),
        }
    }

    /// Sets the directory of commands shared by every platform.
    pub fn common_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.common_dir = Some(dir.into());
        self
    }

    /// Adds a compiled-in command, searched after every directory root.
    pub fn builtin<C: Command + 'static>(mut self, command: C) -> Self {
        self.builtins.push(Rc::new(command));
        self
    }

    /// Returns true once discovery has populated the cache.
    pub fn is_populated(&self) -> bool {
        self.table.get().is_some()
    }

    /// Returns the command table, scanning the filesystem on first use only.
    pub fn discover(&self, platform: &Platform) -> Result<Rc<CommandTable>, RegistryError> {
        self.table
            .get_or_try_init(|| self.scan(platform).map(Rc::new))
            .map(Rc::clone)
    }

    /// Looks up a command by name.
    ///
    /// Without a platform the registry must already be populated.
    pub fn lookup(
        &self,
        platform: Option<&Platform>,
        name: &str,
    ) -> Result<Option<Rc<CommandDescriptor>>, RegistryError> {
        let table = match (self.table.get(), platform) {
            (Some(table), _) => Rc::clone(table),
            (None, Some(platform)) => self.discover(platform)?,
            (None, None) => return Err(RegistryError::NotDiscovered),
        };
        Ok(table.get(name).cloned())
    }

    fn scan(&self, platform: &Platform) -> Result<CommandTable, RegistryError> {
        let mut found = CommandTable::new();

        scan_dir(&platform.commands_dir(), &mut found, CommandOrigin::Platform)?;
        if let Some(dir) = &self.common_dir {
            scan_dir(dir, &mut found, CommandOrigin::Common)?;
        }

        for command in &self.builtins {
            let name = command.name().to_string();
            if found.contains_key(&name) {
                continue;
            }
            tracing::debug!(command = %name, "registered built-in command");
            found.insert(
                name,
                Rc::new(CommandDescriptor::new(
                    Rc::clone(command),
                    CommandOrigin::Builtin,
                )),
            );
        }

        Ok(found)
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CommandRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandRegistry")
            .field("common_dir", &self.common_dir)
            .field("builtins", &self.builtins.len())
            .field("populated", &self.is_populated())
            .finish()
    }
}

fn scan_dir(
    root: &Path,
    found: &mut CommandTable,
    origin: fn(PathBuf) -> CommandOrigin,
) -> Result<(), RegistryError> {
    let read_err = |source: io::Error| RegistryError::ReadDir {
        path: root.to_path_buf(),
        source,
    };

    let mut dirs = Vec::new();
    for entry in fs::read_dir(root).map_err(read_err)? {
        let path = entry.map_err(read_err)?.path();
        if path.is_dir() {
            dirs.push(path);
        }
    }
    dirs.sort();

    for dir in dirs {
        let Some(name) = dir.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            continue;
        };
        if found.contains_key(&name) {
            continue;
        }
        if let Some(command) = ScriptCommand::load(&dir)? {
            tracing::info!(command = %name, path = %dir.display(), "registered command");
            found.insert(
                name,
                Rc::new(CommandDescriptor::new(Rc::new(command), origin(dir))),
            );
        }
    }
    Ok(())
}

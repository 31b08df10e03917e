//! The dispatcher: one command run from lookup to completion.
//!
//! [`Dispatcher::run`] walks a fixed, linear sequence:
//!
//! 1. look the command up in the registry (fatal when absent)
//! 2. drop the display-only `colors` option
//! 3. resolve the effective options and apply their `log-level`
//! 4. validate required options (fatal on the first missing one)
//! 5. scan hook directories into a fresh chain, then freeze it
//! 6. build the [`ExecutionState`]
//! 7. emit `<command>.pre.execute`
//! 8. execute the command
//! 9. report a failure, log the duration, return the [`Completion`]
//!
//! Hook directories are scanned in this order, so handlers from earlier
//! directories run first for the same event:
//!
//! | Order | Directory |
//! |-------|-----------|
//! | 1 | `<src>/hooks` |
//! | 2 | `<src>/../hooks` |
//! | 3 | `<platform dir>/hooks` |
//! | 4 | `<working dir>/hooks` |

use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

use crate::command::CommandResult;
use crate::config::{ConfigLoader, FileConfigLoader};
use crate::error::FatalError;
use crate::hooks::HookChainBuilder;
use crate::logging::{LogLevel, Logger};
use crate::options::{keys, validate, OptionResolver, OptionsRecord};
use crate::platform::{Platform, HOOKS_DIR};
use crate::registry::CommandRegistry;
use crate::report::{format_error, hints};
use crate::state::ExecutionState;

/// The single outcome of a dispatched command.
#[derive(Debug)]
pub struct Completion {
    pub command: String,
    pub elapsed: Duration,
    pub result: CommandResult,
}

impl Completion {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn into_result(self) -> CommandResult {
        self.result
    }
}

/// Runs commands against a registry.
pub struct Dispatcher {
    registry: CommandRegistry,
    config: Box<dyn ConfigLoader>,
    logger: Logger,
    working_dir: PathBuf,
}

impl Dispatcher {
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::new()
    }

    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Runs `command` for `platform`.
    ///
    /// Returns `Err` for a misconfiguration, in which case the command never
    /// ran. Anything the command itself fails with is reported and handed
    /// back inside the [`Completion`].
    pub fn run(
        &self,
        command: &str,
        options: OptionsRecord,
        platform: &Platform,
        args: Vec<String>,
    ) -> Result<Completion, FatalError> {
        let descriptor = self
            .registry
            .lookup(Some(platform), command)?
            .ok_or_else(|| FatalError::CommandNotFound(command.to_string()))?;

        let mut options = options;
        options.remove(keys::COLORS);

        let work_dir = options
            .get_str(keys::SRC)
            .map(|src| self.working_dir.join(src))
            .unwrap_or_else(|| self.working_dir.clone());
        let options = OptionResolver::new(self.config.as_ref(), &self.working_dir).resolve(
            options,
            platform,
            &work_dir,
        )?;
        self.apply_log_level(&options);

        validate(&options, descriptor.name(), &descriptor.options())?;

        let mut builder = HookChainBuilder::new();
        for dir in self.hook_dirs(&options, platform) {
            let found = builder.scan_hooks(&dir)?;
            tracing::info!(dir = %dir.display(), hooks = found, "scanned hooks");
        }
        let hooks = Rc::new(builder.freeze());

        let name = descriptor.name().to_string();
        let mut state = ExecutionState::new(name.as_str(), options, args, hooks);
        state.emit(&format!("{name}.pre.execute"))?;

        descriptor.mark_started();
        let result = descriptor.execute(&mut state);
        let elapsed = descriptor.elapsed().unwrap_or_default();

        if let Err(err) = &result {
            tracing::error!("{}", format_error(err));
            for hint in hints(self.logger.use_color()) {
                tracing::error!("{}", hint);
            }
        }
        tracing::trace!("{} finished in {:.3} seconds.", name, elapsed.as_secs_f64());

        Ok(Completion {
            command: name,
            elapsed,
            result,
        })
    }

    fn apply_log_level(&self, options: &OptionsRecord) {
        let Some(raw) = options.get_str(keys::LOG_LEVEL) else {
            return;
        };
        match raw.parse::<LogLevel>() {
            Ok(level) => self.logger.set_level(level),
            Err(e) => {
                tracing::warn!("{}, using {}", e, LogLevel::default());
                self.logger.set_level(LogLevel::default());
            }
        }
    }

    fn hook_dirs(&self, options: &OptionsRecord, platform: &Platform) -> [PathBuf; 4] {
        let src = options
            .get_str(keys::SRC)
            .map(|src| self.working_dir.join(src))
            .unwrap_or_else(|| self.working_dir.clone());
        [
            src.join(HOOKS_DIR),
            src.join("..").join(HOOKS_DIR),
            platform.hooks_dir(),
            self.working_dir.join(HOOKS_DIR),
        ]
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("registry", &self.registry)
            .field("logger", &self.logger)
            .field("working_dir", &self.working_dir)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Dispatcher`].
///
/// Defaults: an empty registry, [`FileConfigLoader`], a detached logger and
/// the process working directory.
pub struct DispatcherBuilder {
    registry: CommandRegistry,
    config: Box<dyn ConfigLoader>,
    logger: Logger,
    working_dir: Option<PathBuf>,
}

impl Default for DispatcherBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DispatcherBuilder {
    pub fn new() -> Self {
        Self {
            registry: CommandRegistry::new(),
            config: Box::new(FileConfigLoader::new()),
            logger: Logger::default(),
            working_dir: None,
        }
    }

    pub fn registry(mut self, registry: CommandRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn config<L: ConfigLoader + 'static>(mut self, loader: L) -> Self {
        self.config = Box::new(loader);
        self
    }

    pub fn logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }

    /// Directory that relative `src` values and the last hook directory are
    /// resolved against.
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn build(self) -> Dispatcher {
        let working_dir = self
            .working_dir
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."));
        Dispatcher {
            registry: self.registry,
            config: self.config,
            logger: self.logger,
            working_dir,
        }
    }
}

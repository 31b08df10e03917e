//! Command dispatch for the hyperloop build tool.
//!
//! `hyperloop-dispatch` finds a platform's commands, works out the options a
//! run should see, lets hook scripts react to lifecycle events, and executes
//! the command.
//!
//! # Features
//!
//! - **Command registry**: commands discovered from `commands/<name>/command.yaml`
//!   directories plus compiled-in built-ins, cached after the first scan
//! - **Option resolution**: caller options layered over the project config,
//!   platform defaults and built-in defaults
//! - **Hook chain**: handlers collected from `hooks/` directories, frozen, then
//!   emitted synchronously in registration order
//! - **Error reports**: command failures with source positions and hints
//!
//! # Usage
//!
//! ```rust,ignore
//! use hyperloop_dispatch::{CommandRegistry, Dispatcher, OptionsRecord, Platform};
//!
//! let platform = Platform::from_dir("ios", "/opt/hyperloop/platforms/ios")?;
//! let dispatcher = Dispatcher::builder()
//!     .registry(CommandRegistry::new().common_dir("/opt/hyperloop/commands"))
//!     .build();
//!
//! let completion = dispatcher.run("build", OptionsRecord::new(), &platform, vec![])?;
//! match completion.result {
//!     Ok(results) => println!("{results}"),
//!     Err(_) => std::process::exit(1),
//! }
//! ```
//!
//! # Errors
//!
//! Misconfiguration (unknown command, missing required option, unreadable
//! command directory) is a [`FatalError`] and the command never runs. A
//! command's own failure is not fatal: it is logged with [`format_error`]
//! and returned in the [`Completion`].

mod command;
mod config;
mod dispatch;
mod error;
mod hooks;
mod logging;
mod options;
mod platform;
mod registry;
mod report;
mod script;
mod state;

pub use command::{
    Command, CommandDescriptor, CommandError, CommandOrigin, CommandResult, FnCommand, OptionSpec,
};
pub use config::{
    read_yaml_mapping, ConfigError, ConfigLoader, FileConfigLoader, NoConfig, CONFIG_DIR,
    CONFIG_FILES,
};
pub use dispatch::{Completion, Dispatcher, DispatcherBuilder};
pub use error::FatalError;
pub use hooks::{
    HookChain, HookChainBuilder, HookError, HookFn, HookScanError, COMMAND_ENV, EVENT_ENV,
    HOOK_MANIFEST_EXTENSIONS,
};
pub use logging::{LogLevel, Logger, UnknownLogLevel};
pub use options::{
    builtin_defaults, host_platform, keys, safe_name, validate, OptionResolver, OptionsRecord,
    DEFAULT_EXCLUDES, UNSAFE_NAME_CHARS,
};
pub use platform::{Platform, COMMANDS_DIR, HOOKS_DIR, PLATFORM_DEFAULTS_FILE};
pub use registry::{CommandRegistry, CommandTable, RegistryError};
pub use report::{format_error, hints};
pub use script::{ManifestError, ScriptCommand, COMMAND_MANIFESTS};
pub use state::ExecutionState;

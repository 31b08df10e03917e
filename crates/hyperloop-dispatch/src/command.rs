//! Command types.
//!
//! A command is an opaque unit of work: it declares the options it needs and
//! does its job when executed. The dispatcher never looks further inside.
//!
//! # Core Types
//!
//! - [`Command`]: the contract every command implements
//! - [`OptionSpec`]: one entry of a command's declared option schema
//! - [`FnCommand`]: a command built from a closure, for compiled-in commands
//! - [`CommandDescriptor`]: a registered command plus its execution timestamp
//! - [`CommandError`]: an error carrying source position details for reports

use std::cell::Cell;
use std::fmt;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::state::ExecutionState;

/// What a command produces: results on success, any error otherwise.
pub type CommandResult = Result<serde_json::Value, anyhow::Error>;

/// One option a command declares.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionSpec {
    pub name: String,
    #[serde(default)]
    pub required: bool,
    /// Completes the sentence "… which should <description>".
    #[serde(default)]
    pub description: String,
}

impl OptionSpec {
    pub fn required(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required: true,
            description: description.into(),
        }
    }

    pub fn optional(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required: false,
            description: description.into(),
        }
    }
}

/// The contract every command satisfies.
///
/// # Example
///
/// ```rust
/// use hyperloop_dispatch::{Command, CommandResult, ExecutionState, OptionSpec};
/// use serde_json::json;
///
/// struct Clean;
///
/// impl Command for Clean {
///     fn name(&self) -> &str {
///         "clean"
///     }
///
///     fn options(&self) -> Vec<OptionSpec> {
///         vec![OptionSpec::optional("dest", "be the directory to remove")]
///     }
///
///     fn execute(&self, state: &mut ExecutionState) -> CommandResult {
///         Ok(json!({ "removed": state.options.get("dest") }))
///     }
/// }
/// ```
pub trait Command {
    fn name(&self) -> &str;

    /// The declared option schema, in declaration order.
    fn options(&self) -> Vec<OptionSpec> {
        Vec::new()
    }

    /// Runs the command to completion.
    fn execute(&self, state: &mut ExecutionState) -> CommandResult;
}

type CommandFn = Box<dyn Fn(&mut ExecutionState) -> CommandResult>;

/// A command backed by a closure.
///
/// ```rust
/// use hyperloop_dispatch::{FnCommand, OptionSpec};
/// use serde_json::json;
///
/// let deploy = FnCommand::new("deploy", |state| Ok(json!({ "target": state.options.get("target") })))
///     .option(OptionSpec::required("target", "be the device to deploy to"));
/// ```
pub struct FnCommand {
    name: String,
    options: Vec<OptionSpec>,
    f: CommandFn,
}

impl FnCommand {
    pub fn new<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&mut ExecutionState) -> CommandResult + 'static,
    {
        Self {
            name: name.into(),
            options: Vec::new(),
            f: Box::new(f),
        }
    }

    /// Adds an option to the schema.
    pub fn option(mut self, spec: OptionSpec) -> Self {
        self.options.push(spec);
        self
    }
}

impl Command for FnCommand {
    fn name(&self) -> &str {
        &self.name
    }

    fn options(&self) -> Vec<OptionSpec> {
        self.options.clone()
    }

    fn execute(&self, state: &mut ExecutionState) -> CommandResult {
        (self.f)(state)
    }
}

impl fmt::Debug for FnCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnCommand")
            .field("name", &self.name)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Where a registered command came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOrigin {
    /// A directory under the platform's `commands` directory.
    Platform(PathBuf),
    /// A directory under the common `commands` directory.
    Common(PathBuf),
    /// Compiled into the tool.
    Builtin,
}

/// A registered command.
///
/// Immutable apart from the start timestamp the dispatcher records, which is
/// what the duration report is measured from.
pub struct CommandDescriptor {
    command: Rc<dyn Command>,
    origin: CommandOrigin,
    execution_started_at: Cell<Option<Instant>>,
}

impl CommandDescriptor {
    pub fn new(command: Rc<dyn Command>, origin: CommandOrigin) -> Self {
        Self {
            command,
            origin,
            execution_started_at: Cell::new(None),
        }
    }

    pub fn name(&self) -> &str {
        self.command.name()
    }

    pub fn options(&self) -> Vec<OptionSpec> {
        self.command.options()
    }

    pub fn origin(&self) -> &CommandOrigin {
        &self.origin
    }

    pub fn execute(&self, state: &mut ExecutionState) -> CommandResult {
        self.command.execute(state)
    }

    pub fn mark_started(&self) {
        self.execution_started_at.set(Some(Instant::now()));
    }

    pub fn execution_started_at(&self) -> Option<Instant> {
        self.execution_started_at.get()
    }

    /// Time since [`mark_started`](Self::mark_started), if it was called.
    pub fn elapsed(&self) -> Option<Duration> {
        self.execution_started_at.get().map(|start| start.elapsed())
    }
}

impl fmt::Debug for CommandDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandDescriptor")
            .field("name", &self.name())
            .field("origin", &self.origin)
            .field("execution_started_at", &self.execution_started_at.get())
            .finish()
    }
}

/// A command failure with optional source position details.
///
/// Build tools often fail while processing a source file; the error report
/// prints `line`, `column` and `position` when they are set, and `trace`
/// (for example a script's stderr) right after the message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct CommandError {
    pub message: String,
    pub line: Option<u64>,
    pub column: Option<u64>,
    pub position: Option<u64>,
    pub trace: Option<String>,
}

impl CommandError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn at_line(mut self, line: u64) -> Self {
        self.line = Some(line);
        self
    }

    pub fn at_column(mut self, column: u64) -> Self {
        self.column = Some(column);
        self
    }

    pub fn at_position(mut self, position: u64) -> Self {
        self.position = Some(position);
        self
    }

    pub fn with_trace(mut self, trace: impl Into<String>) -> Self {
        self.trace = Some(trace.into());
        self
    }
}

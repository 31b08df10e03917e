//! Commands backed by a directory and a shell script.
//!
//! A directory under a `commands` root is a command when it holds an entry
//! point manifest:
//!
//! ```yaml
//! # commands/deploy/command.yaml
//! description: Install the built app on a device
//! options:
//!   - name: target
//!     required: true
//!     description: be the device to deploy to
//! run: ./deploy.sh
//! timeout: 600   # seconds, optional
//! ```
//!
//! The command's name is the directory name. `run` executes from the
//! command directory with the execution state as JSON on stdin. Whatever it
//! prints on stdout becomes the result: parsed as JSON when possible,
//! otherwise kept as a string.
//!
//! A failing script may print a JSON error object to stdout to get position
//! details into the error report:
//!
//! ```json
//! {"error": {"message": "Unexpected token", "line": 42, "column": 7}}
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use hyperloop_pipe::{ShellCommand, ShellError};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::command::{Command, CommandError, CommandResult, OptionSpec};
use crate::hooks::COMMAND_ENV;
use crate::state::ExecutionState;

/// Entry point file names, in priority order.
pub const COMMAND_MANIFESTS: &[&str] = &["command.yaml", "command.yml"];

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid command manifest {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

#[derive(Debug, Clone, Deserialize)]
struct CommandManifest {
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    options: Vec<OptionSpec>,
    run: String,
    #[serde(default)]
    timeout: Option<u64>,
}

/// A command loaded from `commands/<name>/command.yaml`.
#[derive(Debug, Clone)]
pub struct ScriptCommand {
    name: String,
    dir: PathBuf,
    manifest: CommandManifest,
}

impl ScriptCommand {
    /// Returns the entry point manifest in `dir`, if there is one.
    pub fn entry_point(dir: &Path) -> Option<PathBuf> {
        COMMAND_MANIFESTS
            .iter()
            .map(|name| dir.join(name))
            .find(|path| path.is_file())
    }

    /// Loads the command in `dir`.
    ///
    /// Returns `Ok(None)` when the directory has no entry point.
    pub fn load(dir: &Path) -> Result<Option<Self>, ManifestError> {
        let Some(path) = Self::entry_point(dir) else {
            return Ok(None);
        };

        let content = fs::read_to_string(&path).map_err(|source| ManifestError::Io {
            path: path.clone(),
            source,
        })?;
        let manifest: CommandManifest =
            serde_yaml::from_str(&content).map_err(|source| ManifestError::Parse {
                path: path.clone(),
                source,
            })?;

        let name = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(Some(Self {
            name,
            dir: dir.to_path_buf(),
            manifest,
        }))
    }

    pub fn description(&self) -> Option<&str> {
        self.manifest.description.as_deref()
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl Command for ScriptCommand {
    fn name(&self) -> &str {
        &self.name
    }

    fn options(&self) -> Vec<OptionSpec> {
        self.manifest.options.clone()
    }

    fn execute(&self, state: &mut ExecutionState) -> CommandResult {
        let payload = serde_json::to_string(&state.payload(None))?;

        let mut shell = ShellCommand::new(&self.manifest.run)
            .current_dir(&self.dir)
            .env(COMMAND_ENV, &self.name);
        if let Some(secs) = self.manifest.timeout {
            shell = shell.with_timeout(Duration::from_secs(secs));
        }

        match shell.run(&payload) {
            Ok(output) => Ok(parse_results(&output.stdout)),
            Err(ShellError::CommandFailed {
                status,
                stdout,
                stderr,
                ..
            }) => {
                let fallback = format!("command `{}` failed with status {}", self.name, status);
                Err(script_error(&stdout, &stderr, fallback).into())
            }
            Err(other) => {
                Err(other).with_context(|| format!("failed to run command `{}`", self.name))
            }
        }
    }
}

/// Script stdout as a result value.
fn parse_results(stdout: &str) -> Value {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Value::Null;
    }
    serde_json::from_str(trimmed).unwrap_or_else(|_| Value::String(trimmed.to_string()))
}

/// Builds the error for a failed script from what it printed.
///
/// Position fields follow the common spellings: `line`/`lineNumber`,
/// `column`/`col`, `position`/`pos`.
fn script_error(stdout: &str, stderr: &str, fallback: String) -> CommandError {
    let reported = serde_json::from_str::<Value>(stdout.trim())
        .ok()
        .and_then(|v| v.get("error").cloned());

    let mut err = match &reported {
        Some(Value::String(message)) => CommandError::new(message.clone()),
        Some(Value::Object(obj)) => {
            let message = obj
                .get("message")
                .and_then(Value::as_str)
                .map(String::from)
                .unwrap_or(fallback);
            let number = |keys: &[&str]| keys.iter().find_map(|k| obj.get(*k)?.as_u64());

            CommandError {
                message,
                line: number(&["line", "lineNumber"][..]),
                column: number(&["column", "col"][..]),
                position: number(&["position", "pos"][..]),
                trace: obj.get("stack").and_then(Value::as_str).map(String::from),
            }
        }
        _ => CommandError::new(fallback),
    };

    let stderr = stderr.trim();
    if err.trace.is_none() && !stderr.is_empty() {
        err.trace = Some(stderr.to_string());
    }
    err
}

//! Fatal dispatch errors.
//!
//! These describe a misconfigured tool or project: no partial result can
//! come out of them, so [`Dispatcher::run`](crate::Dispatcher::run) returns
//! them instead of a [`Completion`](crate::Completion) and the command is
//! never executed. The CLI layer reports them and exits with a non-zero
//! status.
//!
//! Errors raised by a command while it runs are not fatal; they come back
//! inside the completion.

use thiserror::Error;

use crate::config::ConfigError;
use crate::hooks::{HookError, HookScanError};
use crate::registry::RegistryError;

#[derive(Debug, Error)]
pub enum FatalError {
    #[error("Command not found: {0}")]
    CommandNotFound(String),

    #[error("Missing required option --{option} {command} which should {description}")]
    MissingOption {
        option: String,
        command: String,
        description: String,
    },

    #[error("Error getting command list: {0}")]
    Discovery(#[from] RegistryError),

    #[error("Error loading configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Error loading hooks: {0}")]
    HookScan(#[from] HookScanError),

    #[error(transparent)]
    Hook(#[from] HookError),
}

impl FatalError {
    /// Process exit status for this error.
    pub fn exit_code(&self) -> i32 {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_error_display() {
        let err = FatalError::CommandNotFound("bogus".into());
        assert_eq!(err.to_string(), "Command not found: bogus");

        let err = FatalError::MissingOption {
            option: "target".into(),
            command: "deploy".into(),
            description: "be the device to deploy to".into(),
        };
        assert_eq!(
            err.to_string(),
            "Missing required option --target deploy which should be the device to deploy to"
        );
        assert_eq!(err.exit_code(), 1);
    }
}

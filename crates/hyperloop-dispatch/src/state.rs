//! Per-run execution state.

use std::rc::Rc;

use serde_json::{json, Value};

use crate::hooks::{HookChain, HookError};
use crate::options::OptionsRecord;

/// What a command and every hook handler receive.
///
/// One state is created per dispatch and owns that dispatch's frozen
/// [`HookChain`]; nothing in it is shared with other runs.
#[derive(Debug)]
pub struct ExecutionState {
    command: String,
    /// The effective options for this run.
    pub options: OptionsRecord,
    /// Positional arguments, passed through untouched.
    pub args: Vec<String>,
    hooks: Rc<HookChain>,
}

impl ExecutionState {
    pub fn new(
        command: impl Into<String>,
        options: OptionsRecord,
        args: Vec<String>,
        hooks: Rc<HookChain>,
    ) -> Self {
        Self {
            command: command.into(),
            options,
            args,
            hooks,
        }
    }

    /// Name of the command being run.
    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn hooks(&self) -> &HookChain {
        &self.hooks
    }

    /// Fires `event` on this run's hook chain.
    ///
    /// Handlers may modify the state; the first failing handler stops the
    /// chain and its error is returned.
    pub fn emit(&mut self, event: &str) -> Result<(), HookError> {
        let hooks = Rc::clone(&self.hooks);
        hooks.emit(event, self)
    }

    /// The JSON document handed to hook scripts and script commands on stdin.
    pub fn payload(&self, event: Option<&str>) -> Value {
        let mut payload = json!({
            "command": self.command,
            "options": self.options,
            "args": self.args,
        });
        if let (Some(event), Some(obj)) = (event, payload.as_object_mut()) {
            obj.insert("event".into(), Value::String(event.to_string()));
        }
        payload
    }
}

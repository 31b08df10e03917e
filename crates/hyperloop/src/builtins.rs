//! Commands compiled into the binary.
//!
//! They sit below every directory root, so a platform or shared command of
//! the same name replaces them.

use hyperloop_dispatch::FnCommand;
use serde_json::{Map, Value};

/// `options`: prints the effective options for this project and platform.
pub fn options() -> FnCommand {
    FnCommand::new("options", |state| Ok(serde_json::to_value(&state.options)?))
}

/// `hooks`: prints how many handlers each event has for this project.
pub fn hooks() -> FnCommand {
    FnCommand::new("hooks", |state| {
        let hooks = state.hooks();
        let counts: Map<String, Value> = hooks
            .events()
            .into_iter()
            .map(|event| (event.to_string(), hooks.handler_count(event).into()))
            .collect();
        Ok(Value::Object(counts))
    })
}

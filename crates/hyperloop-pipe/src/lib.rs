//! Synchronous shell execution for hyperloop.
//!
//! Hook scripts and script-backed commands both boil down to the same thing:
//! run a shell command in a directory, hand it a payload on stdin, and collect
//! what it printed. [`ShellCommand`] describes one such invocation and
//! [`ShellCommand::run`] executes it to completion.

pub mod shell;

pub use shell::{ShellCommand, ShellError, ShellOutput};

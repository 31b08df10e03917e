//! `hyperloop`: run a platform's build commands for a project.

mod builtins;
mod cli;
mod platforms;

use anyhow::Context;
use clap::Parser;
use hyperloop_dispatch::{CommandRegistry, Dispatcher, Logger, Platform};
use serde_json::{json, Value};

use crate::cli::Cli;

/// Answered from the registry when no command of that name is registered.
const LIST_COMMANDS: &str = "commands";

fn main() {
    let cli = Cli::parse();
    let code = match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:#}");
            1
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> anyhow::Result<i32> {
    let use_color = !cli.no_colors && console::colors_enabled_stderr();
    let logger = Logger::install(cli.initial_log_level(), use_color)
        .context("failed to initialise logging")?;

    let home = platforms::home_dir()?;
    let platform_name = cli.platform_name();
    let platform_dir = cli
        .platform_dir
        .clone()
        .unwrap_or_else(|| platforms::platform_dir(&home, platform_name));
    tracing::debug!(platform = platform_name, dir = %platform_dir.display(), "using platform");

    let platform = match Platform::from_dir(platform_name, platform_dir) {
        Ok(platform) => platform,
        Err(err) => logger.fatal(err),
    };

    let mut registry = CommandRegistry::new()
        .builtin(builtins::options())
        .builtin(builtins::hooks());
    if let Some(dir) = cli
        .commands_dir
        .clone()
        .or_else(|| platforms::common_commands_dir(&home))
    {
        registry = registry.common_dir(dir);
    }

    let dispatcher = Dispatcher::builder()
        .registry(registry)
        .logger(logger)
        .build();

    if cli.command == LIST_COMMANDS {
        if let Some(listing) = list_commands(&dispatcher, &platform) {
            print_result(&listing)?;
            return Ok(0);
        }
    }

    let completion =
        match dispatcher.run(&cli.command, cli.caller_options(), &platform, cli.args.clone()) {
            Ok(completion) => completion,
            Err(err) => dispatcher.logger().fatal(err),
        };

    match completion.result {
        Ok(results) => {
            print_result(&results)?;
            Ok(0)
        }
        Err(_) => Ok(1),
    }
}

/// Lists discovered commands, unless a command named `commands` exists.
fn list_commands(dispatcher: &Dispatcher, platform: &Platform) -> Option<Value> {
    let table = match dispatcher.registry().discover(platform) {
        Ok(table) => table,
        Err(err) => dispatcher
            .logger()
            .fatal(format!("Error getting command list: {err}")),
    };
    if table.contains_key(LIST_COMMANDS) {
        return None;
    }
    Some(json!(table.keys().collect::<Vec<_>>()))
}

fn print_result(results: &Value) -> anyhow::Result<()> {
    if !results.is_null() {
        println!("{}", serde_json::to_string_pretty(results)?);
    }
    Ok(())
}

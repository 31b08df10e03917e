//! Hook chain for lifecycle events.
//!
//! Hooks let auxiliary scripts observe and react to events such as
//! `build.pre.execute` without the dispatcher knowing about them ahead of
//! time.
//!
//! # Two Phases
//!
//! A chain is built and used in two distinct phases:
//!
//! 1. **Collection**: a [`HookChainBuilder`] scans hook directories and
//!    accepts in-process handlers. Manifests are parsed into registration
//!    requests; nothing is executed.
//! 2. **Emission**: [`HookChainBuilder::freeze`] produces an immutable
//!    [`HookChain`]. Only a frozen chain can emit, so no handler can be added
//!    after an event it should have observed has fired.
//!
//! # Hook Manifests
//!
//! Every `*.yaml` / `*.yml` file in a hooks directory is a manifest, loaded in
//! file name order:
//!
//! ```yaml
//! hooks:
//!   - event: build.pre.execute
//!     run: ./generate-assets.sh
//!     timeout: 60   # seconds, optional
//! ```
//!
//! A script hook runs through `sh -c` (`cmd /C` on Windows) from the
//! manifest's directory. It receives the execution state as JSON on stdin
//! and the event name in `HYPERLOOP_EVENT`. A non-zero exit fails the hook.
//!
//! # Ordering and Failure
//!
//! Handlers for an event run synchronously in registration order. The first
//! failing handler stops the chain and its error propagates out of
//! [`HookChain::emit`]; later handlers do not run.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

use anyhow::Context;
use hyperloop_pipe::ShellCommand;
use serde::Deserialize;
use thiserror::Error;

use crate::state::ExecutionState;

/// Recognized hook manifest extensions.
pub const HOOK_MANIFEST_EXTENSIONS: &[&str] = &["yaml", "yml"];

/// Environment variable carrying the event name to hook scripts.
pub const EVENT_ENV: &str = "HYPERLOOP_EVENT";

/// Environment variable carrying the command name to hook scripts.
pub const COMMAND_ENV: &str = "HYPERLOOP_COMMAND";

/// In-process hook handler.
pub type HookFn = Rc<dyn Fn(&mut ExecutionState) -> anyhow::Result<()>>;

/// A handler failed while an event was being emitted.
#[derive(Debug, Error)]
#[error("hook {source_label} failed on `{event}`: {error:#}")]
pub struct HookError {
    /// The event being emitted.
    pub event: String,
    /// Manifest path for script hooks, `<inline>` for in-process handlers.
    pub source_label: String,
    pub error: anyhow::Error,
}

/// A hook directory could not be scanned.
#[derive(Debug, Error)]
pub enum HookScanError {
    #[error("failed to read hooks from {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid hook manifest {}: {source}", path.display())]
    Manifest {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

#[derive(Debug, Deserialize)]
struct HookManifest {
    #[serde(default)]
    hooks: Vec<HookDef>,
}

#[derive(Debug, Deserialize)]
struct HookDef {
    event: String,
    run: String,
    #[serde(default)]
    timeout: Option<u64>,
}

/// A hook script: a shell command run from its manifest's directory.
#[derive(Debug, Clone)]
struct ScriptHook {
    command: String,
    dir: PathBuf,
    timeout: Option<Duration>,
}

impl ScriptHook {
    fn run(&self, event: &str, state: &ExecutionState) -> anyhow::Result<()> {
        let payload = serde_json::to_string(&state.payload(Some(event)))?;

        let mut shell = ShellCommand::new(&self.command)
            .current_dir(&self.dir)
            .env(EVENT_ENV, event)
            .env(COMMAND_ENV, state.command());
        if let Some(timeout) = self.timeout {
            shell = shell.with_timeout(timeout);
        }

        let output = shell
            .run(&payload)
            .with_context(|| format!("`{}` in {}", self.command, self.dir.display()))?;

        if !output.stdout.trim().is_empty() {
            tracing::debug!(event = %event, output = %output.stdout.trim_end(), "hook output");
        }
        Ok(())
    }
}

#[derive(Clone)]
enum Handler {
    Script(ScriptHook),
    Inline(HookFn),
}

#[derive(Clone)]
struct Registration {
    source_label: String,
    handler: Handler,
}

impl Registration {
    fn invoke(&self, event: &str, state: &mut ExecutionState) -> anyhow::Result<()> {
        match &self.handler {
            Handler::Script(script) => script.run(event, state),
            Handler::Inline(f) => f(state),
        }
    }
}

const INLINE_LABEL: &str = "<inline>";

/// Collects hook registrations.
///
/// # Example
///
/// ```rust
/// use hyperloop_dispatch::HookChainBuilder;
/// use std::path::Path;
///
/// let mut builder = HookChainBuilder::new()
///     .on("build.pre.execute", |state| {
///         state.options.set("stamped", true);
///         Ok(())
///     });
/// builder.scan_hooks(Path::new("./hooks"))?;
///
/// let chain = builder.freeze();
/// # Ok::<(), hyperloop_dispatch::HookScanError>(())
/// ```
#[derive(Default)]
pub struct HookChainBuilder {
    registrations: Vec<(String, Registration)>,
}

impl HookChainBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an in-process handler for `event`.
    pub fn on<F>(mut self, event: impl Into<String>, f: F) -> Self
    where
        F: Fn(&mut ExecutionState) -> anyhow::Result<()> + 'static,
    {
        self.register(event, f);
        self
    }

    /// Registers an in-process handler for `event` in place.
    pub fn register<F>(&mut self, event: impl Into<String>, f: F)
    where
        F: Fn(&mut ExecutionState) -> anyhow::Result<()> + 'static,
    {
        self.registrations.push((
            event.into(),
            Registration {
                source_label: INLINE_LABEL.to_string(),
                handler: Handler::Inline(Rc::new(f)),
            },
        ));
    }

    /// Loads every manifest in `dir`, returning how many hooks were registered.
    ///
    /// A directory that does not exist registers nothing and is not an error.
    pub fn scan_hooks(&mut self, dir: &Path) -> Result<usize, HookScanError> {
        if !dir.is_dir() {
            tracing::debug!(dir = %dir.display(), "no hooks directory");
            return Ok(0);
        }

        let io_err = |source: io::Error| HookScanError::Io {
            path: dir.to_path_buf(),
            source,
        };

        let mut manifests = Vec::new();
        for entry in fs::read_dir(dir).map_err(io_err)? {
            let path = entry.map_err(io_err)?.path();
            let is_manifest = path.is_file()
                && path
                    .extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| HOOK_MANIFEST_EXTENSIONS.contains(&e));
            if is_manifest {
                manifests.push(path);
            }
        }
        manifests.sort();

        let mut count = 0;
        for path in manifests {
            count += self.load_manifest(&path)?;
        }
        Ok(count)
    }

    fn load_manifest(&mut self, path: &Path) -> Result<usize, HookScanError> {
        let content = fs::read_to_string(path).map_err(|source| HookScanError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let manifest: Option<HookManifest> =
            serde_yaml::from_str(&content).map_err(|source| HookScanError::Manifest {
                path: path.to_path_buf(),
                source,
            })?;
        let defs = manifest.map(|m| m.hooks).unwrap_or_default();

        let dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let count = defs.len();

        for def in defs {
            tracing::debug!(event = %def.event, hook = %path.display(), "registering hook");
            self.registrations.push((
                def.event,
                Registration {
                    source_label: path.display().to_string(),
                    handler: Handler::Script(ScriptHook {
                        command: def.run,
                        dir: dir.clone(),
                        timeout: def.timeout.map(Duration::from_secs),
                    }),
                },
            ));
        }
        Ok(count)
    }

    /// Ends collection. The returned chain cannot gain handlers.
    pub fn freeze(self) -> HookChain {
        let mut table: HashMap<String, Vec<Registration>> = HashMap::new();
        for (event, registration) in self.registrations {
            table.entry(event).or_default().push(registration);
        }
        HookChain { table }
    }
}

impl fmt::Debug for HookChainBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookChainBuilder")
            .field("registrations", &self.registrations.len())
            .finish()
    }
}

/// A frozen table of handlers, keyed by event name.
pub struct HookChain {
    table: HashMap<String, Vec<Registration>>,
}

impl HookChain {
    /// A chain with no handlers.
    pub fn empty() -> Self {
        HookChainBuilder::new().freeze()
    }

    /// Runs every handler registered for `event`, in registration order.
    pub fn emit(&self, event: &str, state: &mut ExecutionState) -> Result<(), HookError> {
        let Some(registrations) = self.table.get(event) else {
            return Ok(());
        };

        tracing::debug!(event = %event, handlers = registrations.len(), "emitting hook event");

        for registration in registrations {
            registration
                .invoke(event, state)
                .map_err(|error| HookError {
                    event: event.to_string(),
                    source_label: registration.source_label.clone(),
                    error,
                })?;
        }
        Ok(())
    }

    pub fn handler_count(&self, event: &str) -> usize {
        self.table.get(event).map_or(0, Vec::len)
    }

    /// Events with at least one handler, sorted.
    pub fn events(&self) -> Vec<&str> {
        let mut events: Vec<&str> = self.table.keys().map(String::as_str).collect();
        events.sort_unstable();
        events
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

impl Default for HookChain {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for HookChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: HashMap<&str, usize> = self
            .table
            .iter()
            .map(|(event, regs)| (event.as_str(), regs.len()))
            .collect();
        f.debug_struct("HookChain").field("handlers", &counts).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::OptionsRecord;
    use std::cell::RefCell;

    fn state() -> ExecutionState {
        ExecutionState::new("build", OptionsRecord::new(), vec![], Rc::new(HookChain::empty()))
    }

    fn write_manifest(dir: &Path, name: &str, content: &str) {
        fs::create_dir_all(dir).unwrap();
        fs::write(dir.join(name), content).unwrap();
    }

    #[test]
    fn test_empty_chain() {
        let chain = HookChain::empty();
        assert!(chain.is_empty());
        assert_eq!(chain.handler_count("build.pre.execute"), 0);
        assert!(chain.emit("build.pre.execute", &mut state()).is_ok());
    }

    #[test]
    fn test_handlers_run_in_registration_order() {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let (a, b) = (calls.clone(), calls.clone());

        let chain = HookChainBuilder::new()
            .on("build.pre.execute", move |_| {
                a.borrow_mut().push("first");
                Ok(())
            })
            .on("build.pre.execute", move |_| {
                b.borrow_mut().push("second");
                Ok(())
            })
            .freeze();

        chain.emit("build.pre.execute", &mut state()).unwrap();
        assert_eq!(*calls.borrow(), vec!["first", "second"]);
    }

    #[test]
    fn test_only_matching_event_fires() {
        let calls = Rc::new(RefCell::new(0));
        let counter = calls.clone();

        let chain = HookChainBuilder::new()
            .on("deploy.pre.execute", move |_| {
                *counter.borrow_mut() += 1;
                Ok(())
            })
            .freeze();

        chain.emit("build.pre.execute", &mut state()).unwrap();
        assert_eq!(*calls.borrow(), 0);
        assert_eq!(chain.events(), vec!["deploy.pre.execute"]);
    }

    #[test]
    fn test_failing_handler_stops_chain() {
        let chain = HookChainBuilder::new()
            .on("build.pre.execute", |_| anyhow::bail!("first fails"))
            .on("build.pre.execute", |_| panic!("should not be called"))
            .freeze();

        let err = chain.emit("build.pre.execute", &mut state()).unwrap_err();
        assert_eq!(err.event, "build.pre.execute");
        assert_eq!(err.source_label, "<inline>");
        assert!(err.to_string().contains("first fails"));
    }

    #[test]
    fn test_scan_missing_directory_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let mut builder = HookChainBuilder::new();

        let count = builder.scan_hooks(&dir.path().join("hooks")).unwrap();
        assert_eq!(count, 0);
        assert!(builder.freeze().is_empty());
    }

    #[test]
    fn test_scan_loads_manifests_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        let hooks = dir.path().join("hooks");
        write_manifest(
            &hooks,
            "20-sign.yaml",
            "hooks:\n  - event: build.pre.execute\n    run: echo sign\n",
        );
        write_manifest(
            &hooks,
            "10-assets.yml",
            "hooks:\n  - event: build.pre.execute\n    run: echo assets\n  - event: build.post.compile\n    run: echo compiled\n",
        );
        write_manifest(&hooks, "README.md", "not a manifest");

        let mut builder = HookChainBuilder::new();
        assert_eq!(builder.scan_hooks(&hooks).unwrap(), 3);

        let labels: Vec<String> = builder
            .registrations
            .iter()
            .map(|(_, r)| match &r.handler {
                Handler::Script(s) => s.command.clone(),
                Handler::Inline(_) => INLINE_LABEL.to_string(),
            })
            .collect();
        assert_eq!(labels, vec!["echo assets", "echo compiled", "echo sign"]);

        let chain = builder.freeze();
        assert_eq!(chain.handler_count("build.pre.execute"), 2);
        assert_eq!(chain.handler_count("build.post.compile"), 1);
    }

    #[test]
    fn test_empty_manifest_registers_nothing() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(dir.path(), "empty.yaml", "");

        let mut builder = HookChainBuilder::new();
        assert_eq!(builder.scan_hooks(dir.path()).unwrap(), 0);
    }

    #[test]
    fn test_malformed_manifest_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(dir.path(), "bad.yaml", "hooks:\n  - run: echo missing-event\n");

        let mut builder = HookChainBuilder::new();
        let err = builder.scan_hooks(dir.path()).unwrap_err();
        assert!(matches!(err, HookScanError::Manifest { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_script_hook_receives_state() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(
            dir.path(),
            "record.yaml",
            "hooks:\n  - event: build.pre.execute\n    run: cat > seen.json; printf %s \"$HYPERLOOP_EVENT\" > event.txt\n",
        );

        let mut builder = HookChainBuilder::new();
        builder.scan_hooks(dir.path()).unwrap();
        let chain = builder.freeze();

        let mut state = state();
        state.options.set("name", "App");
        chain.emit("build.pre.execute", &mut state).unwrap();

        let seen: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(dir.path().join("seen.json")).unwrap())
                .unwrap();
        assert_eq!(seen["event"], "build.pre.execute");
        assert_eq!(seen["options"]["name"], "App");
        assert_eq!(
            fs::read_to_string(dir.path().join("event.txt")).unwrap(),
            "build.pre.execute"
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_failing_script_hook_propagates() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(
            dir.path(),
            "fail.yaml",
            "hooks:\n  - event: build.pre.execute\n    run: exit 2\n",
        );

        let mut builder = HookChainBuilder::new();
        builder.scan_hooks(dir.path()).unwrap();
        let chain = builder.freeze();

        let err = chain.emit("build.pre.execute", &mut state()).unwrap_err();
        assert!(err.source_label.ends_with("fail.yaml"));
    }
}

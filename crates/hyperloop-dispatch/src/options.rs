//! Effective options for a single run.
//!
//! Options come from four layers, lowest precedence first:
//!
//! ```text
//! built-in defaults → platform defaults → config file → caller options
//! ```
//!
//! Merging is defaults-style: the record starts as the caller's options and
//! each lower layer only fills keys that are still unset. A key the caller
//! supplied can therefore never be replaced, whatever the lower layers hold.
//!
//! After merging, [`OptionResolver`] derives `safeName`, applies the `debug`
//! flag to `log-level`, and records the platform directory.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::command::OptionSpec;
use crate::config::{ConfigError, ConfigLoader};
use crate::error::FatalError;
use crate::logging::LogLevel;
use crate::platform::Platform;

/// Well-known option names.
pub mod keys {
    pub const NAME: &str = "name";
    pub const SRC: &str = "src";
    pub const DEST: &str = "dest";
    pub const DEBUG: &str = "debug";
    pub const LOG_LEVEL: &str = "log-level";
    pub const EXCLUDES: &str = "excludes";
    pub const OBFUSCATE: &str = "obfuscate";
    pub const PLATFORM: &str = "platform";
    pub const COLORS: &str = "colors";
    pub const SAFE_NAME: &str = "safeName";
    pub const PLATFORM_DIR: &str = "platform_dir";
}

/// Characters that [`safe_name`] replaces, besides whitespace.
pub const UNSAFE_NAME_CHARS: &[char] = &['+', '-', '$', '@', '!', '?', '*', '%', '#', ':', ';', '/'];

/// Default `excludes` pattern: skip hyperloop's own directory when copying sources.
pub const DEFAULT_EXCLUDES: &str = r"^\.hyperloop$";

/// Ordered mapping from option name to value.
///
/// A key is set as soon as it is present, even when it holds `null`: lower
/// layers never fill it and required-option validation accepts it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OptionsRecord {
    map: Map<String, Value>,
}

impl OptionsRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.map.get(key)
    }

    /// Returns the value as a string slice, if it is a string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.map.get(key).and_then(Value::as_str)
    }

    /// Returns whether the value is set to something truthy.
    ///
    /// `false`, `0`, `""` and `null` are falsy, matching how flags arrive from
    /// config files and the command line.
    pub fn is_truthy(&self, key: &str) -> bool {
        match self.map.get(key) {
            None | Some(Value::Null) => false,
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
            Some(Value::String(s)) => !s.is_empty(),
            Some(Value::Array(_)) | Some(Value::Object(_)) => true,
        }
    }

    /// Returns true if `key` is present, whatever its value.
    pub fn contains(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    /// Sets `key`, returning the previous value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.map.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.map.shift_remove(key)
    }

    /// Fills every key this record leaves unset from `lower`.
    ///
    /// Keys already set here are never touched.
    pub fn fill_from(&mut self, lower: &OptionsRecord) {
        for (key, value) in &lower.map {
            if !self.contains(key) {
                self.map.insert(key.clone(), value.clone());
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.map.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.map.keys()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.map
    }
}

impl From<Map<String, Value>> for OptionsRecord {
    fn from(map: Map<String, Value>) -> Self {
        Self { map }
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for OptionsRecord {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            map: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// The platform a build targets when none is given, based on the host OS.
pub fn host_platform() -> &'static str {
    if cfg!(target_os = "windows") {
        "windows"
    } else if cfg!(target_os = "macos") {
        "ios"
    } else {
        "android"
    }
}

/// The fixed bottom layer of every merge.
pub fn builtin_defaults(cwd: &Path) -> OptionsRecord {
    let mut defaults = OptionsRecord::new();
    defaults.set(keys::NAME, "App");
    defaults.set(keys::SRC, cwd.to_string_lossy().into_owned());
    defaults.set(keys::DEST, "build");
    defaults.set(keys::DEBUG, false);
    defaults.set(keys::LOG_LEVEL, LogLevel::Info.as_str());
    defaults.set(keys::EXCLUDES, DEFAULT_EXCLUDES);
    defaults.set(keys::OBFUSCATE, true);
    defaults.set(keys::PLATFORM, host_platform());
    defaults
}

/// Replaces whitespace and [`UNSAFE_NAME_CHARS`] with `_`.
///
/// Every other character is kept, so applying it twice changes nothing.
pub fn safe_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_whitespace() || UNSAFE_NAME_CHARS.contains(&c) {
                '_'
            } else {
                c
            }
        })
        .collect()
}

/// Builds the effective options record for one run.
pub struct OptionResolver<'a> {
    config: &'a dyn ConfigLoader,
    cwd: &'a Path,
}

impl<'a> OptionResolver<'a> {
    /// `cwd` seeds the built-in `src` default and anchors a relative `src`.
    pub fn new(config: &'a dyn ConfigLoader, cwd: &'a Path) -> Self {
        Self { config, cwd }
    }

    /// Merges `raw` over config, platform and built-in defaults, then adds the
    /// derived fields.
    pub fn resolve(
        &self,
        raw: OptionsRecord,
        platform: &Platform,
        work_dir: &Path,
    ) -> Result<OptionsRecord, ConfigError> {
        let mut options = self.config.load(work_dir, raw)?;

        if let Some(platform_defaults) = platform.default_options() {
            options.fill_from(platform_defaults);
        }
        options.fill_from(&builtin_defaults(self.cwd));

        // Scripts run from their own directory, so `src` must not stay relative.
        if let Some(src) = options.get_str(keys::SRC) {
            let src = self.cwd.join(src);
            options.set(keys::SRC, src.to_string_lossy().into_owned());
        }

        if options.is_truthy(keys::DEBUG) {
            options.set(keys::LOG_LEVEL, LogLevel::MOST_VERBOSE.as_str());
        }

        if let Some(name) = options.get_str(keys::NAME) {
            let safe = safe_name(name);
            options.set(keys::SAFE_NAME, safe);
        }

        options.set(
            keys::PLATFORM_DIR,
            platform.directory().to_string_lossy().into_owned(),
        );

        tracing::debug!(options = ?options, "resolved options");
        Ok(options)
    }
}

/// Checks every required option in `schema` is set.
///
/// Stops at the first missing option.
pub fn validate(
    options: &OptionsRecord,
    command: &str,
    schema: &[OptionSpec],
) -> Result<(), FatalError> {
    match schema
        .iter()
        .find(|spec| spec.required && !options.contains(&spec.name))
    {
        Some(spec) => Err(FatalError::MissingOption {
            option: spec.name.clone(),
            command: command.to_string(),
            description: spec.description.clone(),
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NoConfig;
    use proptest::prelude::*;
    use serde_json::json;
    use std::path::PathBuf;

    fn platform() -> Platform {
        Platform::new("ios", "/opt/hyperloop/platforms/ios")
    }

    struct FixedConfig(OptionsRecord);

    impl ConfigLoader for FixedConfig {
        fn load(
            &self,
            _work_dir: &Path,
            options: OptionsRecord,
        ) -> Result<OptionsRecord, ConfigError> {
            let mut options = options;
            options.fill_from(&self.0);
            Ok(options)
        }
    }

    #[test]
    fn test_safe_name_scenario() {
        assert_eq!(safe_name("My App!"), "My_App_");
    }

    #[test]
    fn test_safe_name_replaces_each_forbidden_char() {
        assert_eq!(safe_name("a+b-c$d@e!f?g*h%i#j:k;l/m"), "a_b_c_d_e_f_g_h_i_j_k_l_m");
        assert_eq!(safe_name("tab\there\nnew"), "tab_here_new");
        assert_eq!(safe_name("Keep.Me_(ok)"), "Keep.Me_(ok)");
    }

    #[test]
    fn test_fill_from_keeps_existing_keys() {
        let mut upper: OptionsRecord = [("name", json!("Upper"))].into_iter().collect();
        let lower: OptionsRecord = [("name", json!("Lower")), ("dest", json!("out"))]
            .into_iter()
            .collect();

        upper.fill_from(&lower);
        assert_eq!(upper.get_str("name"), Some("Upper"));
        assert_eq!(upper.get_str("dest"), Some("out"));
    }

    #[test]
    fn test_fill_from_keeps_explicit_null() {
        let mut upper: OptionsRecord = [("dest", Value::Null)].into_iter().collect();
        let lower: OptionsRecord = [("dest", json!("out")), ("name", json!("App"))]
            .into_iter()
            .collect();

        upper.fill_from(&lower);
        assert_eq!(upper.get("dest"), Some(&Value::Null));
        assert_eq!(upper.get_str("name"), Some("App"));
    }

    #[test]
    fn test_resolve_layers_in_order() {
        let cwd = PathBuf::from("/work");
        let config = FixedConfig(
            [("dest", json!("config-dest")), ("obfuscate", json!(false))]
                .into_iter()
                .collect(),
        );
        let platform = platform().with_default_options(
            [("dest", json!("platform-dest")), ("arch", json!("arm64"))]
                .into_iter()
                .collect(),
        );
        let raw: OptionsRecord = [("name", json!("Caller"))].into_iter().collect();

        let options = OptionResolver::new(&config, &cwd)
            .resolve(raw, &platform, &cwd)
            .unwrap();

        assert_eq!(options.get_str("name"), Some("Caller"));
        assert_eq!(options.get_str("dest"), Some("config-dest"));
        assert_eq!(options.get("obfuscate"), Some(&json!(false)));
        assert_eq!(options.get_str("arch"), Some("arm64"));
        assert_eq!(options.get_str("src"), Some("/work"));
        assert_eq!(options.get_str("log-level"), Some("info"));
        assert_eq!(options.get_str("platform"), Some(host_platform()));
    }

    #[test]
    fn test_resolve_derived_fields() {
        let cwd = PathBuf::from("/work");
        let raw: OptionsRecord = [("name", json!("My App!"))].into_iter().collect();

        let options = OptionResolver::new(&NoConfig, &cwd)
            .resolve(raw, &platform(), &cwd)
            .unwrap();

        assert_eq!(options.get_str(keys::SAFE_NAME), Some("My_App_"));
        assert_eq!(
            options.get_str(keys::PLATFORM_DIR),
            Some("/opt/hyperloop/platforms/ios")
        );
    }

    #[test]
    fn test_debug_forces_most_verbose_level() {
        let cwd = PathBuf::from("/work");
        let config = FixedConfig([("log-level", json!("quiet"))].into_iter().collect());
        let raw: OptionsRecord = [("debug", json!(true))].into_iter().collect();

        let options = OptionResolver::new(&config, &cwd)
            .resolve(raw, &platform(), &cwd)
            .unwrap();

        assert_eq!(options.get_str("log-level"), Some("trace"));
    }

    #[test]
    fn test_relative_src_is_anchored_to_cwd() {
        let cwd = PathBuf::from("/work");
        let raw: OptionsRecord = [("src", json!("app"))].into_iter().collect();

        let options = OptionResolver::new(&NoConfig, &cwd)
            .resolve(raw, &platform(), &cwd.join("app"))
            .unwrap();

        assert_eq!(
            options.get_str(keys::SRC),
            Some(&*cwd.join("app").to_string_lossy())
        );
    }

    #[test]
    fn test_no_safe_name_without_string_name() {
        let cwd = PathBuf::from("/work");
        let raw: OptionsRecord = [("name", json!(42))].into_iter().collect();

        let options = OptionResolver::new(&NoConfig, &cwd)
            .resolve(raw, &platform(), &cwd)
            .unwrap();

        assert!(!options.contains(keys::SAFE_NAME));
    }

    #[test]
    fn test_validate_reports_first_missing() {
        let schema = vec![
            OptionSpec::optional("verbose", "print more"),
            OptionSpec::required("target", "be the device to deploy to"),
            OptionSpec::required("profile", "be the signing profile"),
        ];
        let options = OptionsRecord::new();

        let err = validate(&options, "deploy", &schema).unwrap_err();
        match err {
            FatalError::MissingOption {
                option,
                command,
                description,
            } => {
                assert_eq!(option, "target");
                assert_eq!(command, "deploy");
                assert_eq!(description, "be the device to deploy to");
            }
            other => panic!("expected MissingOption, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_checks_presence_only() {
        let schema = vec![OptionSpec::required("target", "be the target")];
        assert!(validate(&OptionsRecord::new(), "deploy", &schema).is_err());

        let options: OptionsRecord = [("target", Value::Null)].into_iter().collect();
        assert!(validate(&options, "deploy", &schema).is_ok());

        let options: OptionsRecord = [("target", json!(false))].into_iter().collect();
        assert!(validate(&options, "deploy", &schema).is_ok());
    }

    proptest! {
        #[test]
        fn prop_safe_name_is_idempotent(name in any::<String>()) {
            let once = safe_name(&name);
            prop_assert_eq!(safe_name(&once), once);
        }

        #[test]
        fn prop_safe_name_only_touches_forbidden_chars(name in any::<String>()) {
            let safe = safe_name(&name);
            prop_assert_eq!(safe.chars().count(), name.chars().count());
            for (before, after) in name.chars().zip(safe.chars()) {
                if before.is_whitespace() || UNSAFE_NAME_CHARS.contains(&before) {
                    prop_assert_eq!(after, '_');
                } else {
                    prop_assert_eq!(after, before);
                }
            }
        }

        #[test]
        fn prop_caller_keys_survive_merge(
            caller in proptest::collection::btree_map("[a-z-]{1,8}", "[a-z]{1,8}", 0..8),
            configured in proptest::collection::btree_map("[a-z-]{1,8}", "[A-Z]{1,8}", 0..8),
        ) {
            let cwd = PathBuf::from("/work");
            let raw: OptionsRecord = caller.clone().into_iter().collect();
            let config = FixedConfig(configured.into_iter().collect());
            let platform = platform().with_default_options(
                [("name", json!("PLATFORM")), ("dest", json!("PLATFORM"))].into_iter().collect(),
            );

            let options = OptionResolver::new(&config, &cwd)
                .resolve(raw, &platform, &cwd)
                .unwrap();

            for (key, value) in caller {
                // `log-level` is the one key `debug` may rewrite, and derived
                // keys are recomputed after merging.
                if key == keys::LOG_LEVEL || key == keys::DEBUG {
                    continue;
                }
                prop_assert_eq!(options.get_str(&key), Some(value.as_str()));
            }
        }
    }
}

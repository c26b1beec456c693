//! User configuration and its resolution into a pipeline.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::custom::CustomPlugin;
use crate::error::{ConfigError, ConfigWarning};
use crate::pipeline::{PassBody, PassDescriptor};
use crate::plugins::{self, Params};
use crate::serialize::SerializeOptions;

/// Option broadcast by a top-level `floatPrecision`.
const FLOAT_PRECISION: &str = "floatPrecision";

/// One element of the `plugins` list.
#[derive(Debug, Clone)]
pub enum PluginEntry {
    /// `"name"`: enable with default params.
    Name(String),
    /// `{"name": true}` / `{"name": false}`
    Toggle(String, bool),
    /// `{"name": {...}}`: overlay params and enable.
    Params(String, Params),
    /// A transformation supplied from Rust.
    Custom(String, CustomPlugin),
    /// `{"name": null}`
    Missing(String),
    /// `{"name": 42}` and other values that mean nothing.
    Unsupported(String),
}

impl PluginEntry {
    pub fn name(&self) -> &str {
        match self {
            PluginEntry::Name(name)
            | PluginEntry::Toggle(name, _)
            | PluginEntry::Params(name, _)
            | PluginEntry::Custom(name, _)
            | PluginEntry::Missing(name)
            | PluginEntry::Unsupported(name) => name,
        }
    }

    fn from_json(value: Value) -> Vec<PluginEntry> {
        match value {
            Value::String(name) => vec![PluginEntry::Name(name)],
            Value::Object(map) => map
                .into_iter()
                .map(|(name, value)| match value {
                    Value::Bool(active) => PluginEntry::Toggle(name, active),
                    Value::Object(params) => PluginEntry::Params(name, params),
                    Value::Null => PluginEntry::Missing(name),
                    _ => PluginEntry::Unsupported(name),
                })
                .collect(),
            other => vec![PluginEntry::Unsupported(other.to_string())],
        }
    }
}

/// How many times the pipeline may run over one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Multipass {
    #[default]
    Off,
    /// Re-run while the output shrinks, at most this many runs in total.
    Runs(usize),
}

impl Multipass {
    pub const DEFAULT_RUNS: usize = 10;

    pub fn max_runs(self) -> usize {
        match self {
            Multipass::Off => 1,
            Multipass::Runs(n) => n.max(1),
        }
    }

    fn from_json(value: &Value) -> Result<Self, ConfigError> {
        match value {
            Value::Null | Value::Bool(false) => Ok(Multipass::Off),
            Value::Bool(true) => Ok(Multipass::Runs(Self::DEFAULT_RUNS)),
            Value::Number(n) => match n.as_u64() {
                Some(0 | 1) => Ok(Multipass::Off),
                Some(runs) => Ok(Multipass::Runs(usize::try_from(runs).unwrap_or(usize::MAX))),
                None => Err(invalid("multipass", "expected a boolean or a positive run count")),
            },
            _ => Err(invalid("multipass", "expected a boolean or a positive run count")),
        }
    }
}

/// Wrap the output in a `data:` URI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataUri {
    Base64,
    /// Percent-encoded.
    Enc,
    /// Raw markup after the comma.
    Unenc,
}

/// Configuration as the user wrote it.
#[derive(Debug, Clone, Default)]
pub struct UserConfig {
    /// Use `plugins` as the complete pipeline instead of adjusting the defaults.
    pub full: bool,
    pub plugins: Option<Vec<PluginEntry>>,
    pub multipass: Multipass,
    /// Overrides `floatPrecision` in every pass that has one.
    pub float_precision: Option<u8>,
    pub datauri: Option<DataUri>,
    pub js2svg: Option<SerializeOptions>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawConfig {
    #[serde(default)]
    full: bool,
    plugins: Option<Value>,
    multipass: Option<Value>,
    float_precision: Option<u8>,
    datauri: Option<DataUri>,
    js2svg: Option<SerializeOptions>,
}

impl UserConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Self::from_json_value(serde_json::from_str(json)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn from_json_value(value: Value) -> Result<Self, ConfigError> {
        // Checked before anything else looks at the config.
        if let Value::Object(map) = &value
            && let Some(plugins) = map.get("plugins")
            && !matches!(plugins, Value::Array(_) | Value::Null)
        {
            return Err(ConfigError::InvalidPluginList);
        }
        // A present key always broadcasts, so it must hold a usable value.
        if let Value::Object(map) = &value
            && let Some(precision) = map.get(FLOAT_PRECISION)
            && !precision.as_u64().is_some_and(|p| u8::try_from(p).is_ok())
        {
            return Err(invalid(FLOAT_PRECISION, "expected an integer from 0 to 255"));
        }

        let raw: RawConfig = match value {
            Value::Null => return Ok(Self::default()),
            Value::Object(map) => serde_json::from_value(Value::Object(map))?,
            _ => return Err(invalid("config", "expected an object")),
        };

        let plugins = match raw.plugins {
            Some(Value::Array(items)) => {
                Some(items.into_iter().flat_map(PluginEntry::from_json).collect())
            }
            _ => None,
        };

        Ok(Self {
            full: raw.full,
            plugins,
            multipass: raw
                .multipass
                .as_ref()
                .map_or(Ok(Multipass::Off), Multipass::from_json)?,
            float_precision: raw.float_precision,
            datauri: raw.datauri,
            js2svg: raw.js2svg,
        })
    }

    /// Append an entry to the plugin list, creating it if needed.
    pub fn with_plugin(mut self, entry: PluginEntry) -> Self {
        self.plugins.get_or_insert_with(Vec::new).push(entry);
        self
    }

    /// Resolve against the builtin registry.
    pub fn resolve(&self) -> Result<ResolvedConfig, ConfigError> {
        resolve(self)
    }
}

fn invalid(option: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidOption {
        option: option.to_string(),
        reason: reason.to_string(),
    }
}

/// A configuration ready to build a pipeline from. Inactive descriptors are
/// kept so tooling can show what was turned off.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub plugins: Vec<PassDescriptor>,
    pub multipass: Multipass,
    pub float_precision: Option<u8>,
    pub datauri: Option<DataUri>,
    pub js2svg: SerializeOptions,
    pub warnings: Vec<ConfigWarning>,
}

impl ResolvedConfig {
    pub fn active(&self) -> impl Iterator<Item = &PassDescriptor> {
        self.plugins.iter().filter(|d| d.active)
    }
}

/// Merge `config` with the registry defaults.
pub fn resolve(config: &UserConfig) -> Result<ResolvedConfig, ConfigError> {
    let mut warnings = Vec::new();
    let entries = config.plugins.as_deref().unwrap_or_default();

    let mut plugins = if config.full {
        full_list(entries, &mut warnings)
    } else {
        extended_defaults(entries, &mut warnings)
    };

    if let Some(precision) = config.float_precision {
        for descriptor in &mut plugins {
            if let Some(value) = descriptor.params.get_mut(FLOAT_PRECISION) {
                *value = Value::from(precision);
            }
        }
    }

    // Fail now rather than halfway through a document.
    for descriptor in plugins.iter().filter(|d| d.active) {
        if let PassBody::Builtin(pass) = &descriptor.body {
            pass.instantiate(&descriptor.params)
                .map_err(|source| ConfigError::InvalidParams {
                    pass: descriptor.name.clone(),
                    source,
                })?;
        }
    }

    for warning in &warnings {
        tracing::warn!("{warning}");
    }
    tracing::debug!(
        active = plugins.iter().filter(|d| d.active).count(),
        total = plugins.len(),
        full = config.full,
        "resolved plugins"
    );

    Ok(ResolvedConfig {
        plugins,
        multipass: config.multipass,
        float_precision: config.float_precision,
        datauri: config.datauri,
        js2svg: config.js2svg.clone().unwrap_or_default(),
        warnings,
    })
}

/// The user's list is the whole pipeline, in the user's order.
fn full_list(entries: &[PluginEntry], warnings: &mut Vec<ConfigWarning>) -> Vec<PassDescriptor> {
    let mut plugins = Vec::with_capacity(entries.len());
    for entry in entries {
        if let PluginEntry::Custom(name, plugin) = entry {
            plugins.push(PassDescriptor::custom(name, plugin));
            continue;
        }
        if let Some(warning) = entry_warning(entry) {
            warnings.push(warning);
            continue;
        }
        let Some(registered) = plugins::lookup(entry.name()) else {
            warnings.push(ConfigWarning::UnknownPlugin(entry.name().to_string()));
            continue;
        };
        let mut descriptor = PassDescriptor::builtin(registered);
        apply(&mut descriptor, entry);
        plugins.push(descriptor);
    }
    plugins
}

/// Registry defaults in canonical order, adjusted by each entry. Custom
/// passes are appended in the order they appear.
fn extended_defaults(
    entries: &[PluginEntry],
    warnings: &mut Vec<ConfigWarning>,
) -> Vec<PassDescriptor> {
    let mut plugins: Vec<_> = plugins::registry()
        .iter()
        .map(PassDescriptor::builtin)
        .collect();

    for entry in entries {
        if let PluginEntry::Custom(name, plugin) = entry {
            plugins.push(PassDescriptor::custom(name, plugin));
            continue;
        }
        if let Some(warning) = entry_warning(entry) {
            warnings.push(warning);
            continue;
        }

        let mut found = false;
        for descriptor in plugins.iter_mut().filter(|d| d.name == entry.name()) {
            apply(descriptor, entry);
            found = true;
        }
        if !found {
            warnings.push(ConfigWarning::UnknownPlugin(entry.name().to_string()));
        }
    }
    plugins
}

fn entry_warning(entry: &PluginEntry) -> Option<ConfigWarning> {
    match entry {
        PluginEntry::Missing(name) => Some(ConfigWarning::MissingDefinition(name.clone())),
        PluginEntry::Unsupported(name) => Some(ConfigWarning::UnsupportedEntry(name.clone())),
        _ => None,
    }
}

fn apply(descriptor: &mut PassDescriptor, entry: &PluginEntry) {
    match entry {
        PluginEntry::Name(_) => descriptor.active = true,
        PluginEntry::Toggle(_, active) => descriptor.active = *active,
        PluginEntry::Params(_, params) => {
            overlay(&mut descriptor.params, params);
            descriptor.active = true;
        }
        PluginEntry::Custom(..) | PluginEntry::Missing(_) | PluginEntry::Unsupported(_) => {}
    }
}

/// Keys in `overrides` replace keys in `params`; the rest are untouched.
fn overlay(params: &mut Map<String, Value>, overrides: &Map<String, Value>) {
    for (key, value) in overrides {
        params.insert(key.clone(), value.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::PassKind;
    use serde_json::json;

    fn descriptor<'a>(resolved: &'a ResolvedConfig, name: &str) -> &'a PassDescriptor {
        resolved.plugins.iter().find(|d| d.name == name).unwrap()
    }

    fn params(value: Value) -> Params {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    #[test]
    fn test_defaults_follow_registry() {
        let resolved = resolve(&UserConfig::default()).unwrap();
        assert_eq!(resolved.plugins.len(), plugins::registry().len());
        assert!(descriptor(&resolved, "removeComments").active);
        assert!(!descriptor(&resolved, "sortAttrs").active);
        assert!(resolved.warnings.is_empty());
        assert_eq!(resolved.multipass, Multipass::Off);
    }

    #[test]
    fn test_params_overlay_keeps_other_keys() {
        let config = UserConfig::from_json_value(json!({
            "plugins": [{"cleanupNumericValues": {"leadingZero": false}}]
        }))
        .unwrap();
        let resolved = resolve(&config).unwrap();
        let numeric = descriptor(&resolved, "cleanupNumericValues");
        assert_eq!(numeric.params["leadingZero"], json!(false));
        assert_eq!(numeric.params["floatPrecision"], json!(3));
        assert_eq!(numeric.params["defaultPx"], json!(true));
        assert!(numeric.active);
    }

    #[test]
    fn test_overlay_precedence() {
        let mut base = params(json!({"a": 1, "b": 2}));
        overlay(&mut base, &params(json!({"b": 3})));
        assert_eq!(Value::Object(base), json!({"a": 1, "b": 3}));
    }

    #[test]
    fn test_toggles() {
        let config = UserConfig::from_json_value(json!({
            "plugins": ["sortAttrs", {"removeComments": false, "convertColors": true}]
        }))
        .unwrap();
        let resolved = resolve(&config).unwrap();
        assert!(descriptor(&resolved, "sortAttrs").active);
        assert!(!descriptor(&resolved, "removeComments").active);
        assert!(descriptor(&resolved, "convertColors").active);
        assert!(
            resolved.plugins.iter().any(|d| d.name == "removeComments"),
            "inactive passes stay listed"
        );
    }

    #[test]
    fn test_float_precision_broadcast_includes_zero() {
        let config = UserConfig::from_json_value(json!({"floatPrecision": 0})).unwrap();
        let resolved = resolve(&config).unwrap();
        for name in ["cleanupNumericValues", "convertPathData"] {
            assert_eq!(descriptor(&resolved, name).params["floatPrecision"], json!(0));
        }
        assert!(!descriptor(&resolved, "cleanupAttrs").params.contains_key("floatPrecision"));
    }

    #[test]
    fn test_broadcast_wins_over_plugin_params() {
        let config = UserConfig::from_json_value(json!({
            "floatPrecision": 1,
            "plugins": [{"convertPathData": {"floatPrecision": 5}}]
        }))
        .unwrap();
        let resolved = resolve(&config).unwrap();
        assert_eq!(descriptor(&resolved, "convertPathData").params["floatPrecision"], json!(1));
    }

    #[test]
    fn test_registry_is_never_mutated() {
        let config = UserConfig::from_json_value(json!({
            "floatPrecision": 7,
            "plugins": [{"cleanupAttrs": {"trim": false}}]
        }))
        .unwrap();
        resolve(&config).unwrap();

        let defaults = resolve(&UserConfig::default()).unwrap();
        assert_eq!(
            descriptor(&defaults, "cleanupNumericValues").params["floatPrecision"],
            json!(3)
        );
        assert_eq!(descriptor(&defaults, "cleanupAttrs").params["trim"], json!(true));
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let config = UserConfig::from_json_value(json!({
            "floatPrecision": 2,
            "plugins": ["sortAttrs", {"removeMetadata": {"elements": ["title"]}}]
        }))
        .unwrap();
        assert_eq!(resolve(&config).unwrap().plugins, resolve(&config).unwrap().plugins);
    }

    #[test]
    fn test_malformed_plugin_list() {
        let err = UserConfig::from_json_value(json!({"plugins": "notAnArray"})).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPluginList));

        let err = UserConfig::from_json_str(r#"{"plugins": {"cleanupAttrs": true}}"#).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPluginList));
    }

    #[test]
    fn test_missing_definition_warns_and_continues() {
        let config = UserConfig::from_json_value(json!({
            "plugins": [{"removeComments": null}, {"mystery": true}, {"cleanupAttrs": 5}]
        }))
        .unwrap();
        let resolved = resolve(&config).unwrap();
        assert_eq!(
            resolved.warnings,
            [
                ConfigWarning::MissingDefinition("removeComments".into()),
                ConfigWarning::UnknownPlugin("mystery".into()),
                ConfigWarning::UnsupportedEntry("cleanupAttrs".into()),
            ]
        );
        assert!(descriptor(&resolved, "removeComments").active);
    }

    #[test]
    fn test_full_mode_uses_only_listed_passes() {
        let config = UserConfig::from_json_value(json!({
            "full": true,
            "plugins": ["removeComments", {"sortAttrs": true}, "removeComments"]
        }))
        .unwrap();
        let resolved = resolve(&config).unwrap();
        let names: Vec<_> = resolved.plugins.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, ["removeComments", "sortAttrs", "removeComments"]);
        assert!(resolved.plugins.iter().all(|d| d.active));
    }

    #[test]
    fn test_full_mode_without_plugins_is_empty() {
        let config = UserConfig {
            full: true,
            ..Default::default()
        };
        assert!(resolve(&config).unwrap().plugins.is_empty());
    }

    #[test]
    fn test_custom_plugin_is_appended_as_whole_document() {
        let mut custom_params = Params::new();
        custom_params.insert("floatPrecision".into(), json!(4));
        let plugin = CustomPlugin::new(|_, _, _| Ok(())).with_params(custom_params);

        let config = UserConfig {
            float_precision: Some(2),
            ..Default::default()
        }
        .with_plugin(PluginEntry::Custom("mine".into(), plugin));
        let resolved = resolve(&config).unwrap();

        let last = resolved.plugins.last().unwrap();
        assert_eq!(last.name, "mine");
        assert_eq!(last.kind, PassKind::WholeDocument);
        assert!(last.active);
        assert_eq!(last.params["floatPrecision"], json!(2));
    }

    #[test]
    fn test_invalid_params_fail_resolution() {
        let config = UserConfig::from_json_value(json!({
            "plugins": [{"convertColors": {"shorthex": "yes"}}]
        }))
        .unwrap();
        let err = resolve(&config).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidParams { ref pass, .. } if pass == "convertColors"));
    }

    #[test]
    fn test_invalid_params_on_inactive_pass_are_tolerated() {
        let config = UserConfig::from_json_value(json!({
            "plugins": [{"convertColors": {"shorthex": "yes"}}, {"convertColors": false}]
        }))
        .unwrap();
        assert!(resolve(&config).is_ok());
    }

    #[test]
    fn test_pipeline_options() {
        let config = UserConfig::from_json_str(
            r#"{"multipass": true, "datauri": "base64", "js2svg": {"pretty": true, "indent": 2}}"#,
        )
        .unwrap();
        let resolved = resolve(&config).unwrap();
        assert_eq!(resolved.multipass, Multipass::Runs(Multipass::DEFAULT_RUNS));
        assert_eq!(resolved.datauri, Some(DataUri::Base64));
        assert!(resolved.js2svg.pretty);
        assert_eq!(resolved.js2svg.indent, 2);
    }

    #[test]
    fn test_multipass_forms() {
        assert_eq!(Multipass::from_json(&json!(false)).unwrap(), Multipass::Off);
        assert_eq!(Multipass::from_json(&json!(0)).unwrap(), Multipass::Off);
        assert_eq!(Multipass::from_json(&json!(3)).unwrap(), Multipass::Runs(3));
        assert!(Multipass::from_json(&json!("lots")).is_err());
        assert_eq!(Multipass::Off.max_runs(), 1);
    }

    #[test]
    fn test_float_precision_must_hold_a_number() {
        for value in [json!(null), json!(false), json!(-1), json!(1.5), json!(256)] {
            let err = UserConfig::from_json_value(json!({"floatPrecision": value.clone()})).unwrap_err();
            assert!(
                matches!(&err, ConfigError::InvalidOption { option, .. } if option == "floatPrecision"),
                "{value}: {err}"
            );
        }
        let config = UserConfig::from_json_value(json!({"floatPrecision": 0})).unwrap();
        assert_eq!(config.float_precision, Some(0));
        assert_eq!(UserConfig::from_json_value(json!({})).unwrap().float_precision, None);
    }

    #[test]
    fn test_bad_option_shapes() {
        assert!(matches!(
            UserConfig::from_json_str(r#"{"datauri": "gzip"}"#),
            Err(ConfigError::Json(_))
        ));
        assert!(matches!(
            UserConfig::from_json_str(r#"{"multipass": "yes"}"#),
            Err(ConfigError::InvalidOption { .. })
        ));
        assert!(matches!(
            UserConfig::from_json_str("[1, 2]"),
            Err(ConfigError::InvalidOption { .. })
        ));
    }
}

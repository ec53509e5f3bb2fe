//! Experiment resolution: turns a loose request into a full [`ExperimentConfig`].
//!
//! Layering, lowest to highest precedence:
//! 1. the baked-in default template
//! 2. a named preset or bare model shortcut (when the request is a string)
//! 3. `default_model`, `default_version`
//! 4. `models.{role}`, `versions.{role}`
//! 5. per-role overrides: a direct role key, else `modules.{role}`
//!
//! Anything unrecognized or malformed becomes a [`ResolutionWarning`]; it is
//! logged and ignored. Resolution never fails and is fully deterministic.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::domain::{ExperimentConfig, ModuleSpec, RoleName};

pub const SUPPORTED_MODEL_SHORTCUTS: [&str; 3] = ["gpt-5-chat-latest", "gpt-4o-mini", "gpt-5"];

/// What the caller asked for.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExperimentRequest {
    /// No experiment specified.
    #[default]
    Default,
    /// A preset name or a model shortcut.
    Named(String),
    /// A partial override structure.
    Overrides(Map<String, Value>),
}

impl ExperimentRequest {
    pub fn named(name: impl Into<String>) -> Self {
        ExperimentRequest::Named(name.into())
    }

    /// Interpret an arbitrary JSON value; shapes other than null, string or
    /// object fall back to the default request.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::String(s) if s.trim().is_empty() => ExperimentRequest::Default,
            Value::String(s) => ExperimentRequest::Named(s.trim().to_string()),
            Value::Object(map) => ExperimentRequest::Overrides(map),
            Value::Null => ExperimentRequest::Default,
            other => {
                warn!(value = %other, "unsupported experiment value; using default");
                ExperimentRequest::Default
            }
        }
    }
}

impl From<&str> for ExperimentRequest {
    fn from(name: &str) -> Self {
        ExperimentRequest::from_value(Value::String(name.to_string()))
    }
}

impl From<Map<String, Value>> for ExperimentRequest {
    fn from(map: Map<String, Value>) -> Self {
        ExperimentRequest::Overrides(map)
    }
}

/// A soft problem found while resolving a request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolutionWarning {
    #[error("unknown experiment preset '{0}'; using default configuration")]
    UnknownPreset(String),

    #[error("unknown override key '{0}' ignored")]
    UnknownKey(String),

    #[error("unknown role '{name}' in '{section}' ignored")]
    UnknownRole { section: String, name: String },

    #[error("'{key}' must be {expected}; ignored")]
    InvalidValue { key: String, expected: &'static str },
}

/// The resolved configuration plus every warning raised on the way.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub config: ExperimentConfig,
    pub warnings: Vec<ResolutionWarning>,
}

const KNOWN_KEYS: [&str; 5] = ["default_model", "default_version", "models", "versions", "modules"];

#[derive(Debug, Clone)]
pub struct ConfigResolver {
    defaults: ExperimentConfig,
    presets: BTreeMap<String, Map<String, Value>>,
    shortcuts: BTreeSet<String>,
}

impl Default for ConfigResolver {
    fn default() -> Self {
        let defaults = default_template();
        let mut presets = BTreeMap::new();
        presets.insert("default".to_string(), template_overrides(&defaults));
        presets.insert(
            "budget".to_string(),
            object(serde_json::json!({
                "default_model": "gpt-4o-mini",
                "rebuttal": {"version": "v1"},
                "judge": {"version": "none"},
            })),
        );
        presets.insert(
            "max-grounding".to_string(),
            object(serde_json::json!({
                "default_model": "gpt-5",
                "rebuttal": {"version": "v2", "model": "gpt-5"},
            })),
        );

        Self {
            defaults,
            presets,
            shortcuts: SUPPORTED_MODEL_SHORTCUTS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// summarizer v1, rebuttal v2, judge v1, feedback v1.
pub fn default_template() -> ExperimentConfig {
    ExperimentConfig::new(
        ModuleSpec::new("v1", "gpt-4o-mini"),
        ModuleSpec::new("v2", "gpt-5-chat-latest"),
        ModuleSpec::new("v1", "gpt-4o-mini"),
        ModuleSpec::new("v1", "gpt-4o-mini"),
    )
}

fn template_overrides(config: &ExperimentConfig) -> Map<String, Value> {
    config
        .iter()
        .map(|(role, spec)| {
            (
                role.as_str().to_string(),
                serde_json::json!({"version": spec.version, "model": spec.model}),
            )
        })
        .collect()
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

impl ConfigResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add presets from configuration. A custom preset replaces a built-in of
    /// the same name; entries that are not objects are skipped with a warning.
    pub fn with_presets(mut self, presets: &BTreeMap<String, Value>) -> Self {
        for (name, value) in presets {
            match value {
                Value::Object(map) => {
                    self.presets.insert(name.clone(), map.clone());
                }
                _ => warn!(preset = %name, "custom preset is not an object; skipped"),
            }
        }
        self
    }

    pub fn defaults(&self) -> &ExperimentConfig {
        &self.defaults
    }

    pub fn preset_names(&self) -> impl Iterator<Item = &str> {
        self.presets.keys().map(String::as_str)
    }

    pub fn resolve(&self, request: &ExperimentRequest) -> Resolution {
        let mut warnings = Vec::new();
        let shortcut_overrides;
        let overrides: Option<&Map<String, Value>> = match request {
            ExperimentRequest::Default => None,
            ExperimentRequest::Named(name) if name.trim().is_empty() => None,
            ExperimentRequest::Named(name) => {
                let name = name.trim();
                if let Some(preset) = self.presets.get(name) {
                    Some(preset)
                } else if self.shortcuts.contains(name) {
                    shortcut_overrides = object(serde_json::json!({ "default_model": name }));
                    Some(&shortcut_overrides)
                } else {
                    warnings.push(ResolutionWarning::UnknownPreset(name.to_string()));
                    None
                }
            }
            ExperimentRequest::Overrides(map) => Some(map),
        };

        let mut config = self.defaults.clone();
        if let Some(overrides) = overrides {
            apply_overrides(&mut config, overrides, &mut warnings);
        }

        for w in &warnings {
            warn!(event = "resolver.warning", warning = %w);
        }
        Resolution { config, warnings }
    }
}

fn non_empty_str(value: &Value) -> Option<&str> {
    value.as_str().map(str::trim).filter(|s| !s.is_empty())
}

fn role_key(key: &str) -> Option<RoleName> {
    key.parse().ok()
}

fn apply_overrides(
    config: &mut ExperimentConfig,
    overrides: &Map<String, Value>,
    warnings: &mut Vec<ResolutionWarning>,
) {
    if let Some(v) = overrides.get("default_model") {
        match non_empty_str(v) {
            Some(model) => RoleName::ALL
                .iter()
                .for_each(|r| config.get_mut(*r).model = model.to_string()),
            None => warnings.push(ResolutionWarning::InvalidValue {
                key: "default_model".into(),
                expected: "a non-empty string",
            }),
        }
    }

    if let Some(v) = overrides.get("default_version") {
        match non_empty_str(v) {
            Some(version) => RoleName::ALL
                .iter()
                .for_each(|r| config.get_mut(*r).version = version.to_string()),
            None => warnings.push(ResolutionWarning::InvalidValue {
                key: "default_version".into(),
                expected: "a non-empty string",
            }),
        }
    }

    for (section, apply_to) in [("models", Field::Model), ("versions", Field::Version)] {
        let Some(v) = overrides.get(section) else { continue };
        let Some(entries) = v.as_object() else {
            warnings.push(ResolutionWarning::InvalidValue {
                key: section.into(),
                expected: "an object keyed by role",
            });
            continue;
        };
        for (name, value) in entries {
            let Some(role) = role_key(name) else {
                warnings.push(ResolutionWarning::UnknownRole {
                    section: section.into(),
                    name: name.clone(),
                });
                continue;
            };
            match non_empty_str(value) {
                Some(s) => apply_to.set(config.get_mut(role), s),
                None => warnings.push(ResolutionWarning::InvalidValue {
                    key: format!("{section}.{name}"),
                    expected: "a non-empty string",
                }),
            }
        }
    }

    let modules = match overrides.get("modules") {
        None => None,
        Some(Value::Object(map)) => {
            for name in map.keys() {
                if role_key(name).is_none() {
                    warnings.push(ResolutionWarning::UnknownRole {
                        section: "modules".into(),
                        name: name.clone(),
                    });
                }
            }
            Some(map)
        }
        Some(_) => {
            warnings.push(ResolutionWarning::InvalidValue {
                key: "modules".into(),
                expected: "an object keyed by role",
            });
            None
        }
    };

    for role in RoleName::ALL {
        let direct = overrides
            .iter()
            .find(|(k, v)| role_key(k) == Some(role) && !v.is_null());
        let via_modules = || {
            modules.and_then(|m| {
                m.iter()
                    .find(|(k, v)| role_key(k) == Some(role) && !v.is_null())
            })
        };
        if let Some((key, value)) = direct.or_else(via_modules) {
            apply_module_override(config.get_mut(role), key, value, warnings);
        }
    }

    for key in overrides.keys() {
        if !KNOWN_KEYS.contains(&key.as_str()) && role_key(key).is_none() {
            warnings.push(ResolutionWarning::UnknownKey(key.clone()));
        }
    }
}

#[derive(Clone, Copy)]
enum Field {
    Model,
    Version,
}

impl Field {
    fn set(self, spec: &mut ModuleSpec, value: &str) {
        match self {
            Field::Model => spec.model = value.to_string(),
            Field::Version => spec.version = value.to_string(),
        }
    }
}

/// A bare string sets the model; an object may set `model` and/or `version`.
fn apply_module_override(
    spec: &mut ModuleSpec,
    key: &str,
    value: &Value,
    warnings: &mut Vec<ResolutionWarning>,
) {
    match value {
        Value::String(_) => match non_empty_str(value) {
            Some(model) => spec.model = model.to_string(),
            None => warnings.push(ResolutionWarning::InvalidValue {
                key: key.to_string(),
                expected: "a non-empty model name",
            }),
        },
        Value::Object(fields) => {
            for (field, v) in fields {
                let target = match field.as_str() {
                    "model" => Field::Model,
                    "version" => Field::Version,
                    _ => {
                        warnings.push(ResolutionWarning::UnknownKey(format!("{key}.{field}")));
                        continue;
                    }
                };
                match non_empty_str(v) {
                    Some(s) => target.set(spec, s),
                    None => warnings.push(ResolutionWarning::InvalidValue {
                        key: format!("{key}.{field}"),
                        expected: "a non-empty string",
                    }),
                }
            }
        }
        _ => warnings.push(ResolutionWarning::InvalidValue {
            key: key.to_string(),
            expected: "a model name or {model, version}",
        }),
    }
}

//! Experiment configuration and its canonical identity.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::domain::RoleName;

/// Which registered version fills a role, and which model it talks to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModuleSpec {
    pub version: String,
    pub model: String,
}

impl ModuleSpec {
    pub fn new(version: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            model: model.into(),
        }
    }
}

impl std::fmt::Display for ModuleSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.version, self.model)
    }
}

/// A fully-populated role → module mapping.
///
/// Every role is always present. Only the resolver constructs one, so a
/// value of this type has always been through default/preset/override
/// resolution.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ExperimentConfig {
    summarizer: ModuleSpec,
    rebuttal: ModuleSpec,
    judge: ModuleSpec,
    feedback: ModuleSpec,
}

impl ExperimentConfig {
    pub(crate) fn new(
        summarizer: ModuleSpec,
        rebuttal: ModuleSpec,
        judge: ModuleSpec,
        feedback: ModuleSpec,
    ) -> Self {
        Self {
            summarizer,
            rebuttal,
            judge,
            feedback,
        }
    }

    pub fn get(&self, role: RoleName) -> &ModuleSpec {
        match role {
            RoleName::Summarizer => &self.summarizer,
            RoleName::Rebuttal => &self.rebuttal,
            RoleName::Judge => &self.judge,
            RoleName::Feedback => &self.feedback,
        }
    }

    pub(crate) fn get_mut(&mut self, role: RoleName) -> &mut ModuleSpec {
        match role {
            RoleName::Summarizer => &mut self.summarizer,
            RoleName::Rebuttal => &mut self.rebuttal,
            RoleName::Judge => &mut self.judge,
            RoleName::Feedback => &mut self.feedback,
        }
    }

    /// Roles and their specs in pipeline order.
    pub fn iter(&self) -> impl Iterator<Item = (RoleName, &ModuleSpec)> {
        RoleName::ALL.into_iter().map(move |role| (role, self.get(role)))
    }

    /// Order-independent identity of this configuration.
    pub fn canonical_key(&self) -> CanonicalKey {
        let sorted: BTreeMap<&str, &ModuleSpec> =
            self.iter().map(|(role, spec)| (role.as_str(), spec)).collect();
        let value: Map<String, Value> = sorted
            .into_iter()
            .map(|(role, spec)| {
                let mut entry = Map::new();
                entry.insert("model".into(), Value::String(spec.model.clone()));
                entry.insert("version".into(), Value::String(spec.version.clone()));
                (role.to_string(), Value::Object(entry))
            })
            .collect();
        CanonicalKey::from_json(Value::Object(value).to_string())
    }
}

impl std::fmt::Display for ExperimentConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self
            .iter()
            .map(|(role, spec)| format!("{role}={spec}"))
            .collect();
        f.write_str(&parts.join(", "))
    }
}

/// Sorted-key JSON serialization of an [`ExperimentConfig`], used as the
/// pipeline cache key. Two configs are the same experiment iff their keys
/// are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalKey {
    json: String,
    digest: String,
}

impl CanonicalKey {
    fn from_json(json: String) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(json.as_bytes());
        let digest = hex::encode(hasher.finalize());
        Self { json, digest }
    }

    /// The canonical JSON text.
    pub fn as_str(&self) -> &str {
        &self.json
    }

    /// Full SHA-256 hex digest of the canonical text.
    pub fn digest(&self) -> &str {
        &self.digest
    }

    /// Short form (first 12 hex chars).
    pub fn short(&self) -> &str {
        &self.digest[..12.min(self.digest.len())]
    }
}

impl std::fmt::Display for CanonicalKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.short())
    }
}

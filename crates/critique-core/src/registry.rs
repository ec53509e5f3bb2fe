//! Module registry: the `(role, version) → builder` table.
//!
//! Populated once at startup from an explicit descriptor list and read-only
//! afterwards. Construction rejects duplicate `(role, version)` pairs, empty
//! versions, and descriptors whose builder fills a different role than
//! declared.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::domain::RoleName;
use crate::error::{CritiqueError, RegistryError, Result};
use crate::roles::{
    feedback, judge, rebuttal, summarizer, FeedbackGenerator, Judge, ModuleContext,
    RebuttalGenerator, RoleInstance, Summarizer,
};

pub type SummarizerBuilder = fn(&str, &ModuleContext) -> Arc<dyn Summarizer>;
pub type RebuttalBuilder = fn(&str, &ModuleContext) -> Arc<dyn RebuttalGenerator>;
pub type JudgeBuilder = fn(&str, &ModuleContext) -> Arc<dyn Judge>;
pub type FeedbackBuilder = fn(&str, &ModuleContext) -> Arc<dyn FeedbackGenerator>;

/// A typed constructor for one role implementation.
#[derive(Clone, Copy)]
pub enum Builder {
    Summarizer(SummarizerBuilder),
    Rebuttal(RebuttalBuilder),
    Judge(JudgeBuilder),
    Feedback(FeedbackBuilder),
}

impl Builder {
    /// The role this builder produces.
    pub fn role(&self) -> RoleName {
        match self {
            Builder::Summarizer(_) => RoleName::Summarizer,
            Builder::Rebuttal(_) => RoleName::Rebuttal,
            Builder::Judge(_) => RoleName::Judge,
            Builder::Feedback(_) => RoleName::Feedback,
        }
    }

    pub fn build(&self, model: &str, ctx: &ModuleContext) -> RoleInstance {
        match self {
            Builder::Summarizer(f) => RoleInstance::Summarizer(f(model, ctx)),
            Builder::Rebuttal(f) => RoleInstance::Rebuttal(f(model, ctx)),
            Builder::Judge(f) => RoleInstance::Judge(f(model, ctx)),
            Builder::Feedback(f) => RoleInstance::Feedback(f(model, ctx)),
        }
    }
}

impl std::fmt::Debug for Builder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Builder({})", self.role())
    }
}

/// One registration entry.
#[derive(Debug, Clone)]
pub struct ModuleDescriptor {
    pub role: RoleName,
    pub version: String,
    pub builder: Builder,
}

impl ModuleDescriptor {
    pub fn new(role: RoleName, version: impl Into<String>, builder: Builder) -> Self {
        Self {
            role,
            version: version.into(),
            builder,
        }
    }
}

/// Every implementation shipped with this crate.
pub fn builtin_modules() -> Vec<ModuleDescriptor> {
    vec![
        ModuleDescriptor::new(
            RoleName::Summarizer,
            "v1",
            Builder::Summarizer(summarizer::build_v1),
        ),
        ModuleDescriptor::new(
            RoleName::Summarizer,
            "noop",
            Builder::Summarizer(summarizer::build_noop),
        ),
        ModuleDescriptor::new(
            RoleName::Rebuttal,
            "base",
            Builder::Rebuttal(rebuttal::build_base),
        ),
        ModuleDescriptor::new(RoleName::Rebuttal, "v1", Builder::Rebuttal(rebuttal::build_v1)),
        ModuleDescriptor::new(RoleName::Rebuttal, "v2", Builder::Rebuttal(rebuttal::build_v2)),
        ModuleDescriptor::new(RoleName::Judge, "v1", Builder::Judge(judge::build_v1)),
        ModuleDescriptor::new(RoleName::Judge, "none", Builder::Judge(judge::build_none)),
        ModuleDescriptor::new(RoleName::Feedback, "v1", Builder::Feedback(feedback::build_v1)),
    ]
}

#[derive(Debug, Clone, Default)]
pub struct ModuleRegistry {
    modules: BTreeMap<RoleName, BTreeMap<String, Builder>>,
}

impl ModuleRegistry {
    pub fn from_descriptors(
        descriptors: impl IntoIterator<Item = ModuleDescriptor>,
    ) -> std::result::Result<Self, RegistryError> {
        let mut modules: BTreeMap<RoleName, BTreeMap<String, Builder>> = BTreeMap::new();
        for d in descriptors {
            let version = d.version.trim().to_string();
            if version.is_empty() {
                return Err(RegistryError::EmptyVersion { role: d.role });
            }
            if d.builder.role() != d.role {
                return Err(RegistryError::RoleMismatch {
                    declared: d.role,
                    actual: d.builder.role(),
                    version,
                });
            }
            let versions = modules.entry(d.role).or_default();
            if versions.contains_key(&version) {
                return Err(RegistryError::DuplicateModule {
                    role: d.role,
                    version,
                });
            }
            versions.insert(version, d.builder);
        }
        Ok(Self { modules })
    }

    /// Registry over [`builtin_modules`].
    pub fn builtin() -> std::result::Result<Self, RegistryError> {
        Self::from_descriptors(builtin_modules())
    }

    pub fn lookup(&self, role: RoleName, version: &str) -> Result<&Builder> {
        self.modules
            .get(&role)
            .and_then(|versions| versions.get(version))
            .ok_or_else(|| CritiqueError::UnknownModuleVersion {
                role,
                version: version.to_string(),
                available: self.available(role),
            })
    }

    /// Registered versions for `role`, sorted.
    pub fn available(&self, role: RoleName) -> Vec<String> {
        self.modules
            .get(&role)
            .map(|versions| versions.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn contains(&self, role: RoleName, version: &str) -> bool {
        self.modules
            .get(&role)
            .is_some_and(|versions| versions.contains_key(version))
    }

    /// All `(role, version)` pairs in role order.
    pub fn iter(&self) -> impl Iterator<Item = (RoleName, &str)> {
        self.modules
            .iter()
            .flat_map(|(role, versions)| versions.keys().map(move |v| (*role, v.as_str())))
    }

    pub fn len(&self) -> usize {
        self.modules.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

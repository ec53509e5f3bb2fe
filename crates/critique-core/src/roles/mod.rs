//! Role contracts and their versioned implementations.
//!
//! Each role is an async trait with a [`RoleModule`] supertrait for runtime
//! metadata. Implementations hold only what they were built with (a model
//! identifier and a [`ModuleContext`]), so one instance can serve any number
//! of sequential pipeline calls.

use std::sync::Arc;

use async_trait::async_trait;
use critique_clients::CapabilityClients;
use tracing::debug;

use crate::domain::{ConversationHistory, Gradient, JudgeVerdict, RebuttalResult, RoleName, Summary};
use crate::error::Result;

pub mod feedback;
pub mod judge;
pub mod rebuttal;
pub mod summarizer;

/// Everything a builder may hand to a role implementation.
#[derive(Debug, Clone)]
pub struct ModuleContext {
    pub clients: CapabilityClients,
    /// Log every prompt/response pair at `debug`.
    pub log_io: bool,
}

impl ModuleContext {
    pub fn new(clients: CapabilityClients) -> Self {
        Self {
            clients,
            log_io: false,
        }
    }

    pub fn with_log_io(mut self, log_io: bool) -> Self {
        self.log_io = log_io;
        self
    }

    /// One text-generation call, with optional I/O logging.
    pub(crate) async fn generate(
        &self,
        tag: &str,
        implementation: &str,
        model: &str,
        system: &str,
        user: &str,
    ) -> Result<String> {
        let reply = self.clients.text.generate(system, user, model).await?;
        if self.log_io {
            debug!(
                module = %tag,
                implementation = %implementation,
                model = %model,
                prompt = %user,
                response = %reply,
                "module io"
            );
        }
        Ok(reply)
    }
}

/// Runtime metadata every role implementation exposes.
pub trait RoleModule: Send + Sync {
    /// Implementation name, e.g. `RebuttalV2`.
    fn implementation(&self) -> &'static str;

    /// Model identifier handed to the capability client.
    fn model(&self) -> &str;
}

#[async_trait]
pub trait Summarizer: RoleModule {
    async fn summarize(&self, history: &ConversationHistory, grad: &[String]) -> Result<Summary>;
}

#[async_trait]
pub trait RebuttalGenerator: RoleModule {
    async fn rebut(
        &self,
        history: &ConversationHistory,
        summary: &Summary,
        grad: &[String],
    ) -> Result<RebuttalResult>;
}

/// A verdict together with the rebuttal the judge hands back, which may
/// differ from the one it was given.
#[derive(Debug, Clone, PartialEq)]
pub struct JudgeOutcome {
    pub verdict: JudgeVerdict,
    pub rebuttal: RebuttalResult,
}

#[async_trait]
pub trait Judge: RoleModule {
    async fn judge(
        &self,
        history: &ConversationHistory,
        summary: &Summary,
        rebuttal: RebuttalResult,
    ) -> Result<JudgeOutcome>;

    /// Score a rebuttal must reach to pass, if the judge scores at all.
    fn pass_threshold(&self) -> Option<f64> {
        None
    }

    /// Most recent total score, best effort and diagnostic only.
    fn last_total_score(&self) -> Option<f64> {
        None
    }
}

#[async_trait]
pub trait FeedbackGenerator: RoleModule {
    async fn feedback(
        &self,
        history: &ConversationHistory,
        summary: &Summary,
        rebuttal: &RebuttalResult,
        feedback: Option<&str>,
    ) -> Result<Gradient>;
}

/// A built role instance, tagged with the role it fills.
#[derive(Clone)]
pub enum RoleInstance {
    Summarizer(Arc<dyn Summarizer>),
    Rebuttal(Arc<dyn RebuttalGenerator>),
    Judge(Arc<dyn Judge>),
    Feedback(Arc<dyn FeedbackGenerator>),
}

impl RoleInstance {
    pub fn role(&self) -> RoleName {
        match self {
            RoleInstance::Summarizer(_) => RoleName::Summarizer,
            RoleInstance::Rebuttal(_) => RoleName::Rebuttal,
            RoleInstance::Judge(_) => RoleName::Judge,
            RoleInstance::Feedback(_) => RoleName::Feedback,
        }
    }

    pub fn implementation(&self) -> &'static str {
        match self {
            RoleInstance::Summarizer(m) => m.implementation(),
            RoleInstance::Rebuttal(m) => m.implementation(),
            RoleInstance::Judge(m) => m.implementation(),
            RoleInstance::Feedback(m) => m.implementation(),
        }
    }

    pub fn model(&self) -> &str {
        match self {
            RoleInstance::Summarizer(m) => m.model(),
            RoleInstance::Rebuttal(m) => m.model(),
            RoleInstance::Judge(m) => m.model(),
            RoleInstance::Feedback(m) => m.model(),
        }
    }
}

impl std::fmt::Debug for RoleInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoleInstance")
            .field("role", &self.role())
            .field("implementation", &self.implementation())
            .field("model", &self.model())
            .finish()
    }
}

/// Prompt suffix carrying gradient items, empty when there are none.
pub(crate) fn improvement_block(grad: &[String]) -> String {
    match crate::domain::artifacts::render_grad(grad) {
        Some(lines) => format!("\n\n[Improvement instructions]\n{lines}"),
        None => String::new(),
    }
}

pub(crate) const NO_SUMMARY: &str = "No summary is available.";

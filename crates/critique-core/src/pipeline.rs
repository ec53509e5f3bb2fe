//! The critique-refinement loop.
//!
//! Each iteration runs Summarize → Rebut → Judge. A passing verdict ends the
//! call with the rebuttal the judge handed back. Otherwise the feedback
//! generator turns the verdict into a [`Gradient`] that the next iteration's
//! summarizer and rebuttal generator receive. When the iteration budget runs
//! out, the last iteration's unjudged rebuttal is returned.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::domain::{
    CanonicalKey, ConversationHistory, ExperimentConfig, Gradient, JudgeVerdict, RebuttalResult,
    RoleName,
};
use crate::error::{CritiqueError, Result};
use crate::metrics::METRICS;
use crate::obs;
use crate::roles::{FeedbackGenerator, Judge, RebuttalGenerator, RoleInstance, Summarizer};

pub const DEFAULT_MAX_ITERATIONS: usize = 5;

/// Per-call knobs for [`Pipeline::call_with`].
#[derive(Debug, Clone)]
pub struct CallOptions {
    /// Iteration budget; `0` is treated as `1`.
    pub max_iterations: usize,
    /// Upper bound on any single role step.
    pub step_timeout: Option<Duration>,
    /// Aborts the call at the next await point when cancelled.
    pub cancel: Option<CancellationToken>,
}

impl Default for CallOptions {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            step_timeout: None,
            cancel: None,
        }
    }
}

impl CallOptions {
    pub fn with_max_iterations(mut self, n: usize) -> Self {
        self.max_iterations = n;
        self
    }

    pub fn with_step_timeout(mut self, timeout: Duration) -> Self {
        self.step_timeout = Some(timeout);
        self
    }

    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    fn effective_iterations(&self) -> usize {
        self.max_iterations.max(1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// The judge passed a rebuttal.
    Accepted,
    /// Every iteration ran without a pass.
    BudgetExhausted,
}

impl Termination {
    pub fn as_str(&self) -> &'static str {
        match self {
            Termination::Accepted => "accepted",
            Termination::BudgetExhausted => "budget_exhausted",
        }
    }
}

/// Everything a call produced, for callers that want more than the text.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopOutcome {
    pub rebuttal: RebuttalResult,
    pub iterations: usize,
    pub termination: Termination,
    /// One verdict per completed judge step, in order.
    pub verdicts: Vec<JudgeVerdict>,
    /// The judge's most recent total score, when it scores at all.
    pub last_score: Option<f64>,
}

/// Implementation name and model of one built role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleRuntime {
    pub implementation: String,
    pub model: String,
}

impl std::fmt::Display for ModuleRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.implementation, self.model)
    }
}

/// Role → runtime module, as actually built.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RuntimeMetadata(BTreeMap<RoleName, ModuleRuntime>);

impl RuntimeMetadata {
    pub fn get(&self, role: RoleName) -> Option<&ModuleRuntime> {
        self.0.get(&role)
    }

    pub fn iter(&self) -> impl Iterator<Item = (RoleName, &ModuleRuntime)> {
        self.0.iter().map(|(r, m)| (*r, m))
    }

    fn record(&mut self, instance: &RoleInstance) {
        self.0.insert(
            instance.role(),
            ModuleRuntime {
                implementation: instance.implementation().to_string(),
                model: instance.model().to_string(),
            },
        );
    }
}

/// The four role instances a pipeline runs.
#[derive(Clone)]
pub struct PipelineRoles {
    pub summarizer: Arc<dyn Summarizer>,
    pub rebuttal: Arc<dyn RebuttalGenerator>,
    pub judge: Arc<dyn Judge>,
    pub feedback: Arc<dyn FeedbackGenerator>,
}

impl PipelineRoles {
    /// Collect one instance per role; a missing or repeated role is an error.
    pub fn from_instances(instances: impl IntoIterator<Item = RoleInstance>) -> Result<Self> {
        let mut summarizer = None;
        let mut rebuttal = None;
        let mut judge = None;
        let mut feedback = None;
        for instance in instances {
            let role = instance.role();
            let replaced = match instance {
                RoleInstance::Summarizer(m) => summarizer.replace(m).is_some(),
                RoleInstance::Rebuttal(m) => rebuttal.replace(m).is_some(),
                RoleInstance::Judge(m) => judge.replace(m).is_some(),
                RoleInstance::Feedback(m) => feedback.replace(m).is_some(),
            };
            if replaced {
                return Err(CritiqueError::Config(format!("role {role} built twice")));
            }
        }
        let missing = |role: RoleName| CritiqueError::Config(format!("no {role} module built"));
        Ok(Self {
            summarizer: summarizer.ok_or_else(|| missing(RoleName::Summarizer))?,
            rebuttal: rebuttal.ok_or_else(|| missing(RoleName::Rebuttal))?,
            judge: judge.ok_or_else(|| missing(RoleName::Judge))?,
            feedback: feedback.ok_or_else(|| missing(RoleName::Feedback))?,
        })
    }

    fn instances(&self) -> [RoleInstance; 4] {
        [
            RoleInstance::Summarizer(self.summarizer.clone()),
            RoleInstance::Rebuttal(self.rebuttal.clone()),
            RoleInstance::Judge(self.judge.clone()),
            RoleInstance::Feedback(self.feedback.clone()),
        ]
    }
}

/// A fully assembled, immutable pipeline.
pub struct Pipeline {
    config: ExperimentConfig,
    key: CanonicalKey,
    metadata: RuntimeMetadata,
    roles: PipelineRoles,
    defaults: CallOptions,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .field("key", &self.key.short())
            .field("metadata", &self.metadata)
            .finish()
    }
}

impl Pipeline {
    pub fn new(config: ExperimentConfig, roles: PipelineRoles) -> Self {
        let mut metadata = RuntimeMetadata::default();
        for instance in roles.instances() {
            metadata.record(&instance);
        }
        Self {
            key: config.canonical_key(),
            config,
            metadata,
            roles,
            defaults: CallOptions::default(),
        }
    }

    /// Options used by [`Pipeline::call`].
    pub fn with_call_defaults(mut self, defaults: CallOptions) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    pub fn key(&self) -> &CanonicalKey {
        &self.key
    }

    pub fn metadata(&self) -> &RuntimeMetadata {
        &self.metadata
    }

    pub fn call_defaults(&self) -> &CallOptions {
        &self.defaults
    }

    /// Produce a refined rebuttal for the conversation.
    pub async fn call(&self, history: &ConversationHistory) -> Result<RebuttalResult> {
        Ok(self.call_with(history, &self.defaults).await?.rebuttal)
    }

    pub async fn call_with(
        &self,
        history: &ConversationHistory,
        options: &CallOptions,
    ) -> Result<LoopOutcome> {
        let call_id = Uuid::new_v4().to_string();
        let span = obs::call_span(&call_id, self.key.short());
        self.run_loop(history, options).instrument(span).await
    }

    async fn run_loop(
        &self,
        history: &ConversationHistory,
        options: &CallOptions,
    ) -> Result<LoopOutcome> {
        let started = Instant::now();
        let max = options.effective_iterations();

        let mut grad = Gradient::default();
        let mut verdicts = Vec::new();
        let mut iteration = 0;

        loop {
            iteration += 1;
            METRICS.inc_loop_iterations();
            obs::emit_iteration_started(iteration, max);

            let summary = step(
                RoleName::Summarizer,
                options,
                self.roles.summarizer.summarize(history, &grad.summarizer_grad),
            )
            .await?;

            let rebuttal = step(
                RoleName::Rebuttal,
                options,
                self.roles.rebuttal.rebut(history, &summary, &grad.rebuttal_grad),
            )
            .await?;

            let judged = step(
                RoleName::Judge,
                options,
                self.roles.judge.judge(history, &summary, rebuttal.clone()),
            )
            .await?;
            let verdict = judged.verdict;
            obs::emit_verdict(
                iteration,
                verdict.passed,
                verdict.score,
                self.roles.judge.pass_threshold(),
            );
            verdicts.push(verdict.clone());

            if verdict.passed {
                METRICS.inc_judge_passes();
                return Ok(self.finish(
                    judged.rebuttal,
                    iteration,
                    Termination::Accepted,
                    verdicts,
                    started,
                ));
            }
            if iteration >= max {
                return Ok(self.finish(
                    rebuttal,
                    iteration,
                    Termination::BudgetExhausted,
                    verdicts,
                    started,
                ));
            }

            grad = step(
                RoleName::Feedback,
                options,
                self.roles.feedback.feedback(
                    history,
                    &summary,
                    &rebuttal,
                    verdict.feedback.as_deref(),
                ),
            )
            .await?;
        }
    }

    fn finish(
        &self,
        rebuttal: RebuttalResult,
        iterations: usize,
        termination: Termination,
        verdicts: Vec<JudgeVerdict>,
        started: Instant,
    ) -> LoopOutcome {
        let last_score = self.roles.judge.last_total_score();
        obs::emit_loop_finished(
            iterations,
            termination.as_str(),
            last_score,
            started.elapsed().as_millis() as u64,
        );
        LoopOutcome {
            rebuttal,
            iterations,
            termination,
            verdicts,
            last_score,
        }
    }
}

/// Run one role step under the call's timeout and cancellation token.
async fn step<T, F>(role: RoleName, options: &CallOptions, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let bounded = async {
        match options.step_timeout {
            Some(limit) => match tokio::time::timeout(limit, fut).await {
                Ok(r) => r,
                Err(_) => Err(CritiqueError::StepTimeout {
                    role,
                    timeout: limit,
                }),
            },
            None => fut.await,
        }
    };

    let result = match &options.cancel {
        Some(token) => {
            tokio::select! {
                biased;
                _ = token.cancelled() => Err(CritiqueError::Cancelled { role }),
                r = bounded => r,
            }
        }
        None => bounded.await,
    };

    if let Err(e) = &result {
        obs::emit_call_failed(role.as_str(), e);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_iterations_means_one() {
        let opts = CallOptions::default().with_max_iterations(0);
        assert_eq!(opts.effective_iterations(), 1);
        assert_eq!(
            CallOptions::default().effective_iterations(),
            DEFAULT_MAX_ITERATIONS
        );
    }

    #[test]
    fn termination_labels() {
        assert_eq!(Termination::Accepted.as_str(), "accepted");
        assert_eq!(Termination::BudgetExhausted.as_str(), "budget_exhausted");
    }

    #[test]
    fn module_runtime_display() {
        let m = ModuleRuntime {
            implementation: "JudgeV1".into(),
            model: "gpt-4o-mini".into(),
        };
        assert_eq!(m.to_string(), "JudgeV1(gpt-4o-mini)");
    }
}

//! Critique-refinement loop behaviour with in-process role doubles.
//!
//! The doubles record what they were given so the tests can check the data
//! flow between iterations, not just the final text.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use critique_core::{
    default_template, CallOptions, ConversationHistory, CritiqueError, FeedbackGenerator,
    Gradient, Judge, JudgeOutcome, JudgeVerdict, Pipeline, PipelineRoles, RebuttalGenerator,
    RebuttalResult, Result, RoleModule, RoleName, Summarizer, Summary, Termination,
};

// ---------------------------------------------------------------------------
// Role doubles
// ---------------------------------------------------------------------------

#[derive(Default)]
struct RecordingSummarizer {
    grads: Mutex<Vec<Vec<String>>>,
    delay: Option<Duration>,
}

impl RoleModule for RecordingSummarizer {
    fn implementation(&self) -> &'static str {
        "RecordingSummarizer"
    }
    fn model(&self) -> &str {
        "test"
    }
}

#[async_trait]
impl Summarizer for RecordingSummarizer {
    async fn summarize(&self, _history: &ConversationHistory, grad: &[String]) -> Result<Summary> {
        self.grads.lock().unwrap().push(grad.to_vec());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(Summary::default())
    }
}

#[derive(Default)]
struct DraftRebuttal {
    grads: Mutex<Vec<Vec<String>>>,
}

impl RoleModule for DraftRebuttal {
    fn implementation(&self) -> &'static str {
        "DraftRebuttal"
    }
    fn model(&self) -> &str {
        "test"
    }
}

#[async_trait]
impl RebuttalGenerator for DraftRebuttal {
    async fn rebut(
        &self,
        _history: &ConversationHistory,
        _summary: &Summary,
        grad: &[String],
    ) -> Result<RebuttalResult> {
        let mut grads = self.grads.lock().unwrap();
        grads.push(grad.to_vec());
        Ok(RebuttalResult::new(format!("draft {}", grads.len())))
    }
}

/// Passes or fails per the queued verdicts; the last one repeats.
struct QueuedJudge {
    verdicts: Mutex<VecDeque<bool>>,
    calls: Mutex<usize>,
}

impl QueuedJudge {
    fn new(verdicts: &[bool]) -> Self {
        Self {
            verdicts: Mutex::new(verdicts.iter().copied().collect()),
            calls: Mutex::new(0),
        }
    }

    fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

impl RoleModule for QueuedJudge {
    fn implementation(&self) -> &'static str {
        "QueuedJudge"
    }
    fn model(&self) -> &str {
        "test"
    }
}

#[async_trait]
impl Judge for QueuedJudge {
    async fn judge(
        &self,
        _history: &ConversationHistory,
        _summary: &Summary,
        rebuttal: RebuttalResult,
    ) -> Result<JudgeOutcome> {
        let n = {
            let mut calls = self.calls.lock().unwrap();
            *calls += 1;
            *calls
        };
        let mut queue = self.verdicts.lock().unwrap();
        let passed = if queue.len() > 1 {
            queue.pop_front().unwrap_or(false)
        } else {
            queue.front().copied().unwrap_or(false)
        };
        if passed {
            Ok(JudgeOutcome {
                verdict: JudgeVerdict::pass(),
                rebuttal: RebuttalResult::new(format!("{} (approved)", rebuttal.text)),
            })
        } else {
            Ok(JudgeOutcome {
                verdict: JudgeVerdict::fail(Some(format!("fix #{n}"))),
                rebuttal,
            })
        }
    }
}

#[derive(Default)]
struct CountingFeedback {
    seen: Mutex<Vec<(String, Option<String>)>>,
}

impl CountingFeedback {
    fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }
}

impl RoleModule for CountingFeedback {
    fn implementation(&self) -> &'static str {
        "CountingFeedback"
    }
    fn model(&self) -> &str {
        "test"
    }
}

#[async_trait]
impl FeedbackGenerator for CountingFeedback {
    async fn feedback(
        &self,
        _history: &ConversationHistory,
        _summary: &Summary,
        rebuttal: &RebuttalResult,
        feedback: Option<&str>,
    ) -> Result<Gradient> {
        let mut seen = self.seen.lock().unwrap();
        seen.push((rebuttal.text.clone(), feedback.map(str::to_string)));
        let n = seen.len();
        Ok(Gradient {
            summarizer_grad: vec![format!("s{n}")],
            rebuttal_grad: vec![format!("r{n}")],
        })
    }
}

struct Harness {
    summarizer: Arc<RecordingSummarizer>,
    rebuttal: Arc<DraftRebuttal>,
    judge: Arc<QueuedJudge>,
    feedback: Arc<CountingFeedback>,
    pipeline: Pipeline,
}

fn harness_with(summarizer: RecordingSummarizer, verdicts: &[bool]) -> Harness {
    let summarizer = Arc::new(summarizer);
    let rebuttal = Arc::new(DraftRebuttal::default());
    let judge = Arc::new(QueuedJudge::new(verdicts));
    let feedback = Arc::new(CountingFeedback::default());
    let roles = PipelineRoles {
        summarizer: summarizer.clone(),
        rebuttal: rebuttal.clone(),
        judge: judge.clone(),
        feedback: feedback.clone(),
    };
    Harness {
        summarizer,
        rebuttal,
        judge,
        feedback,
        pipeline: Pipeline::new(default_template(), roles),
    }
}

fn harness(verdicts: &[bool]) -> Harness {
    harness_with(RecordingSummarizer::default(), verdicts)
}

fn history() -> ConversationHistory {
    let mut h = ConversationHistory::new();
    h.push_user("Remote work always lowers productivity.");
    h
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn budget_exhaustion_returns_last_unjudged_rebuttal() {
    let h = harness(&[false]);
    let options = CallOptions::default().with_max_iterations(3);

    let outcome = h.pipeline.call_with(&history(), &options).await.unwrap();

    assert_eq!(outcome.iterations, 3);
    assert_eq!(outcome.termination, Termination::BudgetExhausted);
    assert_eq!(outcome.rebuttal.text, "draft 3");
    assert_eq!(outcome.verdicts.len(), 3);
    assert_eq!(h.judge.calls(), 3);
    assert_eq!(h.feedback.calls(), 2);
}

#[tokio::test]
async fn gradients_flow_into_the_next_iteration() {
    let h = harness(&[false]);
    let options = CallOptions::default().with_max_iterations(3);
    h.pipeline.call_with(&history(), &options).await.unwrap();

    let summarizer_grads = h.summarizer.grads.lock().unwrap().clone();
    assert_eq!(
        summarizer_grads,
        vec![vec![], vec!["s1".to_string()], vec!["s2".to_string()]]
    );
    let rebuttal_grads = h.rebuttal.grads.lock().unwrap().clone();
    assert_eq!(
        rebuttal_grads,
        vec![vec![], vec!["r1".to_string()], vec!["r2".to_string()]]
    );

    let seen = h.feedback.seen.lock().unwrap().clone();
    assert_eq!(seen[0], ("draft 1".to_string(), Some("fix #1".to_string())));
    assert_eq!(seen[1], ("draft 2".to_string(), Some("fix #2".to_string())));
}

#[tokio::test]
async fn single_iteration_budget_returns_first_rebuttal() {
    let h = harness(&[false]);
    let options = CallOptions::default().with_max_iterations(1);

    let outcome = h.pipeline.call_with(&history(), &options).await.unwrap();

    assert_eq!(outcome.iterations, 1);
    assert_eq!(outcome.rebuttal.text, "draft 1");
    assert_eq!(h.judge.calls(), 1);
    assert_eq!(h.feedback.calls(), 0);
}

#[tokio::test]
async fn zero_budget_runs_one_iteration() {
    let h = harness(&[false]);
    let options = CallOptions::default().with_max_iterations(0);

    let outcome = h.pipeline.call_with(&history(), &options).await.unwrap();

    assert_eq!(outcome.iterations, 1);
    assert_eq!(outcome.termination, Termination::BudgetExhausted);
}

#[tokio::test]
async fn passing_judge_stops_after_one_iteration() {
    let h = harness(&[true]);

    let reply = h.pipeline.call(&history()).await.unwrap();

    assert_eq!(reply.text, "draft 1 (approved)");
    assert_eq!(h.judge.calls(), 1);
    assert_eq!(h.feedback.calls(), 0);
}

#[tokio::test]
async fn pass_on_second_iteration_returns_judged_rebuttal() {
    let h = harness(&[false, true]);

    let outcome = h
        .pipeline
        .call_with(&history(), &CallOptions::default())
        .await
        .unwrap();

    assert_eq!(outcome.iterations, 2);
    assert_eq!(outcome.termination, Termination::Accepted);
    assert_eq!(outcome.rebuttal.text, "draft 2 (approved)");
    assert_eq!(h.feedback.calls(), 1);
    assert!(!outcome.verdicts[0].passed);
    assert!(outcome.verdicts[1].passed);
}

#[tokio::test]
async fn default_budget_is_five() {
    let h = harness(&[false]);
    let outcome = h
        .pipeline
        .call_with(&history(), &CallOptions::default())
        .await
        .unwrap();
    assert_eq!(outcome.iterations, 5);
    assert_eq!(h.feedback.calls(), 4);
}

#[tokio::test(start_paused = true)]
async fn slow_step_times_out() {
    let h = harness_with(
        RecordingSummarizer {
            delay: Some(Duration::from_secs(30)),
            ..Default::default()
        },
        &[true],
    );
    let options = CallOptions::default().with_step_timeout(Duration::from_secs(1));

    let err = h.pipeline.call_with(&history(), &options).await.unwrap_err();

    match err {
        CritiqueError::StepTimeout { role, timeout } => {
            assert_eq!(role, RoleName::Summarizer);
            assert_eq!(timeout, Duration::from_secs(1));
        }
        other => panic!("expected timeout, got {other:?}"),
    }
    assert_eq!(h.judge.calls(), 0);
}

#[tokio::test]
async fn cancelled_call_aborts_before_any_role_finishes() {
    let h = harness(&[true]);
    let token = CancellationToken::new();
    token.cancel();
    let options = CallOptions::default().with_cancel(token);

    let err = h.pipeline.call_with(&history(), &options).await.unwrap_err();

    assert!(matches!(
        err,
        CritiqueError::Cancelled {
            role: RoleName::Summarizer
        }
    ));
    assert_eq!(h.judge.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn cancellation_mid_step_is_observed() {
    let h = harness_with(
        RecordingSummarizer {
            delay: Some(Duration::from_secs(60)),
            ..Default::default()
        },
        &[true],
    );
    let token = CancellationToken::new();
    let options = CallOptions::default().with_cancel(token.clone());

    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(5)).await;
        token.cancel();
    });
    let err = h.pipeline.call_with(&history(), &options).await.unwrap_err();
    canceller.await.unwrap();

    assert!(matches!(err, CritiqueError::Cancelled { .. }));
}

#[tokio::test]
async fn metadata_reports_injected_modules() {
    let h = harness(&[true]);
    let meta = h.pipeline.metadata();
    assert_eq!(
        meta.get(RoleName::Judge).map(|m| m.implementation.as_str()),
        Some("QueuedJudge")
    );
    assert_eq!(meta.iter().count(), 4);
    assert_eq!(h.pipeline.key(), &default_template().canonical_key());
}

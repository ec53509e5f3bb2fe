//! Judge implementations: `v1` (rubric scoring) and `none` (always passes).

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::warn;

use super::{Judge, JudgeOutcome, ModuleContext, RoleModule, NO_SUMMARY};
use crate::domain::{ConversationHistory, JudgeVerdict, RebuttalResult, Summary};
use crate::error::Result;
use crate::parse::{as_f64, normalize_scores, parse_object, Parsed};

const SYSTEM: &str = "You are the Judge sub-module for a debate assistant. \
Score the assistant's rebuttal on what a constructive counterargument requires \
and give actionable guidance.";

/// Rubric metrics, each scored 0-25.
const RUBRIC: [(&str, &str); 4] = [
    (
        "context_alignment",
        "does it accurately reflect the user's claim and the conversation so far",
    ),
    (
        "evidence_quality",
        "are the facts, evidence and sources accurate and sufficient",
    ),
    ("civility", "is the tone polite and cooperative"),
    (
        "actionability",
        "is it concrete enough to move the conversation forward",
    ),
];

pub const PASS_THRESHOLD: f64 = 90.0;

pub fn build_v1(model: &str, ctx: &ModuleContext) -> Arc<dyn Judge> {
    Arc::new(JudgeV1 {
        model: model.to_string(),
        ctx: ctx.clone(),
        pass_threshold: PASS_THRESHOLD,
        last_total_score: Mutex::new(None),
    })
}

pub fn build_none(model: &str, _ctx: &ModuleContext) -> Arc<dyn Judge> {
    Arc::new(NoJudge {
        model: model.to_string(),
    })
}

/// Scores the rebuttal on four metrics and passes it at or above the threshold.
pub struct JudgeV1 {
    model: String,
    ctx: ModuleContext,
    pass_threshold: f64,
    last_total_score: Mutex<Option<f64>>,
}

impl JudgeV1 {
    fn prompt(
        &self,
        history: &ConversationHistory,
        summary: &Summary,
        rebuttal: &RebuttalResult,
    ) -> String {
        let refs = if rebuttal.references.is_empty() {
            "(no references)".to_string()
        } else {
            rebuttal
                .references
                .iter()
                .map(|(title, url)| format!("- {title}: {url}"))
                .collect::<Vec<_>>()
                .join("\n")
        };
        let metric_lines = RUBRIC
            .iter()
            .map(|(key, desc)| format!("- {key}: {desc}"))
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            "Conversation:\n{}\n\nSummary:\n{}\n\nAssistant rebuttal:\n{}\n\nReferences:\n{refs}\n\n\
             Score each metric from 0 to 25 (100 in total) and compute the total:\n{metric_lines}\n\
             JSON format: {{\"scores\": {{\"context_alignment\": number, \"evidence_quality\": number, \
             \"civility\": number, \"actionability\": number}}, \"total_score\": number, \"feedback\": \"...\"}}.\n\
             The feedback must name 2-3 concrete improvements.",
            history.render(),
            summary.render().unwrap_or_else(|| NO_SUMMARY.to_string()),
            rebuttal.text,
        )
    }

    fn verdict_from(&self, reply: &str) -> JudgeVerdict {
        let obj = match parse_object(reply) {
            Parsed::Structured(obj) => obj,
            Parsed::Unparseable => {
                warn!(
                    implementation = self.implementation(),
                    "judge reply was not structured; treating as not passed"
                );
                return JudgeVerdict::fail(None);
            }
        };

        let scores = normalize_scores(obj.get("scores"));
        let total = obj
            .get("total_score")
            .and_then(as_f64)
            .unwrap_or_else(|| scores.values().sum());
        let feedback = obj
            .get("feedback")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        JudgeVerdict {
            passed: total >= self.pass_threshold,
            score: Some(total),
            feedback,
        }
    }
}

impl RoleModule for JudgeV1 {
    fn implementation(&self) -> &'static str {
        "JudgeV1"
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl Judge for JudgeV1 {
    async fn judge(
        &self,
        history: &ConversationHistory,
        summary: &Summary,
        rebuttal: RebuttalResult,
    ) -> Result<JudgeOutcome> {
        let prompt = self.prompt(history, summary, &rebuttal);
        let reply = self
            .ctx
            .generate("judge", self.implementation(), &self.model, SYSTEM, &prompt)
            .await?;

        let verdict = self.verdict_from(&reply);
        if let Ok(mut last) = self.last_total_score.lock() {
            *last = verdict.score;
        }
        Ok(JudgeOutcome { verdict, rebuttal })
    }

    fn pass_threshold(&self) -> Option<f64> {
        Some(self.pass_threshold)
    }

    fn last_total_score(&self) -> Option<f64> {
        self.last_total_score.lock().ok().and_then(|s| *s)
    }
}

/// Passes every rebuttal untouched.
pub struct NoJudge {
    model: String,
}

impl RoleModule for NoJudge {
    fn implementation(&self) -> &'static str {
        "NoJudge"
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl Judge for NoJudge {
    async fn judge(
        &self,
        _history: &ConversationHistory,
        _summary: &Summary,
        rebuttal: RebuttalResult,
    ) -> Result<JudgeOutcome> {
        Ok(JudgeOutcome {
            verdict: JudgeVerdict::pass(),
            rebuttal,
        })
    }
}

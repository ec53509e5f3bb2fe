//! Feedback generator: turns judge diagnostics into a gradient.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use super::{FeedbackGenerator, ModuleContext, RoleModule, NO_SUMMARY};
use crate::domain::{ConversationHistory, Gradient, RebuttalResult, Summary};
use crate::error::Result;
use crate::parse::{normalize_string_list, parse_object, Parsed};

const SYSTEM: &str = "You analyze judge diagnostics and propose targeted adjustments \
for the Summarizer and Rebuttal sub-modules of a debate assistant. \
Deliver concise numbered steps in the language of the dialogue.";

const MISSING_FEEDBACK: &str =
    "The internal judge gave no feedback; improve clarity, evidence and tone.";

pub fn build_v1(model: &str, ctx: &ModuleContext) -> Arc<dyn FeedbackGenerator> {
    Arc::new(FeedbackV1 {
        model: model.to_string(),
        ctx: ctx.clone(),
    })
}

pub struct FeedbackV1 {
    model: String,
    ctx: ModuleContext,
}

fn parse_gradient(reply: &str) -> Gradient {
    match parse_object(reply) {
        Parsed::Structured(obj) => Gradient {
            summarizer_grad: normalize_string_list(obj.get("summarizer_grad")),
            rebuttal_grad: normalize_string_list(obj.get("rebuttal_grad")),
        },
        Parsed::Unparseable => {
            warn!("feedback reply was not structured; using an empty gradient");
            Gradient::default()
        }
    }
}

impl RoleModule for FeedbackV1 {
    fn implementation(&self) -> &'static str {
        "FeedbackV1"
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl FeedbackGenerator for FeedbackV1 {
    async fn feedback(
        &self,
        history: &ConversationHistory,
        summary: &Summary,
        rebuttal: &RebuttalResult,
        feedback: Option<&str>,
    ) -> Result<Gradient> {
        let prompt = format!(
            "Conversation:\n{}\n\nCurrent summary:\n{}\n\nCurrent rebuttal:\n{}\n\n\
             Internal judge feedback:\n{}\n\n\
             Write 2-3 concrete instructions each for the Summarizer and the Rebuttal module \
             to apply on the next attempt, keeping the two lists separate.\n\
             JSON format: {{\"summarizer_grad\": [\"...\"], \"rebuttal_grad\": [\"...\"]}}",
            history.render(),
            summary.render().unwrap_or_else(|| NO_SUMMARY.to_string()),
            rebuttal.text,
            feedback.unwrap_or(MISSING_FEEDBACK),
        );
        let reply = self
            .ctx
            .generate("feedback", self.implementation(), &self.model, SYSTEM, &prompt)
            .await?;
        Ok(parse_gradient(&reply))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use critique_clients::fakes::{ScriptedGenerator, StaticSearch};
    use critique_clients::CapabilityClients;

    #[test]
    fn gradient_lists_are_normalized() {
        let grad = parse_gradient(
            r#"```json
{"summarizer_grad": "capture the user's statistic", "rebuttal_grad": ["cite WHO", "", "shorter"]}
```"#,
        );
        assert_eq!(grad.summarizer_grad, vec!["capture the user's statistic"]);
        assert_eq!(grad.rebuttal_grad, vec!["cite WHO", "shorter"]);
    }

    #[test]
    fn prose_reply_yields_empty_gradient() {
        assert!(parse_gradient("1. be nicer\n2. cite more").is_empty());
    }

    #[tokio::test]
    async fn missing_judge_feedback_uses_placeholder() {
        let generator = Arc::new(ScriptedGenerator::new().with_default("{}"));
        let ctx = ModuleContext::new(CapabilityClients::new(
            generator.clone(),
            Arc::new(StaticSearch::empty()),
        ));
        let feedback = build_v1("gpt-4o-mini", &ctx);
        let grad = feedback
            .feedback(
                &ConversationHistory::new(),
                &Summary::default(),
                &RebuttalResult::new("r"),
                None,
            )
            .await
            .unwrap();
        assert!(grad.is_empty());
        assert!(generator.calls()[0].user.contains(MISSING_FEEDBACK));
    }
}

//! Summarizer implementations: `v1` (model-backed) and `noop`.

use std::sync::Arc;

use async_trait::async_trait;

use super::{improvement_block, ModuleContext, RoleModule, Summarizer};
use crate::domain::{ConversationHistory, Speaker, Summary};
use crate::error::Result;
use crate::parse::parse_bullet_list;

const SYSTEM: &str = "You are the Summarizer sub-module inside a debate assistant. \
Compress the multi-turn dialogue into a briefing that highlights the user's stance, \
the assistant's prior rebuttals, and unresolved issues. \
Reply in the language of the dialogue.";

/// Transcripts at or under this many words get a single bullet.
const SHORT_TRANSCRIPT_WORDS: usize = 20;

pub fn build_v1(model: &str, ctx: &ModuleContext) -> Arc<dyn Summarizer> {
    Arc::new(SummarizerV1 {
        model: model.to_string(),
        ctx: ctx.clone(),
    })
}

pub fn build_noop(model: &str, _ctx: &ModuleContext) -> Arc<dyn Summarizer> {
    Arc::new(NoopSummarizer {
        model: model.to_string(),
    })
}

/// Per-speaker bullet summaries plus open questions.
pub struct SummarizerV1 {
    model: String,
    ctx: ModuleContext,
}

impl SummarizerV1 {
    async fn summarize_speaker(
        &self,
        transcript: &str,
        label: &str,
        grad: &[String],
    ) -> Result<Vec<String>> {
        if transcript.is_empty() {
            return Ok(Vec::new());
        }
        let limit = if transcript.split_whitespace().count() <= SHORT_TRANSCRIPT_WORDS {
            "exactly 1 bullet"
        } else {
            "1 to 3 bullets"
        };
        let prompt = format!(
            "Here is everything the {label} said:\n{transcript}\n\n\
             Summarize their key claims as a bullet list with {limit}. \
             Use only information that is present; never invent content.{}",
            improvement_block(grad)
        );
        let reply = self
            .ctx
            .generate(
                &format!("summarizer.{label}"),
                self.implementation(),
                &self.model,
                SYSTEM,
                &prompt,
            )
            .await?;
        Ok(parse_bullet_list(&reply))
    }

    async fn open_questions(
        &self,
        history: &ConversationHistory,
        user_summary: &[String],
        assistant_summary: &[String],
        grad: &[String],
    ) -> Result<Vec<String>> {
        let block = |lines: &[String]| {
            if lines.is_empty() {
                "- (none)".to_string()
            } else {
                lines
                    .iter()
                    .map(|l| format!("- {l}"))
                    .collect::<Vec<_>>()
                    .join("\n")
            }
        };
        let prompt = format!(
            "Conversation:\n{}\n\nUser summary:\n{}\n\nAssistant summary:\n{}\n\n\
             List 1 to 3 unresolved issues or follow-up questions as bullets. \
             Do not raise questions the conversation gives no basis for.{}",
            history.render(),
            block(user_summary),
            block(assistant_summary),
            improvement_block(grad)
        );
        let reply = self
            .ctx
            .generate(
                "summarizer.open_questions",
                self.implementation(),
                &self.model,
                SYSTEM,
                &prompt,
            )
            .await?;
        Ok(parse_bullet_list(&reply))
    }
}

impl RoleModule for SummarizerV1 {
    fn implementation(&self) -> &'static str {
        "SummarizerV1"
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl Summarizer for SummarizerV1 {
    async fn summarize(&self, history: &ConversationHistory, grad: &[String]) -> Result<Summary> {
        let user_summary = self
            .summarize_speaker(&history.transcript(Speaker::User), "user", grad)
            .await?;
        let assistant_summary = self
            .summarize_speaker(&history.transcript(Speaker::Assistant), "assistant", grad)
            .await?;
        let open_questions = self
            .open_questions(history, &user_summary, &assistant_summary, grad)
            .await?;

        Ok(Summary {
            user_summary,
            assistant_summary,
            open_questions,
        })
    }
}

/// Always returns an empty summary and never calls a model.
pub struct NoopSummarizer {
    model: String,
}

impl RoleModule for NoopSummarizer {
    fn implementation(&self) -> &'static str {
        "NoopSummarizer"
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl Summarizer for NoopSummarizer {
    async fn summarize(&self, _history: &ConversationHistory, _grad: &[String]) -> Result<Summary> {
        Ok(Summary::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use critique_clients::fakes::{ScriptedGenerator, StaticSearch};
    use critique_clients::CapabilityClients;

    fn ctx(generator: Arc<ScriptedGenerator>) -> ModuleContext {
        ModuleContext::new(CapabilityClients::new(
            generator,
            Arc::new(StaticSearch::empty()),
        ))
    }

    #[tokio::test]
    async fn v1_summarizes_each_speaker_and_open_questions() {
        let generator = Arc::new(
            ScriptedGenerator::new()
                .on("everything the user said", "- coffee is harmful")
                .on("everything the assistant said", "- moderate intake is fine")
                .on("follow-up questions", "- what dose is harmful?"),
        );
        let summarizer = build_v1("gpt-4o-mini", &ctx(generator.clone()));

        let mut history = ConversationHistory::new();
        history.push_user("Coffee is harmful.");
        history.push_assistant("Moderate intake is fine.");

        let summary = summarizer.summarize(&history, &[]).await.unwrap();
        assert_eq!(summary.user_summary, vec!["coffee is harmful"]);
        assert_eq!(summary.assistant_summary, vec!["moderate intake is fine"]);
        assert_eq!(summary.open_questions, vec!["what dose is harmful?"]);
        assert_eq!(generator.call_count(), 3);
        assert!(generator.calls().iter().all(|c| c.model == "gpt-4o-mini"));
    }

    #[tokio::test]
    async fn v1_skips_silent_speaker_and_injects_grad() {
        let generator = Arc::new(ScriptedGenerator::new().with_default("- point"));
        let summarizer = build_v1("m", &ctx(generator.clone()));

        let mut history = ConversationHistory::new();
        history.push_user("Short claim.");

        let grad = vec!["mention the user's evidence".to_string()];
        let summary = summarizer.summarize(&history, &grad).await.unwrap();
        assert!(summary.assistant_summary.is_empty());
        // user summary + open questions only
        assert_eq!(generator.call_count(), 2);

        let calls = generator.calls();
        assert!(calls[0].user.contains("exactly 1 bullet"));
        assert!(calls[0].user.contains("- mention the user's evidence"));
        assert!(calls[1].user.contains("[Improvement instructions]"));
    }

    #[tokio::test]
    async fn v1_long_transcript_allows_three_bullets() {
        let generator = Arc::new(ScriptedGenerator::new().with_default("- a"));
        let summarizer = build_v1("m", &ctx(generator.clone()));

        let mut history = ConversationHistory::new();
        history.push_user("word ".repeat(25));
        summarizer.summarize(&history, &[]).await.unwrap();
        assert!(generator.calls()[0].user.contains("1 to 3 bullets"));
    }

    #[tokio::test]
    async fn noop_makes_no_calls() {
        let generator = Arc::new(ScriptedGenerator::new());
        let summarizer = build_noop("gpt-4o-mini", &ctx(generator.clone()));

        let mut history = ConversationHistory::new();
        history.push_user("anything");
        let summary = summarizer.summarize(&history, &["x".into()]).await.unwrap();
        assert!(summary.is_empty());
        assert_eq!(generator.call_count(), 0);
        assert_eq!(summarizer.implementation(), "NoopSummarizer");
    }
}

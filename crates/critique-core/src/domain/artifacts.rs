//! Artifacts passed between roles inside one loop invocation.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Structured digest of the conversation. The loop never looks inside it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub user_summary: Vec<String>,
    pub assistant_summary: Vec<String>,
    pub open_questions: Vec<String>,
}

impl Summary {
    pub fn is_empty(&self) -> bool {
        self.user_summary.is_empty()
            && self.assistant_summary.is_empty()
            && self.open_questions.is_empty()
    }

    /// Prompt-ready text, or `None` when there is nothing to show.
    pub fn render(&self) -> Option<String> {
        if self.is_empty() {
            return None;
        }
        serde_json::to_string(self).ok()
    }
}

/// Improvement instructions for the next iteration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gradient {
    #[serde(default)]
    pub summarizer_grad: Vec<String>,
    #[serde(default)]
    pub rebuttal_grad: Vec<String>,
}

impl Gradient {
    pub fn is_empty(&self) -> bool {
        self.summarizer_grad.is_empty() && self.rebuttal_grad.is_empty()
    }
}

/// Render gradient items as `- item` lines, or `None` if there are none.
pub(crate) fn render_grad(items: &[String]) -> Option<String> {
    let lines: Vec<String> = items
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| format!("- {s}"))
        .collect();
    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}

/// A generated counter-argument with its sources.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebuttalResult {
    pub text: String,
    /// title → URL
    pub references: BTreeMap<String, String>,
}

impl RebuttalResult {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            references: BTreeMap::new(),
        }
    }

    pub fn with_reference(mut self, title: impl Into<String>, url: impl Into<String>) -> Self {
        self.references.insert(title.into(), url.into());
        self
    }

    /// `title: url; title: url` as written to batch output.
    pub fn references_line(&self) -> String {
        self.references
            .iter()
            .map(|(title, url)| format!("{title}: {url}"))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Outcome of the internal quality gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeVerdict {
    pub passed: bool,
    pub score: Option<f64>,
    pub feedback: Option<String>,
}

impl JudgeVerdict {
    pub fn pass() -> Self {
        Self {
            passed: true,
            score: None,
            feedback: None,
        }
    }

    pub fn fail(feedback: Option<String>) -> Self {
        Self {
            passed: false,
            score: None,
            feedback,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_summary_renders_none() {
        assert_eq!(Summary::default().render(), None);
        let summary = Summary {
            user_summary: vec!["claims coffee is harmful".into()],
            ..Default::default()
        };
        assert!(summary.render().unwrap().contains("claims coffee is harmful"));
    }

    #[test]
    fn grad_lines_skip_blanks() {
        let items = vec!["cite a study".to_string(), "  ".to_string(), "be brief".into()];
        assert_eq!(
            render_grad(&items).as_deref(),
            Some("- cite a study\n- be brief")
        );
        assert_eq!(render_grad(&[]), None);
    }

    #[test]
    fn references_line_joins_sorted_by_title() {
        let result = RebuttalResult::new("text")
            .with_reference("WHO", "https://who.int")
            .with_reference("CDC", "https://cdc.gov");
        assert_eq!(
            result.references_line(),
            "CDC: https://cdc.gov; WHO: https://who.int"
        );
    }
}

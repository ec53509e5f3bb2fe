//! Conversation history shared with every role.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Assistant,
}

impl Speaker {
    pub fn label(&self) -> &'static str {
        match self {
            Speaker::User => "User",
            Speaker::Assistant => "Assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Speaker,
    pub content: String,
}

/// Ordered, append-only dialogue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationHistory {
    turns: Vec<Turn>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, role: Speaker, content: impl Into<String>) {
        self.turns.push(Turn {
            role,
            content: content.into(),
        });
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.push(Speaker::User, content);
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.push(Speaker::Assistant, content);
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// `User: ...` / `Assistant: ...` lines for prompts.
    pub fn render(&self) -> String {
        self.turns
            .iter()
            .map(|t| format!("{}: {}", t.role.label(), t.content))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Everything one speaker said, one turn per line. Blank turns are skipped.
    pub fn transcript(&self, speaker: Speaker) -> String {
        self.turns
            .iter()
            .filter(|t| t.role == speaker)
            .map(|t| t.content.trim())
            .filter(|c| !c.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl FromIterator<Turn> for ConversationHistory {
    fn from_iter<I: IntoIterator<Item = Turn>>(iter: I) -> Self {
        Self {
            turns: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_labels_speakers() {
        let mut history = ConversationHistory::new();
        history.push_user("Coffee is bad for you.");
        history.push_assistant("Moderate intake is linked to benefits.");
        assert_eq!(
            history.render(),
            "User: Coffee is bad for you.\nAssistant: Moderate intake is linked to benefits."
        );
    }

    #[test]
    fn transcript_filters_by_speaker() {
        let mut history = ConversationHistory::new();
        history.push_user("a");
        history.push_assistant("b");
        history.push_user("  ");
        history.push_user("c");
        assert_eq!(history.transcript(Speaker::User), "a\nc");
        assert_eq!(history.transcript(Speaker::Assistant), "b");
    }

    #[test]
    fn serializes_as_turn_list() {
        let mut history = ConversationHistory::new();
        history.push_user("hi");
        let json = serde_json::to_string(&history).unwrap();
        assert_eq!(json, r#"[{"role":"user","content":"hi"}]"#);
    }
}

//! OpenAI-compatible chat-completions client
//!
//! Sends one system message and one user message per call and returns the
//! first choice's content. Any server speaking the chat-completions wire
//! format works by overriding `base_url`.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::CapabilityError;
use crate::traits::{CapabilityResult, TextGeneration};

const SERVICE: &str = "openai";

/// OpenAI client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    /// API root, without the trailing `/chat/completions`
    pub base_url: String,
    /// Bearer token
    pub api_key: Option<String>,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        OpenAiConfig {
            base_url: std::env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            api_key: std::env::var("OPENAI_API_KEY").ok(),
            timeout_secs: 120,
        }
    }
}

impl OpenAiConfig {
    /// Create a new config from environment variables
    pub fn from_env() -> Self {
        Self::default()
    }

    /// Set the API key, ignoring blank values
    pub fn with_api_key(mut self, key: &str) -> Self {
        if !key.trim().is_empty() {
            self.api_key = Some(key.trim().to_string());
        }
        self
    }

    /// Point the client at another chat-completions server
    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Chat-completions client
pub struct OpenAiClient {
    config: OpenAiConfig,
    http_client: reqwest::Client,
}

impl OpenAiClient {
    /// Create a new client; fails when no API key is configured
    pub fn new(config: OpenAiConfig) -> CapabilityResult<Self> {
        if config.api_key.is_none() {
            return Err(CapabilityError::NotConfigured { service: SERVICE });
        }
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("critiquebot/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(OpenAiClient {
            config,
            http_client,
        })
    }

    /// Create client from environment variables
    pub fn from_env() -> CapabilityResult<Self> {
        Self::new(OpenAiConfig::from_env())
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url)
    }
}

#[async_trait]
impl TextGeneration for OpenAiClient {
    async fn generate(&self, system: &str, user: &str, model: &str) -> CapabilityResult<String> {
        let body = ChatRequest {
            model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
        };
        let key = self.config.api_key.as_deref().unwrap_or_default();

        debug!(model = %model, prompt_chars = user.len(), "chat completion request");
        let response = self
            .http_client
            .post(self.endpoint())
            .bearer_auth(key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(model = %model, status = status.as_u16(), "chat completion failed");
            return Err(CapabilityError::Status {
                service: SERVICE,
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response.json().await?;
        extract_content(parsed)
    }
}

fn extract_content(parsed: ChatResponse) -> CapabilityResult<String> {
    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .map(|s| s.trim().to_string())
        .ok_or(CapabilityError::EmptyResponse { service: SERVICE })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_requires_api_key() {
        let config = OpenAiConfig {
            base_url: "http://localhost".into(),
            api_key: None,
            timeout_secs: 5,
        };
        assert!(matches!(
            OpenAiClient::new(config),
            Err(CapabilityError::NotConfigured { service: "openai" })
        ));
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let config = OpenAiConfig::from_env()
            .with_api_key("sk-test")
            .with_base_url("http://localhost:8080/v1/");
        let client = OpenAiClient::new(config).unwrap();
        assert_eq!(client.endpoint(), "http://localhost:8080/v1/chat/completions");
    }

    #[test]
    fn blank_key_is_ignored() {
        let config = OpenAiConfig {
            base_url: "http://localhost".into(),
            api_key: None,
            timeout_secs: 5,
        }
        .with_api_key("   ");
        assert!(config.api_key.is_none());
    }

    #[test]
    fn first_choice_content_is_trimmed() {
        let parsed: ChatResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"content":"  hello  "}},{"message":{"content":"x"}}]}"#,
        )
        .unwrap();
        assert_eq!(extract_content(parsed).unwrap(), "hello");
    }

    #[test]
    fn missing_choices_is_empty_response() {
        let parsed: ChatResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert!(matches!(
            extract_content(parsed),
            Err(CapabilityError::EmptyResponse { .. })
        ));
    }
}

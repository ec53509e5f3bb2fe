//! Tavily web-search client

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::CapabilityError;
use crate::traits::{CapabilityResult, SearchDepth, SearchHit, WebSearch};

const SERVICE: &str = "tavily";

/// Tavily configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TavilyConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl Default for TavilyConfig {
    fn default() -> Self {
        TavilyConfig {
            endpoint: std::env::var("TAVILY_ENDPOINT")
                .unwrap_or_else(|_| "https://api.tavily.com/search".to_string()),
            api_key: std::env::var("TAVILY_API_KEY").ok(),
            timeout_secs: 30,
        }
    }
}

impl TavilyConfig {
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
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    api_key: &'a str,
    query: &'a str,
    search_depth: &'a str,
    max_results: usize,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<RawHit>,
}

#[derive(Deserialize)]
struct RawHit {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    snippet: Option<String>,
}

/// Tavily search client
pub struct TavilyClient {
    config: TavilyConfig,
    http_client: reqwest::Client,
}

impl TavilyClient {
    pub fn new(config: TavilyConfig) -> CapabilityResult<Self> {
        if config.api_key.is_none() {
            return Err(CapabilityError::NotConfigured { service: SERVICE });
        }
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("critiquebot/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(TavilyClient {
            config,
            http_client,
        })
    }

    pub fn from_env() -> CapabilityResult<Self> {
        Self::new(TavilyConfig::from_env())
    }
}

#[async_trait]
impl WebSearch for TavilyClient {
    async fn search(
        &self,
        query: &str,
        depth: SearchDepth,
        max_results: usize,
    ) -> CapabilityResult<Vec<SearchHit>> {
        let body = SearchRequest {
            api_key: self.config.api_key.as_deref().unwrap_or_default(),
            query,
            search_depth: depth.as_str(),
            max_results,
        };

        debug!(query = %query, depth = %depth, max_results, "tavily search");
        let response = self
            .http_client
            .post(&self.config.endpoint)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(query = %query, status = status.as_u16(), "tavily search failed");
            return Err(CapabilityError::Status {
                service: SERVICE,
                status: status.as_u16(),
                body,
            });
        }

        let parsed: SearchResponse = response.json().await?;
        Ok(into_hits(parsed, max_results))
    }
}

/// Convert raw results, dropping entries without a URL.
fn into_hits(parsed: SearchResponse, max_results: usize) -> Vec<SearchHit> {
    parsed
        .results
        .into_iter()
        .filter_map(|raw| {
            let url = raw.url.filter(|u| !u.trim().is_empty())?;
            let title = raw
                .title
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| url.clone());
            Some(SearchHit {
                title,
                url,
                snippet: raw
                    .content
                    .or(raw.snippet)
                    .unwrap_or_default()
                    .trim()
                    .to_string(),
            })
        })
        .take(max_results)
        .collect()
}

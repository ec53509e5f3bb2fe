//! Capability trait definitions
//!
//! These traits are the only seam between the pipeline and remote services:
//! - `TextGeneration`: prompt in, text out
//! - `WebSearch`: query in, ranked snippets out
//!
//! Both traits are async and backend-agnostic. In-memory fakes are provided
//! for testing via the `fakes` module.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CapabilityError;

/// Result type for capability calls
pub type CapabilityResult<T> = std::result::Result<T, CapabilityError>;

// ---------------------------------------------------------------------------
// TextGeneration
// ---------------------------------------------------------------------------

/// A remote text-generation model.
#[async_trait]
pub trait TextGeneration: Send + Sync {
    /// Run one system + user prompt against `model` and return the trimmed reply.
    async fn generate(&self, system: &str, user: &str, model: &str) -> CapabilityResult<String>;
}

// ---------------------------------------------------------------------------
// WebSearch
// ---------------------------------------------------------------------------

/// How hard the search backend should dig.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchDepth {
    Basic,
    #[default]
    Advanced,
}

impl SearchDepth {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchDepth::Basic => "basic",
            SearchDepth::Advanced => "advanced",
        }
    }
}

impl fmt::Display for SearchDepth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One ranked search result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// A remote web-search service.
#[async_trait]
pub trait WebSearch: Send + Sync {
    async fn search(
        &self,
        query: &str,
        depth: SearchDepth,
        max_results: usize,
    ) -> CapabilityResult<Vec<SearchHit>>;
}

// ---------------------------------------------------------------------------
// Bundle
// ---------------------------------------------------------------------------

/// The capability handles every role builder receives.
#[derive(Clone)]
pub struct CapabilityClients {
    pub text: Arc<dyn TextGeneration>,
    pub search: Arc<dyn WebSearch>,
}

impl CapabilityClients {
    pub fn new(text: Arc<dyn TextGeneration>, search: Arc<dyn WebSearch>) -> Self {
        Self { text, search }
    }

    /// Clients that fail every call with `NotConfigured`, for building
    /// pipelines that are only inspected.
    pub fn unconfigured() -> Self {
        Self {
            text: Arc::new(Unconfigured),
            search: Arc::new(Unconfigured),
        }
    }
}

#[derive(Debug)]
struct Unconfigured;

#[async_trait]
impl TextGeneration for Unconfigured {
    async fn generate(&self, _system: &str, _user: &str, _model: &str) -> CapabilityResult<String> {
        Err(CapabilityError::NotConfigured {
            service: "text generation",
        })
    }
}

#[async_trait]
impl WebSearch for Unconfigured {
    async fn search(
        &self,
        _query: &str,
        _depth: SearchDepth,
        _max_results: usize,
    ) -> CapabilityResult<Vec<SearchHit>> {
        Err(CapabilityError::NotConfigured { service: "search" })
    }
}

impl fmt::Debug for CapabilityClients {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilityClients").finish_non_exhaustive()
    }
}

//! In-memory fakes for capability traits (testing only)
//!
//! Provides `ScriptedGenerator`, `FailingGenerator`, `StaticSearch`, and
//! `FailingSearch` that satisfy the trait contracts without any network.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::CapabilityError;
use crate::traits::*;

// ---------------------------------------------------------------------------
// ScriptedGenerator
// ---------------------------------------------------------------------------

/// A recorded `generate` invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationCall {
    pub system: String,
    pub user: String,
    pub model: String,
}

#[derive(Debug)]
struct Rule {
    needle: String,
    replies: VecDeque<String>,
}

/// Text generator that answers from scripted replies.
///
/// Rules are matched in insertion order against the system prompt followed by
/// the user prompt. Each rule yields its replies in order and keeps repeating
/// the last one once the queue is down to a single entry.
#[derive(Debug, Default)]
pub struct ScriptedGenerator {
    rules: Mutex<Vec<Rule>>,
    fallback: Mutex<Option<String>>,
    calls: Mutex<Vec<GenerationCall>>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `reply` for prompts containing `needle`.
    pub fn on(self, needle: &str, reply: &str) -> Self {
        {
            let mut rules = self.rules.lock().unwrap();
            match rules.iter_mut().find(|r| r.needle == needle) {
                Some(rule) => rule.replies.push_back(reply.to_string()),
                None => rules.push(Rule {
                    needle: needle.to_string(),
                    replies: VecDeque::from([reply.to_string()]),
                }),
            }
        }
        self
    }

    /// Reply used when no rule matches.
    pub fn with_default(self, reply: &str) -> Self {
        *self.fallback.lock().unwrap() = Some(reply.to_string());
        self
    }

    /// Every call seen so far, in order.
    pub fn calls(&self) -> Vec<GenerationCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Number of calls whose system or user prompt contains `needle`.
    pub fn calls_matching(&self, needle: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.system.contains(needle) || c.user.contains(needle))
            .count()
    }
}

#[async_trait]
impl TextGeneration for ScriptedGenerator {
    async fn generate(&self, system: &str, user: &str, model: &str) -> CapabilityResult<String> {
        self.calls.lock().unwrap().push(GenerationCall {
            system: system.to_string(),
            user: user.to_string(),
            model: model.to_string(),
        });

        let mut rules = self.rules.lock().unwrap();
        let hit = rules
            .iter_mut()
            .find(|r| system.contains(&r.needle) || user.contains(&r.needle));
        if let Some(rule) = hit {
            let reply = if rule.replies.len() > 1 {
                rule.replies.pop_front()
            } else {
                rule.replies.front().cloned()
            };
            if let Some(reply) = reply {
                return Ok(reply);
            }
        }

        self.fallback
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| CapabilityError::Unavailable("no scripted reply for prompt".into()))
    }
}

// ---------------------------------------------------------------------------
// FailingGenerator
// ---------------------------------------------------------------------------

/// Text generator whose every call fails.
#[derive(Debug, Default)]
pub struct FailingGenerator {
    calls: Mutex<usize>,
}

impl FailingGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn call_count(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl TextGeneration for FailingGenerator {
    async fn generate(&self, _system: &str, _user: &str, model: &str) -> CapabilityResult<String> {
        *self.calls.lock().unwrap() += 1;
        Err(CapabilityError::Unavailable(format!("model {model} is down")))
    }
}

// ---------------------------------------------------------------------------
// StaticSearch / FailingSearch
// ---------------------------------------------------------------------------

/// Search backend returning the same hits for every query.
#[derive(Debug, Default)]
pub struct StaticSearch {
    hits: Vec<SearchHit>,
    queries: Mutex<Vec<String>>,
}

impl StaticSearch {
    pub fn new(hits: Vec<SearchHit>) -> Self {
        Self {
            hits,
            queries: Mutex::new(Vec::new()),
        }
    }

    /// Backend that never finds anything.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl WebSearch for StaticSearch {
    async fn search(
        &self,
        query: &str,
        _depth: SearchDepth,
        max_results: usize,
    ) -> CapabilityResult<Vec<SearchHit>> {
        self.queries.lock().unwrap().push(query.to_string());
        Ok(self.hits.iter().take(max_results).cloned().collect())
    }
}

/// Search backend whose every call fails.
#[derive(Debug, Default)]
pub struct FailingSearch {
    calls: Mutex<usize>,
}

impl FailingSearch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn call_count(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl WebSearch for FailingSearch {
    async fn search(
        &self,
        _query: &str,
        _depth: SearchDepth,
        _max_results: usize,
    ) -> CapabilityResult<Vec<SearchHit>> {
        *self.calls.lock().unwrap() += 1;
        Err(CapabilityError::Unavailable("search backend offline".into()))
    }
}

//! Rebuttal implementations: `base`, `v1`, and search-grounded `v2`.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use critique_clients::{SearchDepth, SearchHit};
use tracing::{debug, info};

use super::{improvement_block, ModuleContext, RebuttalGenerator, RoleModule, NO_SUMMARY};
use crate::domain::{ConversationHistory, RebuttalResult, Summary};
use crate::error::Result;
use crate::metrics::METRICS;
use crate::obs;
use crate::parse::{normalize_references, normalize_string_list, parse_bullet_list, parse_object, Parsed};

const SYSTEM: &str = "You are the Rebuttal sub-module for a conversational debate assistant. \
Acknowledge the user's points in a natural, friendly tone, then present evidence-backed \
counterarguments in the language of the dialogue. Always answer with JSON containing the keys \
`rebuttal` and `references`.\n\n[SAFETY REQUIREMENTS]\n\
Never generate harmful, unethical, or inappropriate content. Even when the user's claim is \
problematic, respond with respectful, evidence-based counterarguments.";

const QUERY_SYSTEM: &str = "You are the research planner for the Rebuttal sub-module. \
You propose web search queries that would verify or refute the user's claims.";

const OUTPUT_FORMAT: &str = "Keep the rebuttal to 3-5 sentences. Output JSON \
{\"rebuttal\": \"...\", \"references\": [{\"title\": \"...\", \"url\": \"...\"}]}.";

pub fn build_base(model: &str, ctx: &ModuleContext) -> Arc<dyn RebuttalGenerator> {
    Arc::new(BaseRebuttal {
        model: model.to_string(),
        ctx: ctx.clone(),
    })
}

pub fn build_v1(model: &str, ctx: &ModuleContext) -> Arc<dyn RebuttalGenerator> {
    Arc::new(RebuttalV1 {
        model: model.to_string(),
        ctx: ctx.clone(),
    })
}

pub fn build_v2(model: &str, ctx: &ModuleContext) -> Arc<dyn RebuttalGenerator> {
    Arc::new(RebuttalV2 {
        model: model.to_string(),
        ctx: ctx.clone(),
        max_queries: 3,
        hits_per_query: 3,
        depth: SearchDepth::Advanced,
    })
}

/// Rebuttal text from a model reply. A reply without the expected JSON is
/// taken verbatim with no references.
fn parse_rebuttal(reply: &str) -> RebuttalResult {
    match parse_object(reply) {
        Parsed::Structured(obj) => {
            let text = obj
                .get("rebuttal")
                .and_then(|v| v.as_str())
                .unwrap_or(reply)
                .trim()
                .to_string();
            RebuttalResult {
                text,
                references: normalize_references(obj.get("references")),
            }
        }
        Parsed::Unparseable => RebuttalResult::new(reply.trim()),
    }
}

fn summary_text(summary: &Summary) -> String {
    summary.render().unwrap_or_else(|| NO_SUMMARY.to_string())
}

/// Counter-argument from the conversation alone.
pub struct BaseRebuttal {
    model: String,
    ctx: ModuleContext,
}

impl RoleModule for BaseRebuttal {
    fn implementation(&self) -> &'static str {
        "BaseRebuttal"
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl RebuttalGenerator for BaseRebuttal {
    async fn rebut(
        &self,
        history: &ConversationHistory,
        _summary: &Summary,
        _grad: &[String],
    ) -> Result<RebuttalResult> {
        let prompt = format!(
            "Conversation:\n{}\n\nWrite a courteous counter-argument to the user's latest claim. {OUTPUT_FORMAT}",
            history.render()
        );
        let reply = self
            .ctx
            .generate("rebuttal", self.implementation(), &self.model, SYSTEM, &prompt)
            .await?;
        Ok(parse_rebuttal(&reply))
    }
}

/// Counter-argument from the conversation and its summary.
pub struct RebuttalV1 {
    model: String,
    ctx: ModuleContext,
}

impl RoleModule for RebuttalV1 {
    fn implementation(&self) -> &'static str {
        "RebuttalV1"
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl RebuttalGenerator for RebuttalV1 {
    async fn rebut(
        &self,
        history: &ConversationHistory,
        summary: &Summary,
        grad: &[String],
    ) -> Result<RebuttalResult> {
        let prompt = format!(
            "Conversation:\n{}\n\nSummary:\n{}\n\n\
             Briefly acknowledge the user's point, then rebut it with facts you can attribute \
             to a named source. {OUTPUT_FORMAT}{}",
            history.render(),
            summary_text(summary),
            improvement_block(grad)
        );
        let reply = self
            .ctx
            .generate("rebuttal", self.implementation(), &self.model, SYSTEM, &prompt)
            .await?;
        Ok(parse_rebuttal(&reply))
    }
}

/// Hits gathered for one search query.
#[derive(Debug, Clone)]
struct Evidence {
    query: String,
    hits: Vec<SearchHit>,
}

/// Counter-argument grounded in web-search evidence.
///
/// Plans up to `max_queries` searches, collects `hits_per_query` results for
/// each, and asks the model to argue only from that evidence. A failed
/// search counts as zero results. When the model cites nothing, the
/// references fall back to every distinct source that was retrieved.
pub struct RebuttalV2 {
    model: String,
    ctx: ModuleContext,
    max_queries: usize,
    hits_per_query: usize,
    depth: SearchDepth,
}

impl RebuttalV2 {
    async fn plan_queries(
        &self,
        convo: &str,
        summary: &str,
        grad: &[String],
    ) -> Result<Vec<String>> {
        let prompt = format!(
            "Read the conversation and summary, then propose 1 to {} search queries that \
             would help prepare a sound rebuttal. Prefer concrete questions about facts, \
             statistics, or cases. JSON format: {{\"queries\": [\"...\"]}}.\n\n\
             Conversation:\n{convo}\n\nSummary:\n{summary}{}",
            self.max_queries,
            improvement_block(grad)
        );
        let reply = self
            .ctx
            .generate(
                "rebuttal.queries",
                self.implementation(),
                &self.model,
                QUERY_SYSTEM,
                &prompt,
            )
            .await?;

        let mut candidates = match parse_object(&reply) {
            Parsed::Structured(obj) => normalize_string_list(obj.get("queries")),
            Parsed::Unparseable => Vec::new(),
        };
        if candidates.is_empty() {
            candidates = parse_bullet_list(&reply)
                .into_iter()
                .filter(|line| !line.starts_with('{'))
                .collect();
        }
        let mut queries: Vec<String> = Vec::new();
        for q in candidates {
            if !queries.contains(&q) {
                queries.push(q);
            }
            if queries.len() >= self.max_queries {
                break;
            }
        }
        debug!(count = queries.len(), ?queries, "planned search queries");
        Ok(queries)
    }

    async fn gather(&self, queries: &[String]) -> Vec<Evidence> {
        let mut evidence = Vec::new();
        for (idx, query) in queries.iter().enumerate() {
            let hits = match self
                .ctx
                .clients
                .search
                .search(query, self.depth, self.hits_per_query)
                .await
            {
                Ok(hits) => hits,
                Err(e) => {
                    METRICS.inc_search_failures();
                    obs::emit_search_degraded(query, &e);
                    Vec::new()
                }
            };
            info!(
                query = %query,
                position = idx + 1,
                of = queries.len(),
                hits = hits.len(),
                "search completed"
            );
            if !hits.is_empty() {
                evidence.push(Evidence {
                    query: query.clone(),
                    hits: hits.into_iter().take(self.hits_per_query).collect(),
                });
            }
        }
        evidence
    }
}

fn evidence_block(evidence: &[Evidence]) -> String {
    if evidence.is_empty() {
        return "(no search results)".to_string();
    }
    let mut lines = Vec::new();
    for block in evidence {
        lines.push(format!("[query] {}", block.query));
        for (idx, hit) in block.hits.iter().enumerate() {
            let snippet = if hit.snippet.is_empty() {
                "(no snippet)"
            } else {
                hit.snippet.as_str()
            };
            lines.push(format!("  - ({}) title: {}", idx + 1, hit.title));
            lines.push(format!("    url: {}", hit.url));
            lines.push(format!("    snippet: {snippet}"));
        }
    }
    lines.join("\n")
}

/// First URL seen for each distinct title.
fn reference_pool(evidence: &[Evidence]) -> BTreeMap<String, String> {
    let mut refs = BTreeMap::new();
    for hit in evidence.iter().flat_map(|e| e.hits.iter()) {
        if !hit.title.is_empty() && !hit.url.is_empty() {
            refs.entry(hit.title.clone()).or_insert_with(|| hit.url.clone());
        }
    }
    refs
}

impl RoleModule for RebuttalV2 {
    fn implementation(&self) -> &'static str {
        "RebuttalV2"
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl RebuttalGenerator for RebuttalV2 {
    async fn rebut(
        &self,
        history: &ConversationHistory,
        summary: &Summary,
        grad: &[String],
    ) -> Result<RebuttalResult> {
        let convo = history.render();
        let summary = summary_text(summary);

        let queries = self.plan_queries(&convo, &summary, grad).await?;
        let evidence = self.gather(&queries).await;

        let prompt = format!(
            "Conversation:\n{convo}\n\nSummary:\n{summary}\n\nSearch evidence:\n{}\n\n\
             Using only facts stated in the search evidence and the summary, write a natural, \
             friendly rebuttal. Briefly acknowledge the user's claim, then calmly rebut it, \
             mentioning in the text which result each piece of evidence came from. \
             {OUTPUT_FORMAT}{}",
            evidence_block(&evidence),
            improvement_block(grad)
        );
        let reply = self
            .ctx
            .generate("rebuttal", self.implementation(), &self.model, SYSTEM, &prompt)
            .await?;

        let mut result = parse_rebuttal(&reply);
        if result.references.is_empty() {
            result.references = reference_pool(&evidence);
        }
        Ok(result)
    }
}

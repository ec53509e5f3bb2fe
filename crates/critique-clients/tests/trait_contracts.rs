//! Contract tests for capability traits against the in-memory fakes.

use std::sync::Arc;

use critique_clients::fakes::{FailingGenerator, FailingSearch, ScriptedGenerator, StaticSearch};
use critique_clients::{CapabilityClients, SearchDepth, SearchHit, TextGeneration, WebSearch};

fn hit(n: usize) -> SearchHit {
    SearchHit {
        title: format!("Source {n}"),
        url: format!("https://example.org/{n}"),
        snippet: format!("snippet {n}"),
    }
}

#[tokio::test]
async fn scripted_generator_matches_rules_in_order() {
    let generator = ScriptedGenerator::new()
        .on("Judge", r#"{"total_score": 10}"#)
        .on("Judge", r#"{"total_score": 95}"#)
        .with_default("fallback");

    let first = generator.generate("Judge sub-module", "x", "m").await.unwrap();
    let second = generator.generate("Judge sub-module", "x", "m").await.unwrap();
    let third = generator.generate("Judge sub-module", "x", "m").await.unwrap();
    let other = generator.generate("Summarizer", "x", "m").await.unwrap();

    assert_eq!(first, r#"{"total_score": 10}"#);
    assert_eq!(second, r#"{"total_score": 95}"#);
    // last reply repeats once the queue is drained
    assert_eq!(third, r#"{"total_score": 95}"#);
    assert_eq!(other, "fallback");
    assert_eq!(generator.call_count(), 4);
    assert_eq!(generator.calls_matching("Judge"), 3);
}

#[tokio::test]
async fn scripted_generator_without_match_fails() {
    let generator = ScriptedGenerator::new().on("Rebuttal", "r");
    assert!(generator.generate("Judge", "x", "m").await.is_err());
}

#[tokio::test]
async fn scripted_generator_records_model() {
    let generator = ScriptedGenerator::new().with_default("ok");
    generator.generate("s", "u", "gpt-4o-mini").await.unwrap();
    let calls = generator.calls();
    assert_eq!(calls[0].model, "gpt-4o-mini");
    assert_eq!(calls[0].user, "u");
}

#[tokio::test]
async fn failing_generator_counts_calls() {
    let generator = FailingGenerator::new();
    assert!(generator.generate("s", "u", "m").await.is_err());
    assert!(generator.generate("s", "u", "m").await.is_err());
    assert_eq!(generator.call_count(), 2);
}

#[tokio::test]
async fn static_search_truncates_and_records() {
    let search = StaticSearch::new(vec![hit(1), hit(2), hit(3), hit(4)]);
    let hits = search
        .search("is coffee healthy", SearchDepth::Advanced, 3)
        .await
        .unwrap();
    assert_eq!(hits.len(), 3);
    assert_eq!(search.queries(), vec!["is coffee healthy".to_string()]);
}

#[tokio::test]
async fn failing_search_errors() {
    let search = FailingSearch::new();
    assert!(search.search("q", SearchDepth::Basic, 3).await.is_err());
    assert_eq!(search.call_count(), 1);
}

#[tokio::test]
async fn bundle_is_usable_as_trait_objects() {
    let clients = CapabilityClients::new(
        Arc::new(ScriptedGenerator::new().with_default("hello")),
        Arc::new(StaticSearch::empty()),
    );
    assert_eq!(clients.text.generate("s", "u", "m").await.unwrap(), "hello");
    assert!(clients
        .search
        .search("q", SearchDepth::Advanced, 3)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn unconfigured_clients_refuse_every_call() {
    let clients = CapabilityClients::unconfigured();
    let err = clients.text.generate("s", "u", "m").await.unwrap_err();
    assert!(err.to_string().contains("not configured"));
    assert!(clients
        .search
        .search("q", SearchDepth::Basic, 3)
        .await
        .is_err());
}

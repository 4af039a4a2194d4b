//! Fallback controller behavior: a failing dense leg degrades the engine
//! to sparse-only retrieval while preserving the response contract.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use medrag::{
    EmbedConfig, EngineConfig, EngineState, ExtractiveGenerator, RagEngine, RetryConfig,
};
use serde_json::json;
use tempfile::TempDir;

fn write_corpus(dir: &Path) {
    let docs = json!([
        {"id": "d1", "title": "Diabetes", "content": "penyakit gula darah metabolik"},
        {"id": "d2", "title": "Hipertensi", "content": "tekanan darah tinggi kronis"}
    ]);
    fs::write(dir.join("medical.json"), docs.to_string()).unwrap();
}

/// An embedder pointed at a dead endpoint: every embedding call fails with
/// an upstream transport error after its retry.
fn unreachable_embed_config() -> EmbedConfig {
    EmbedConfig::api("http://127.0.0.1:9", "test-key")
        .with_retry(RetryConfig::default().with_base_delay_ms(10))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn dense_leg_failure_degrades_to_sparse_fallback() {
    let dir = TempDir::new().unwrap();
    write_corpus(dir.path());

    // The build drops every document from the dense index (embedding is
    // unreachable) but BM25 still indexes the full corpus.
    let config = EngineConfig::new(dir.path()).with_embed(unreachable_embed_config());
    let engine = RagEngine::load_or_build(config, Arc::new(ExtractiveGenerator))
        .await
        .unwrap();
    assert_eq!(engine.stats().dense_vectors, 0);
    assert_eq!(engine.stats().sparse_documents, 2);
    assert_eq!(engine.state(), EngineState::Hybrid);

    // The query-time embedding fails too: the hybrid path errors, the
    // controller degrades toward the surviving sparse leg, and the retry
    // succeeds without surfacing any exception to the caller.
    let result = engine.query("tekanan darah tinggi", Some(3), None).await;
    assert!(result.error.is_none());
    assert!(!result.metadata.error);
    assert_eq!(result.metadata.engine, "sparse_fallback");
    assert!(!result.retrieved_documents.is_empty());
    assert_eq!(result.retrieved_documents[0].title, "Hipertensi");
    assert_eq!(engine.state(), EngineState::DegradedSparse);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn degraded_state_persists_for_subsequent_queries() {
    let dir = TempDir::new().unwrap();
    write_corpus(dir.path());

    let config = EngineConfig::new(dir.path()).with_embed(unreachable_embed_config());
    let engine = RagEngine::load_or_build(config, Arc::new(ExtractiveGenerator))
        .await
        .unwrap();

    let first = engine.query("gula darah", Some(3), None).await;
    assert_eq!(first.metadata.engine, "sparse_fallback");

    // The second query starts directly on the degraded path.
    let second = engine.query("tekanan darah", Some(3), None).await;
    assert_eq!(second.metadata.engine, "sparse_fallback");
    assert!(!second.retrieved_documents.is_empty());
    assert_eq!(engine.state(), EngineState::DegradedSparse);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn degradation_is_per_engine_instance() {
    let dir = TempDir::new().unwrap();
    write_corpus(dir.path());

    let broken = RagEngine::load_or_build(
        EngineConfig::new(dir.path()).with_embed(unreachable_embed_config()),
        Arc::new(ExtractiveGenerator),
    )
    .await
    .unwrap();
    broken.query("darah", Some(2), None).await;
    assert_eq!(broken.state(), EngineState::DegradedSparse);

    // A healthy engine over the same data is unaffected: the degradation
    // flag lives in the instance, not in process-wide state.
    let healthy = RagEngine::load_or_build(
        EngineConfig::new(dir.path()).with_embed(EmbedConfig::hash(64)),
        Arc::new(ExtractiveGenerator),
    )
    .await
    .unwrap();
    let result = healthy.query("darah", Some(2), None).await;
    assert_eq!(result.metadata.engine, "hybrid");
    assert_eq!(healthy.state(), EngineState::Hybrid);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn fallback_results_keep_the_response_contract() {
    let dir = TempDir::new().unwrap();
    write_corpus(dir.path());

    let config = EngineConfig::new(dir.path()).with_embed(unreachable_embed_config());
    let engine = RagEngine::load_or_build(config, Arc::new(ExtractiveGenerator))
        .await
        .unwrap();

    let result = engine.query("hipertensi kronis", Some(3), None).await;
    let value = serde_json::to_value(&result).unwrap();

    // Identical shape to the healthy path.
    assert!(value.get("query").is_some());
    assert!(value.get("response").is_some());
    assert!(value.get("retrieved_documents").unwrap().is_array());
    assert!(value.pointer("/metadata/performance/search_time_seconds").is_some());
    assert_eq!(
        value.pointer("/metadata/engine").unwrap().as_str().unwrap(),
        "sparse_fallback"
    );
}

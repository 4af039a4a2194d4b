//! Snapshot cache lifecycle: build, hit, invalidation on source change,
//! and recovery from corrupt blobs.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use engine::cache;
use medrag::{EmbedConfig, EngineConfig, ExtractiveGenerator, RagEngine};
use serde_json::json;
use tempfile::TempDir;

fn write_corpus(dir: &Path) {
    let docs = json!([
        {"id": "d1", "title": "Diabetes", "content": "penyakit gula darah"},
        {"id": "d2", "title": "Hipertensi", "content": "tekanan darah tinggi"}
    ]);
    fs::write(dir.join("medical.json"), docs.to_string()).unwrap();
}

fn test_config(dir: &Path) -> EngineConfig {
    EngineConfig::new(dir).with_embed(EmbedConfig::hash(64))
}

async fn build_engine(dir: &Path) -> RagEngine {
    RagEngine::load_or_build(test_config(dir), Arc::new(ExtractiveGenerator))
        .await
        .unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn build_writes_all_four_snapshot_files() {
    let dir = TempDir::new().unwrap();
    write_corpus(dir.path());
    build_engine(dir.path()).await;

    let paths = cache::IndexPaths::new(dir.path());
    assert!(paths.dense_vectors().is_file());
    assert!(paths.dense_metadata().is_file());
    assert!(paths.sparse().is_file());
    assert!(paths.manifest().is_file());
    assert!(cache::is_cache_valid(dir.path()));

    let manifest = cache::read_manifest(&paths).unwrap();
    assert_eq!(manifest.document_count, 2);
    assert!(manifest.timestamp > 0.0);
    assert!(manifest.build_time >= 0.0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn touching_a_source_file_invalidates_and_rebuilds() {
    let dir = TempDir::new().unwrap();
    write_corpus(dir.path());

    let first = build_engine(dir.path()).await;
    assert!(!first.stats().cache_hit);
    assert!(cache::is_cache_valid(dir.path()));

    // Bump the source mtime past the manifest timestamp.
    tokio::time::sleep(Duration::from_millis(50)).await;
    write_corpus(dir.path());
    assert!(!cache::is_cache_valid(dir.path()));

    let second = build_engine(dir.path()).await;
    assert!(!second.stats().cache_hit, "stale cache must trigger a rebuild");
    // The rebuild refreshed the snapshot.
    assert!(cache::is_cache_valid(dir.path()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unchanged_data_is_a_cache_hit() {
    let dir = TempDir::new().unwrap();
    write_corpus(dir.path());

    build_engine(dir.path()).await;
    let second = build_engine(dir.path()).await;
    assert!(second.stats().cache_hit);
    assert!(second.stats().build_time_seconds.is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn corrupt_snapshot_triggers_rebuild_instead_of_failure() {
    let dir = TempDir::new().unwrap();
    write_corpus(dir.path());
    build_engine(dir.path()).await;

    let paths = cache::IndexPaths::new(dir.path());
    fs::write(paths.sparse(), b"definitely not a bm25 snapshot").unwrap();

    let engine = build_engine(dir.path()).await;
    assert!(!engine.stats().cache_hit);
    let result = engine.query("tekanan darah", Some(2), None).await;
    assert!(result.error.is_none());
    assert!(!result.retrieved_documents.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn missing_snapshot_file_invalidates_cache() {
    let dir = TempDir::new().unwrap();
    write_corpus(dir.path());
    build_engine(dir.path()).await;

    let paths = cache::IndexPaths::new(dir.path());
    fs::remove_file(paths.manifest()).unwrap();
    assert!(!cache::is_cache_valid(dir.path()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn queries_work_identically_after_cache_hit() {
    let dir = TempDir::new().unwrap();
    write_corpus(dir.path());

    let fresh = build_engine(dir.path()).await;
    let fresh_result = fresh.query("gula darah", Some(2), None).await;

    let cached = build_engine(dir.path()).await;
    let cached_result = cached.query("gula darah", Some(2), None).await;

    let titles = |r: &medrag::QueryResult| {
        r.retrieved_documents
            .iter()
            .map(|d| d.title.clone())
            .collect::<Vec<_>>()
    };
    assert_eq!(titles(&fresh_result), titles(&cached_result));
}

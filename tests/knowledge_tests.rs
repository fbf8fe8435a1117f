//! Knowledge store queries: thresholds, merging, deduplication, ingestion.

mod common;

use async_trait::async_trait;
use common::mocks::memory_store;
use scribe::knowledge::{
    Embedder, InMemoryKnowledgeStore, KnowledgeStore, StoreId, StoreItems, TextChunker,
};
use scribe::types::{AppError, Result};
use scribe::utils::toml_config::EmbeddingConfig;
use serde_json::{Map, Value, json};
use std::sync::Arc;

/// Queries start with `?`; every document sits at cosine 0.5 from every query.
struct FixedAngleEmbedder;

#[async_trait]
impl Embedder for FixedAngleEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|t| {
                if t.starts_with('?') {
                    vec![1.0, 0.0]
                } else {
                    vec![0.5, 0.75f32.sqrt()]
                }
            })
            .collect())
    }

    fn dimension(&self) -> usize {
        2
    }

    fn name(&self) -> &str {
        "fixed-angle"
    }
}

fn meta(chunk_id: Option<&str>) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert("source".to_string(), json!("notes.md"));
    if let Some(id) = chunk_id {
        map.insert("chunk_id".to_string(), json!(id));
    }
    map
}

async fn seeded(docs: &[(&str, Option<&str>)]) -> (InMemoryKnowledgeStore, StoreId) {
    let store = InMemoryKnowledgeStore::new(Arc::new(FixedAngleEmbedder));
    let id = store
        .create_ephemeral_store(&EmbeddingConfig::default())
        .await
        .unwrap();
    let items = StoreItems::new(
        docs.iter().map(|(d, _)| d.to_string()).collect(),
        docs.iter().map(|(_, c)| meta(*c)).collect(),
        (0..docs.len()).map(|i| format!("item-{}", i)).collect(),
    )
    .unwrap();
    store.add_items(&id, items).await.unwrap();
    (store, id)
}

#[tokio::test]
async fn test_threshold_above_every_score_returns_nothing() {
    let (store, id) = seeded(&[("alpha", None), ("beta", None)]).await;

    let hits = store
        .query(&id, &["?anything".to_string()], 10, 0.9)
        .await
        .unwrap();

    assert!(hits.is_empty());
}

#[tokio::test]
async fn test_threshold_below_scores_keeps_everything() {
    let (store, id) = seeded(&[("alpha", None), ("beta", None)]).await;

    let hits = store
        .query(&id, &["?anything".to_string()], 10, 0.4)
        .await
        .unwrap();

    assert_eq!(hits.len(), 2);
    for hit in &hits {
        assert!((hit.score - 0.5).abs() < 1e-4, "score {}", hit.score);
    }
}

#[tokio::test]
async fn test_top_k_applies_per_query_text() {
    let (store, id) = seeded(&[("a", None), ("b", None), ("c", None), ("d", None)]).await;

    let one = store
        .query(&id, &["?one".to_string()], 2, 0.0)
        .await
        .unwrap();
    assert_eq!(one.len(), 2);

    // Same neighbours for both texts, so merging collapses them again
    let two = store
        .query(&id, &["?one".to_string(), "?two".to_string()], 2, 0.0)
        .await
        .unwrap();
    assert_eq!(two.len(), 2);
}

#[tokio::test]
async fn test_duplicate_chunks_are_collapsed() {
    let (store, id) = seeded(&[
        ("first copy", Some("file_a_chunk_0")),
        ("second copy", Some("file_a_chunk_0")),
        ("other", Some("file_a_chunk_1")),
    ])
    .await;

    let hits = store
        .query(&id, &["?q1".to_string(), "?q2".to_string()], 10, 0.0)
        .await
        .unwrap();

    let keys: Vec<&str> = hits.iter().map(|h| h.chunk_key()).collect();
    assert_eq!(keys.len(), 2);
    assert!(keys.contains(&"file_a_chunk_0"));
    assert!(keys.contains(&"file_a_chunk_1"));
}

#[tokio::test]
async fn test_deleted_store_cannot_be_queried() {
    let (store, id) = seeded(&[("alpha", None)]).await;

    store.delete_store(&id).await.unwrap();

    assert!(!store.store_exists(&id).await.unwrap());
    let err = store
        .query(&id, &["?q".to_string()], 1, 0.0)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn test_corpus_ingestion_is_queryable() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("corpus.md");
    std::fs::write(
        &path,
        "# Retrieval\n\nDense retrieval embeds queries and passages.\n\n\
         ## Ranking\n\nRerankers reorder the first-stage candidates.",
    )
    .unwrap();

    let store = memory_store();
    let id = store
        .create_store("corpus", &EmbeddingConfig::default())
        .await
        .unwrap();
    let chunker = TextChunker::new(60, 10).unwrap();

    let added = chunker.ingest_file(&store, &id, &path).await.unwrap();

    assert!(added >= 2);
    assert_eq!(store.count(&id).await.unwrap(), added);
    let hits = store
        .query(&id, &["rerankers reorder candidates".to_string()], 1, 0.1)
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert!(hits[0].content.contains("Rerankers"));
    assert_eq!(hits[0].metadata["source"], json!("corpus.md"));
}

//! Knowledge store abstraction
//!
//! A knowledge store holds named indices of embedded text. The pipeline uses
//! it two ways: an ephemeral index per run holding the extracted sources, and
//! optional long-lived indices (the "corpus") shared across runs.
//!
//! # Example
//!
//! ```rust,ignore
//! use scribe::knowledge::{InMemoryKnowledgeStore, KnowledgeStore, StoreItems};
//!
//! let store = InMemoryKnowledgeStore::new(create_embedder(&config.embedding)?);
//! let id = store.create_ephemeral_store(&config.embedding).await?;
//! store.add_items(&id, StoreItems::new(docs, metas, ids)?).await?;
//! let hits = store.query(&id, &["attention".to_string()], 5, 0.3).await?;
//! ```

use crate::types::{AppError, Result};
use crate::utils::toml_config::EmbeddingConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Identifier of one index inside a knowledge store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StoreId(String);

impl StoreId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Column-oriented batch of items to add. All three columns have equal length.
#[derive(Debug, Clone, Default)]
pub struct StoreItems {
    documents: Vec<String>,
    metadatas: Vec<Map<String, Value>>,
    ids: Vec<String>,
}

impl StoreItems {
    pub fn new(
        documents: Vec<String>,
        metadatas: Vec<Map<String, Value>>,
        ids: Vec<String>,
    ) -> Result<Self> {
        if documents.len() != metadatas.len() || documents.len() != ids.len() {
            return Err(AppError::InvalidInput(format!(
                "Mismatched item columns: {} documents, {} metadatas, {} ids",
                documents.len(),
                metadatas.len(),
                ids.len()
            )));
        }
        Ok(Self {
            documents,
            metadatas,
            ids,
        })
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Document texts, in insertion order
    pub fn documents(&self) -> &[String] {
        &self.documents
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    /// Iterate `(id, document, metadata)` rows
    pub fn into_rows(self) -> impl Iterator<Item = (String, String, Map<String, Value>)> {
        self.ids
            .into_iter()
            .zip(self.documents)
            .zip(self.metadatas)
            .map(|((id, doc), meta)| (id, doc, meta))
    }
}

/// A single query match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryHit {
    pub id: String,
    pub content: String,
    pub metadata: Map<String, Value>,
    /// `1 - distance`, higher is closer
    pub score: f32,
}

impl QueryHit {
    /// Key used to collapse duplicate chunks: the `chunk_id` metadata entry
    /// when present, the item id otherwise.
    pub fn chunk_key(&self) -> &str {
        self.metadata
            .get("chunk_id")
            .and_then(Value::as_str)
            .unwrap_or(&self.id)
    }
}

/// Abstract trait for knowledge store backends
#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    /// Get the provider name
    fn provider_name(&self) -> &'static str;

    /// Create a uniquely named index for a single run
    async fn create_ephemeral_store(&self, embedding: &EmbeddingConfig) -> Result<StoreId>;

    /// Create a named long-lived index. Fails if the name is taken.
    async fn create_store(&self, name: &str, embedding: &EmbeddingConfig) -> Result<StoreId>;

    /// Embed and add items, replacing any with the same id
    async fn add_items(&self, store: &StoreId, items: StoreItems) -> Result<usize>;

    /// Ranked, deduplicated matches for the query texts.
    ///
    /// Each query text contributes its `top_k` nearest items. Matches scoring
    /// below `similarity_threshold` are dropped, the rest are merged by score
    /// descending, and repeated chunk keys keep only their first occurrence.
    async fn query(
        &self,
        store: &StoreId,
        query_texts: &[String],
        top_k: usize,
        similarity_threshold: f32,
    ) -> Result<Vec<QueryHit>>;

    /// Drop an index and everything in it
    async fn delete_store(&self, store: &StoreId) -> Result<()>;

    /// Count items in an index
    async fn count(&self, store: &StoreId) -> Result<usize>;

    /// Check whether an index exists
    async fn store_exists(&self, store: &StoreId) -> Result<bool>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_store_items_rejects_mismatched_columns() {
        let result = StoreItems::new(
            vec!["a".into(), "b".into()],
            vec![Map::new()],
            vec!["0".into(), "1".into()],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_chunk_key_prefers_chunk_id() {
        let mut metadata = Map::new();
        metadata.insert("chunk_id".into(), json!("file_1_chunk_0"));
        let hit = QueryHit {
            id: "42".into(),
            content: String::new(),
            metadata,
            score: 1.0,
        };
        assert_eq!(hit.chunk_key(), "file_1_chunk_0");

        let bare = QueryHit {
            id: "42".into(),
            content: String::new(),
            metadata: Map::new(),
            score: 1.0,
        };
        assert_eq!(bare.chunk_key(), "42");
    }
}

use super::embeddings::Embedder;
use super::store::{KnowledgeStore, QueryHit, StoreId, StoreItems};
use crate::types::{AppError, Result};
use crate::utils::toml_config::EmbeddingConfig;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use uuid::Uuid;

/// In-memory knowledge store.
///
/// Data is not persisted and is lost when the process exits. Distances are
/// cosine distances, so `score = 1 - distance` is the cosine similarity.
/// Every index shares one embedder, loaded once for the process.
pub struct InMemoryKnowledgeStore {
    stores: Arc<RwLock<HashMap<StoreId, Index>>>,
    embedder: Arc<dyn Embedder>,
}

struct Index {
    entries: Vec<Entry>,
}

struct Entry {
    id: String,
    content: String,
    metadata: Map<String, Value>,
    embedding: Vec<f32>,
}

impl InMemoryKnowledgeStore {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            stores: Arc::new(RwLock::new(HashMap::new())),
            embedder,
        }
    }

    fn insert_index(&self, id: StoreId, config: &EmbeddingConfig) -> Result<StoreId> {
        if config.dimension != self.embedder.dimension() {
            tracing::warn!(
                store = %id,
                configured = config.dimension,
                actual = self.embedder.dimension(),
                embedder = self.embedder.name(),
                "embedding dimension differs from config, using the embedder's"
            );
        }

        let mut stores = self.stores.write();
        if stores.contains_key(&id) {
            return Err(AppError::InvalidInput(format!(
                "Knowledge store '{}' already exists",
                id
            )));
        }
        stores.insert(
            id.clone(),
            Index {
                entries: Vec::new(),
            },
        );
        Ok(id)
    }

    fn ensure_exists(&self, store: &StoreId) -> Result<()> {
        if self.stores.read().contains_key(store) {
            Ok(())
        } else {
            Err(AppError::NotFound(format!("Knowledge store '{}' not found", store)))
        }
    }

    fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
        if a.len() != b.len() {
            return 0.0;
        }

        let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

        if norm_a == 0.0 || norm_b == 0.0 {
            return 0.0;
        }

        dot_product / (norm_a * norm_b)
    }

    fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
        1.0 - Self::cosine_similarity(a, b)
    }

    /// Legacy ingestion wrote the source file under `full_doc_id`
    fn normalize_metadata(mut metadata: Map<String, Value>) -> Map<String, Value> {
        if let Some(file_id) = metadata.remove("full_doc_id") {
            metadata.insert("file_id".to_string(), file_id);
        }
        metadata
    }
}

#[async_trait]
impl KnowledgeStore for InMemoryKnowledgeStore {
    fn provider_name(&self) -> &'static str {
        "in-memory"
    }

    async fn create_ephemeral_store(&self, embedding: &EmbeddingConfig) -> Result<StoreId> {
        let id = StoreId::new(format!("run-{}", Uuid::new_v4()));
        tracing::debug!(store = %id, embedder = self.embedder.name(), "creating ephemeral store");
        self.insert_index(id, embedding)
    }

    async fn create_store(&self, name: &str, embedding: &EmbeddingConfig) -> Result<StoreId> {
        if name.trim().is_empty() {
            return Err(AppError::InvalidInput(
                "Knowledge store name must not be empty".to_string(),
            ));
        }
        self.insert_index(StoreId::new(name), embedding)
    }

    async fn add_items(&self, store: &StoreId, items: StoreItems) -> Result<usize> {
        if items.is_empty() {
            return Ok(0);
        }

        // Embed without holding the lock; the embedder may be remote.
        self.ensure_exists(store)?;
        let embeddings = self.embedder.embed(items.documents()).await?;
        if embeddings.len() != items.len() {
            return Err(AppError::Knowledge(format!(
                "Embedder returned {} vectors for {} documents",
                embeddings.len(),
                items.len()
            )));
        }

        let mut stores = self.stores.write();
        let index = stores
            .get_mut(store)
            .ok_or_else(|| AppError::NotFound(format!("Knowledge store '{}' not found", store)))?;

        let mut count = 0;
        for ((id, content, metadata), embedding) in items.into_rows().zip(embeddings) {
            let entry = Entry {
                id,
                content,
                metadata,
                embedding,
            };
            match index.entries.iter_mut().find(|e| e.id == entry.id) {
                Some(existing) => *existing = entry,
                None => index.entries.push(entry),
            }
            count += 1;
        }

        Ok(count)
    }

    async fn query(
        &self,
        store: &StoreId,
        query_texts: &[String],
        top_k: usize,
        similarity_threshold: f32,
    ) -> Result<Vec<QueryHit>> {
        self.ensure_exists(store)?;
        if query_texts.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }
        let query_vectors = self.embedder.embed(query_texts).await?;

        let stores = self.stores.read();
        let index = stores
            .get(store)
            .ok_or_else(|| AppError::NotFound(format!("Knowledge store '{}' not found", store)))?;

        let mut hits: Vec<QueryHit> = Vec::new();
        for query_vector in &query_vectors {
            let mut nearest: Vec<(f32, &Entry)> = index
                .entries
                .iter()
                .map(|entry| (Self::cosine_distance(query_vector, &entry.embedding), entry))
                .collect();
            nearest.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
            nearest.truncate(top_k);

            for (distance, entry) in nearest {
                let score = 1.0 - distance;
                if score < similarity_threshold {
                    continue;
                }
                hits.push(QueryHit {
                    id: entry.id.clone(),
                    content: entry.content.clone(),
                    metadata: Self::normalize_metadata(entry.metadata.clone()),
                    score,
                });
            }
        }

        // Stable sort keeps query order among equal scores
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

        let mut seen = HashSet::new();
        hits.retain(|hit| seen.insert(hit.chunk_key().to_string()));

        Ok(hits)
    }

    async fn delete_store(&self, store: &StoreId) -> Result<()> {
        let mut stores = self.stores.write();
        stores
            .remove(store)
            .ok_or_else(|| AppError::NotFound(format!("Knowledge store '{}' not found", store)))?;
        Ok(())
    }

    async fn count(&self, store: &StoreId) -> Result<usize> {
        let stores = self.stores.read();
        stores
            .get(store)
            .map(|index| index.entries.len())
            .ok_or_else(|| AppError::NotFound(format!("Knowledge store '{}' not found", store)))
    }

    async fn store_exists(&self, store: &StoreId) -> Result<bool> {
        Ok(self.stores.read().contains_key(store))
    }
}

// ============================================================================
// Tests
// ============================================================================

//! Extraction stage
//!
//! One content-analysis job per search result, all running concurrently.
//! Outputs are normalized ([`super::normalize`]); jobs that fail are logged
//! and dropped. Successes are persisted into a fresh ephemeral store for the
//! retrieval participant to query later in the run.

use super::models::{ExtractedSource, SearchResult};
use super::normalize::{normalize, AnalyzerOutput};
use super::progress::{ProgressSender, Step};
use crate::knowledge::{KnowledgeStore, StoreId, StoreItems};
use crate::types::Result;
use crate::utils::toml_config::EmbeddingConfig;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::task::JoinSet;

/// Reads one source and reports what it found, in whatever shape the
/// underlying model produced.
#[async_trait]
pub trait ContentAnalyzer: Send + Sync {
    async fn analyze(&self, request: &str, source: &SearchResult) -> Result<AnalyzerOutput>;
}

/// Result of the reading stage.
#[derive(Debug, Clone)]
pub struct ExtractionOutcome {
    /// Successful extractions in search-result order
    pub extracted: Vec<ExtractedSource>,
    /// Ephemeral store holding them; `None` if persistence failed
    pub store: Option<StoreId>,
    pub attempted: usize,
}

impl ExtractionOutcome {
    /// Completion summary for the reading step
    pub fn summary(&self) -> String {
        format!(
            "extracted {} of {} sources",
            self.extracted.len(),
            self.attempted
        )
    }
}

/// Reads every search result concurrently into an extraction.
pub struct ExtractionStage {
    analyzer: Arc<dyn ContentAnalyzer>,
    store: Arc<dyn KnowledgeStore>,
    embedding: EmbeddingConfig,
}

impl ExtractionStage {
    pub fn new(
        analyzer: Arc<dyn ContentAnalyzer>,
        store: Arc<dyn KnowledgeStore>,
        embedding: EmbeddingConfig,
    ) -> Self {
        Self {
            analyzer,
            store,
            embedding,
        }
    }

    /// Extract every result and persist the successes to a fresh ephemeral store
    pub async fn run(
        &self,
        request: &str,
        results: &[SearchResult],
        progress: &ProgressSender,
    ) -> ExtractionOutcome {
        let extracted = self.extract_all(request, results, progress).await;

        let store = match self.persist(&extracted).await {
            Ok(id) => Some(id),
            Err(e) => {
                tracing::warn!(
                    run_id = %progress.run_id(),
                    error = %e,
                    "failed to persist extracted sources, continuing without retrieval context"
                );
                None
            }
        };

        ExtractionOutcome {
            extracted,
            store,
            attempted: results.len(),
        }
    }

    /// Run every analysis job and keep the ones that normalize
    pub async fn extract_all(
        &self,
        request: &str,
        results: &[SearchResult],
        progress: &ProgressSender,
    ) -> Vec<ExtractedSource> {
        let mut set = JoinSet::new();
        let request: Arc<str> = Arc::from(request);

        for (position, source) in results.iter().cloned().enumerate() {
            let analyzer = Arc::clone(&self.analyzer);
            let request = Arc::clone(&request);
            set.spawn(async move {
                let outcome = analyzer
                    .analyze(&request, &source)
                    .await
                    .and_then(normalize);
                (position, source, outcome)
            });
        }

        let mut extracted = Vec::with_capacity(results.len());
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((position, source, Ok(extraction))) => {
                    tracing::debug!(
                        source_id = %source.id,
                        route = ?extraction.route,
                        "source extracted"
                    );
                    progress.generating(Step::Reading, format!("read: {}", source.title));
                    extracted.push((
                        position,
                        ExtractedSource { source, extraction },
                    ));
                }
                Ok((_, source, Err(e))) => {
                    tracing::warn!(source_id = %source.id, error = %e, "dropping source");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "extraction job aborted");
                }
            }
        }

        extracted.sort_by_key(|(position, _)| *position);
        extracted.into_iter().map(|(_, source)| source).collect()
    }

    async fn persist(&self, extracted: &[ExtractedSource]) -> Result<StoreId> {
        let store_id = self.store.create_ephemeral_store(&self.embedding).await?;
        if extracted.is_empty() {
            return Ok(store_id);
        }

        let mut documents = Vec::with_capacity(extracted.len());
        let mut metadatas = Vec::with_capacity(extracted.len());
        for entry in extracted {
            documents.push(serde_json::to_string(&entry.extraction.item)?);
            metadatas.push(sanitize_metadata(entry.source.raw_metadata()));
        }
        let ids = (0..extracted.len()).map(|i| i.to_string()).collect();

        let added = self
            .store
            .add_items(&store_id, StoreItems::new(documents, metadatas, ids)?)
            .await?;
        tracing::debug!(store = %store_id, added, "persisted extracted sources");
        Ok(store_id)
    }
}

/// Flatten metadata for storage: nulls dropped, lists joined with `", "`,
/// nested objects JSON-encoded.
pub fn sanitize_metadata(metadata: Map<String, Value>) -> Map<String, Value> {
    metadata
        .into_iter()
        .filter_map(|(key, value)| {
            let value = match value {
                Value::Null => return None,
                Value::Array(items) => Value::String(
                    items
                        .iter()
                        .map(|item| match item {
                            Value::String(s) => s.clone(),
                            other => other.to_string(),
                        })
                        .collect::<Vec<_>>()
                        .join(", "),
                ),
                Value::Object(map) => Value::String(Value::Object(map).to_string()),
                scalar => scalar,
            };
            Some((key, value))
        })
        .collect()
}

//! Knowledge retrieval tool
//!
//! Queries the run's ephemeral store of extracted sources and, when
//! configured, the long-lived corpus store. Both store ids travel in a
//! [`RetrievalScope`] built per run.

use crate::knowledge::{KnowledgeStore, QueryHit, StoreId};
use crate::tools::registry::Tool;
use crate::types::{AppError, Result};
use crate::utils::toml_config::KnowledgeConfig;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;

/// Which stores a run may read from, with the thresholds to apply.
#[derive(Clone)]
pub struct RetrievalScope {
    pub store: Arc<dyn KnowledgeStore>,
    /// Extracted sources of the current run; `None` when persistence failed
    pub ephemeral: Option<StoreId>,
    pub corpus: Option<StoreId>,
    pub knowledge: KnowledgeConfig,
}

impl RetrievalScope {
    /// True when neither store is available
    pub fn is_empty(&self) -> bool {
        self.ephemeral.is_none() && self.corpus.is_none()
    }

    /// Query every available store and render the hits as context passages
    pub async fn retrieve(&self, queries: &[String]) -> Result<Vec<String>> {
        let mut passages = Vec::new();

        if let Some(store_id) = &self.ephemeral {
            let hits = self
                .store
                .query(
                    store_id,
                    queries,
                    self.knowledge.ephemeral_top_k,
                    self.knowledge.ephemeral_similarity_threshold,
                )
                .await?;
            passages.extend(hits.iter().map(render_source_hit));
        }

        if let Some(store_id) = &self.corpus {
            let hits = self
                .store
                .query(
                    store_id,
                    queries,
                    self.knowledge.top_k,
                    self.knowledge.similarity_threshold,
                )
                .await?;
            passages.extend(hits.iter().map(render_corpus_hit));
        }

        Ok(passages)
    }
}

impl std::fmt::Debug for RetrievalScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetrievalScope")
            .field("store", &self.store.provider_name())
            .field("ephemeral", &self.ephemeral)
            .field("corpus", &self.corpus)
            .finish()
    }
}

/// Extracted source: its search metadata plus the parsed item
fn render_source_hit(hit: &QueryHit) -> String {
    let extraction = serde_json::from_str::<Value>(&hit.content)
        .unwrap_or_else(|_| Value::String(hit.content.clone()));
    let passage = json!({
        "source": Value::Object(hit.metadata.clone()),
        "extraction": extraction,
    });
    serde_json::to_string_pretty(&passage).unwrap_or_else(|_| hit.content.clone())
}

fn render_corpus_hit(hit: &QueryHit) -> String {
    let source = hit
        .metadata
        .get("source")
        .and_then(Value::as_str)
        .unwrap_or("unknown");
    format!("{}\nSource: {}", hit.content, source)
}

/// Tool exposing a [`RetrievalScope`] to the retrieval participant
pub struct RetrievalTool {
    scope: RetrievalScope,
}

impl RetrievalTool {
    /// Tool name the retriever calls
    pub const NAME: &'static str = "retrieve_knowledge";

    pub fn new(scope: RetrievalScope) -> Self {
        Self { scope }
    }
}

#[async_trait]
impl Tool for RetrievalTool {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "Search the extracted sources and reference corpus for passages relevant to the queries"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "queries": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "One or more search phrases"
                }
            },
            "required": ["queries"]
        })
    }

    async fn execute(&self, args: Value) -> Result<Value> {
        let queries: Vec<String> = match args.get("queries") {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|q| !q.is_empty())
                .map(String::from)
                .collect(),
            Some(Value::String(q)) if !q.trim().is_empty() => vec![q.trim().to_string()],
            _ => Vec::new(),
        };
        if queries.is_empty() {
            return Err(AppError::InvalidInput(
                "Missing 'queries' parameter".to_string(),
            ));
        }

        let passages = self.scope.retrieve(&queries).await?;
        Ok(json!({
            "queries": queries,
            "passages": passages,
            "count": passages.len()
        }))
    }
}

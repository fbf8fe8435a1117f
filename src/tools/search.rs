//! Web search using daedra
//!
//! The search stage talks to a [`Searcher`]; [`DaedraSearcher`] is the default
//! implementation and uses DuckDuckGo through the daedra crate.

use crate::pipeline::models::SearchResult;
use crate::types::{AppError, Result};
use async_trait::async_trait;
use serde_json::{Map, Value};

/// Source discovery for the searching stage.
#[async_trait]
pub trait Searcher: Send + Sync {
    /// Find up to `max_results` sources for `query`, in provider rank order
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchResult>>;
}

/// Web search powered by daedra
pub struct DaedraSearcher;

impl DaedraSearcher {
    pub fn new() -> Self {
        Self
    }
}

impl Default for DaedraSearcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Searcher for DaedraSearcher {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchResult>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(AppError::InvalidInput("Search query is empty".to_string()));
        }

        let search_args = daedra::SearchArgs {
            query: query.to_string(),
            options: Some(daedra::SearchOptions {
                num_results: max_results,
                ..Default::default()
            }),
        };

        let response = daedra::tools::search::perform_search(&search_args)
            .await
            .map_err(|e| AppError::Search(format!("Search failed: {}", e)))?;

        let results: Vec<SearchResult> = response
            .data
            .iter()
            .take(max_results)
            .enumerate()
            .map(|(i, r)| {
                let mut metadata = Map::new();
                metadata.insert("rank".to_string(), Value::from(i + 1));
                metadata.insert("provider".to_string(), Value::from("duckduckgo"));
                SearchResult {
                    id: i.to_string(),
                    title: r.title.clone(),
                    url: Some(r.url.clone()).filter(|u| !u.is_empty()),
                    snippet: r.description.clone(),
                    metadata,
                }
            })
            .collect();

        tracing::debug!(query, count = results.len(), "web search finished");
        Ok(results)
    }
}

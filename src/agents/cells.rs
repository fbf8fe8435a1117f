use crate::agents::{RetrieverAgent, ReviewerAgent, WriterAgent};
use crate::llm::LLMClient;
use crate::pipeline::cell::ConversationCell;
use crate::pipeline::writing::CellFactory;
use crate::tools::{RetrievalScope, RetrievalTool, ToolRegistry};
use crate::types::Result;
use crate::utils::toml_config::WritingConfig;
use async_trait::async_trait;
use std::sync::Arc;

/// Builds writer / retriever / reviewer cells sharing one model client.
///
/// Each cell gets its own tool registry bound to the run's retrieval scope.
pub struct LlmCellFactory {
    llm: Arc<dyn LLMClient>,
    config: WritingConfig,
}

impl LlmCellFactory {
    pub fn new(llm: Arc<dyn LLMClient>, config: WritingConfig) -> Self {
        Self { llm, config }
    }
}

#[async_trait]
impl CellFactory for LlmCellFactory {
    async fn build(&self, scope: &RetrievalScope, prompt: String) -> Result<ConversationCell> {
        let mut tools = ToolRegistry::new();
        tools.register(Arc::new(RetrievalTool::new(scope.clone())));

        ConversationCell::new(
            Arc::new(WriterAgent::new(Arc::clone(&self.llm))),
            Arc::new(RetrieverAgent::new(Arc::clone(&self.llm), Arc::new(tools))),
            Arc::new(ReviewerAgent::new(
                Arc::clone(&self.llm),
                self.config.approval_token.clone(),
            )),
            self.config.max_turns,
            prompt,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::test_support::CannedLlm;
    use crate::knowledge::embeddings::test_support::memory_store;
    use crate::pipeline::cell::{CellEvent, CellOutcome};
    use crate::utils::toml_config::KnowledgeConfig;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_factory_cell_reaches_approval() {
        let llm = Arc::new(CannedLlm::new(&["## Intro\nDraft text", "APPROVE"]));
        let factory = LlmCellFactory::new(llm, WritingConfig::default());
        let scope = RetrievalScope {
            store: Arc::new(memory_store()),
            ephemeral: None,
            corpus: None,
            knowledge: KnowledgeConfig::default(),
        };

        let cell = factory.build(&scope, "write".into()).await.unwrap();
        let events: Vec<CellEvent> = cell
            .run_stream()
            .map(|e| e.unwrap())
            .collect()
            .await;
        assert_eq!(
            events.last(),
            Some(&CellEvent::Finished {
                outcome: CellOutcome::Approved,
                turns: 2
            })
        );
    }
}

use crate::llm::LLMClient;
use crate::pipeline::extraction::ContentAnalyzer;
use crate::pipeline::models::SearchResult;
use crate::pipeline::normalize::AnalyzerOutput;
use crate::types::Result;
use async_trait::async_trait;
use std::sync::Arc;

const SYSTEM_PROMPT: &str = r#"You are a reading assistant that extracts structured information from one research source.

Reply with a single JSON object and nothing else, using exactly these fields:

{
  "core_problem": "the problem the work addresses",
  "key_methodology": {"name": "method name", "principle": "core idea", "novelty": "what is new"},
  "datasets_used": ["dataset", "..."],
  "evaluation_metrics": ["metric", "..."],
  "main_results": "headline results",
  "limitations": "stated or evident limitations",
  "contributions": ["contribution", "..."]
}

Use empty strings or empty lists for anything the source does not say."#;

/// Content analyzer that asks a language model to read one search result.
///
/// The raw reply is returned as text and normalized by the extraction stage.
pub struct LlmContentAnalyzer {
    llm: Arc<dyn LLMClient>,
}

impl LlmContentAnalyzer {
    pub fn new(llm: Arc<dyn LLMClient>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl ContentAnalyzer for LlmContentAnalyzer {
    async fn analyze(&self, request: &str, source: &SearchResult) -> Result<AnalyzerOutput> {
        let source_json = serde_json::to_string_pretty(&source.raw_metadata())?;
        let prompt = format!(
            "Research request: {}\n\nSource:\n{}\n\nExtract the fields for this source.",
            request, source_json
        );

        let reply = self.llm.generate_with_system(SYSTEM_PROMPT, &prompt).await?;
        tracing::debug!(source_id = %source.id, model = self.llm.model_name(), "source read");
        Ok(AnalyzerOutput::Text(reply))
    }
}

use crate::llm::LLMClient;
use crate::pipeline::cell::{Participant, Role, Signal, Transcript, TurnChunk, TurnStream};
use crate::tools::{RetrievalTool, ToolRegistry};
use crate::types::Result;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;

const MAX_QUERIES: usize = 3;

/// Turns the latest request for knowledge into search queries and runs them
/// through the retrieval tool.
pub struct RetrieverAgent {
    llm: Arc<dyn LLMClient>,
    tools: Arc<ToolRegistry>,
}

impl RetrieverAgent {
    pub fn new(llm: Arc<dyn LLMClient>, tools: Arc<ToolRegistry>) -> Self {
        Self { llm, tools }
    }

    /// What the retriever should look for: the last message before its turn
    fn need(transcript: &Transcript) -> &str {
        transcript
            .last()
            .map(|turn| turn.content.as_str())
            .filter(|content| !content.trim().is_empty())
            .unwrap_or(&transcript.prompt)
    }

    async fn plan_queries(&self, need: &str) -> Vec<String> {
        let prompt = format!(
            r#"A writer needs supporting material. Their latest message:

{}

Available knowledge tools:
{}

Write up to {} short search queries that would find the missing information.

Return only the queries, one per line."#,
            need,
            self.tools.catalog(),
            MAX_QUERIES
        );

        let queries = match self.llm.generate(&prompt).await {
            Ok(response) => parse_queries(&response),
            Err(e) => {
                tracing::warn!(error = %e, "query planning failed, searching with the raw request");
                Vec::new()
            }
        };

        if queries.is_empty() {
            let fallback: String = need.chars().take(200).collect();
            vec![fallback.trim().to_string()]
        } else {
            queries
        }
    }
}

/// One query per non-empty line, numbering and bullets stripped
fn parse_queries(response: &str) -> Vec<String> {
    response
        .lines()
        .map(|line| {
            line.trim()
                .trim_start_matches(|c: char| {
                    c.is_numeric() || matches!(c, '.' | ')' | '-' | '*' | '•')
                })
                .trim()
                .trim_matches('"')
                .to_string()
        })
        .filter(|line| !line.is_empty())
        .take(MAX_QUERIES)
        .collect()
}

#[async_trait]
impl Participant for RetrieverAgent {
    fn role(&self) -> Role {
        Role::Retriever
    }

    async fn take_turn(&self, transcript: &Transcript) -> Result<TurnStream> {
        let queries = self.plan_queries(Self::need(transcript)).await;

        let (summary, passages) = match self
            .tools
            .execute(RetrievalTool::NAME, json!({ "queries": queries }))
            .await
        {
            Ok(value) => {
                let passages: Vec<String> = value
                    .get("passages")
                    .and_then(Value::as_array)
                    .map(|items| {
                        items
                            .iter()
                            .filter_map(Value::as_str)
                            .map(String::from)
                            .collect()
                    })
                    .unwrap_or_default();
                let summary = format!(
                    "{}({}) -> {} passages\n",
                    RetrievalTool::NAME,
                    queries.join("; "),
                    passages.len()
                );
                (summary, passages)
            }
            Err(e) => {
                tracing::warn!(error = %e, "retrieval failed, continuing without evidence");
                (format!("{} failed: {}\n", RetrievalTool::NAME, e), Vec::new())
            }
        };

        let text = if passages.is_empty() {
            "No relevant passages were found in the knowledge sources.".to_string()
        } else {
            format!("Retrieved evidence:\n\n{}", passages.join("\n\n---\n\n"))
        };

        let chunks = vec![Ok(TurnChunk::ToolSummary(summary)), Ok(TurnChunk::Text(text))];
        Ok(Box::new(futures::stream::iter(chunks)))
    }

    fn classify(&self, _visible: &str) -> Signal {
        Signal::Evidence
    }
}

use crate::llm::LLMClient;
use crate::pipeline::analysis::Analyst;
use crate::pipeline::models::{Analysis, ExtractedSource, OutlineSection};
use crate::pipeline::normalize::parse_structured;
use crate::types::{AppError, Result};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;

const SYSTEM_PROMPT: &str = r#"You are a research analyst. Given a research request and structured notes on the sources found for it, write a global analysis and plan the report.

Reply with a single JSON object and nothing else:

{
  "global_analysis": "themes, agreements, disagreements and gaps across the sources",
  "outline": [
    {"title": "section title", "description": "what the section must cover"}
  ]
}

Plan between 3 and 8 sections, in reading order."#;

/// Produces the global analysis and report outline with one model call.
pub struct LlmAnalyst {
    llm: Arc<dyn LLMClient>,
}

impl LlmAnalyst {
    pub fn new(llm: Arc<dyn LLMClient>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl Analyst for LlmAnalyst {
    async fn analyze(&self, request: &str, sources: &[ExtractedSource]) -> Result<Analysis> {
        let notes: Vec<Value> = sources
            .iter()
            .map(|s| {
                json!({
                    "title": s.source.title,
                    "url": s.source.url,
                    "extraction": s.extraction.item,
                })
            })
            .collect();
        let prompt = format!(
            "Research request: {}\n\nSource notes:\n{}",
            request,
            serde_json::to_string_pretty(&notes)?
        );

        let reply = self.llm.generate_with_system(SYSTEM_PROMPT, &prompt).await?;
        parse_analysis(&reply)
    }
}

/// Read an analysis reply.
///
/// Accepts `{"global_analysis": .., "outline": [..]}` (or `sections` as the
/// list key) and a bare list of sections. A section is an object with
/// `title`/`description` or just a title string.
pub fn parse_analysis(reply: &str) -> Result<Analysis> {
    let value = parse_structured(reply)?;

    let (global_analysis, sections) = match value {
        Value::Object(mut map) => {
            let global = match map.remove("global_analysis") {
                Some(Value::String(s)) => s,
                Some(Value::Null) | None => String::new(),
                Some(other) => other.to_string(),
            };
            let sections = map
                .remove("outline")
                .or_else(|| map.remove("sections"))
                .unwrap_or(Value::Null);
            (global, sections)
        }
        list @ Value::Array(_) => (String::new(), list),
        _ => {
            return Err(AppError::Validation(
                "analysis reply is not an object".to_string(),
            ));
        }
    };

    let Value::Array(entries) = sections else {
        return Err(AppError::Validation(
            "analysis reply has no outline list".to_string(),
        ));
    };

    let outline = entries
        .into_iter()
        .filter_map(|entry| match entry {
            Value::String(title) => Some((title, String::new())),
            Value::Object(section) => {
                let text = |key: &str| {
                    section
                        .get(key)
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string()
                };
                Some((text("title"), text("description")))
            }
            _ => None,
        })
        .enumerate()
        .map(|(i, (title, description))| OutlineSection::new(i, title, description))
        .collect();

    Ok(Analysis {
        global_analysis,
        outline,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::test_support::CannedLlm;

    #[test]
    fn test_parse_analysis_object() {
        let analysis = parse_analysis(
            r#"```json
{"global_analysis": "g", "outline": [{"title": "Intro", "description": "d"}, "Methods"]}
```"#,
        )
        .unwrap();
        assert_eq!(analysis.global_analysis, "g");
        assert_eq!(analysis.outline.len(), 2);
        assert_eq!(analysis.outline[1].title, "Methods");
        assert_eq!(analysis.outline[1].index.position(), 1);
    }

    #[test]
    fn test_parse_analysis_literal_and_list() {
        let analysis = parse_analysis("[{'title': 'Only'}]").unwrap();
        assert_eq!(analysis.outline[0].title, "Only");
        assert!(analysis.global_analysis.is_empty());

        assert!(parse_analysis(r#"{"global_analysis": "g"}"#).is_err());
        assert!(parse_analysis("no structure here").is_err());
    }

    #[tokio::test]
    async fn test_analyst_calls_model() {
        let analyst = LlmAnalyst::new(Arc::new(CannedLlm::new(&[
            r#"{"global_analysis": "g", "sections": [{"title": "A"}]}"#,
        ])));
        let analysis = analyst.analyze("q", &[]).await.unwrap();
        assert_eq!(analysis.outline[0].title, "A");
    }
}

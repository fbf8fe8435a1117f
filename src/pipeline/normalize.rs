//! Extraction output normalization
//!
//! A content analyzer may hand back a typed item, an untyped mapping or free
//! text. [`normalize`] turns any of them into a validated [`ExtractedItem`],
//! first success wins:
//!
//! 1. typed items are accepted as-is
//! 2. mappings are validated directly
//! 3. text has its code fences stripped, then parses as strict JSON or, failing
//!    that, with the permissive literal grammar ([`super::literal`])
//! 4. a list yields its first element; an envelope such as `{"papers": [...]}`
//!    is unwrapped one level
//! 5. the resulting value is validated against the item schema

use super::literal::parse_literal;
use super::models::{value_kind, ExtractedItem, Extraction, ParseRoute};
use crate::types::{AppError, Result};
use serde_json::{Map, Value};

/// Keys under which models commonly nest the real item
pub const ENVELOPE_KEYS: &[&str] = &["papers", "paper", "items", "item"];

const ITEM_FIELDS: &[&str] = &[
    "core_problem",
    "key_methodology",
    "datasets_used",
    "evaluation_metrics",
    "main_results",
    "limitations",
    "contributions",
];

/// Raw result of a content analyzer call.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalyzerOutput {
    Typed(ExtractedItem),
    Mapping(Map<String, Value>),
    Text(String),
}

/// Normalize one analyzer output into a validated item
pub fn normalize(output: AnalyzerOutput) -> Result<Extraction> {
    let (value, route) = match output {
        AnalyzerOutput::Typed(item) => {
            return Ok(Extraction {
                item,
                route: ParseRoute::Typed,
                unwrapped: false,
            });
        }
        AnalyzerOutput::Mapping(map) => (Value::Object(map), ParseRoute::Mapping),
        AnalyzerOutput::Text(text) => parse_text(&text)?,
    };

    let (value, unwrapped) = unwrap_container(value)?;
    let item = ExtractedItem::from_value(value)?;
    Ok(Extraction {
        item,
        route,
        unwrapped,
    })
}

/// Parse model text into a value using the same fence stripping and
/// JSON-then-literal fallback as item normalization
pub fn parse_structured(text: &str) -> Result<Value> {
    parse_text(text).map(|(value, _)| value)
}

fn parse_text(text: &str) -> Result<(Value, ParseRoute)> {
    let cleaned = preprocess(text);
    if cleaned.is_empty() {
        return Err(AppError::Validation("analyzer returned empty text".to_string()));
    }

    if let Some(parsed) = parse_either(cleaned) {
        return Ok(parsed);
    }

    // Prose around the payload: retry on the outermost bracketed span
    if let Some(span) = bracketed_span(cleaned) {
        if let Some(parsed) = parse_either(span) {
            return Ok(parsed);
        }
    }

    let preview: String = cleaned.chars().take(80).collect();
    Err(AppError::Validation(format!(
        "text is neither JSON nor a data literal: {:?}",
        preview
    )))
}

fn parse_either(text: &str) -> Option<(Value, ParseRoute)> {
    if let Ok(value) = serde_json::from_str::<Value>(text) {
        return Some((value, ParseRoute::Json));
    }
    match parse_literal(text) {
        Ok(value) => Some((value, ParseRoute::Literal)),
        Err(e) => {
            tracing::debug!(error = %e, "literal fallback failed");
            None
        }
    }
}

fn preprocess(text: &str) -> &str {
    let text = text.trim().trim_start_matches('\u{feff}');
    strip_code_fences(text).trim()
}

fn strip_code_fences(text: &str) -> &str {
    let mut s = text;

    if s.starts_with("```") {
        s = match s.find('\n') {
            Some(newline) => &s[newline + 1..],
            None => s.trim_start_matches('`'),
        };
    }

    let trimmed = s.trim_end();
    if let Some(stripped) = trimmed.strip_suffix("```") {
        s = stripped.trim_end();
    }

    s
}

fn bracketed_span(text: &str) -> Option<&str> {
    let start = text.find(['{', '['])?;
    let close = if text[start..].starts_with('{') { '}' } else { ']' };
    let end = text.rfind(close)?;
    (end > start).then(|| &text[start..=end])
}

/// Take the first element of a list and unwrap one envelope level
fn unwrap_container(value: Value) -> Result<(Value, bool)> {
    let (value, from_list) = first_of_list(value)?;

    let mut map = match value {
        Value::Object(map) => map,
        other => return Ok((other, from_list)),
    };

    let looks_like_item = ITEM_FIELDS.iter().any(|field| map.contains_key(*field));
    if looks_like_item {
        return Ok((Value::Object(map), from_list));
    }

    let Some(key) = ENVELOPE_KEYS.iter().find(|key| map.contains_key(**key)) else {
        return Ok((Value::Object(map), from_list));
    };
    let inner = map.remove(*key).unwrap_or(Value::Null);
    let (inner, _) = first_of_list(inner)?;
    match inner {
        Value::Object(_) => Ok((inner, true)),
        other => Err(AppError::Validation(format!(
            "envelope '{}' holds {}, expected an object",
            key,
            value_kind(&other)
        ))),
    }
}

fn first_of_list(value: Value) -> Result<(Value, bool)> {
    match value {
        Value::Array(items) => items
            .into_iter()
            .next()
            .map(|first| (first, true))
            .ok_or_else(|| AppError::Validation("empty list".to_string())),
        other => Ok((other, false)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn text(s: &str) -> AnalyzerOutput {
        AnalyzerOutput::Text(s.to_string())
    }

    #[test]
    fn test_typed_item_passes_through_unchanged() {
        let item = ExtractedItem {
            core_problem: "p".into(),
            ..Default::default()
        };
        let extraction = normalize(AnalyzerOutput::Typed(item.clone())).unwrap();
        assert_eq!(extraction.item, item);
        assert_eq!(extraction.route, ParseRoute::Typed);
        assert!(!extraction.unwrapped);
    }

    #[test]
    fn test_mapping_is_validated() {
        let map = json!({"core_problem": "p", "datasets_used": "d"})
            .as_object()
            .cloned()
            .unwrap();
        let extraction = normalize(AnalyzerOutput::Mapping(map)).unwrap();
        assert_eq!(extraction.route, ParseRoute::Mapping);
        assert_eq!(extraction.item.datasets_used, vec!["d"]);
    }

    #[rstest]
    #[case::plain_json(r#"{"core_problem": "p"}"#, ParseRoute::Json, false)]
    #[case::fenced_json("```json\n{\"core_problem\": \"p\"}\n```", ParseRoute::Json, false)]
    #[case::bare_fence("```\n{\"core_problem\": \"p\"}```", ParseRoute::Json, false)]
    #[case::literal("{'core_problem': 'p', 'key_methodology': None,}", ParseRoute::Literal, false)]
    #[case::list(r#"[{"core_problem": "p"}, {"core_problem": "q"}]"#, ParseRoute::Json, true)]
    #[case::envelope_list(r#"{"papers": [{"core_problem": "p"}]}"#, ParseRoute::Json, true)]
    #[case::envelope_object("{'paper': {'core_problem': 'p'}}", ParseRoute::Literal, true)]
    #[case::tuple("({'core_problem': 'p'},)", ParseRoute::Literal, true)]
    #[case::prose("Here you go:\n{\"core_problem\": \"p\"}\nThanks", ParseRoute::Json, false)]
    fn test_text_routes(#[case] input: &str, #[case] route: ParseRoute, #[case] unwrapped: bool) {
        let extraction = normalize(text(input)).unwrap();
        assert_eq!(extraction.item.core_problem, "p");
        assert_eq!(extraction.route, route);
        assert_eq!(extraction.unwrapped, unwrapped);
    }

    #[rstest]
    #[case::empty("")]
    #[case::prose_only("I could not read this page.")]
    #[case::empty_list("[]")]
    #[case::scalar("42")]
    #[case::unknown_object(r#"{"summary": "nothing useful"}"#)]
    #[case::envelope_of_scalar(r#"{"items": ["a"]}"#)]
    #[case::all_empty(r#"{"core_problem": "", "contributions": []}"#)]
    fn test_text_failures(#[case] input: &str) {
        assert!(matches!(normalize(text(input)), Err(AppError::Validation(_))));
    }

    #[rstest]
    #[case::unclosed_lists("[".repeat(5_000) + &"]".repeat(4_999))]
    #[case::balanced_tuples("(".repeat(10_000) + &")".repeat(10_000))]
    #[case::fenced_dicts(format!("```\n{}\n```", "{'a': ".repeat(2_000)))]
    fn test_deeply_nested_text_is_rejected(#[case] input: String) {
        assert!(matches!(normalize(text(&input)), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_same_text_normalizes_identically() {
        let raw = "{'core_problem': 'p', 'contributions': ('a', 'b')}";
        let first = normalize(text(raw)).unwrap();
        let second = normalize(text(raw)).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.item.contributions, vec!["a", "b"]);
    }

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```json\n{}\n```"), "{}");
        assert_eq!(strip_code_fences("{}"), "{}");
        assert_eq!(strip_code_fences("```{}```"), "{}");
    }
}

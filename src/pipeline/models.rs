//! Data model shared by the pipeline stages.

use super::progress::ProgressSender;
use crate::types::{AppError, Result};
use chrono::{DateTime, Utc};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

// ============= Run State =============

/// Stage of a run. Transitions only move forward; any live state may fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    Idle,
    Searching,
    Reading,
    Analyzing,
    SectionWriting,
    Assembling,
    Done,
    Failed,
}

impl RunState {
    fn ordinal(self) -> u8 {
        match self {
            RunState::Idle => 0,
            RunState::Searching => 1,
            RunState::Reading => 2,
            RunState::Analyzing => 3,
            RunState::SectionWriting => 4,
            RunState::Assembling => 5,
            RunState::Done => 6,
            RunState::Failed => 7,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Done | RunState::Failed)
    }

    /// Check that `next` is reachable from `self`
    pub fn can_advance_to(self, next: RunState) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            RunState::Failed => true,
            _ => next.ordinal() == self.ordinal() + 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunState::Idle => "IDLE",
            RunState::Searching => "SEARCHING",
            RunState::Reading => "READING",
            RunState::Analyzing => "ANALYZING",
            RunState::SectionWriting => "SECTION_WRITING",
            RunState::Assembling => "ASSEMBLING",
            RunState::Done => "DONE",
            RunState::Failed => "FAILED",
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============= Search Results =============

/// A source found by the search stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Opaque reference, unique within a run
    pub id: String,
    pub title: String,
    pub url: Option<String>,
    pub snippet: String,
    /// Provider-specific fields, kept verbatim
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl SearchResult {
    /// All known fields flattened into one map, typed fields winning
    pub fn raw_metadata(&self) -> Map<String, Value> {
        let mut map = self.metadata.clone();
        map.insert("id".to_string(), Value::String(self.id.clone()));
        map.insert("title".to_string(), Value::String(self.title.clone()));
        map.insert(
            "url".to_string(),
            self.url.clone().map(Value::String).unwrap_or(Value::Null),
        );
        map.insert("snippet".to_string(), Value::String(self.snippet.clone()));
        map
    }
}

// ============= Extracted Items =============

/// Method described by a source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyMethodology {
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub principle: String,
    #[serde(default, deserialize_with = "lenient_optional_string")]
    pub novelty: Option<String>,
}

impl KeyMethodology {
    pub fn is_empty(&self) -> bool {
        self.name.is_empty()
            && self.principle.is_empty()
            && self.novelty.as_deref().is_none_or(str::is_empty)
    }
}

/// Structured summary of one source.
///
/// Deserialization is lenient: `null` strings become empty, a lone string
/// where a list is expected becomes a one-element list, numbers become their
/// text. Anything else of the wrong shape is a validation failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedItem {
    #[serde(default, deserialize_with = "lenient_string")]
    pub core_problem: String,
    #[serde(default, deserialize_with = "lenient_methodology")]
    pub key_methodology: KeyMethodology,
    #[serde(default, deserialize_with = "lenient_list")]
    pub datasets_used: Vec<String>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub evaluation_metrics: Vec<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub main_results: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub limitations: String,
    #[serde(default, deserialize_with = "lenient_list")]
    pub contributions: Vec<String>,
}

impl ExtractedItem {
    /// Validate an untyped value against the item schema
    pub fn from_value(value: Value) -> Result<Self> {
        if !value.is_object() {
            return Err(AppError::Validation(format!(
                "expected an object, got {}",
                value_kind(&value)
            )));
        }
        let item: ExtractedItem = serde_json::from_value(value)
            .map_err(|e| AppError::Validation(format!("schema mismatch: {}", e)))?;
        if item.is_empty() {
            return Err(AppError::Validation(
                "object carries none of the item fields".to_string(),
            ));
        }
        Ok(item)
    }

    pub fn is_empty(&self) -> bool {
        self.core_problem.is_empty()
            && self.key_methodology.is_empty()
            && self.datasets_used.is_empty()
            && self.evaluation_metrics.is_empty()
            && self.main_results.is_empty()
            && self.limitations.is_empty()
            && self.contributions.is_empty()
    }
}

pub(crate) fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn scalar_to_string<E: de::Error>(value: Value) -> std::result::Result<Option<String>, E> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s)),
        Value::Number(n) => Ok(Some(n.to_string())),
        Value::Bool(b) => Ok(Some(b.to_string())),
        other => Err(E::custom(format!(
            "expected a string, got {}",
            value_kind(&other)
        ))),
    }
}

fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<String, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(scalar_to_string::<D::Error>(value)?.unwrap_or_default())
}

fn lenient_optional_string<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<String>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(scalar_to_string::<D::Error>(value)?.filter(|s| !s.is_empty()))
}

fn lenient_list<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Vec<String>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    match value {
        Value::Null => Ok(Vec::new()),
        Value::String(s) if s.trim().is_empty() => Ok(Vec::new()),
        Value::String(s) => Ok(vec![s]),
        Value::Array(values) => {
            let mut out = Vec::with_capacity(values.len());
            for v in values {
                if let Some(s) = scalar_to_string::<D::Error>(v)? {
                    if !s.is_empty() {
                        out.push(s);
                    }
                }
            }
            Ok(out)
        }
        other => Err(de::Error::custom(format!(
            "expected a list of strings, got {}",
            value_kind(&other)
        ))),
    }
}

fn lenient_methodology<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<KeyMethodology, D::Error> {
    let value = Value::deserialize(deserializer)?;
    match value {
        Value::Null => Ok(KeyMethodology::default()),
        Value::String(name) => Ok(KeyMethodology {
            name,
            ..Default::default()
        }),
        Value::Object(_) => serde_json::from_value(value).map_err(de::Error::custom),
        other => Err(de::Error::custom(format!(
            "expected a methodology object, got {}",
            value_kind(&other)
        ))),
    }
}

/// Which normalization step produced an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseRoute {
    /// Already typed, accepted as-is
    Typed,
    /// Untyped mapping validated directly
    Mapping,
    /// Text parsed as strict JSON
    Json,
    /// Text parsed with the permissive literal grammar
    Literal,
}

/// A validated item plus how it was obtained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Extraction {
    pub item: ExtractedItem,
    pub route: ParseRoute,
    /// Whether the value was taken out of a list or an envelope key
    pub unwrapped: bool,
}

/// An extraction paired with the source it came from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedSource {
    pub source: SearchResult,
    pub extraction: Extraction,
}

// ============= Outline & Sections =============

/// Canonical 0-based section position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SectionIndex(usize);

impl SectionIndex {
    pub fn new(position: usize) -> Self {
        Self(position)
    }

    /// Position in the outline and in the slot array
    pub fn position(self) -> usize {
        self.0
    }

    /// 1-based number used in every emitted event tag
    pub fn external(self) -> usize {
        self.0 + 1
    }

    /// Inverse of [`SectionIndex::external`]; `0` has no section
    pub fn from_external(external: usize) -> Option<Self> {
        external.checked_sub(1).map(Self)
    }
}

impl fmt::Display for SectionIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.external())
    }
}

/// One planned report section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutlineSection {
    pub index: SectionIndex,
    pub title: String,
    pub description: String,
}

impl OutlineSection {
    pub fn new(index: usize, title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            index: SectionIndex::new(index),
            title: title.into(),
            description: description.into(),
        }
    }
}

/// Output of the analysis stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Analysis {
    pub global_analysis: String,
    pub outline: Vec<OutlineSection>,
}

/// Lifecycle of one section slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SectionStatus {
    Pending,
    Drafting,
    Reviewing,
    Done,
    Failed,
}

impl SectionStatus {
    /// `Done` or `Failed`
    pub fn is_terminal(self) -> bool {
        matches!(self, SectionStatus::Done | SectionStatus::Failed)
    }
}

/// Mutable output slot for one outline section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionState {
    pub content: String,
    pub status: SectionStatus,
    pub error: Option<String>,
}

impl SectionState {
    pub fn pending() -> Self {
        Self {
            content: String::new(),
            status: SectionStatus::Pending,
            error: None,
        }
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        self.status = SectionStatus::Failed;
        self.error = Some(message.into());
    }
}

impl Default for SectionState {
    fn default() -> Self {
        Self::pending()
    }
}

// ============= Run =============

/// One end-to-end execution for a single request, bound to the progress
/// channel its events go out on.
#[derive(Debug, Clone, Serialize)]
pub struct Run {
    pub id: String,
    pub request: String,
    pub state: RunState,
    pub created_at: DateTime<Utc>,
    pub search_results: Vec<SearchResult>,
    pub extracted: Vec<ExtractedSource>,
    pub analysis: Option<Analysis>,
    pub sections: Vec<SectionState>,
    pub report: Option<String>,
    #[serde(skip)]
    pub progress: ProgressSender,
}

impl Run {
    /// A fresh run, identified by its progress channel's run id
    pub fn new(request: impl Into<String>, progress: ProgressSender) -> Self {
        Self {
            id: progress.run_id().to_string(),
            request: request.into(),
            state: RunState::Idle,
            created_at: Utc::now(),
            search_results: Vec::new(),
            extracted: Vec::new(),
            analysis: None,
            sections: Vec::new(),
            report: None,
            progress,
        }
    }

    /// Move to `next`, refusing backward or post-terminal transitions
    pub fn advance(&mut self, next: RunState) -> Result<()> {
        if !self.state.can_advance_to(next) {
            return Err(AppError::Internal(format!(
                "illegal run transition {} -> {}",
                self.state, next
            )));
        }
        tracing::debug!(run_id = %self.id, from = %self.state, to = %next, "run transition");
        self.state = next;
        Ok(())
    }
}

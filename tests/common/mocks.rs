//! Mock implementations for testing.
//!
//! Scripted stand-ins for every pipeline collaborator, so whole runs can be
//! driven without a model server or network access.

use async_trait::async_trait;
use futures::stream;
use parking_lot::Mutex;
use scribe::knowledge::{Embedder, InMemoryKnowledgeStore, KnowledgeStore, QueryHit, StoreId, StoreItems};
use scribe::llm::{LLMClient, TextStream};
use scribe::pipeline::cell::{ConversationCell, Participant, RejectionKind, Role, Signal, Transcript, TurnChunk, TurnStream};
use scribe::pipeline::{
    Analysis, Analyst, AnalyzerOutput, CellFactory, ContentAnalyzer, ExtractedSource,
    OutlineSection, ResearchPipeline, SearchResult,
};
use scribe::tools::{RetrievalScope, Searcher};
use scribe::types::{AppError, Result};
use scribe::utils::toml_config::{EmbeddingConfig, ScribeConfig};
use serde_json::{Map, json};
use std::collections::VecDeque;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Arc;

// ============= LLM =============

/// Mock LLM client that returns one fixed response, or always fails.
#[derive(Clone)]
pub struct MockLLMClient {
    response: String,
    should_fail: bool,
}

impl MockLLMClient {
    /// Create a new mock client that returns the given response.
    pub fn new(response: &str) -> Self {
        Self {
            response: response.to_string(),
            should_fail: false,
        }
    }

    /// Create a mock client that always returns an error.
    pub fn failing() -> Self {
        Self {
            response: String::new(),
            should_fail: true,
        }
    }

    fn reply(&self) -> Result<String> {
        if self.should_fail {
            return Err(AppError::LLM("Mock LLM failure".to_string()));
        }
        Ok(self.response.clone())
    }
}

#[async_trait]
impl LLMClient for MockLLMClient {
    async fn generate(&self, _prompt: &str) -> Result<String> {
        self.reply()
    }

    async fn generate_with_system(&self, _system: &str, _prompt: &str) -> Result<String> {
        self.reply()
    }

    async fn generate_with_history(&self, _messages: &[(String, String)]) -> Result<String> {
        self.reply()
    }

    async fn stream(&self, _prompt: &str) -> Result<TextStream> {
        let reply = self.reply()?;
        Ok(Box::new(stream::iter(vec![Ok(reply)])))
    }

    async fn stream_with_history(&self, _messages: &[(String, String)]) -> Result<TextStream> {
        let reply = self.reply()?;
        Ok(Box::new(stream::iter(vec![Ok(reply)])))
    }

    fn model_name(&self) -> &str {
        "mock-model"
    }
}

// ============= Stage collaborators =============

/// Returns `count` numbered results, or fails.
pub struct StubSearcher {
    count: usize,
    fail: bool,
}

impl StubSearcher {
    pub fn with_results(count: usize) -> Self {
        Self { count, fail: false }
    }

    pub fn failing() -> Self {
        Self {
            count: 0,
            fail: true,
        }
    }
}

pub fn search_result(i: usize) -> SearchResult {
    let mut metadata = Map::new();
    metadata.insert("rank".to_string(), json!(i + 1));
    SearchResult {
        id: i.to_string(),
        title: format!("Paper {}", i),
        url: Some(format!("https://example.org/paper/{}", i)),
        snippet: format!("Snippet about sparse attention variant {}", i),
        metadata,
    }
}

#[async_trait]
impl Searcher for StubSearcher {
    async fn search(&self, _query: &str, max_results: usize) -> Result<Vec<SearchResult>> {
        if self.fail {
            return Err(AppError::Search("search provider unavailable".to_string()));
        }
        Ok((0..self.count.min(max_results)).map(search_result).collect())
    }
}

/// Answers every source with fenced JSON; titles containing a marker fail.
pub struct StubAnalyzer {
    fail_title: Option<String>,
}

impl StubAnalyzer {
    pub fn new() -> Self {
        Self { fail_title: None }
    }

    pub fn failing_on(title: &str) -> Self {
        Self {
            fail_title: Some(title.to_string()),
        }
    }
}

#[async_trait]
impl ContentAnalyzer for StubAnalyzer {
    async fn analyze(&self, _request: &str, source: &SearchResult) -> Result<AnalyzerOutput> {
        if self.fail_title.as_deref() == Some(source.title.as_str()) {
            return Ok(AnalyzerOutput::Text("I could not read that page.".to_string()));
        }
        Ok(AnalyzerOutput::Text(format!(
            "```json\n{}\n```",
            json!({
                "core_problem": format!("problem studied by {}", source.title),
                "key_methodology": {"name": "sparse attention", "principle": "attend to fewer tokens"},
                "datasets_used": ["LRA"],
                "main_results": "faster at equal quality",
            })
        )))
    }
}

/// Outlines a fixed number of sections.
pub struct StubAnalyst {
    sections: usize,
}

impl StubAnalyst {
    pub fn with_sections(sections: usize) -> Self {
        Self { sections }
    }
}

#[async_trait]
impl Analyst for StubAnalyst {
    async fn analyze(&self, _request: &str, sources: &[ExtractedSource]) -> Result<Analysis> {
        Ok(Analysis {
            global_analysis: format!("{} sources agree on sparsity", sources.len()),
            outline: (0..self.sections)
                .map(|i| OutlineSection::new(i, format!("Part {}", i + 1), "details"))
                .collect(),
        })
    }
}

// ============= Conversation cells =============

/// Participant that replays its replies in order.
pub struct ScriptedParticipant {
    role: Role,
    replies: Mutex<VecDeque<String>>,
    approval: String,
}

impl ScriptedParticipant {
    pub fn new(role: Role, replies: &[&str]) -> Self {
        Self {
            role,
            replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
            approval: "APPROVE".to_string(),
        }
    }
}

#[async_trait]
impl Participant for ScriptedParticipant {
    fn role(&self) -> Role {
        self.role
    }

    async fn take_turn(&self, _transcript: &Transcript) -> Result<TurnStream> {
        let reply = self
            .replies
            .lock()
            .pop_front()
            .ok_or_else(|| AppError::LLM(format!("{} has nothing left to say", self.role)))?;
        Ok(Box::new(stream::iter(vec![Ok(TurnChunk::Text(reply))])))
    }

    fn classify(&self, visible: &str) -> Signal {
        match self.role {
            Role::Writer if visible.contains("[[NEED_RETRIEVAL]]") => Signal::NeedsKnowledge,
            Role::Writer => Signal::Draft,
            Role::Retriever => Signal::Evidence,
            Role::Reviewer if visible.starts_with("FACTUAL:") => {
                Signal::Rejected(RejectionKind::Factual)
            }
            Role::Reviewer if visible.contains(&self.approval) => Signal::Approved,
            Role::Reviewer => Signal::Rejected(RejectionKind::Structural),
        }
    }
}

/// Builds draft-then-approve cells; sections listed in `failing` cannot be built.
pub struct ScriptedCellFactory {
    failing: Vec<usize>,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedCellFactory {
    pub fn new() -> Self {
        Self {
            failing: Vec::new(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Fail the sections with these 1-based numbers
    pub fn failing(sections: &[usize]) -> Self {
        Self {
            failing: sections.to_vec(),
            prompts: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl CellFactory for ScriptedCellFactory {
    async fn build(&self, _scope: &RetrievalScope, prompt: String) -> Result<ConversationCell> {
        self.prompts.lock().push(prompt.clone());

        let number = self
            .failing
            .iter()
            .find(|n| prompt.contains(&format!("Current section ({}):", n)));
        if let Some(n) = number {
            return Err(AppError::LLM(format!("model refused section {}", n)));
        }

        let title = prompt
            .lines()
            .find_map(|l| l.strip_prefix("Current section "))
            .unwrap_or("section")
            .to_string();
        let draft = format!("Draft for {}", title);

        ConversationCell::new(
            Arc::new(ScriptedParticipant::new(Role::Writer, &[draft.as_str()])),
            Arc::new(ScriptedParticipant::new(Role::Retriever, &[])),
            Arc::new(ScriptedParticipant::new(Role::Reviewer, &["APPROVE"])),
            6,
            prompt,
        )
    }
}

// ============= Knowledge store =============

/// Deterministic bag-of-words embedder, so retrieval needs no model files.
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| {
                let mut vector = vec![0.0f32; self.dimension];
                for token in text.split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty()) {
                    let mut hasher = DefaultHasher::new();
                    token.to_lowercase().hash(&mut hasher);
                    vector[(hasher.finish() % self.dimension as u64) as usize] += 1.0;
                }
                vector
            })
            .collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "hashing"
    }
}

/// In-memory store with the hashing embedder at the default dimension
pub fn memory_store() -> InMemoryKnowledgeStore {
    InMemoryKnowledgeStore::new(Arc::new(HashingEmbedder::new(384)))
}

/// In-memory store that remembers which indices were created and deleted.
pub struct RecordingStore {
    inner: InMemoryKnowledgeStore,
    pub created: Mutex<Vec<StoreId>>,
    pub deleted: Mutex<Vec<StoreId>>,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self {
            inner: memory_store(),
            created: Mutex::new(Vec::new()),
            deleted: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl KnowledgeStore for RecordingStore {
    fn provider_name(&self) -> &'static str {
        "recording"
    }

    async fn create_ephemeral_store(&self, embedding: &EmbeddingConfig) -> Result<StoreId> {
        let id = self.inner.create_ephemeral_store(embedding).await?;
        self.created.lock().push(id.clone());
        Ok(id)
    }

    async fn create_store(&self, name: &str, embedding: &EmbeddingConfig) -> Result<StoreId> {
        self.inner.create_store(name, embedding).await
    }

    async fn add_items(&self, store: &StoreId, items: StoreItems) -> Result<usize> {
        self.inner.add_items(store, items).await
    }

    async fn query(
        &self,
        store: &StoreId,
        query_texts: &[String],
        top_k: usize,
        similarity_threshold: f32,
    ) -> Result<Vec<QueryHit>> {
        self.inner
            .query(store, query_texts, top_k, similarity_threshold)
            .await
    }

    async fn delete_store(&self, store: &StoreId) -> Result<()> {
        self.deleted.lock().push(store.clone());
        self.inner.delete_store(store).await
    }

    async fn count(&self, store: &StoreId) -> Result<usize> {
        self.inner.count(store).await
    }

    async fn store_exists(&self, store: &StoreId) -> Result<bool> {
        self.inner.store_exists(store).await
    }
}

// ============= Pipeline =============

pub fn pipeline_with(
    searcher: Arc<dyn Searcher>,
    analyzer: Arc<dyn ContentAnalyzer>,
    analyst: Arc<dyn Analyst>,
    cells: Arc<dyn CellFactory>,
    store: Arc<dyn KnowledgeStore>,
) -> ResearchPipeline {
    ResearchPipeline::builder(Arc::new(ScribeConfig::default()))
        .searcher(searcher)
        .analyzer(analyzer)
        .analyst(analyst)
        .cell_factory(cells)
        .store(store)
        .build()
        .expect("all collaborators supplied")
}

/// A pipeline where every stage succeeds
pub fn happy_pipeline(sources: usize, sections: usize) -> ResearchPipeline {
    pipeline_with(
        Arc::new(StubSearcher::with_results(sources)),
        Arc::new(StubAnalyzer::new()),
        Arc::new(StubAnalyst::with_sections(sections)),
        Arc::new(ScriptedCellFactory::new()),
        Arc::new(memory_store()),
    )
}

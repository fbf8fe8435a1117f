//! # Scribe - staged research reports
//!
//! Scribe turns one research request into a multi-section markdown report.
//! A run searches the web, reads each source into a structured extraction,
//! outlines the report, writes every section in parallel through a small
//! writer / retriever / reviewer conversation, and assembles the result,
//! streaming tagged progress events the whole way.
//!
//! ## Overview
//!
//! Scribe can be used in two ways:
//!
//! 1. **As a standalone server** - Run the `scribe-server` binary and open
//!    `GET /api/research?query=...` as a Server-Sent Events stream
//! 2. **As a library** - Build a [`ResearchPipeline`] with your own searcher,
//!    analyzers and knowledge store
//!
//! ### Basic Example
//!
//! ```rust,ignore
//! use scribe::{ResearchPipeline, ScribeConfigManager};
//!
//! let manager = ScribeConfigManager::new("scribe.toml")?;
//! let pipeline = ResearchPipeline::builder(manager.config())
//!     .searcher(searcher)
//!     .analyzer(analyzer)
//!     .analyst(analyst)
//!     .cell_factory(cells)
//!     .store(store)
//!     .build()?;
//!
//! let mut handle = pipeline.start("state of sparse attention");
//! while let Some(event) = handle.events.recv().await {
//!     println!("{}: {:?}", event.tag(), event.state);
//! }
//! let outcome = handle.join().await?;
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `ollama` | Ollama local inference and embeddings (default) |
//! | `openai` | OpenAI API and compatible endpoints |
//! | `local-embeddings` | In-process fastembed embeddings (default) |
//!
//! ## Modules
//!
//! - [`pipeline`] - Orchestrator, stages, conversation cells and progress
//! - [`agents`] - Model-backed participants and analyzers
//! - [`knowledge`] - Chunking, embedding and similarity queries
//! - [`tools`] - Web search and knowledge retrieval tools
//! - [`llm`] - LLM client implementations
//! - [`api`] - HTTP routes and the SSE research stream
//! - [`types`] - Common types and error handling

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

/// Model-backed pipeline participants.
pub mod agents;
/// HTTP API handlers and routes.
pub mod api;
/// Command-line parsing and terminal output.
pub mod cli;
/// Knowledge store: chunking, embeddings, similarity queries.
pub mod knowledge;
/// LLM provider clients and abstractions.
pub mod llm;
/// The research report pipeline.
pub mod pipeline;
/// Built-in tools (web search, knowledge retrieval).
pub mod tools;
/// Core types (requests, responses, errors).
pub mod types;
/// Configuration utilities (TOML).
pub mod utils;

// Re-export commonly used types
pub use knowledge::{InMemoryKnowledgeStore, KnowledgeStore};
pub use llm::{LLMClient, LLMClientFactory, Provider};
pub use pipeline::{ProgressEvent, ResearchPipeline, RunHandle, RunOutcome};
pub use tools::registry::ToolRegistry;
pub use types::{AppError, Result};
pub use utils::toml_config::{ScribeConfig, ScribeConfigManager};

use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// TOML configuration with hot-reload support
    pub config_manager: Arc<ScribeConfigManager>,
    /// The pipeline every research request runs through
    pub pipeline: Arc<ResearchPipeline>,
}

//! Knowledge Store
//!
//! Chunk, embed, store and query text for retrieval during section writing.
//!
//! # Module Structure
//!
//! - [`store`] - The [`KnowledgeStore`] trait and its item/hit types
//! - [`memory`] - In-process implementation with cosine distance
//! - [`embeddings`] - fastembed and Ollama embedders
//! - [`chunker`] - Markdown chunking for corpus ingestion
//!
//! # Lifecycle
//!
//! 1. **Ephemeral** - each run creates its own index for extracted sources and
//!    deletes it when the run ends
//! 2. **Corpus** - files listed in `knowledge.corpus_paths` are chunked into a
//!    long-lived index at startup and queried by every run

/// Markdown chunking and corpus ingestion.
pub mod chunker;
/// Embedding backends.
pub mod embeddings;
/// In-memory vector store.
pub mod memory;
/// Store trait and item types.
pub mod store;

pub use chunker::TextChunker;
pub use embeddings::{Embedder, create_embedder, fastembed_dimension};
#[cfg(feature = "local-embeddings")]
pub use embeddings::FastEmbedEmbedder;
pub use memory::InMemoryKnowledgeStore;
pub use store::{KnowledgeStore, QueryHit, StoreId, StoreItems};

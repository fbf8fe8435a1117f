use super::store::{KnowledgeStore, StoreId, StoreItems};
use crate::types::{AppError, Result};
use serde_json::{Map, Value, json};
use std::path::Path;
use text_splitter::{ChunkConfig, Characters, MarkdownSplitter};
use uuid::Uuid;

/// Markdown-aware splitter used for corpus ingestion.
pub struct TextChunker {
    splitter: MarkdownSplitter<Characters>,
}

/// One chunk of a source file, ready to embed.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: String,
    pub content: String,
    pub metadata: Map<String, Value>,
}

impl TextChunker {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        let config = ChunkConfig::new(chunk_size)
            .with_overlap(chunk_overlap)
            .map_err(|e| AppError::Configuration(format!("Invalid chunk config: {}", e)))?;

        Ok(Self {
            splitter: MarkdownSplitter::new(config),
        })
    }

    /// Split text into chunks with ids `{file_id}_chunk_{i}`
    pub fn chunk(&self, text: &str, file_id: &str, source: &str) -> Vec<Chunk> {
        self.splitter
            .chunks(text)
            .enumerate()
            .map(|(index, content)| {
                let id = format!("{}_chunk_{}", file_id, index);
                let mut metadata = Map::new();
                metadata.insert("source".to_string(), json!(source));
                metadata.insert("file_id".to_string(), json!(file_id));
                metadata.insert("chunk_id".to_string(), json!(id));
                metadata.insert("chunk_index".to_string(), json!(index));
                Chunk {
                    id,
                    content: content.to_string(),
                    metadata,
                }
            })
            .collect()
    }

    /// Read a file, chunk it and add the chunks to `store`
    pub async fn ingest_file(
        &self,
        store: &dyn KnowledgeStore,
        store_id: &StoreId,
        path: &Path,
    ) -> Result<usize> {
        let text = tokio::fs::read_to_string(path).await.map_err(|e| {
            AppError::Knowledge(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let source = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let file_id = format!("file_{}", &Uuid::new_v4().simple().to_string()[..8]);

        let chunks = self.chunk(&text, &file_id, &source);
        let mut documents = Vec::with_capacity(chunks.len());
        let mut metadatas = Vec::with_capacity(chunks.len());
        let mut ids = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            documents.push(chunk.content);
            metadatas.push(chunk.metadata);
            ids.push(chunk.id);
        }

        let added = store
            .add_items(store_id, StoreItems::new(documents, metadatas, ids)?)
            .await?;
        tracing::info!(file = %path.display(), chunks = added, "ingested corpus file");
        Ok(added)
    }
}

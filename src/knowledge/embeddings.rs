//! Text embedding backends
//!
//! - `FastEmbedEmbedder` - local ONNX models via fastembed (`local-embeddings` feature)
//! - `OllamaEmbedder` - vectors from an Ollama embedding model (`ollama` feature)

use crate::types::{AppError, Result};
use crate::utils::toml_config::{EmbeddingConfig, EmbeddingProvider};
use async_trait::async_trait;
use std::sync::Arc;

/// Turns texts into fixed-size vectors for similarity search.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed each text into a vector of `dimension()` floats
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    fn dimension(&self) -> usize;

    fn name(&self) -> &str;
}

/// Build the embedder described by the `[embedding]` config section
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    match config.provider {
        #[cfg(feature = "local-embeddings")]
        EmbeddingProvider::FastEmbed => Ok(Arc::new(FastEmbedEmbedder::new(config)?)),

        #[cfg(not(feature = "local-embeddings"))]
        EmbeddingProvider::FastEmbed => Err(AppError::Configuration(
            "fastembed embeddings require the 'local-embeddings' feature".to_string(),
        )),

        #[cfg(feature = "ollama")]
        EmbeddingProvider::Ollama => Ok(Arc::new(OllamaEmbedder::new(
            &config.base_url,
            config.model.clone(),
            config.dimension,
        )?)),

        #[cfg(not(feature = "ollama"))]
        EmbeddingProvider::Ollama => Err(AppError::Configuration(
            "Ollama embeddings require the 'ollama' feature".to_string(),
        )),
    }
}

/// Supported fastembed models: config name, then output dimension
const FASTEMBED_MODELS: &[(&str, usize)] = &[
    ("bge-small-en-v1.5", 384),
    ("bge-base-en-v1.5", 768),
    ("all-minilm-l6-v2", 384),
    ("nomic-embed-text-v1.5", 768),
];

/// Output dimension of a supported fastembed model, matched case-insensitively
pub fn fastembed_dimension(model: &str) -> Option<usize> {
    FASTEMBED_MODELS
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(model))
        .map(|(_, dimension)| *dimension)
}

#[cfg(feature = "local-embeddings")]
pub use fastembed_embedder::FastEmbedEmbedder;

#[cfg(feature = "local-embeddings")]
mod fastembed_embedder {
    use super::*;
    use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
    use parking_lot::Mutex;

    /// In-process embeddings. The model is loaded (and downloaded on first
    /// use) when the embedder is built; inference runs on the blocking pool.
    pub struct FastEmbedEmbedder {
        model: Arc<Mutex<TextEmbedding>>,
        name: String,
        dimension: usize,
    }

    fn model_for(name: &str) -> Result<EmbeddingModel> {
        match name.to_ascii_lowercase().as_str() {
            "bge-small-en-v1.5" => Ok(EmbeddingModel::BGESmallENV15),
            "bge-base-en-v1.5" => Ok(EmbeddingModel::BGEBaseENV15),
            "all-minilm-l6-v2" => Ok(EmbeddingModel::AllMiniLML6V2),
            "nomic-embed-text-v1.5" => Ok(EmbeddingModel::NomicEmbedTextV15),
            other => Err(AppError::Configuration(format!(
                "Unsupported fastembed model '{}'",
                other
            ))),
        }
    }

    impl FastEmbedEmbedder {
        pub fn new(config: &EmbeddingConfig) -> Result<Self> {
            let dimension = fastembed_dimension(&config.model).ok_or_else(|| {
                AppError::Configuration(format!("Unsupported fastembed model '{}'", config.model))
            })?;

            let mut options = InitOptions::new(model_for(&config.model)?)
                .with_show_download_progress(false);
            if let Some(dir) = &config.cache_dir {
                options = options.with_cache_dir(dir.clone());
            }

            let model = TextEmbedding::try_new(options)
                .map_err(|e| AppError::Knowledge(format!("fastembed init failed: {}", e)))?;
            tracing::info!(model = %config.model, dimension, "fastembed model loaded");

            Ok(Self {
                model: Arc::new(Mutex::new(model)),
                name: config.model.clone(),
                dimension,
            })
        }
    }

    #[async_trait]
    impl Embedder for FastEmbedEmbedder {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            if texts.is_empty() {
                return Ok(Vec::new());
            }

            let model = Arc::clone(&self.model);
            let texts = texts.to_vec();
            tokio::task::spawn_blocking(move || model.lock().embed(texts, None))
                .await
                .map_err(|e| AppError::Internal(format!("embedding task failed: {}", e)))?
                .map_err(|e| AppError::Knowledge(format!("fastembed error: {}", e)))
        }

        fn dimension(&self) -> usize {
            self.dimension
        }

        fn name(&self) -> &str {
            &self.name
        }
    }
}

#[cfg(feature = "ollama")]
pub use ollama_embedder::OllamaEmbedder;

#[cfg(feature = "ollama")]
mod ollama_embedder {
    use super::*;
    use ollama_rs::Ollama;
    use ollama_rs::generation::embeddings::request::{EmbeddingsInput, GenerateEmbeddingsRequest};

    /// Embeddings from an Ollama server.
    pub struct OllamaEmbedder {
        client: Ollama,
        model: String,
        dimension: usize,
    }

    impl OllamaEmbedder {
        pub fn new(base_url: &str, model: String, dimension: usize) -> Result<Self> {
            let (host, port) = crate::llm::ollama::parse_base_url(base_url)?;
            Ok(Self {
                client: Ollama::new(host, port),
                model,
                dimension,
            })
        }
    }

    #[async_trait]
    impl Embedder for OllamaEmbedder {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            if texts.is_empty() {
                return Ok(Vec::new());
            }

            let request = GenerateEmbeddingsRequest::new(
                self.model.clone(),
                EmbeddingsInput::Multiple(texts.to_vec()),
            );

            let response = self
                .client
                .generate_embeddings(request)
                .await
                .map_err(|e| AppError::Knowledge(format!("Ollama embedding error: {}", e)))?;

            if response.embeddings.len() != texts.len() {
                return Err(AppError::Knowledge(format!(
                    "Expected {} embeddings, got {}",
                    texts.len(),
                    response.embeddings.len()
                )));
            }

            Ok(response.embeddings)
        }

        fn dimension(&self) -> usize {
            self.dimension
        }

        fn name(&self) -> &str {
            &self.model
        }
    }
}

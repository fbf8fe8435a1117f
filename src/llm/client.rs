//! LLM Client abstractions and provider management
//!
//! This module provides a unified interface for the language providers the
//! pipeline talks to:
//! - **Ollama**: local inference with streaming (default feature)
//! - **OpenAI**: OpenAI API and compatible endpoints (`openai` feature)

use crate::types::{AppError, Result};
use crate::utils::toml_config::ProviderConfig;
use async_trait::async_trait;
use std::sync::Arc;

/// Boxed stream of incremental text fragments.
pub type TextStream = Box<dyn futures::Stream<Item = Result<String>> + Send + Unpin>;

/// Generic LLM client trait for provider abstraction
///
/// All providers implement this trait, so stages and participants never see
/// provider-specific types.
#[async_trait]
pub trait LLMClient: Send + Sync {
    /// Generate a completion from a prompt
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Generate with system prompt
    async fn generate_with_system(&self, system: &str, prompt: &str) -> Result<String>;

    /// Generate with conversation history
    async fn generate_with_history(
        &self,
        messages: &[(String, String)], // (role, content) pairs
    ) -> Result<String>;

    /// Stream a completion
    async fn stream(&self, prompt: &str) -> Result<TextStream>;

    /// Stream a completion over a conversation history
    async fn stream_with_history(&self, messages: &[(String, String)]) -> Result<TextStream>;

    /// Get the model name/identifier
    fn model_name(&self) -> &str;
}

/// Provider enum for runtime selection
#[derive(Debug, Clone)]
pub enum Provider {
    /// OpenAI API provider (including compatible APIs)
    ///
    /// # Example
    /// ```rust,ignore
    /// let provider = Provider::OpenAI {
    ///     api_key: "sk-...".to_string(),
    ///     api_base: "https://api.openai.com/v1".to_string(),
    ///     model: "gpt-4o-mini".to_string(),
    /// };
    /// ```
    OpenAI {
        api_key: String,
        api_base: String,
        model: String,
    },

    /// Ollama local LLM provider
    ///
    /// # Example
    /// ```rust,ignore
    /// let provider = Provider::Ollama {
    ///     base_url: "http://localhost:11434".to_string(),
    ///     model: "qwen3:8b".to_string(),
    /// };
    /// ```
    Ollama { base_url: String, model: String },
}

impl Provider {
    /// Resolve a provider from configuration, using `model` instead of the
    /// configured default.
    pub fn from_config(config: &ProviderConfig, model: &str) -> Result<Self> {
        match config {
            ProviderConfig::Ollama { base_url, .. } => Ok(Provider::Ollama {
                base_url: base_url.clone(),
                model: model.to_string(),
            }),
            ProviderConfig::OpenAI {
                api_key_env,
                api_base,
                ..
            } => {
                let api_key = std::env::var(api_key_env).map_err(|_| {
                    AppError::Configuration(format!(
                        "Environment variable '{}' is not set",
                        api_key_env
                    ))
                })?;
                Ok(Provider::OpenAI {
                    api_key,
                    api_base: api_base.clone(),
                    model: model.to_string(),
                })
            }
        }
    }

    /// Create a client instance for this provider
    ///
    /// # Errors
    ///
    /// Returns an error if the provider's cargo feature is disabled.
    pub async fn create_client(&self) -> Result<Box<dyn LLMClient>> {
        match self {
            #[cfg(feature = "openai")]
            Provider::OpenAI {
                api_key,
                api_base,
                model,
            } => Ok(Box::new(super::openai::OpenAIClient::new(
                api_key.clone(),
                api_base.clone(),
                model.clone(),
            ))),

            #[cfg(not(feature = "openai"))]
            Provider::OpenAI { .. } => Err(AppError::Configuration(
                "OpenAI provider requires the 'openai' feature".to_string(),
            )),

            #[cfg(feature = "ollama")]
            Provider::Ollama { base_url, model } => Ok(Box::new(
                super::ollama::OllamaClient::new(base_url.clone(), model.clone()).await?,
            )),

            #[cfg(not(feature = "ollama"))]
            Provider::Ollama { .. } => Err(AppError::Configuration(
                "Ollama provider requires the 'ollama' feature".to_string(),
            )),
        }
    }

    /// Get a human-readable name for this provider
    pub fn name(&self) -> &'static str {
        match self {
            Provider::OpenAI { .. } => "OpenAI",
            Provider::Ollama { .. } => "Ollama",
        }
    }

    pub fn model(&self) -> &str {
        match self {
            Provider::OpenAI { model, .. } | Provider::Ollama { model, .. } => model,
        }
    }
}

/// Configuration-based client factory
///
/// Holds the configured provider and hands out clients for the model each
/// stage asks for.
///
/// # Example
///
/// ```rust,ignore
/// use scribe::llm::LLMClientFactory;
///
/// let factory = LLMClientFactory::from_config(&config.llm);
/// let reader = factory.create_for_model(config.reading_model()).await?;
/// ```
pub struct LLMClientFactory {
    config: ProviderConfig,
}

impl LLMClientFactory {
    /// Factory for the provider in `[llm]`
    pub fn from_config(config: &ProviderConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Create a client for a specific model on the configured provider
    pub async fn create_for_model(&self, model: &str) -> Result<Arc<dyn LLMClient>> {
        let provider = Provider::from_config(&self.config, model)?;
        tracing::debug!(provider = provider.name(), model, "creating LLM client");
        Ok(Arc::from(provider.create_client().await?))
    }

    pub fn provider_config(&self) -> &ProviderConfig {
        &self.config
    }
}

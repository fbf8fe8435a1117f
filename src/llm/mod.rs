//! LLM Provider Clients and Abstractions
//!
//! This module provides a unified interface for the language providers used by
//! every pipeline stage. Provider-specific code stays behind the
//! [`LLMClient`] trait.
//!
//! # Architecture
//!
//! - [`LLMClient`] - The core trait that all providers implement
//! - [`Provider`] - Runtime provider selection
//! - [`LLMClientFactory`] - Creates clients from the `[llm]` section of `scribe.toml`
//!
//! # Supported Providers
//!
//! Enable providers via Cargo features:
//! - `ollama` - Local Ollama server (default)
//! - `openai` - OpenAI API and compatible endpoints
//!
//! # Streaming
//!
//! Both providers stream through [`LLMClient::stream_with_history`], which
//! returns a boxed `Stream<Item = Result<String>>` of text fragments.

/// Core LLM client trait and provider selection.
pub mod client;

/// Ollama client.
#[cfg(feature = "ollama")]
pub mod ollama;

/// OpenAI-compatible client.
#[cfg(feature = "openai")]
pub mod openai;

pub use client::{LLMClient, LLMClientFactory, Provider, TextStream};

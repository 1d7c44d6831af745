//! Provider module - external AI provider access
//!
//! Wraps an OpenAI-compatible API behind two narrow seams: chat completions
//! (used by extraction) and embeddings (used by storage and retrieval).
//! Services depend on the traits, not the concrete client, so tests can
//! substitute doubles without any network.

pub mod client;
pub mod types;

pub use client::OpenAiClient;
pub use types::{
    ChatCompletionRequest, ChatCompletionResponse, Choice, EmbeddingRequest, EmbeddingResponse,
    GenerationOptions, Message, Role, Usage,
};

use crate::error::Result;
use async_trait::async_trait;

/// Chat completion seam for the extraction service
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Run a single system+user exchange and return the assistant content
    async fn complete(&self, system_prompt: &str, user_text: &str) -> Result<String>;
}

/// Embedding seam for the storage and retrieval services
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a batch of texts, one vector per input, in input order
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// The fixed vector dimension produced by the configured model
    fn dimensions(&self) -> usize;
}

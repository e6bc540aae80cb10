// External model providers
// Embedding and language-model access behind injectable traits

pub mod openai;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

pub use openai::OpenAiClient;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("provider returned HTTP {0}")]
    Status(u16),
    #[error("malformed provider response: {0}")]
    InvalidResponse(String),
}

/// Maps text to fixed-dimension vectors. All embeddings written to storage
/// and all query vectors must come from the same provider configuration.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, ProviderError>;

    /// Embed a batch of texts in provider-bounded sub-batches, preserving
    /// input order
    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError>;

    fn dimension(&self) -> usize;
}

/// Maps a prompt to generated text
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, ProviderError>;
}

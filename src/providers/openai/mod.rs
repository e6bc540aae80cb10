
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::ProviderConfig;
use crate::providers::{EmbeddingProvider, LanguageModel, ProviderError};

const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
const EXPONENTIAL_BACKOFF_BASE: u64 = 2;
const CHAT_TEMPERATURE: f32 = 0.7;

/// Client for an OpenAI-compatible API serving both the embeddings and the
/// chat completions endpoints
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    base_url: String,
    api_key: String,
    embedding_model: String,
    chat_model: String,
    embedding_dimension: usize,
    batch_size: usize,
    timeout: Duration,
    retry_attempts: u32,
    agent: ureq::Agent,
}

#[derive(Debug, Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatRequestMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatRequestMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

impl OpenAiClient {
    #[inline]
    pub fn new(config: &ProviderConfig, api_key: String) -> Self {
        let timeout = Duration::from_secs(config.timeout_seconds);

        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();

        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            embedding_model: config.embedding_model.clone(),
            chat_model: config.chat_model.clone(),
            embedding_dimension: config.embedding_dimension as usize,
            batch_size: (config.batch_size as usize).max(1),
            timeout,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            agent,
        }
    }

    #[inline]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts.max(1);
        self
    }

    /// Generate embeddings for a batch of texts, splitting into
    /// provider-bounded sub-batches
    #[inline]
    pub fn embed_batch_sync(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Generating embeddings for {} texts", texts.len());

        let mut results = Vec::with_capacity(texts.len());

        for batch in texts.chunks(self.batch_size) {
            let request = EmbeddingsRequest {
                model: &self.embedding_model,
                input: batch,
            };

            let request_json = serde_json::to_string(&request)
                .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

            let url = format!("{}/embeddings", self.base_url);
            let authorization = format!("Bearer {}", self.api_key);
            let response_text = self.request_with_retry(|| {
                self.agent
                    .post(&url)
                    .header("Content-Type", "application/json")
                    .header("Authorization", authorization.as_str())
                    .send(&request_json)
                    .and_then(|mut resp| resp.body_mut().read_to_string())
            })?;

            let embeddings =
                parse_embeddings_response(&response_text, batch.len(), self.embedding_dimension)?;
            results.extend(embeddings);
        }

        debug!("Generated {} embeddings total", results.len());
        Ok(results)
    }

    /// Generate a chat completion for a single-turn prompt
    #[inline]
    pub fn complete_sync(&self, prompt: &str) -> Result<String, ProviderError> {
        debug!("Requesting completion (prompt length: {})", prompt.len());

        let request = ChatRequest {
            model: &self.chat_model,
            messages: vec![ChatRequestMessage {
                role: "user",
                content: prompt,
            }],
            temperature: CHAT_TEMPERATURE,
        };

        let request_json = serde_json::to_string(&request)
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        let url = format!("{}/chat/completions", self.base_url);
        let authorization = format!("Bearer {}", self.api_key);
        let response_text = self.request_with_retry(|| {
            self.agent
                .post(&url)
                .header("Content-Type", "application/json")
                .header("Authorization", authorization.as_str())
                .send(&request_json)
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })?;

        parse_chat_response(&response_text)
    }

    fn request_with_retry<F>(&self, mut request_fn: F) -> Result<String, ProviderError>
    where
        F: FnMut() -> Result<String, ureq::Error>,
    {
        let mut last_error = None;

        for attempt in 1..=self.retry_attempts {
            debug!("HTTP request attempt {}/{}", attempt, self.retry_attempts);

            match request_fn() {
                Ok(response_text) => return Ok(response_text),
                Err(error) => {
                    let (mapped, retryable) = self.classify_error(error);

                    if !retryable {
                        warn!("Non-retryable provider error: {}", mapped);
                        return Err(mapped);
                    }

                    warn!(
                        "Retryable provider error: {}, attempt {}/{}",
                        mapped, attempt, self.retry_attempts
                    );
                    last_error = Some(mapped);

                    if attempt < self.retry_attempts {
                        let delay_ms = EXPONENTIAL_BACKOFF_BASE.pow(attempt - 1) * 1000;
                        std::thread::sleep(Duration::from_millis(delay_ms));
                    }
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| ProviderError::Transport("request failed after retries".to_string())))
    }

    /// Map a transport error to the provider error taxonomy, along with
    /// whether it is worth retrying. Rate limits and server errors retry;
    /// other client errors fail immediately.
    fn classify_error(&self, error: ureq::Error) -> (ProviderError, bool) {
        match error {
            ureq::Error::StatusCode(status) => (
                ProviderError::Status(status),
                status == 429 || status >= 500,
            ),
            ureq::Error::Timeout(_) => (ProviderError::Timeout(self.timeout), true),
            ureq::Error::ConnectionFailed | ureq::Error::HostNotFound => {
                (ProviderError::Transport(error.to_string()), true)
            }
            ureq::Error::Io(e) => (ProviderError::Transport(e.to_string()), true),
            other => (ProviderError::Transport(other.to_string()), false),
        }
    }
}

fn parse_embeddings_response(
    response_text: &str,
    expected_count: usize,
    expected_dimension: usize,
) -> Result<Vec<Vec<f32>>, ProviderError> {
    let response: EmbeddingsResponse = serde_json::from_str(response_text)
        .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

    if response.data.len() != expected_count {
        return Err(ProviderError::InvalidResponse(format!(
            "expected {} embeddings, got {}",
            expected_count,
            response.data.len()
        )));
    }

    let embeddings: Vec<Vec<f32>> = response.data.into_iter().map(|d| d.embedding).collect();

    if let Some(mismatched) = embeddings
        .iter()
        .find(|e| e.len() != expected_dimension)
    {
        return Err(ProviderError::InvalidResponse(format!(
            "expected {}-dimension embeddings, got {}",
            expected_dimension,
            mismatched.len()
        )));
    }

    Ok(embeddings)
}

fn parse_chat_response(response_text: &str) -> Result<String, ProviderError> {
    let response: ChatResponse = serde_json::from_str(response_text)
        .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

    response
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.message.content)
        .ok_or_else(|| ProviderError::InvalidResponse("response contained no choices".to_string()))
}

#[async_trait]
impl EmbeddingProvider for OpenAiClient {
    #[inline]
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let mut embeddings = self.embed_many(&[text.to_string()]).await?;
        embeddings
            .pop()
            .ok_or_else(|| ProviderError::InvalidResponse("empty embedding response".to_string()))
    }

    #[inline]
    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let client = self.clone();
        let texts = texts.to_vec();

        tokio::task::spawn_blocking(move || client.embed_batch_sync(&texts))
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?
    }

    #[inline]
    fn dimension(&self) -> usize {
        self.embedding_dimension
    }
}

#[async_trait]
impl LanguageModel for OpenAiClient {
    #[inline]
    async fn complete(&self, prompt: &str) -> Result<String, ProviderError> {
        let client = self.clone();
        let prompt = prompt.to_string();

        tokio::task::spawn_blocking(move || client.complete_sync(&prompt))
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?
    }
}

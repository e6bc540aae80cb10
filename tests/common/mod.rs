// Shared fixtures for integration tests

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use bookrag::providers::{EmbeddingProvider, LanguageModel, ProviderError};

/// Deterministic embedding fake with per-text overrides and call counters
#[derive(Default)]
pub struct FakeEmbedder {
    dimension: usize,
    overrides: Mutex<HashMap<String, Vec<f32>>>,
    pub single_calls: AtomicUsize,
    pub batch_calls: AtomicUsize,
}

impl FakeEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            ..Self::default()
        }
    }

    pub fn with_override(self, text: &str, vector: Vec<f32>) -> Self {
        self.overrides
            .lock()
            .expect("overrides lock")
            .insert(text.to_string(), vector);
        self
    }

    fn vector_for(&self, text: &str) -> Vec<f32> {
        let overrides = self.overrides.lock().expect("overrides lock");
        overrides.get(text).cloned().unwrap_or_else(|| {
            let mut vector = vec![0.0; self.dimension];
            if let Some(first) = vector.first_mut() {
                *first = text.chars().count() as f32;
            }
            vector
        })
    }

    pub fn retrieval_calls(&self) -> usize {
        self.single_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for FakeEmbedder {
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        self.single_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.vector_for(text))
    }

    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|text| self.vector_for(text)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Language-model fake replaying scripted replies in order
#[derive(Default)]
pub struct FakeLanguageModel {
    replies: Mutex<VecDeque<String>>,
    pub calls: AtomicUsize,
}

impl FakeLanguageModel {
    pub fn with_replies(replies: &[&str]) -> Self {
        let model = Self::default();
        model
            .replies
            .lock()
            .expect("replies lock")
            .extend(replies.iter().map(|reply| (*reply).to_string()));
        model
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LanguageModel for FakeLanguageModel {
    async fn complete(&self, _prompt: &str) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let reply = self
            .replies
            .lock()
            .expect("replies lock")
            .pop_front()
            .unwrap_or_else(|| "OK".to_string());
        Ok(reply)
    }
}

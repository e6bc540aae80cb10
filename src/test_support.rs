// Shared fakes and fixtures for unit tests

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

use crate::database::Database;
use crate::providers::{EmbeddingProvider, LanguageModel, ProviderError};

pub(crate) async fn create_test_database() -> (Database, TempDir) {
    let temp_dir = TempDir::new().expect("can create temp dir");
    let database = Database::new(temp_dir.path().join("catalog.db"))
        .await
        .expect("can create database");
    (database, temp_dir)
}

/// Deterministic embedding fake with per-text overrides and call counters
pub(crate) struct FakeEmbedder {
    dimension: usize,
    overrides: Mutex<HashMap<String, Vec<f32>>>,
    pub single_calls: AtomicUsize,
    pub batch_calls: AtomicUsize,
    fail: bool,
}

impl FakeEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            overrides: Mutex::new(HashMap::new()),
            single_calls: AtomicUsize::new(0),
            batch_calls: AtomicUsize::new(0),
            fail: false,
        }
    }

    pub fn failing(dimension: usize) -> Self {
        let mut embedder = Self::new(dimension);
        embedder.fail = true;
        embedder
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
}

#[async_trait]
impl EmbeddingProvider for FakeEmbedder {
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        self.single_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(ProviderError::Transport("fake embedder failure".to_string()));
        }
        Ok(self.vector_for(text))
    }

    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(ProviderError::Transport("fake embedder failure".to_string()));
        }
        Ok(texts.iter().map(|text| self.vector_for(text)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Language-model fake replaying scripted replies in order
pub(crate) struct FakeLanguageModel {
    replies: Mutex<VecDeque<String>>,
    pub calls: AtomicUsize,
    pub prompts: Mutex<Vec<String>>,
    fail: bool,
    fail_when_exhausted: bool,
}

impl FakeLanguageModel {
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
            fail: false,
            fail_when_exhausted: false,
        }
    }

    pub fn with_replies(replies: &[&str]) -> Self {
        let model = Self::new();
        model
            .replies
            .lock()
            .expect("replies lock")
            .extend(replies.iter().map(|reply| (*reply).to_string()));
        model
    }

    /// Script some replies, then fail every later call
    pub fn with_replies_then_fail(replies: &[&str]) -> Self {
        let mut model = Self::with_replies(replies);
        model.fail_when_exhausted = true;
        model
    }

    pub fn failing() -> Self {
        let mut model = Self::new();
        model.fail = true;
        model
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LanguageModel for FakeLanguageModel {
    async fn complete(&self, prompt: &str) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts
            .lock()
            .expect("prompts lock")
            .push(prompt.to_string());

        if self.fail {
            return Err(ProviderError::Transport("fake model failure".to_string()));
        }

        let reply = self.replies.lock().expect("replies lock").pop_front();
        match reply {
            Some(reply) => Ok(reply),
            None if self.fail_when_exhausted => {
                Err(ProviderError::Transport("fake model exhausted".to_string()))
            }
            None => Ok("OK".to_string()),
        }
    }
}

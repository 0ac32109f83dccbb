//! Provider abstractions for embeddings and clause-review findings.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

pub mod lmstudio;
pub mod noop;
pub mod openai;
pub mod qdrant;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("not implemented")]
    NotImplemented,
    #[error("request failed: {0}")]
    RequestFailed(String),
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    #[error("unknown provider: {0}")]
    UnknownProvider(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedResponse {
    pub vectors: Vec<Vec<f32>>,
}

/// One retrieved passage handed to the reviewer as grounding context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextPassage {
    pub source: String,
    pub title: String,
    pub snippet: String,
}

/// Review request for a single clause plus the context retrieved for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewRequest {
    pub clause_id: String,
    pub clause_title: String,
    pub clause_text: String,
    pub context: Vec<ContextPassage>,
}

/// Wire shape of one reviewer finding. The engine converts this to its own
/// finding record at the boundary and never edits the text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawFinding {
    pub text: String,
    #[serde(default)]
    pub clause_hint: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub quote_start: Option<usize>,
    #[serde(default)]
    pub quote_end: Option<usize>,
}

#[async_trait::async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Order-preserving batch embedding; a single text is the batch of one.
    async fn embed(&self, texts: &[String]) -> Result<EmbedResponse, ProviderError>;
}

#[async_trait::async_trait]
pub trait FindingsProvider: Send + Sync {
    async fn review(&self, request: &ReviewRequest) -> Result<Vec<RawFinding>, ProviderError>;
}

#[derive(Default, Clone)]
pub struct ProviderRegistry {
    embeddings: HashMap<String, Arc<dyn EmbeddingProvider>>,
    reviewers: HashMap<String, Arc<dyn FindingsProvider>>,
    pub preferred_embedding: Option<String>,
    pub preferred_reviewer: Option<String>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_embedding(mut self, name: &str, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embeddings.insert(name.to_string(), provider);
        self
    }

    pub fn with_reviewer(mut self, name: &str, provider: Arc<dyn FindingsProvider>) -> Self {
        self.reviewers.insert(name.to_string(), provider);
        self
    }

    pub fn set_preferred_embedding(mut self, name: &str) -> Self {
        self.preferred_embedding = Some(name.to_string());
        self
    }

    pub fn set_preferred_reviewer(mut self, name: &str) -> Self {
        self.preferred_reviewer = Some(name.to_string());
        self
    }

    pub fn embedding(
        &self,
        name: Option<&str>,
    ) -> Result<Arc<dyn EmbeddingProvider>, ProviderError> {
        let key = name
            .map(str::to_string)
            .or_else(|| self.preferred_embedding.clone())
            .ok_or_else(|| {
                ProviderError::UnknownProvider("no embedding provider configured".into())
            })?;
        self.embeddings
            .get(&key)
            .cloned()
            .ok_or_else(|| ProviderError::UnknownProvider(key))
    }

    pub fn reviewer(&self, name: Option<&str>) -> Result<Arc<dyn FindingsProvider>, ProviderError> {
        let key = name
            .map(str::to_string)
            .or_else(|| self.preferred_reviewer.clone())
            .ok_or_else(|| {
                ProviderError::UnknownProvider("no findings provider configured".into())
            })?;
        self.reviewers
            .get(&key)
            .cloned()
            .ok_or_else(|| ProviderError::UnknownProvider(key))
    }
}

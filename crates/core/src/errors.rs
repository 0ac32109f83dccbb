//! Typed failures crossing component boundaries. Input problems degrade
//! inside components instead of surfacing here; these variants are for
//! upstream services being unreachable or misbehaving.

use std::sync::Arc;

use providers::ProviderError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

/// A text/vector pair recovered from cache before an upstream failure.
#[derive(Debug, Clone)]
pub struct CachedEmbedding {
    pub text: String,
    pub vector: Arc<Vec<f32>>,
}

#[derive(Debug, Error)]
pub enum EngineError {
    /// The embedding provider failed. `cached` carries whatever vectors the
    /// cache already held for the request, so callers can degrade.
    #[error("embedding provider unavailable: {source}")]
    EmbeddingUnavailable {
        #[source]
        source: ProviderError,
        cached: Vec<CachedEmbedding>,
    },

    #[error("vector store unavailable: {source}")]
    StoreUnavailable {
        #[source]
        source: ProviderError,
    },

    #[error("findings provider unavailable: {source}")]
    FindingsUnavailable {
        #[source]
        source: ProviderError,
    },
}

impl EngineError {
    /// Partial embeddings salvaged before the failure, if any.
    pub fn cached_embeddings(&self) -> &[CachedEmbedding] {
        match self {
            Self::EmbeddingUnavailable { cached, .. } => cached,
            _ => &[],
        }
    }
}

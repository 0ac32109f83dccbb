use crate::{
    EmbedResponse, EmbeddingProvider, FindingsProvider, ProviderError, RawFinding, ReviewRequest,
};

/// Offline placeholder providers. Embedding returns empty vectors so callers
/// can exercise the pipeline without a model; review declines.
#[derive(Debug, Default)]
pub struct NoopProvider;

#[async_trait::async_trait]
impl EmbeddingProvider for NoopProvider {
    async fn embed(&self, texts: &[String]) -> Result<EmbedResponse, ProviderError> {
        Ok(EmbedResponse {
            vectors: vec![vec![]; texts.len()],
        })
    }
}

#[async_trait::async_trait]
impl FindingsProvider for NoopProvider {
    async fn review(&self, _request: &ReviewRequest) -> Result<Vec<RawFinding>, ProviderError> {
        Err(ProviderError::NotImplemented)
    }
}

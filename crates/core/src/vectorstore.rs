//! Vector store boundary. Store rows are converted to typed candidates
//! right here; malformed rows are skipped with a warning instead of being
//! patched downstream.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use providers::qdrant::{self, QdrantClient, QdrantPoint, ScoredPoint};
use providers::ProviderError;
use tracing::warn;

use crate::models::{CandidateChunk, SearchScope, SourceType};
use crate::ranker::cosine_similarity;

/// One chunk to index, carrying the payload fields retrieval relies on.
#[derive(Debug, Clone)]
pub struct ChunkUpsert {
    pub id: String,
    pub external_document_id: String,
    /// Set for chunks of an analyzed document so they can be searched
    /// with a document scope later.
    pub document_key: Option<String>,
    pub source_type: SourceType,
    pub title: String,
    pub snippet: String,
    pub vector: Vec<f32>,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn search(
        &self,
        vector: &[f32],
        limit: usize,
        scope: &SearchScope,
    ) -> Result<Vec<CandidateChunk>, ProviderError>;

    async fn upsert(&self, chunks: Vec<ChunkUpsert>) -> Result<(), ProviderError>;
}

pub struct QdrantSearchStore {
    client: QdrantClient,
}

impl QdrantSearchStore {
    pub fn new(client: QdrantClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl VectorStore for QdrantSearchStore {
    async fn search(
        &self,
        vector: &[f32],
        limit: usize,
        scope: &SearchScope,
    ) -> Result<Vec<CandidateChunk>, ProviderError> {
        let filter = scope_filter(scope);
        let points = self.client.search(vector, limit as u64, filter).await?;
        let total = points.len();
        let chunks: Vec<CandidateChunk> = points
            .into_iter()
            .filter_map(candidate_from_point)
            .collect();
        if chunks.len() < total {
            warn!(
                skipped = total - chunks.len(),
                "dropped malformed rows from store response"
            );
        }
        Ok(chunks)
    }

    async fn upsert(&self, chunks: Vec<ChunkUpsert>) -> Result<(), ProviderError> {
        let points: Vec<QdrantPoint> = chunks.into_iter().map(point_from_chunk).collect();
        self.client.upsert(points).await
    }
}

/// Corpus scopes exclude document-keyed rows so one document's chunks
/// never leak into reference retrieval for another.
fn scope_filter(scope: &SearchScope) -> Option<serde_json::Value> {
    match scope {
        SearchScope::Corpus { source_types: None } => {
            Some(serde_json::json!({
                "must": [{ "is_empty": { "key": "document_key" } }]
            }))
        }
        SearchScope::Corpus {
            source_types: Some(types),
        } => {
            let values: Vec<String> = types.iter().map(|t| t.as_str().to_string()).collect();
            Some(serde_json::json!({
                "must": [
                    { "is_empty": { "key": "document_key" } },
                    { "key": "source_type", "match": { "any": values } },
                ]
            }))
        }
        SearchScope::Document { key } => Some(qdrant::match_filter("document_key", key)),
    }
}

/// Typed candidate from one scored row. Rows missing a usable id, document
/// id, or source type yield `None`.
fn candidate_from_point(point: ScoredPoint) -> Option<CandidateChunk> {
    let id = match point.id {
        serde_json::Value::String(s) => s,
        serde_json::Value::Number(n) => n.to_string(),
        _ => return None,
    };
    let payload = point.payload?;
    let source_type = SourceType::parse(payload.get("source_type")?.as_str()?)?;
    let external_document_id = payload.get("document_id")?.as_str()?.to_string();
    let title = payload
        .get("title")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    let snippet = payload
        .get("snippet")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    let vector_score = point.score.clamp(0.0, 1.0);
    Some(CandidateChunk {
        id,
        external_document_id,
        source_type,
        title,
        snippet,
        vector_score,
        keyword_score: None,
        combined_score: vector_score,
        vector: point.vector,
    })
}

fn point_from_chunk(chunk: ChunkUpsert) -> QdrantPoint {
    let mut payload: HashMap<String, serde_json::Value> = HashMap::new();
    payload.insert("document_id".into(), chunk.external_document_id.into());
    payload.insert("source_type".into(), chunk.source_type.as_str().into());
    payload.insert("title".into(), chunk.title.into());
    payload.insert("snippet".into(), chunk.snippet.into());
    if let Some(key) = chunk.document_key {
        payload.insert("document_key".into(), key.into());
    }
    QdrantPoint {
        id: chunk.id,
        vector: chunk.vector,
        payload,
    }
}

/// Brute-force in-process store for tests and offline runs.
#[derive(Default)]
pub struct MemoryVectorStore {
    rows: RwLock<Vec<ChunkUpsert>>,
}

impl MemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn search(
        &self,
        vector: &[f32],
        limit: usize,
        scope: &SearchScope,
    ) -> Result<Vec<CandidateChunk>, ProviderError> {
        let rows = self.rows.read();
        let mut scored: Vec<CandidateChunk> = rows
            .iter()
            .filter(|row| in_scope(row, scope))
            .map(|row| {
                let score = cosine_similarity(vector, &row.vector).clamp(0.0, 1.0);
                CandidateChunk {
                    id: row.id.clone(),
                    external_document_id: row.external_document_id.clone(),
                    source_type: row.source_type,
                    title: row.title.clone(),
                    snippet: row.snippet.clone(),
                    vector_score: score,
                    keyword_score: None,
                    combined_score: score,
                    vector: Some(row.vector.clone()),
                }
            })
            .collect();
        scored.sort_by(|a, b| {
            b.vector_score
                .partial_cmp(&a.vector_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(limit);
        Ok(scored)
    }

    async fn upsert(&self, chunks: Vec<ChunkUpsert>) -> Result<(), ProviderError> {
        let mut rows = self.rows.write();
        for chunk in chunks {
            if let Some(existing) = rows.iter_mut().find(|row| row.id == chunk.id) {
                *existing = chunk;
            } else {
                rows.push(chunk);
            }
        }
        Ok(())
    }
}

fn in_scope(row: &ChunkUpsert, scope: &SearchScope) -> bool {
    match scope {
        SearchScope::Corpus { source_types: None } => row.document_key.is_none(),
        SearchScope::Corpus {
            source_types: Some(types),
        } => row.document_key.is_none() && types.contains(&row.source_type),
        SearchScope::Document { key } => row.document_key.as_deref() == Some(key.as_str()),
    }
}

/// Store placeholder that indexes nothing and finds nothing.
pub struct NoopVectorStore;

#[async_trait]
impl VectorStore for NoopVectorStore {
    async fn search(
        &self,
        _vector: &[f32],
        _limit: usize,
        _scope: &SearchScope,
    ) -> Result<Vec<CandidateChunk>, ProviderError> {
        Ok(Vec::new())
    }

    async fn upsert(&self, _chunks: Vec<ChunkUpsert>) -> Result<(), ProviderError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn malformed_rows_are_dropped() {
        let good = ScoredPoint {
            id: json!("chunk-1"),
            score: 0.8,
            payload: Some(json!({
                "source_type": "primary_law",
                "document_id": "gdpr",
                "title": "Art. 28",
                "snippet": "processor obligations",
            })),
            vector: None,
        };
        let bad_source = ScoredPoint {
            id: json!("chunk-2"),
            score: 0.7,
            payload: Some(json!({
                "source_type": "statute",
                "document_id": "gdpr",
            })),
            vector: None,
        };
        let no_payload = ScoredPoint {
            id: json!(3),
            score: 0.6,
            payload: None,
            vector: None,
        };
        assert!(candidate_from_point(good).is_some());
        assert!(candidate_from_point(bad_source).is_none());
        assert!(candidate_from_point(no_payload).is_none());
    }

    #[test]
    fn numeric_point_ids_become_strings() {
        let point = ScoredPoint {
            id: json!(42),
            score: 1.4,
            payload: Some(json!({
                "source_type": "guidance",
                "document_id": "handbook",
            })),
            vector: None,
        };
        let chunk = candidate_from_point(point).unwrap();
        assert_eq!(chunk.id, "42");
        assert_eq!(chunk.vector_score, 1.0);
    }

    #[test]
    fn scope_filters_map_to_qdrant_shapes() {
        let filter = scope_filter(&SearchScope::default()).unwrap();
        assert_eq!(filter["must"][0]["is_empty"]["key"], json!("document_key"));

        let narrowed = SearchScope::Corpus {
            source_types: Some(vec![SourceType::PrimaryLaw, SourceType::Guidance]),
        };
        let filter = scope_filter(&narrowed).unwrap();
        assert_eq!(filter["must"][0]["is_empty"]["key"], json!("document_key"));
        assert_eq!(
            filter["must"][1]["match"]["any"],
            json!(["primary_law", "guidance"])
        );

        let scoped = SearchScope::Document {
            key: "msa-2024".into(),
        };
        let filter = scope_filter(&scoped).unwrap();
        assert_eq!(filter["must"][0]["match"]["value"], json!("msa-2024"));
    }
}

//! Retrieval orchestration: embed through the cache, over-fetch from the
//! store, rank, and hand findings back to the aligner.

use std::sync::Arc;

use providers::EmbeddingProvider;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::aligner::ClauseAligner;
use crate::cache::EmbeddingCache;
use crate::errors::EngineError;
use crate::models::{AlignedFinding, CandidateChunk, ClauseRecord, Finding, SearchScope, SourceType};
use crate::ranker::{CandidateRanker, Diversity, RankQuery};
use crate::text;
use crate::vectorstore::{ChunkUpsert, VectorStore};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub default_top_k: usize,
    /// Multiple of top_k fetched from the store so diversity reselection
    /// has slack to work with.
    pub overfetch_factor: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_top_k: 8,
            overfetch_factor: 2.5,
        }
    }
}

/// Per-call retrieval knobs.
#[derive(Debug, Clone)]
pub struct RetrievalOptions {
    /// Falls back to the configured default when unset.
    pub top_k: Option<usize>,
    /// Blend keyword overlap into the score, or rank by vector alone.
    pub hybrid: bool,
    pub diversity: Diversity,
    /// Scope of the corpus branch; the document branch of a dual call
    /// always searches the analyzed document's own chunks.
    pub scope: SearchScope,
}

impl Default for RetrievalOptions {
    fn default() -> Self {
        Self {
            top_k: None,
            hybrid: true,
            diversity: Diversity::SourceQuota,
            scope: SearchScope::default(),
        }
    }
}

/// Outcome of a dual retrieval. Branches run concurrently and fail
/// independently; one branch erroring never discards the other.
#[derive(Debug)]
pub struct DualContext {
    pub document: Result<Vec<CandidateChunk>, EngineError>,
    pub reference: Result<Vec<CandidateChunk>, EngineError>,
}

impl DualContext {
    /// Chunks from the successful branches, best score first.
    pub fn merged(&self) -> Vec<&CandidateChunk> {
        let mut all: Vec<&CandidateChunk> = self
            .document
            .iter()
            .flatten()
            .chain(self.reference.iter().flatten())
            .collect();
        all.sort_by(|a, b| {
            b.combined_score
                .partial_cmp(&a.combined_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        all
    }
}

pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    cache: Arc<EmbeddingCache>,
    ranker: CandidateRanker,
    aligner: ClauseAligner,
    cfg: RetrievalConfig,
}

impl Retriever {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        cache: Arc<EmbeddingCache>,
        ranker: CandidateRanker,
        aligner: ClauseAligner,
        cfg: RetrievalConfig,
    ) -> Self {
        Self {
            embedder,
            store,
            cache,
            ranker,
            aligner,
            cfg,
        }
    }

    /// Ranked context for one query. An empty result means nothing scored
    /// above the relevance floor, which is a valid outcome.
    pub async fn context_for_query(
        &self,
        query: &str,
        opts: &RetrievalOptions,
    ) -> Result<Vec<CandidateChunk>, EngineError> {
        let top_k = opts.top_k.unwrap_or(self.cfg.default_top_k);
        if top_k == 0 || query.trim().is_empty() {
            return Ok(Vec::new());
        }
        let vector = self
            .cache
            .get_or_compute(query, self.embedder.as_ref())
            .await?;
        self.search_ranked(query, &vector, top_k, &opts.scope, opts.hybrid, opts.diversity)
            .await
    }

    /// In-document plus reference-corpus retrieval for the same query,
    /// dispatched concurrently and joined. The query is embedded once.
    pub async fn dual_context(
        &self,
        query: &str,
        document_key: &str,
        opts: &RetrievalOptions,
    ) -> Result<DualContext, EngineError> {
        let top_k = opts.top_k.unwrap_or(self.cfg.default_top_k);
        if top_k == 0 || query.trim().is_empty() {
            return Ok(DualContext {
                document: Ok(Vec::new()),
                reference: Ok(Vec::new()),
            });
        }
        let vector = self
            .cache
            .get_or_compute(query, self.embedder.as_ref())
            .await?;
        let doc_scope = SearchScope::Document {
            key: document_key.to_string(),
        };
        let (document, reference) = tokio::join!(
            self.search_ranked(query, &vector, top_k, &doc_scope, opts.hybrid, opts.diversity),
            self.search_ranked(query, &vector, top_k, &opts.scope, opts.hybrid, opts.diversity),
        );
        Ok(DualContext {
            document,
            reference,
        })
    }

    /// Embeds and indexes clause chunks under `document_key` for later
    /// document-scoped retrieval. Empty clauses are skipped. Returns how
    /// many chunks were written.
    pub async fn index_clauses(
        &self,
        document_key: &str,
        source_type: SourceType,
        clauses: &[ClauseRecord],
    ) -> Result<usize, EngineError> {
        let indexable: Vec<&ClauseRecord> = clauses
            .iter()
            .filter(|clause| !clause.content.trim().is_empty())
            .collect();
        if indexable.is_empty() {
            return Ok(0);
        }
        let texts: Vec<String> = indexable
            .iter()
            .map(|clause| clause.content.clone())
            .collect();
        let vectors = self
            .cache
            .get_or_compute_many(&texts, self.embedder.as_ref())
            .await?;
        let chunks: Vec<ChunkUpsert> = indexable
            .iter()
            .zip(vectors)
            .map(|(clause, vector)| ChunkUpsert {
                id: clause.id.clone(),
                external_document_id: document_key.to_string(),
                document_key: Some(document_key.to_string()),
                source_type,
                title: clause.title.clone(),
                snippet: text::clip(&clause.content, 240).to_string(),
                vector: (*vector).clone(),
            })
            .collect();
        let written = chunks.len();
        self.store
            .upsert(chunks)
            .await
            .map_err(|source| EngineError::StoreUnavailable { source })?;
        debug!(document_key, written, "indexed clause chunks");
        Ok(written)
    }

    /// Aligns reviewer findings onto segmented clauses.
    pub fn attach_findings(
        &self,
        findings: Vec<Finding>,
        clauses: &[ClauseRecord],
    ) -> Vec<AlignedFinding> {
        self.aligner.align_all(findings, clauses)
    }

    pub fn cache(&self) -> &EmbeddingCache {
        &self.cache
    }

    async fn search_ranked(
        &self,
        query: &str,
        vector: &[f32],
        top_k: usize,
        scope: &SearchScope,
        hybrid: bool,
        diversity: Diversity,
    ) -> Result<Vec<CandidateChunk>, EngineError> {
        let fetch = self.fetch_limit(top_k);
        let candidates = self
            .store
            .search(vector, fetch, scope)
            .await
            .map_err(|source| EngineError::StoreUnavailable { source })?;
        debug!(query, fetched = candidates.len(), top_k, "ranking retrieved candidates");
        let rank_query = if hybrid {
            RankQuery::hybrid(query)
        } else {
            RankQuery::vector_only()
        };
        Ok(self.ranker.rank(&rank_query, candidates, top_k, diversity))
    }

    fn fetch_limit(&self, top_k: usize) -> usize {
        (((top_k as f32) * self.cfg.overfetch_factor).ceil() as usize).max(top_k)
    }
}

//! End-to-end document analysis and environment-driven wiring.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use providers::lmstudio::{LmStudioConfig, LmStudioProvider};
use providers::noop::NoopProvider;
use providers::openai::{OpenAiConfig, OpenAiProvider};
use providers::qdrant::{QdrantClient, QdrantConfig};
use providers::{ContextPassage, FindingsProvider, ProviderError, ProviderRegistry, ReviewRequest};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::aligner::ClauseAligner;
use crate::cache::EmbeddingCache;
use crate::config::AppConfig;
use crate::errors::EngineError;
use crate::models::{AlignedFinding, CandidateChunk, ClauseRecord, Finding, SourceType};
use crate::ranker::CandidateRanker;
use crate::retrieval::{RetrievalOptions, Retriever};
use crate::segmenter::ClauseSegmenter;
use crate::vectorstore::{MemoryVectorStore, NoopVectorStore, QdrantSearchStore, VectorStore};

pub fn build_registry(config: &AppConfig) -> ProviderRegistry {
    let mut reg = ProviderRegistry::new()
        .with_embedding("noop", Arc::new(NoopProvider))
        .with_reviewer("noop", Arc::new(NoopProvider));

    if let (Some(key), Some(base)) = (
        std::env::var_os("OPENAI_API_KEY"),
        std::env::var_os("OPENAI_BASE_URL"),
    ) {
        let provider = OpenAiProvider::new(OpenAiConfig {
            api_key: key.to_string_lossy().into_owned(),
            base_url: base.to_string_lossy().into_owned(),
            embedding_model: config.embeddings.model.clone(),
            review_model: config.review.model.clone(),
        });
        reg = reg
            .with_embedding("openai", Arc::new(provider.clone()))
            .with_reviewer("openai", Arc::new(provider));
    }

    if let Some(base) = std::env::var_os("LMSTUDIO_BASE_URL") {
        let provider = LmStudioProvider::new(LmStudioConfig {
            base_url: base.to_string_lossy().into_owned(),
            embedding_model: config.embeddings.model.clone(),
            review_model: config.review.model.clone(),
        });
        reg = reg
            .with_embedding("lmstudio", Arc::new(provider.clone()))
            .with_reviewer("lmstudio", Arc::new(provider));
    }

    reg.set_preferred_embedding(&config.embeddings.provider)
        .set_preferred_reviewer(&config.review.provider)
}

pub fn build_store(config: &AppConfig) -> Arc<dyn VectorStore> {
    match config.vectors.provider.as_str() {
        "qdrant" => {
            if let Some(url) = &config.vectors.url {
                let client = QdrantClient::new(QdrantConfig {
                    url: url.clone(),
                    collection: config.vectors.collection.clone(),
                    api_key: std::env::var("QDRANT_API_KEY").ok(),
                });
                return Arc::new(QdrantSearchStore::new(client));
            }
            warn!("qdrant selected without a url, falling back to the noop store");
            Arc::new(NoopVectorStore)
        }
        "memory" => Arc::new(MemoryVectorStore::new()),
        _ => Arc::new(NoopVectorStore),
    }
}

/// Everything one analysis produced, including what degraded on the way.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub document_key: String,
    pub clauses: Vec<ClauseRecord>,
    pub findings: Vec<AlignedFinding>,
    /// Deduplicated context retrieved across all queries, best score first.
    pub context: Vec<CandidateChunk>,
    /// Upstream failures the analysis survived.
    pub degraded: Vec<String>,
    pub completed_at: DateTime<Utc>,
}

pub struct DocumentAnalyzer {
    segmenter: ClauseSegmenter,
    retriever: Retriever,
    reviewer: Option<Arc<dyn FindingsProvider>>,
    context_passages: usize,
}

impl DocumentAnalyzer {
    pub fn new(
        segmenter: ClauseSegmenter,
        retriever: Retriever,
        reviewer: Option<Arc<dyn FindingsProvider>>,
        context_passages: usize,
    ) -> Self {
        Self {
            segmenter,
            retriever,
            reviewer,
            context_passages,
        }
    }

    /// Wires the full engine from configuration and the environment.
    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let registry = build_registry(config);
        let embedder = registry.embedding(None)?;
        let reviewer = registry.reviewer(None).ok();
        let store = build_store(config);
        let cache = Arc::new(EmbeddingCache::new(config.cache.capacity));
        let retriever = Retriever::new(
            embedder,
            store,
            cache,
            CandidateRanker::new(config.ranker.clone()),
            ClauseAligner::new(config.aligner.clone()),
            config.retrieval.clone(),
        );
        let segmenter = ClauseSegmenter::new(config.segmenter.clone())?;
        Ok(Self::new(
            segmenter,
            retriever,
            reviewer,
            config.review.context_passages,
        ))
    }

    pub fn segmenter(&self) -> &ClauseSegmenter {
        &self.segmenter
    }

    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    /// Segments `text` and indexes its clause chunks under `document_key`
    /// so later retrievals can search inside the document.
    pub async fn index_document(
        &self,
        document_key: &str,
        source_type: SourceType,
        text: &str,
    ) -> Result<Vec<ClauseRecord>, EngineError> {
        let clauses = self.segmenter.segment(text);
        let written = self
            .retriever
            .index_clauses(document_key, source_type, &clauses)
            .await?;
        info!(document_key, written, "document indexed");
        Ok(clauses)
    }

    /// Runs a full review: segment, retrieve context for each query,
    /// review each clause, and align the findings back onto the clause
    /// list. Upstream failures degrade the report instead of aborting it.
    pub async fn analyze(
        &self,
        document_key: &str,
        text: &str,
        queries: &[String],
    ) -> AnalysisReport {
        let clauses = self.segmenter.segment(text);
        info!(document_key, clauses = clauses.len(), "starting document analysis");

        let opts = RetrievalOptions::default();
        let mut context: Vec<CandidateChunk> = Vec::new();
        let mut degraded: Vec<String> = Vec::new();
        for query in queries {
            match self.retriever.dual_context(query, document_key, &opts).await {
                Ok(dual) => {
                    for branch in [dual.document, dual.reference] {
                        match branch {
                            Ok(chunks) => merge_context(&mut context, chunks),
                            Err(err) => {
                                warn!(%query, error = %err, "retrieval branch failed");
                                degraded.push(err.to_string());
                            }
                        }
                    }
                }
                Err(err) => {
                    warn!(%query, error = %err, "retrieval failed");
                    degraded.push(err.to_string());
                }
            }
        }
        context.sort_by(|a, b| {
            b.combined_score
                .partial_cmp(&a.combined_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut findings: Vec<Finding> = Vec::new();
        if let Some(reviewer) = &self.reviewer {
            let passages: Vec<ContextPassage> = context
                .iter()
                .take(self.context_passages)
                .map(|chunk| ContextPassage {
                    source: chunk.source_type.as_str().to_string(),
                    title: chunk.title.clone(),
                    snippet: chunk.snippet.clone(),
                })
                .collect();
            for clause in &clauses {
                let request = ReviewRequest {
                    clause_id: clause.id.clone(),
                    clause_title: clause.title.clone(),
                    clause_text: clause.content.clone(),
                    context: passages.clone(),
                };
                match reviewer.review(&request).await {
                    Ok(raw) => {
                        for item in raw {
                            let id = format!("f{:03}", findings.len() + 1);
                            findings.push(Finding::from_raw(id, item));
                        }
                    }
                    Err(ProviderError::NotImplemented) => {
                        debug!("findings provider not configured, skipping review");
                        break;
                    }
                    Err(source) => {
                        let err = EngineError::FindingsUnavailable { source };
                        warn!(clause = %clause.id, error = %err, "reviewer unavailable, stopping review");
                        degraded.push(err.to_string());
                        break;
                    }
                }
            }
        }

        let total_findings = findings.len();
        let aligned = self.retriever.attach_findings(findings, &clauses);
        let unresolved = aligned.iter().filter(|f| !f.is_resolved()).count();
        info!(
            document_key,
            clauses = clauses.len(),
            findings = total_findings,
            unresolved,
            "analysis complete"
        );
        AnalysisReport {
            document_key: document_key.to_string(),
            clauses,
            findings: aligned,
            context,
            degraded,
            completed_at: Utc::now(),
        }
    }
}

fn merge_context(context: &mut Vec<CandidateChunk>, incoming: Vec<CandidateChunk>) {
    for chunk in incoming {
        if !context.iter().any(|existing| existing.id == chunk.id) {
            context.push(chunk);
        }
    }
}

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use clause_core::aligner::{AlignerConfig, ClauseAligner};
use clause_core::cache::EmbeddingCache;
use clause_core::errors::EngineError;
use clause_core::models::{CandidateChunk, ClauseRecord, SearchScope, SourceType};
use clause_core::ranker::{CandidateRanker, Diversity, RankerConfig};
use clause_core::retrieval::{RetrievalConfig, RetrievalOptions, Retriever};
use clause_core::vectorstore::{ChunkUpsert, MemoryVectorStore, VectorStore};
use parking_lot::Mutex;
use providers::{EmbedResponse, EmbeddingProvider, ProviderError};

/// Embedder with a fixed text-to-vector table. Unknown text lands on the
/// z axis, orthogonal to everything the tests index.
struct StaticEmbedder {
    known: HashMap<String, Vec<f32>>,
    calls: AtomicUsize,
    fail: AtomicBool,
}

impl StaticEmbedder {
    fn new(entries: &[(&str, [f32; 3])]) -> Arc<Self> {
        let known = entries
            .iter()
            .map(|(text, v)| (text.to_string(), v.to_vec()))
            .collect();
        Arc::new(Self {
            known,
            calls: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for StaticEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<EmbedResponse, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(ProviderError::RequestFailed("embedding backend down".into()));
        }
        let vectors = texts
            .iter()
            .map(|t| {
                self.known
                    .get(t)
                    .cloned()
                    .unwrap_or_else(|| vec![0.0, 0.0, 1.0])
            })
            .collect();
        Ok(EmbedResponse { vectors })
    }
}

/// Store that records every search request and returns nothing.
#[derive(Default)]
struct RecordingStore {
    searches: Mutex<Vec<(usize, SearchScope)>>,
}

#[async_trait]
impl VectorStore for RecordingStore {
    async fn search(
        &self,
        _vector: &[f32],
        limit: usize,
        scope: &SearchScope,
    ) -> Result<Vec<CandidateChunk>, ProviderError> {
        self.searches.lock().push((limit, scope.clone()));
        Ok(Vec::new())
    }

    async fn upsert(&self, _chunks: Vec<ChunkUpsert>) -> Result<(), ProviderError> {
        Ok(())
    }
}

/// Store that fails document-scoped searches and serves the rest from an
/// in-memory store.
struct DocumentOutageStore {
    inner: MemoryVectorStore,
}

#[async_trait]
impl VectorStore for DocumentOutageStore {
    async fn search(
        &self,
        vector: &[f32],
        limit: usize,
        scope: &SearchScope,
    ) -> Result<Vec<CandidateChunk>, ProviderError> {
        if matches!(scope, SearchScope::Document { .. }) {
            return Err(ProviderError::RequestFailed("document shard offline".into()));
        }
        self.inner.search(vector, limit, scope).await
    }

    async fn upsert(&self, chunks: Vec<ChunkUpsert>) -> Result<(), ProviderError> {
        self.inner.upsert(chunks).await
    }
}

fn corpus_row(
    id: &str,
    source: SourceType,
    title: &str,
    snippet: &str,
    vector: [f32; 3],
) -> ChunkUpsert {
    ChunkUpsert {
        id: id.to_string(),
        external_document_id: format!("ref-{id}"),
        document_key: None,
        source_type: source,
        title: title.to_string(),
        snippet: snippet.to_string(),
        vector: vector.to_vec(),
    }
}

fn clause(id: &str, seq: u32, content: &str) -> ClauseRecord {
    ClauseRecord {
        id: id.to_string(),
        title: format!("Clause {seq}"),
        content: content.to_string(),
        sequence_number: seq,
        start_offset: 0,
        end_offset: content.len(),
        article_number: Some(seq),
        category: None,
    }
}

fn build_retriever(embedder: Arc<StaticEmbedder>, store: Arc<dyn VectorStore>) -> Retriever {
    Retriever::new(
        embedder,
        store,
        Arc::new(EmbeddingCache::default()),
        CandidateRanker::new(RankerConfig::default()),
        ClauseAligner::new(AlignerConfig::default()),
        RetrievalConfig::default(),
    )
}

async fn seeded_corpus_store() -> Arc<MemoryVectorStore> {
    let store = Arc::new(MemoryVectorStore::new());
    store
        .upsert(vec![
            corpus_row(
                "law1",
                SourceType::PrimaryLaw,
                "Late payment",
                "statutory interest on late payment obligations",
                [1.0, 0.0, 0.0],
            ),
            corpus_row(
                "law2",
                SourceType::PrimaryLaw,
                "Payment terms",
                "maximum payment terms between undertakings",
                [0.95, 0.3, 0.0],
            ),
            corpus_row(
                "ref1",
                SourceType::StandardTemplate,
                "Model invoice clause",
                "payment due dates in model contracts",
                [0.8, 0.6, 0.0],
            ),
            corpus_row(
                "case1",
                SourceType::PrecedentCase,
                "Invoice dispute ruling",
                "payment withheld pending defect remedy",
                [0.6, 0.8, 0.0],
            ),
        ])
        .await
        .unwrap();
    store
}

#[tokio::test]
async fn ranked_context_is_capped_and_sorted() {
    let embedder = StaticEmbedder::new(&[("payment obligations", [1.0, 0.0, 0.0])]);
    let store = seeded_corpus_store().await;
    let retriever = build_retriever(embedder, store);

    let opts = RetrievalOptions {
        top_k: Some(2),
        diversity: Diversity::None,
        ..RetrievalOptions::default()
    };
    let out = retriever
        .context_for_query("payment obligations", &opts)
        .await
        .unwrap();

    assert_eq!(out.len(), 2);
    assert!(out[0].combined_score >= out[1].combined_score);
    assert_eq!(out[0].id, "law1");
}

#[tokio::test]
async fn quota_keeps_every_source_bucket_in_reach() {
    let embedder = StaticEmbedder::new(&[("payment obligations", [1.0, 0.0, 0.0])]);
    let store = seeded_corpus_store().await;
    let retriever = build_retriever(embedder, store);

    let opts = RetrievalOptions {
        top_k: Some(3),
        hybrid: false,
        ..RetrievalOptions::default()
    };
    let out = retriever
        .context_for_query("payment obligations", &opts)
        .await
        .unwrap();

    let buckets: Vec<_> = out.iter().map(|c| c.source_type.bucket()).collect();
    assert_eq!(out.len(), 3);
    assert!(buckets.windows(2).all(|w| w[0] != w[1]));
}

#[tokio::test]
async fn blank_queries_and_zero_top_k_short_circuit() {
    let embedder = StaticEmbedder::new(&[]);
    let store = seeded_corpus_store().await;
    let retriever = build_retriever(Arc::clone(&embedder), store);

    let out = retriever
        .context_for_query("   ", &RetrievalOptions::default())
        .await
        .unwrap();
    assert!(out.is_empty());

    let opts = RetrievalOptions {
        top_k: Some(0),
        ..RetrievalOptions::default()
    };
    let out = retriever
        .context_for_query("payment obligations", &opts)
        .await
        .unwrap();
    assert!(out.is_empty());

    assert_eq!(embedder.calls(), 0);
}

#[tokio::test]
async fn irrelevant_results_come_back_empty_not_as_an_error() {
    // The query embeds orthogonal to every indexed row.
    let embedder = StaticEmbedder::new(&[("assignment of receivables", [0.0, 0.0, 1.0])]);
    let store = seeded_corpus_store().await;
    let retriever = build_retriever(embedder, store);

    let out = retriever
        .context_for_query("assignment of receivables", &RetrievalOptions::default())
        .await
        .unwrap();
    assert!(out.is_empty());
}

#[tokio::test]
async fn the_store_is_asked_for_more_than_top_k() {
    let embedder = StaticEmbedder::new(&[("payment obligations", [1.0, 0.0, 0.0])]);
    let store = Arc::new(RecordingStore::default());
    let retriever = build_retriever(embedder, Arc::clone(&store) as Arc<dyn VectorStore>);

    let opts = RetrievalOptions {
        top_k: Some(4),
        ..RetrievalOptions::default()
    };
    retriever
        .context_for_query("payment obligations", &opts)
        .await
        .unwrap();

    let searches = store.searches.lock();
    assert_eq!(searches.len(), 1);
    let (limit, scope) = &searches[0];
    assert_eq!(*limit, 10);
    assert_eq!(scope, &SearchScope::Corpus { source_types: None });
}

#[tokio::test]
async fn dual_context_keeps_document_and_corpus_chunks_apart() {
    let embedder = StaticEmbedder::new(&[
        ("payment obligations", [1.0, 0.0, 0.0]),
        ("Payment is due within thirty days.", [1.0, 0.2, 0.0]),
        ("Either party may terminate.", [0.0, 1.0, 0.0]),
    ]);
    let store = seeded_corpus_store().await;
    let retriever = build_retriever(embedder, Arc::clone(&store) as Arc<dyn VectorStore>);

    let clauses = vec![
        clause("doc1-c001", 1, "Payment is due within thirty days."),
        clause("doc1-c002", 2, "Either party may terminate."),
    ];
    let written = retriever
        .index_clauses("doc1", SourceType::StandardTemplate, &clauses)
        .await
        .unwrap();
    assert_eq!(written, 2);

    let dual = retriever
        .dual_context("payment obligations", "doc1", &RetrievalOptions::default())
        .await
        .unwrap();

    let document = dual.document.as_ref().unwrap();
    let reference = dual.reference.as_ref().unwrap();
    assert!(!document.is_empty());
    assert!(!reference.is_empty());
    assert!(document.iter().all(|c| c.id.starts_with("doc1-")));
    assert!(reference.iter().all(|c| !c.id.starts_with("doc1-")));

    let merged = dual.merged();
    assert_eq!(merged.len(), document.len() + reference.len());
    assert!(merged
        .windows(2)
        .all(|w| w[0].combined_score >= w[1].combined_score));
}

#[tokio::test]
async fn one_failing_branch_leaves_the_other_intact() {
    let embedder = StaticEmbedder::new(&[("payment obligations", [1.0, 0.0, 0.0])]);
    let store = Arc::new(DocumentOutageStore {
        inner: MemoryVectorStore::new(),
    });
    store
        .upsert(vec![corpus_row(
            "law1",
            SourceType::PrimaryLaw,
            "Late payment",
            "statutory interest on late payment obligations",
            [1.0, 0.0, 0.0],
        )])
        .await
        .unwrap();
    let retriever = build_retriever(embedder, store);

    let dual = retriever
        .dual_context("payment obligations", "doc1", &RetrievalOptions::default())
        .await
        .unwrap();

    assert!(matches!(
        dual.document,
        Err(EngineError::StoreUnavailable { .. })
    ));
    let reference = dual.reference.as_ref().unwrap();
    assert_eq!(reference.len(), 1);
    assert_eq!(dual.merged().len(), 1);
}

#[tokio::test]
async fn an_embedder_outage_fails_the_whole_call() {
    let embedder = StaticEmbedder::new(&[("payment obligations", [1.0, 0.0, 0.0])]);
    embedder.fail.store(true, Ordering::SeqCst);
    let store = seeded_corpus_store().await;
    let retriever = build_retriever(embedder, store);

    let err = retriever
        .context_for_query("payment obligations", &RetrievalOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::EmbeddingUnavailable { .. }));
}

#[tokio::test]
async fn repeated_queries_reuse_the_cached_embedding() {
    let embedder = StaticEmbedder::new(&[("payment obligations", [1.0, 0.0, 0.0])]);
    let store = seeded_corpus_store().await;
    let retriever = build_retriever(Arc::clone(&embedder), store);

    for _ in 0..3 {
        retriever
            .context_for_query("payment obligations", &RetrievalOptions::default())
            .await
            .unwrap();
    }
    assert_eq!(embedder.calls(), 1);
}

#[tokio::test]
async fn indexing_skips_clauses_with_no_content() {
    let embedder = StaticEmbedder::new(&[
        ("Payment is due within thirty days.", [1.0, 0.2, 0.0]),
        ("Either party may terminate.", [0.0, 1.0, 0.0]),
    ]);
    let store = Arc::new(MemoryVectorStore::new());
    let retriever = build_retriever(embedder, Arc::clone(&store) as Arc<dyn VectorStore>);

    let clauses = vec![
        clause("doc1-c001", 1, "Payment is due within thirty days."),
        clause("doc1-c002", 2, "   "),
        clause("doc1-c003", 3, "Either party may terminate."),
    ];
    let written = retriever
        .index_clauses("doc1", SourceType::StandardTemplate, &clauses)
        .await
        .unwrap();

    assert_eq!(written, 2);
    assert_eq!(store.len(), 2);
}

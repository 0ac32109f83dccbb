//! Bounded LRU memoization of text embeddings. The cache is the one piece
//! of shared mutable state in the engine; every lookup promotes recency
//! under the same lock so concurrent readers cannot lose updates.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;
use providers::{EmbeddingProvider, ProviderError};
use tracing::debug;

use crate::errors::{CachedEmbedding, EngineError};
use crate::text;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

pub struct EmbeddingCache {
    entries: Mutex<LruCache<String, Arc<Vec<f32>>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl EmbeddingCache {
    pub const DEFAULT_CAPACITY: usize = 100;

    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Cached vector for `text`, promoting it to most recently used.
    pub fn lookup(&self, text: &str) -> Option<Arc<Vec<f32>>> {
        let key = text::fold(text);
        let found = self.entries.lock().get(&key).cloned();
        match &found {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        found
    }

    pub fn store(&self, text: &str, vector: Arc<Vec<f32>>) {
        self.entries.lock().put(text::fold(text), vector);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.entries.lock().cap().get()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    /// Vector for one text, embedding on a miss.
    pub async fn get_or_compute(
        &self,
        text: &str,
        provider: &dyn EmbeddingProvider,
    ) -> Result<Arc<Vec<f32>>, EngineError> {
        if let Some(vector) = self.lookup(text) {
            return Ok(vector);
        }
        let request = vec![text.to_string()];
        let response = provider.embed(&request).await.map_err(|source| {
            EngineError::EmbeddingUnavailable {
                source,
                cached: Vec::new(),
            }
        })?;
        let mut vectors = response.vectors;
        if vectors.len() != 1 {
            let source = ProviderError::MalformedResponse(format!(
                "expected 1 vector, got {}",
                vectors.len()
            ));
            return Err(EngineError::EmbeddingUnavailable {
                source,
                cached: Vec::new(),
            });
        }
        let vector = Arc::new(vectors.remove(0));
        self.store(text, Arc::clone(&vector));
        Ok(vector)
    }

    /// Vectors for many texts, preserving input order. Cached entries are
    /// reused; the uncached remainder is deduplicated and embedded in one
    /// batched call. On provider failure the error carries every vector
    /// the cache could still supply.
    pub async fn get_or_compute_many(
        &self,
        texts: &[String],
        provider: &dyn EmbeddingProvider,
    ) -> Result<Vec<Arc<Vec<f32>>>, EngineError> {
        let mut resolved: Vec<Option<Arc<Vec<f32>>>> = vec![None; texts.len()];
        let mut pending: Vec<String> = Vec::new();
        let mut positions: HashMap<String, Vec<usize>> = HashMap::new();
        {
            let mut entries = self.entries.lock();
            for (i, text) in texts.iter().enumerate() {
                let key = text::fold(text);
                if let Some(vector) = entries.get(&key) {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    resolved[i] = Some(Arc::clone(vector));
                } else {
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    let slots = positions.entry(key).or_default();
                    if slots.is_empty() {
                        pending.push(text.clone());
                    }
                    slots.push(i);
                }
            }
        }
        if pending.is_empty() {
            return Ok(resolved.into_iter().flatten().collect());
        }
        debug!(
            total = texts.len(),
            uncached = pending.len(),
            "embedding uncached batch"
        );
        let response = match provider.embed(&pending).await {
            Ok(response) => response,
            Err(source) => {
                return Err(EngineError::EmbeddingUnavailable {
                    source,
                    cached: salvaged(&resolved, texts),
                });
            }
        };
        if response.vectors.len() != pending.len() {
            let source = ProviderError::MalformedResponse(format!(
                "expected {} vectors, got {}",
                pending.len(),
                response.vectors.len()
            ));
            return Err(EngineError::EmbeddingUnavailable {
                source,
                cached: salvaged(&resolved, texts),
            });
        }
        for (text, vector) in pending.iter().zip(response.vectors) {
            let vector = Arc::new(vector);
            let key = text::fold(text);
            self.entries.lock().put(key.clone(), Arc::clone(&vector));
            if let Some(slots) = positions.get(&key) {
                for &i in slots {
                    resolved[i] = Some(Arc::clone(&vector));
                }
            }
        }
        Ok(resolved.into_iter().flatten().collect())
    }
}

impl Default for EmbeddingCache {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

/// Vectors the cache already held for this batch, paired with their texts,
/// so a failed call can still hand back the resolved part.
fn salvaged(resolved: &[Option<Arc<Vec<f32>>>], texts: &[String]) -> Vec<CachedEmbedding> {
    resolved
        .iter()
        .zip(texts)
        .filter_map(|(slot, text)| {
            slot.as_ref().map(|vector| CachedEmbedding {
                text: text.clone(),
                vector: Arc::clone(vector),
            })
        })
        .collect()
}

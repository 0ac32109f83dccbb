//! Layered configuration. Every field has a default so the engine runs
//! with no config file at all; a file only overrides what it names.

use serde::{Deserialize, Serialize};

use crate::aligner::AlignerConfig;
use crate::ranker::RankerConfig;
use crate::retrieval::RetrievalConfig;
use crate::segmenter::SegmenterConfig;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub embeddings: EmbeddingConfig,
    pub review: ReviewConfig,
    pub vectors: VectorConfig,
    pub cache: CacheConfig,
    pub segmenter: SegmenterConfig,
    pub ranker: RankerConfig,
    pub aligner: AlignerConfig,
    pub retrieval: RetrievalConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: String,
    pub model: String,
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "noop".into(),
            model: "text-embedding-3-small".into(),
            batch_size: 16,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewConfig {
    pub provider: String,
    pub model: String,
    /// Context passages forwarded with each clause under review.
    pub context_passages: usize,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            provider: "noop".into(),
            model: "gpt-4o-mini".into(),
            context_passages: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorConfig {
    pub provider: String,
    pub url: Option<String>,
    pub collection: String,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            provider: "memory".into(),
            url: None,
            collection: "clause_chunks".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { capacity: 100 }
    }
}

pub fn load(path: Option<&str>) -> anyhow::Result<AppConfig> {
    let mut settings = config::Config::builder();
    if let Some(p) = path {
        settings = settings.add_source(config::File::with_name(p));
    } else {
        settings = settings.add_source(config::File::with_name("config/default").required(false));
    }
    let cfg = settings.build()?;
    Ok(cfg.try_deserialize()?)
}

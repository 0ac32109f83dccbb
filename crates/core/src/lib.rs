//! Core library: clause segmentation, embedding cache, candidate ranking,
//! finding alignment, retrieval orchestration.

pub mod aligner;
pub mod cache;
pub mod config;
pub mod errors;
pub mod models;
pub mod pipeline;
pub mod ranker;
pub mod retrieval;
pub mod segmenter;
pub mod text;
pub mod vectorstore;

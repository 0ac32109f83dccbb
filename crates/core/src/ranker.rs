//! Hybrid scoring and diversity-aware reselection over retrieved
//! candidates. Ranking is pure: same inputs, same output order.

use std::cmp::Ordering;
use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::{CandidateChunk, DiversityBucket};
use crate::text;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RankerConfig {
    pub vector_weight: f32,
    pub keyword_weight: f32,
    /// Results are dropped wholesale when the best candidate scores below
    /// this. An empty result is a valid "no relevant context" outcome.
    pub min_top_score: f32,
    /// Relevance/redundancy trade-off for MMR reselection.
    pub mmr_lambda: f32,
}

impl Default for RankerConfig {
    fn default() -> Self {
        Self {
            vector_weight: 0.7,
            keyword_weight: 0.3,
            min_top_score: 0.4,
            mmr_lambda: 0.7,
        }
    }
}

/// Reselection mode applied after scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Diversity {
    /// Plain top-k by score.
    None,
    /// At least one candidate per available source bucket, remaining slots
    /// by score, final list re-sorted by score.
    #[default]
    SourceQuota,
    /// Maximal marginal relevance.
    Mmr,
}

/// Query side of a ranking call. Tokens drive keyword overlap; relevance
/// itself arrives precomputed on each candidate as its vector score.
#[derive(Debug, Clone, Default)]
pub struct RankQuery {
    pub tokens: Vec<String>,
}

impl RankQuery {
    /// Hybrid query: tokens extracted from `query` text.
    pub fn hybrid(query: &str) -> Self {
        Self {
            tokens: text::tokens(query),
        }
    }

    /// Vector-only query: no keyword component, combined score is the
    /// vector score alone.
    pub fn vector_only() -> Self {
        Self::default()
    }
}

pub struct CandidateRanker {
    cfg: RankerConfig,
}

impl CandidateRanker {
    pub fn new(cfg: RankerConfig) -> Self {
        Self { cfg }
    }

    /// Scores, thresholds, and reselects `candidates`, returning at most
    /// `top_k` in descending score order. Ties keep original candidate
    /// order, so identical inputs always produce identical output.
    pub fn rank(
        &self,
        query: &RankQuery,
        mut candidates: Vec<CandidateChunk>,
        top_k: usize,
        diversity: Diversity,
    ) -> Vec<CandidateChunk> {
        if top_k == 0 || candidates.is_empty() {
            return Vec::new();
        }
        for candidate in &mut candidates {
            let keyword = if query.tokens.is_empty() {
                None
            } else {
                Some(keyword_overlap(
                    &query.tokens,
                    &candidate.title,
                    &candidate.snippet,
                ))
            };
            candidate.keyword_score = keyword;
            candidate.combined_score = match keyword {
                Some(kw) => {
                    self.cfg.vector_weight * candidate.vector_score
                        + self.cfg.keyword_weight * kw
                }
                None => candidate.vector_score,
            };
        }
        candidates.sort_by(|a, b| compare_scores(b.combined_score, a.combined_score));

        let best = candidates[0].combined_score;
        if best < self.cfg.min_top_score {
            debug!(best, floor = self.cfg.min_top_score, "no candidate above floor");
            return Vec::new();
        }

        match diversity {
            Diversity::None => {
                candidates.truncate(top_k);
                candidates
            }
            Diversity::SourceQuota => quota_select(candidates, top_k),
            Diversity::Mmr => self.mmr_select(candidates, top_k),
        }
    }

    /// Iteratively picks the candidate maximizing
    /// `lambda * relevance - (1 - lambda) * max similarity to selected`,
    /// seeded with the highest-relevance item. `candidates` arrive sorted
    /// by score, which also settles ties toward the better-ranked item.
    fn mmr_select(&self, candidates: Vec<CandidateChunk>, top_k: usize) -> Vec<CandidateChunk> {
        let lambda = self.cfg.mmr_lambda;
        let mut selected: Vec<usize> = vec![0];
        let mut remaining: Vec<usize> = (1..candidates.len()).collect();
        while selected.len() < top_k && !remaining.is_empty() {
            let mut best_slot = 0;
            let mut best_score = f32::NEG_INFINITY;
            for (slot, &idx) in remaining.iter().enumerate() {
                let redundancy = selected
                    .iter()
                    .map(|&sel| pair_similarity(&candidates[idx], &candidates[sel]))
                    .fold(f32::NEG_INFINITY, f32::max);
                let score = lambda * candidates[idx].combined_score - (1.0 - lambda) * redundancy;
                if score > best_score {
                    best_score = score;
                    best_slot = slot;
                }
            }
            let picked = remaining.remove(best_slot);
            selected.push(picked);
        }
        pick(candidates, &selected)
    }
}

/// Fraction of query tokens present in the candidate's title or snippet.
fn keyword_overlap(tokens: &[String], title: &str, snippet: &str) -> f32 {
    let haystack = format!("{} {}", title, snippet).to_lowercase();
    let hits = tokens
        .iter()
        .filter(|token| haystack.contains(token.as_str()))
        .count();
    hits as f32 / tokens.len() as f32
}

/// Descending f32 comparison that treats NaN as equal, keeping the sort
/// stable and total.
fn compare_scores(a: f32, b: f32) -> Ordering {
    a.partial_cmp(&b).unwrap_or(Ordering::Equal)
}

/// Reserves the best candidate of each source bucket, fills remaining
/// slots by rank, then re-sorts by score. With score-sorted input the
/// final order equals index order.
fn quota_select(candidates: Vec<CandidateChunk>, top_k: usize) -> Vec<CandidateChunk> {
    let mut seen: HashSet<DiversityBucket> = HashSet::new();
    let mut picked: Vec<usize> = Vec::new();
    for (i, candidate) in candidates.iter().enumerate() {
        if seen.insert(candidate.source_type.bucket()) {
            picked.push(i);
        }
    }
    picked.truncate(top_k);
    let reserved: HashSet<usize> = picked.iter().copied().collect();
    for i in 0..candidates.len() {
        if picked.len() == top_k {
            break;
        }
        if !reserved.contains(&i) {
            picked.push(i);
        }
    }
    picked.sort_unstable();
    pick(candidates, &picked)
}

fn pick(candidates: Vec<CandidateChunk>, indices: &[usize]) -> Vec<CandidateChunk> {
    let mut slots: Vec<Option<CandidateChunk>> = candidates.into_iter().map(Some).collect();
    indices
        .iter()
        .filter_map(|&i| slots.get_mut(i).and_then(Option::take))
        .collect()
}

/// Similarity between two candidates: cosine of their vectors when both
/// are present, otherwise a proxy from how close their scores sit.
fn pair_similarity(a: &CandidateChunk, b: &CandidateChunk) -> f32 {
    match (&a.vector, &b.vector) {
        (Some(va), Some(vb)) => cosine_similarity(va, vb),
        _ => (1.0 - (a.combined_score - b.combined_score).abs()).clamp(0.0, 1.0),
    }
}

pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

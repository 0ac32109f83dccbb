//! Re-attaches reviewer findings to the clauses they describe. Alignment
//! never drops a finding: anything the cascade cannot place comes back
//! marked unresolved with the reason attached.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::models::{
    AlignedFinding, ClauseMatch, ClauseRecord, Finding, MatchMethod, UnresolvedReason,
};
use crate::text;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignerConfig {
    /// Minimum normalized similarity for the fuzzy fallback tier.
    pub similarity_floor: f64,
    /// Maximum numbering drift tolerated when remapping a stale id.
    pub max_id_distance: u32,
}

impl Default for AlignerConfig {
    fn default() -> Self {
        Self {
            similarity_floor: 0.6,
            max_id_distance: 3,
        }
    }
}

pub struct ClauseAligner {
    cfg: AlignerConfig,
}

impl ClauseAligner {
    pub fn new(cfg: AlignerConfig) -> Self {
        Self { cfg }
    }

    pub fn align_all(
        &self,
        findings: Vec<Finding>,
        clauses: &[ClauseRecord],
    ) -> Vec<AlignedFinding> {
        findings
            .into_iter()
            .map(|finding| self.align(finding, clauses))
            .collect()
    }

    /// Resolves one finding against the clause list. The cascade runs in
    /// priority order and stops at the first tier that produces a match;
    /// a stale explicit id is only remapped after the text tiers failed,
    /// since text evidence beats a drifted pointer.
    pub fn align(&self, finding: Finding, clauses: &[ClauseRecord]) -> AlignedFinding {
        if clauses.is_empty() {
            return self.unresolved(finding, UnresolvedReason::NoClauseRecords);
        }

        if let Some(id) = finding.candidate_clause_id.as_deref() {
            if let Some(clause) = clauses.iter().find(|c| c.id == id) {
                let matched = clause_match(clause, 1.0, MatchMethod::ExplicitId);
                return resolved(finding, vec![matched]);
            }
        }

        let needle = finding.raw_text.trim().to_string();
        let mut best_similarity = 0.0;

        if !needle.is_empty() {
            let contained: Vec<ClauseMatch> = clauses
                .iter()
                .filter(|c| c.content.contains(&needle))
                .map(|c| clause_match(c, 1.0, MatchMethod::FindingInClause))
                .collect();
            if !contained.is_empty() {
                return resolved(finding, contained);
            }
            let containing: Vec<ClauseMatch> = clauses
                .iter()
                .filter(|c| {
                    let content = c.content.trim();
                    !content.is_empty() && needle.contains(content)
                })
                .map(|c| clause_match(c, 0.95, MatchMethod::ClauseInFinding))
                .collect();
            if !containing.is_empty() {
                return resolved(finding, containing);
            }
        }

        if let Some(matched) = self.overlap_match(&finding, clauses) {
            return resolved(finding, vec![matched]);
        }

        if !needle.is_empty() {
            let folded = text::fold(&needle);
            let mut scored: Vec<ClauseMatch> = Vec::new();
            for clause in clauses {
                let ratio =
                    strsim::normalized_levenshtein(&folded, &text::fold(&clause.content));
                best_similarity = f64::max(best_similarity, ratio);
                if ratio >= self.cfg.similarity_floor {
                    scored.push(clause_match(clause, ratio as f32, MatchMethod::Similarity));
                }
            }
            if !scored.is_empty() {
                scored.sort_by(|a, b| {
                    b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal)
                });
                return resolved(finding, scored);
            }
        }

        if let Some(requested) = finding.candidate_clause_id.as_deref() {
            if let Some(matched) = self.remap_stale_id(requested, clauses) {
                return resolved(finding, vec![matched]);
            }
            let requested = requested.to_string();
            return self.unresolved(finding, UnresolvedReason::IdNotFound { requested });
        }

        if needle.is_empty() {
            return self.unresolved(finding, UnresolvedReason::EmptyFindingText);
        }
        self.unresolved(
            finding,
            UnresolvedReason::BelowSimilarityFloor {
                best: best_similarity as f32,
            },
        )
    }

    /// Clause whose span overlaps the finding's own claimed span the most.
    fn overlap_match(&self, finding: &Finding, clauses: &[ClauseRecord]) -> Option<ClauseMatch> {
        let (start, end) = finding.source_span?;
        let mut best: Option<(&ClauseRecord, usize)> = None;
        for clause in clauses {
            let span = clause.span();
            let lo = start.max(span.start);
            let hi = end.min(span.end);
            if hi <= lo {
                continue;
            }
            let overlap = hi - lo;
            if best.map_or(true, |(_, prev)| overlap > prev) {
                best = Some((clause, overlap));
            }
        }
        best.map(|(clause, overlap)| {
            debug!(clause = %clause.id, overlap, "matched finding by span overlap");
            clause_match(clause, 0.9, MatchMethod::SpanOverlap)
        })
    }

    /// Remaps a stale explicit id by its trailing integer to the nearest
    /// clause number within the configured drift.
    fn remap_stale_id(&self, requested: &str, clauses: &[ClauseRecord]) -> Option<ClauseMatch> {
        let wanted = trailing_integer(requested)?;
        let mut best: Option<(&ClauseRecord, u32)> = None;
        for clause in clauses {
            let Some(number) = trailing_integer(&clause.id) else {
                continue;
            };
            let distance = number.abs_diff(wanted);
            if distance > self.cfg.max_id_distance {
                continue;
            }
            if best.map_or(true, |(_, prev)| distance < prev) {
                best = Some((clause, distance));
            }
        }
        best.map(|(clause, distance)| {
            debug!(
                requested,
                remapped = %clause.id,
                distance,
                "remapped stale clause id"
            );
            clause_match(clause, 0.75, MatchMethod::RemappedId)
        })
    }

    fn unresolved(&self, finding: Finding, reason: UnresolvedReason) -> AlignedFinding {
        warn!(finding = %finding.id, ?reason, "finding left unresolved");
        AlignedFinding {
            finding,
            matches: Vec::new(),
            unresolved: Some(reason),
        }
    }
}

/// Resolution fills the finding's clause pointer from the primary match
/// so downstream consumers see a consistent reference.
fn resolved(mut finding: Finding, matches: Vec<ClauseMatch>) -> AlignedFinding {
    if let Some(primary) = matches.first() {
        finding.candidate_clause_id = Some(primary.clause_id.clone());
    }
    AlignedFinding {
        finding,
        matches,
        unresolved: None,
    }
}

fn clause_match(clause: &ClauseRecord, score: f32, method: MatchMethod) -> ClauseMatch {
    ClauseMatch {
        clause_id: clause.id.clone(),
        start_offset: clause.start_offset,
        end_offset: clause.end_offset,
        score,
        method,
    }
}

/// Trailing run of ASCII digits in an id, e.g. `ab12f3c0-c007` -> 7.
fn trailing_integer(id: &str) -> Option<u32> {
    let digits: String = id
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_digit())
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_integer_parses_id_suffixes() {
        assert_eq!(trailing_integer("ab12f3c0-c007"), Some(7));
        assert_eq!(trailing_integer("clause 12"), Some(12));
        assert_eq!(trailing_integer("no-digits"), None);
        assert_eq!(trailing_integer(""), None);
    }
}

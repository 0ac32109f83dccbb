//! Record types shared across the engine. Instances are constructed
//! exhaustively at system boundaries; malformed upstream rows are skipped
//! there rather than patched downstream.

use serde::{Deserialize, Serialize};

/// Origin of a retrieved passage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    PrimaryLaw,
    StandardTemplate,
    Guidance,
    PrecedentCase,
}

impl SourceType {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "primary_law" => Some(Self::PrimaryLaw),
            "standard_template" => Some(Self::StandardTemplate),
            "guidance" => Some(Self::Guidance),
            "precedent_case" => Some(Self::PrecedentCase),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PrimaryLaw => "primary_law",
            Self::StandardTemplate => "standard_template",
            Self::Guidance => "guidance",
            Self::PrecedentCase => "precedent_case",
        }
    }

    /// Diversity bucket used by quota reselection. Templates and guidance
    /// share the reference bucket.
    pub fn bucket(&self) -> DiversityBucket {
        match self {
            Self::PrimaryLaw => DiversityBucket::Law,
            Self::StandardTemplate | Self::Guidance => DiversityBucket::Reference,
            Self::PrecedentCase => DiversityBucket::Case,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiversityBucket {
    Law,
    Reference,
    Case,
}

/// One structurally segmented unit of a document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClauseRecord {
    /// Stable within one segmentation pass: `{doc_fp8}-c{seq:03}`.
    pub id: String,
    pub title: String,
    pub content: String,
    /// 1-based position within the document.
    pub sequence_number: u32,
    /// Half-open byte range locating `content` in the source text.
    pub start_offset: usize,
    pub end_offset: usize,
    /// Parsed article number; sub-records keep their parent's.
    pub article_number: Option<u32>,
    /// Assigned by later analysis stages, never by segmentation.
    pub category: Option<String>,
}

impl ClauseRecord {
    pub fn span(&self) -> std::ops::Range<usize> {
        self.start_offset..self.end_offset
    }
}

/// A retrieved passage with its relevance scores. Transient per call;
/// nothing caches these across requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateChunk {
    pub id: String,
    pub external_document_id: String,
    pub source_type: SourceType,
    pub title: String,
    pub snippet: String,
    /// Store similarity, clamped to [0, 1].
    pub vector_score: f32,
    /// Filled during hybrid fusion when query tokens are available.
    pub keyword_score: Option<f32>,
    pub combined_score: f32,
    /// Raw embedding when the store returns one; MMR uses it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector: Option<Vec<f32>>,
}

/// Free-text observation produced by the findings provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub id: String,
    pub raw_text: String,
    /// Producer's best-guess clause id. Alignment fills this in when it
    /// resolves the finding by other means.
    pub candidate_clause_id: Option<String>,
    pub category: Option<String>,
    /// Producer-claimed byte span in the source document, when it quoted
    /// directly.
    pub source_span: Option<(usize, usize)>,
}

impl Finding {
    /// Boundary constructor from the provider wire shape. Inverted or
    /// zero-length quote spans are dropped here.
    pub fn from_raw(id: String, raw: providers::RawFinding) -> Self {
        let source_span = match (raw.quote_start, raw.quote_end) {
            (Some(start), Some(end)) if end > start => Some((start, end)),
            _ => None,
        };
        Self {
            id,
            raw_text: raw.text,
            candidate_clause_id: raw.clause_hint,
            category: raw.category,
            source_span,
        }
    }
}

/// How a finding was matched to a clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMethod {
    ExplicitId,
    RemappedId,
    FindingInClause,
    ClauseInFinding,
    SpanOverlap,
    Similarity,
}

/// One clause a finding was matched to, with the match confidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClauseMatch {
    pub clause_id: String,
    pub start_offset: usize,
    pub end_offset: usize,
    pub score: f32,
    pub method: MatchMethod,
}

/// Why alignment left a finding unresolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum UnresolvedReason {
    IdNotFound { requested: String },
    EmptyFindingText,
    NoClauseRecords,
    BelowSimilarityFloor { best: f32 },
}

/// Alignment outcome. `matches` is score-ordered with the primary match
/// first; an unresolved finding carries its reason instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlignedFinding {
    pub finding: Finding,
    pub matches: Vec<ClauseMatch>,
    pub unresolved: Option<UnresolvedReason>,
}

impl AlignedFinding {
    pub fn is_resolved(&self) -> bool {
        !self.matches.is_empty()
    }

    pub fn primary(&self) -> Option<&ClauseMatch> {
        self.matches.first()
    }
}

/// Which slice of the corpus a retrieval call searches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum SearchScope {
    /// Whole reference corpus, optionally narrowed to source types.
    Corpus { source_types: Option<Vec<SourceType>> },
    /// Chunks of one previously indexed document.
    Document { key: String },
}

impl Default for SearchScope {
    fn default() -> Self {
        SearchScope::Corpus { source_types: None }
    }
}

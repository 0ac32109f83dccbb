//! Clause segmentation. Splits raw contract text into ordered records with
//! stable ids and monotonic, non-overlapping source offsets. Segmentation
//! never fails: malformed input degrades to coarser records and logs.

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::models::ClauseRecord;
use crate::text;

/// Section names recognized by the keyword-header strategy when a document
/// has no numbered articles.
const SECTION_NAMES: &[&str] = &[
    "definitions",
    "interpretation",
    "term",
    "termination",
    "renewal",
    "confidentiality",
    "non-disclosure",
    "indemnification",
    "indemnity",
    "limitation of liability",
    "liability",
    "warranties",
    "warranty",
    "representations",
    "governing law",
    "jurisdiction",
    "dispute resolution",
    "arbitration",
    "force majeure",
    "assignment",
    "severability",
    "notices",
    "payment",
    "fees",
    "taxes",
    "intellectual property",
    "insurance",
    "compliance",
    "audit",
    "data protection",
    "non-solicitation",
    "entire agreement",
    "amendments",
    "amendment",
    "waiver",
    "counterparts",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmenterConfig {
    /// Records with content longer than this many bytes are split further.
    pub max_clause_chars: usize,
    /// Context bytes carried past a window boundary by the last-resort
    /// splitter. The carried tail is excluded from the recorded span.
    pub window_overlap_chars: usize,
    /// Extra section names merged into the built-in keyword vocabulary.
    pub extra_section_names: Vec<String>,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            max_clause_chars: 2000,
            window_overlap_chars: 200,
            extra_section_names: Vec::new(),
        }
    }
}

/// Intermediate segment before offsets are resolved.
struct RawSegment {
    title: String,
    content: String,
    article_number: Option<u32>,
    /// When the content carries window overlap, the recorded span is
    /// clipped to this many leading bytes so spans stay disjoint.
    owned_len: Option<usize>,
}

struct ResolvedSpan {
    start: usize,
    end: usize,
    degraded: bool,
}

pub struct ClauseSegmenter {
    cfg: SegmenterConfig,
    heading: Regex,
    keyword: Regex,
    subitem: Regex,
    blank_line: Regex,
}

impl ClauseSegmenter {
    pub fn new(cfg: SegmenterConfig) -> anyhow::Result<Self> {
        let heading = Regex::new(
            r"(?mi)^[ \t]*(?:article|art\.|section|sec\.|clause|§)\s*(\d+)\b[^\n]*",
        )?;
        let mut names: Vec<String> = SECTION_NAMES.iter().map(|s| s.to_string()).collect();
        names.extend(cfg.extra_section_names.iter().map(|s| s.to_lowercase()));
        names.sort();
        names.dedup();
        names.sort_by(|a, b| b.len().cmp(&a.len()));
        let alternation = names
            .iter()
            .map(|n| regex::escape(n).replace(' ', r"\s+"))
            .collect::<Vec<_>>()
            .join("|");
        let keyword = Regex::new(&format!(r"(?i)\b(?:{alternation})\b"))?;
        let subitem = Regex::new(r"(?mi)^[ \t]*(?:\([a-z0-9]{1,3}\)|[a-z0-9]{1,2}[.)])[ \t]+")?;
        let blank_line = Regex::new(r"\r?\n[ \t]*(?:\r?\n)+")?;
        Ok(Self {
            cfg,
            heading,
            keyword,
            subitem,
            blank_line,
        })
    }

    /// Splits `raw_text` into ordered clause records. Empty or
    /// whitespace-only input yields an empty list; any other input yields
    /// at least one record.
    pub fn segment(&self, raw_text: &str) -> Vec<ClauseRecord> {
        if raw_text.trim().is_empty() {
            return Vec::new();
        }
        let mut segments = self.article_segments(raw_text);
        let mut strategy = "article";
        if segments.is_empty() {
            segments = self.keyword_segments(raw_text);
            strategy = "keyword";
        }
        if segments.is_empty() {
            segments = vec![whole_document_segment(raw_text)];
            strategy = "whole_document";
        }
        let segments: Vec<RawSegment> = segments
            .into_iter()
            .flat_map(|s| self.split_oversized(s))
            .collect();

        let spans = resolve_offsets(raw_text, &segments);
        let degraded = spans.iter().filter(|s| s.degraded).count();
        if degraded > 0 {
            warn!(
                degraded,
                total = segments.len(),
                "segmentation placed records without an exact offset match"
            );
        }

        let fingerprint = doc_fingerprint(raw_text);
        let records: Vec<ClauseRecord> = segments
            .into_iter()
            .zip(spans)
            .enumerate()
            .map(|(idx, (seg, span))| {
                let seq = idx as u32 + 1;
                ClauseRecord {
                    id: format!("{fingerprint}-c{seq:03}"),
                    title: seg.title,
                    content: seg.content,
                    sequence_number: seq,
                    start_offset: span.start,
                    end_offset: span.end,
                    article_number: seg.article_number,
                    category: None,
                }
            })
            .collect();
        debug!(strategy, records = records.len(), "segmented document");
        records
    }

    fn article_segments(&self, text: &str) -> Vec<RawSegment> {
        let headings: Vec<(usize, usize, Option<u32>)> = self
            .heading
            .captures_iter(text)
            .filter_map(|cap| {
                let m = cap.get(0)?;
                let number = cap.get(1).and_then(|n| n.as_str().parse().ok());
                Some((m.start(), m.end(), number))
            })
            .collect();
        if headings.is_empty() {
            return Vec::new();
        }
        let mut segments = Vec::with_capacity(headings.len() + 1);
        if let Some(pre) = preamble_segment(text, headings[0].0) {
            segments.push(pre);
        }
        for (i, &(start, head_end, number)) in headings.iter().enumerate() {
            let body_end = headings.get(i + 1).map_or(text.len(), |next| next.0);
            segments.push(RawSegment {
                title: text[start..head_end].trim().to_string(),
                content: text[head_end..body_end].trim().to_string(),
                article_number: number,
                owned_len: None,
            });
        }
        segments
    }

    fn keyword_segments(&self, text: &str) -> Vec<RawSegment> {
        let anchors: Vec<(usize, usize)> = self
            .keyword
            .find_iter(text)
            .map(|m| (m.start(), m.end()))
            .filter(|&(start, end)| looks_like_header(text, start, end))
            .collect();
        if anchors.is_empty() {
            return Vec::new();
        }
        let mut segments = Vec::with_capacity(anchors.len() + 1);
        if let Some(pre) = preamble_segment(text, anchors[0].0) {
            segments.push(pre);
        }
        for (i, &(start, head_end)) in anchors.iter().enumerate() {
            let body_end = anchors.get(i + 1).map_or(text.len(), |next| next.0);
            let body_start = skip_header_separator(text, head_end, body_end);
            segments.push(RawSegment {
                title: text[start..head_end].trim().to_string(),
                content: text[body_start..body_end].trim().to_string(),
                article_number: None,
                owned_len: None,
            });
        }
        segments
    }

    fn split_oversized(&self, seg: RawSegment) -> Vec<RawSegment> {
        if seg.content.len() <= self.cfg.max_clause_chars {
            return vec![seg];
        }
        let pieces: Vec<(usize, usize, Option<usize>)> = self
            .split_at_blank_lines(&seg.content)
            .or_else(|| self.split_at_subitems(&seg.content))
            .map(|runs| runs.into_iter().map(|(s, e)| (s, e, None)).collect())
            .unwrap_or_else(|| {
                window_spans(
                    &seg.content,
                    self.cfg.max_clause_chars,
                    self.cfg.window_overlap_chars,
                )
            });
        debug!(parent = %seg.title, parts = pieces.len(), "split oversized clause");
        pieces
            .into_iter()
            .enumerate()
            .map(|(i, (start, end, owned_len))| RawSegment {
                title: format!("{} (part {})", seg.title, i + 1),
                content: seg.content[start..end].to_string(),
                article_number: seg.article_number,
                owned_len,
            })
            .collect()
    }

    fn split_at_blank_lines(&self, content: &str) -> Option<Vec<(usize, usize)>> {
        let mut blocks: Vec<(usize, usize)> = Vec::new();
        let mut pos = 0;
        for m in self.blank_line.find_iter(content) {
            if m.start() > pos {
                blocks.push((pos, m.start()));
            }
            pos = m.end();
        }
        if pos < content.len() {
            blocks.push((pos, content.len()));
        }
        pack_blocks(&blocks, self.cfg.max_clause_chars)
    }

    fn split_at_subitems(&self, content: &str) -> Option<Vec<(usize, usize)>> {
        let anchors: Vec<usize> = self.subitem.find_iter(content).map(|m| m.start()).collect();
        if anchors.is_empty() {
            return None;
        }
        let mut blocks = Vec::with_capacity(anchors.len() + 1);
        if anchors[0] > 0 {
            blocks.push((0, anchors[0]));
        }
        for (i, &a) in anchors.iter().enumerate() {
            let end = anchors.get(i + 1).copied().unwrap_or(content.len());
            blocks.push((a, end));
        }
        pack_blocks(&blocks, self.cfg.max_clause_chars)
    }
}

fn preamble_segment(text: &str, first_anchor: usize) -> Option<RawSegment> {
    let content = text[..first_anchor].trim();
    if content.is_empty() {
        return None;
    }
    let first_line = content.lines().next().unwrap_or(content);
    Some(RawSegment {
        title: text::clip(first_line.trim(), 80).to_string(),
        content: content.to_string(),
        article_number: None,
        owned_len: None,
    })
}

fn whole_document_segment(text: &str) -> RawSegment {
    let content = text.trim();
    let first_line = content.lines().next().unwrap_or(content);
    RawSegment {
        title: text::clip(first_line.trim(), 80).to_string(),
        content: content.to_string(),
        article_number: None,
        owned_len: None,
    }
}

/// A keyword hit counts as a header when it is capitalized and sits at a
/// plausible section boundary. The punctuation test keeps the strategy
/// working on text with no line breaks at all.
fn looks_like_header(text: &str, start: usize, end: usize) -> bool {
    let capitalized = text[start..]
        .chars()
        .next()
        .is_some_and(|c| !c.is_lowercase());
    if !capitalized {
        return false;
    }
    if start == 0 {
        return true;
    }
    let before = text[..start].trim_end_matches([' ', '\t']);
    if before.is_empty() || before.ends_with(['\n', '.', ':', ';']) {
        return true;
    }
    text[end..]
        .chars()
        .find(|c| !c.is_whitespace())
        .is_some_and(|c| c == ':' || c.is_uppercase() || c.is_ascii_digit())
}

/// Advances past the punctuation and whitespace separating a keyword
/// header from its body.
fn skip_header_separator(text: &str, pos: usize, limit: usize) -> usize {
    for (off, ch) in text[pos..limit].char_indices() {
        if !ch.is_whitespace() && !matches!(ch, ':' | '.' | '-') {
            return pos + off;
        }
    }
    limit
}

/// Greedily packs consecutive blocks into runs no longer than `max` bytes.
/// Gives up when a single block exceeds `max` or fewer than two runs come
/// out, so the caller can try the next splitting strategy.
fn pack_blocks(blocks: &[(usize, usize)], max: usize) -> Option<Vec<(usize, usize)>> {
    if blocks.len() < 2 {
        return None;
    }
    let mut runs: Vec<(usize, usize)> = Vec::new();
    for &(start, end) in blocks {
        if end - start > max {
            return None;
        }
        match runs.last_mut() {
            Some(run) if end - run.0 <= max => run.1 = end,
            _ => runs.push((start, end)),
        }
    }
    if runs.len() < 2 {
        return None;
    }
    Some(runs)
}

/// Fixed windows over `content`, the last-resort splitter. Each piece
/// carries `overlap` bytes of following text for context; `owned_len`
/// marks where its recorded span must stop so spans stay disjoint.
fn window_spans(content: &str, window: usize, overlap: usize) -> Vec<(usize, usize, Option<usize>)> {
    let mut out = Vec::new();
    let mut start = 0;
    while start < content.len() {
        let mut owned_end = text::floor_char_boundary(content, start + window);
        if owned_end <= start {
            let step = content[start..].chars().next().map_or(1, |c| c.len_utf8());
            owned_end = start + step;
        }
        let end = text::floor_char_boundary(content, owned_end + overlap);
        out.push((start, end, Some(owned_end - start)));
        start = owned_end;
    }
    out
}

/// Locates each segment's content in the source text. First success wins:
/// exact search from the previous record's end, whitespace-normalized
/// search in the same region, then a prefix search. Anything still
/// unplaced lands at the previous end and is flagged degraded. Spans come
/// out monotonic and non-overlapping either way.
fn resolve_offsets(text: &str, segments: &[RawSegment]) -> Vec<ResolvedSpan> {
    const PREFIX_LEN: usize = 100;
    let mut spans = Vec::with_capacity(segments.len());
    let mut cursor = 0usize;
    for seg in segments {
        let content = seg.content.as_str();
        if content.is_empty() {
            spans.push(ResolvedSpan {
                start: cursor,
                end: cursor,
                degraded: false,
            });
            continue;
        }
        let tail = &text[cursor..];
        let mut degraded = false;
        let (start, mut end) = if let Some(pos) = tail.find(content) {
            (cursor + pos, cursor + pos + content.len())
        } else if let Some((s, e)) = text::find_normalized(tail, content) {
            (cursor + s, cursor + e)
        } else if let Some(pos) = tail.find(text::clip(content, PREFIX_LEN)) {
            (cursor + pos, (cursor + pos + content.len()).min(text.len()))
        } else {
            degraded = true;
            warn!(
                title = %seg.title,
                "could not locate clause content, placing at previous end"
            );
            (cursor, (cursor + content.len()).min(text.len()))
        };
        if let Some(owned) = seg.owned_len {
            end = end.min(start + owned);
        }
        let end = text::floor_char_boundary(text, end.max(start));
        spans.push(ResolvedSpan {
            start,
            end,
            degraded,
        });
        cursor = end;
    }
    spans
}

fn doc_fingerprint(text: &str) -> String {
    blake3::hash(text.as_bytes()).to_hex().as_str()[..8].to_string()
}

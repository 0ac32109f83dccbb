//! Small text helpers shared by the segmenter, ranker, and aligner.

use std::collections::HashSet;

/// Collapses whitespace runs to single spaces and trims both ends.
pub fn collapse_ws(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;
    for ch in text.chars() {
        if ch.is_whitespace() {
            pending_space = !out.is_empty();
        } else {
            if pending_space {
                out.push(' ');
                pending_space = false;
            }
            out.push(ch);
        }
    }
    out
}

/// Lowercased, whitespace-collapsed form used for cache keys and fuzzy
/// comparison.
pub fn fold(text: &str) -> String {
    collapse_ws(&text.to_lowercase())
}

/// Distinct lowercase alphanumeric tokens in first-seen order.
pub fn tokens(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for tok in lowered.split(|c: char| !c.is_alphanumeric()) {
        if !tok.is_empty() && seen.insert(tok) {
            out.push(tok.to_string());
        }
    }
    out
}

/// Truncates to at most `max` bytes without splitting a character.
pub fn clip(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// Rounds `pos` down to the nearest char boundary of `text`.
pub(crate) fn floor_char_boundary(text: &str, mut pos: usize) -> usize {
    if pos >= text.len() {
        return text.len();
    }
    while pos > 0 && !text.is_char_boundary(pos) {
        pos -= 1;
    }
    pos
}

/// Whitespace-normalized copy of `haystack` plus per-byte maps back to the
/// original: `starts[i]` and `ends[i]` bound the original bytes behind
/// normalized byte `i`. A collapsed run maps to the span of the whole run.
fn normalized_with_map(haystack: &str) -> (String, Vec<usize>, Vec<usize>) {
    let mut norm = String::with_capacity(haystack.len());
    let mut starts = Vec::with_capacity(haystack.len());
    let mut ends = Vec::with_capacity(haystack.len());
    let mut run_start: Option<usize> = None;
    for (idx, ch) in haystack.char_indices() {
        if ch.is_whitespace() {
            if run_start.is_none() {
                run_start = Some(idx);
            }
            continue;
        }
        if let Some(ws) = run_start.take() {
            if !norm.is_empty() {
                norm.push(' ');
                starts.push(ws);
                ends.push(idx);
            }
        }
        for k in 0..ch.len_utf8() {
            starts.push(idx + k);
            ends.push(idx + k + 1);
        }
        norm.push(ch);
    }
    (norm, starts, ends)
}

/// Finds `needle` in `haystack` ignoring whitespace differences. Returns
/// the byte span in the original haystack.
pub(crate) fn find_normalized(haystack: &str, needle: &str) -> Option<(usize, usize)> {
    let needle_norm = collapse_ws(needle);
    if needle_norm.is_empty() {
        return None;
    }
    let (hay_norm, starts, ends) = normalized_with_map(haystack);
    let pos = hay_norm.find(&needle_norm)?;
    let last = pos + needle_norm.len() - 1;
    Some((starts[pos], ends[last]))
}

//! Title-anchored chunking of partitioned elements.
//!
//! Consecutive elements are merged into a chunk until the character ceiling
//! is reached or a new section title begins. A fixed character overlap can be
//! carried into the next chunk to preserve cross-boundary context, and very
//! short trailing sections are folded into their neighbor instead of being
//! emitted as degenerate fragments.

use crate::config::ChunkingPolicy;
use crate::ingestion::partition::{Element, ElementKind};
use thiserror::Error;

/// Errors produced while turning elements into chunks.
#[derive(Debug, Error)]
pub enum ChunkingError {
    /// Requested strategy is not implemented.
    #[error("chunking strategy '{0}' is not supported")]
    UnsupportedStrategy(String),
    /// Chunking configured an impossible character budget.
    #[error("max_characters must be greater than zero")]
    InvalidMaxCharacters,
}

/// A chunk-shaped span of text before document metadata is attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkSpan {
    /// Merged text of the span.
    pub text: String,
    /// Starting page of the span's section, when resolvable.
    pub page_number: Option<u32>,
}

/// Chunk elements according to the configured strategy.
///
/// Only `by_title` is implemented; any other strategy name fails fast
/// rather than silently defaulting.
///
/// `max_characters` bounds the text gathered per span before the overlap
/// is carried in; a span with overlap applied can run up to
/// `overlap + 2` characters past the ceiling.
pub fn chunk_elements(
    elements: &[Element],
    policy: &ChunkingPolicy,
) -> Result<Vec<ChunkSpan>, ChunkingError> {
    if policy.strategy != "by_title" {
        return Err(ChunkingError::UnsupportedStrategy(policy.strategy.clone()));
    }
    if policy.max_characters == 0 {
        return Err(ChunkingError::InvalidMaxCharacters);
    }

    let spans = chunk_by_title(elements, policy);
    let spans = combine_short_spans(spans, policy);
    Ok(apply_overlap(spans, policy))
}

/// Group elements into sections anchored on titles, splitting oversized
/// sections at the character ceiling.
fn chunk_by_title(elements: &[Element], policy: &ChunkingPolicy) -> Vec<ChunkSpan> {
    let mut spans = Vec::new();
    let mut current = String::new();
    let mut current_page: Option<u32> = None;

    let mut flush = |current: &mut String, current_page: &mut Option<u32>| {
        if !current.trim().is_empty() {
            spans.push(ChunkSpan {
                text: std::mem::take(current),
                page_number: *current_page,
            });
        } else {
            current.clear();
        }
        *current_page = None;
    };

    for element in elements {
        let text = element.text.trim();
        if text.is_empty() {
            continue;
        }

        let section_break = element.kind == ElementKind::Title
            || (!policy.multipage_sections
                && current_page.is_some()
                && element.page_number != current_page);

        if section_break && !current.is_empty() {
            flush(&mut current, &mut current_page);
        }

        for piece in split_to_budget(text, policy.max_characters) {
            let separator = if current.is_empty() { 0 } else { 2 };
            if !current.is_empty() && current.len() + separator + piece.len() > policy.max_characters
            {
                flush(&mut current, &mut current_page);
            }
            if current.is_empty() {
                // Multipage sections keep the starting page for the whole span.
                current_page = element.page_number;
            } else {
                current.push_str("\n\n");
            }
            current.push_str(piece);
        }
    }

    flush(&mut current, &mut current_page);
    spans
}

/// Merge spans shorter than `combine_text_under_n_chars` into the previous
/// span when the combined text still fits the budget.
fn combine_short_spans(spans: Vec<ChunkSpan>, policy: &ChunkingPolicy) -> Vec<ChunkSpan> {
    if policy.combine_text_under_n_chars == 0 {
        return spans;
    }

    let mut combined: Vec<ChunkSpan> = Vec::with_capacity(spans.len());
    for span in spans {
        if span.text.len() < policy.combine_text_under_n_chars
            && let Some(previous) = combined.last_mut()
            && previous.text.len() + 2 + span.text.len() <= policy.max_characters
        {
            previous.text.push_str("\n\n");
            previous.text.push_str(&span.text);
            continue;
        }
        combined.push(span);
    }
    combined
}

/// Carry a fixed character overlap from the tail of each span into the next.
///
/// Runs after budget enforcement, so the tail plus its separator sits on
/// top of `max_characters` rather than inside it.
fn apply_overlap(spans: Vec<ChunkSpan>, policy: &ChunkingPolicy) -> Vec<ChunkSpan> {
    if policy.overlap == 0 || spans.len() < 2 {
        return spans;
    }

    let mut overlapped = Vec::with_capacity(spans.len());
    let mut iter = spans.into_iter();
    let mut previous_text = String::new();

    if let Some(first) = iter.next() {
        previous_text = first.text.clone();
        overlapped.push(first);
    }

    for current in iter {
        let tail = char_safe_tail(&previous_text, policy.overlap);
        let text = if tail.is_empty() {
            current.text.clone()
        } else {
            format!("{tail}\n\n{}", current.text)
        };
        previous_text = current.text;
        overlapped.push(ChunkSpan {
            text,
            page_number: current.page_number,
        });
    }

    overlapped
}

/// Split text that exceeds the budget into budget-sized pieces, preferring
/// whitespace break points and never splitting inside a UTF-8 character.
fn split_to_budget(text: &str, max_characters: usize) -> Vec<&str> {
    if text.len() <= max_characters {
        return vec![text];
    }

    let mut pieces = Vec::new();
    let mut rest = text;
    while rest.len() > max_characters {
        let boundary = break_index(rest, max_characters);
        let (head, tail) = rest.split_at(boundary);
        pieces.push(head.trim_end());
        rest = tail.trim_start();
    }
    if !rest.is_empty() {
        pieces.push(rest);
    }
    pieces
}

/// Pick a split index at or below `limit`: the last whitespace when one
/// exists, otherwise the nearest char boundary. Never returns 0; when the
/// limit falls inside the first character, the whole character is taken so
/// the caller always makes progress.
fn break_index(text: &str, limit: usize) -> usize {
    let mut boundary = limit;
    while boundary > 0 && !text.is_char_boundary(boundary) {
        boundary -= 1;
    }
    if boundary == 0 {
        boundary = 1;
        while !text.is_char_boundary(boundary) {
            boundary += 1;
        }
        return boundary;
    }
    match text[..boundary].rfind(char::is_whitespace) {
        Some(ws) if ws > 0 => ws,
        _ => boundary,
    }
}

/// Last `overlap` bytes of `text`, rounded to a char boundary and trimmed.
fn char_safe_tail(text: &str, overlap: usize) -> &str {
    if text.len() <= overlap {
        return text.trim();
    }
    let mut start = text.len() - overlap;
    while start < text.len() && !text.is_char_boundary(start) {
        start += 1;
    }
    text[start..].trim()
}

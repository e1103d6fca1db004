//! Length-bounded, overlapping chunking of extracted page text.
//!
//! - Splitting: `semchunk-rs` recursively splits on the most meaningful boundary available
//!   (paragraphs, then lines, sentences, words) until every piece fits the budget.
//! - Length: measured in characters by default, mirroring a `len`-based splitter; set
//!   `TEXT_SPLITTER_UNIT=tokens` to measure in `cl100k_base` tokens via `tiktoken-rs`.
//! - Overlap: the splitter runs at `chunk_size - overlap`; each chunk after the first is then
//!   prefixed with up to `overlap` units from the tail of its predecessor. Pieces the splitter
//!   leaves over budget are cut at whitespace, so no chunk exceeds `chunk_size`.

use crate::config::LengthUnit;
use crate::extract::DocumentPage;
use crate::index::TextChunk;
use semchunk_rs::Chunker;
use std::sync::Arc;
use tiktoken_rs::cl100k_base;

use super::types::ChunkingError;

type LengthCounter = Arc<dyn Fn(&str) -> usize + Send + Sync>;

/// Chunk budget applied to every page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSettings {
    /// Maximum chunk length.
    pub chunk_size: usize,
    /// Length carried over from the previous chunk.
    pub overlap: usize,
    /// Unit both values are measured in.
    pub unit: LengthUnit,
}

/// Split every page into chunks, preserving page provenance.
///
/// Pages that are blank after extraction contribute no chunks, so an all-scanned document
/// yields an empty result rather than an error.
pub fn chunk_pages(
    pages: &[DocumentPage],
    settings: ChunkSettings,
) -> Result<Vec<TextChunk>, ChunkingError> {
    if settings.chunk_size == 0 {
        return Err(ChunkingError::InvalidChunkSize);
    }

    let counter = build_length_counter(settings.unit)?;
    let mut chunks = Vec::new();
    for page in pages {
        if page.text.trim().is_empty() {
            continue;
        }
        for text in chunk_text_with_counter(
            &page.text,
            settings.chunk_size,
            settings.overlap,
            Arc::clone(&counter),
        ) {
            if text.trim().is_empty() {
                continue;
            }
            chunks.push(TextChunk {
                text,
                source: page.source.clone(),
                page: page.page,
            });
        }
    }

    tracing::debug!(
        pages = pages.len(),
        chunks = chunks.len(),
        chunk_size = settings.chunk_size,
        overlap = settings.overlap,
        unit = ?settings.unit,
        "Chunked extracted pages"
    );
    Ok(chunks)
}

/// Build the length counter for the configured unit.
fn build_length_counter(unit: LengthUnit) -> Result<LengthCounter, ChunkingError> {
    match unit {
        LengthUnit::Chars => Ok(Arc::new(|segment: &str| segment.chars().count())),
        LengthUnit::Tokens => {
            let encoding =
                Arc::new(cl100k_base().map_err(|source| ChunkingError::Tokenizer { source })?);
            Ok(Arc::new(move |segment: &str| {
                encoding.encode_ordinary(segment).len()
            }))
        }
    }
}

/// Split `text` into chunks of at most `chunk_size`, each repeating up to `overlap` from the
/// tail of its predecessor.
///
/// The splitter runs at `chunk_size - overlap` so the carried tail has room to fit.
fn chunk_text_with_counter(
    text: &str,
    chunk_size: usize,
    overlap: usize,
    counter: LengthCounter,
) -> Vec<String> {
    let effective_overlap = overlap.min(chunk_size.saturating_sub(1));
    let base_size = chunk_size - effective_overlap;

    let counter_for_chunker = Arc::clone(&counter);
    let chunker = Chunker::new(
        base_size,
        Box::new(move |segment: &str| counter_for_chunker.as_ref()(segment)),
    );
    let base_chunks = chunker
        .chunk(text)
        .into_iter()
        .flat_map(|chunk| split_to_budget(&chunk, base_size, &counter))
        .collect();
    apply_overlap(base_chunks, chunk_size, effective_overlap, &counter)
}

/// Break an over-long piece into prefixes that fit `budget`, preferring whitespace boundaries.
fn split_to_budget(text: &str, budget: usize, counter: &LengthCounter) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut rest = text.trim();
    while !rest.is_empty() {
        if counter.as_ref()(rest) <= budget {
            pieces.push(rest.to_string());
            break;
        }
        let end = longest_prefix_within(rest, budget, counter);
        let cut = rest[..end]
            .rfind(char::is_whitespace)
            .filter(|&position| position > 0)
            .unwrap_or(end);
        pieces.push(rest[..cut].trim_end().to_string());
        rest = rest[cut..].trim_start();
    }
    pieces
}

/// Byte length of the longest non-empty prefix of `text` whose length fits `budget`.
///
/// Always takes at least one character so callers make progress.
fn longest_prefix_within(text: &str, budget: usize, counter: &LengthCounter) -> usize {
    let boundaries: Vec<usize> = text
        .char_indices()
        .map(|(offset, _)| offset)
        .skip(1)
        .chain(std::iter::once(text.len()))
        .collect();
    let (mut low, mut high) = (0, boundaries.len());
    while low < high {
        let middle = (low + high) / 2;
        if counter.as_ref()(&text[..boundaries[middle]]) <= budget {
            low = middle + 1;
        } else {
            high = middle;
        }
    }
    boundaries[low.saturating_sub(1)]
}

/// Prefix each chunk with a bounded tail of the previously emitted chunk.
///
/// The overlapped chunk is trimmed from the start as needed so it stays within `chunk_size`.
fn apply_overlap(
    chunks: Vec<String>,
    chunk_size: usize,
    overlap: usize,
    counter: &LengthCounter,
) -> Vec<String> {
    let effective_overlap = overlap.min(chunk_size.saturating_sub(1));
    if chunks.len() < 2 || effective_overlap == 0 {
        return chunks;
    }

    let mut overlapped: Vec<String> = Vec::with_capacity(chunks.len());
    for current in chunks {
        let next = match overlapped.last() {
            Some(prev) => {
                build_overlapped_chunk(prev, &current, effective_overlap, chunk_size, counter)
            }
            None => current,
        };
        overlapped.push(next);
    }

    overlapped
}

fn build_overlapped_chunk(
    previous: &str,
    current: &str,
    overlap: usize,
    chunk_size: usize,
    counter: &LengthCounter,
) -> String {
    let tail = tail_within_limit(previous, overlap, counter);
    let mut combined = String::with_capacity(tail.len() + current.len() + 1);

    if !tail.is_empty() {
        combined.push_str(tail);
        if !ends_with_whitespace(tail) && !starts_with_whitespace(current) {
            combined.push(' ');
        }
    }

    combined.push_str(current);
    trim_to_budget(&combined, chunk_size, counter).to_string()
}

/// Longest whitespace-trimmed suffix of `text` whose length fits `limit`.
fn tail_within_limit<'a>(text: &'a str, limit: usize, counter: &LengthCounter) -> &'a str {
    if limit == 0 {
        return "";
    }
    trim_to_budget(text, limit, counter)
}

/// Drop characters from the front of `text` until it fits `budget`.
fn trim_to_budget<'a>(text: &'a str, budget: usize, counter: &LengthCounter) -> &'a str {
    if budget == 0 {
        return "";
    }

    let trimmed_text = text.trim_start();
    if counter.as_ref()(trimmed_text) <= budget {
        return trimmed_text;
    }

    for (offset, _) in text.char_indices().skip(1) {
        let candidate = text[offset..].trim_start();
        if counter.as_ref()(candidate) <= budget {
            return candidate;
        }
    }

    ""
}

fn starts_with_whitespace(text: &str) -> bool {
    text.chars().next().is_some_and(char::is_whitespace)
}

fn ends_with_whitespace(text: &str) -> bool {
    text.chars().next_back().is_some_and(char::is_whitespace)
}

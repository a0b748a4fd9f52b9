
use std::ops::Range;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Boundary tiers in descending priority. Within a tier the rightmost
/// occurrence wins; when no tier fits the chunk is cut at the window edge.
const BOUNDARY_TIERS: &[&[&str]] = &[&["\n\n"], &["\n"], &[".", "!", "?"], &[","], &[" "]];

/// Characters kept when a document has to be stored as a single truncated chunk
pub const TRUNCATED_FALLBACK_CHARS: usize = 1000;

/// Configuration for content chunking. All sizes are in characters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum length of a single chunk
    pub chunk_size: usize,
    /// Characters shared between adjacent chunks
    pub chunk_overlap: usize,
    /// Chunks shorter than this after trimming are dropped
    pub min_chunk_size: usize,
    /// Upper bound on chunks produced from one document
    pub max_chunks: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            min_chunk_size: 50,
            max_chunks: 10_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChunkingError {
    #[error("chunk size must be greater than zero")]
    ZeroChunkSize,
    #[error("chunk limit must be greater than zero")]
    ZeroChunkLimit,
    #[error("chunk overlap ({overlap}) must be smaller than chunk size ({size})")]
    OverlapTooLarge { overlap: usize, size: usize },
    #[error("document would produce more than {limit} chunks")]
    TooManyChunks { limit: usize },
}

impl ChunkingConfig {
    /// Check the invariants the splitter relies on
    #[inline]
    pub fn check(&self) -> Result<(), ChunkingError> {
        if self.chunk_size == 0 {
            return Err(ChunkingError::ZeroChunkSize);
        }
        if self.max_chunks == 0 {
            return Err(ChunkingError::ZeroChunkLimit);
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(ChunkingError::OverlapTooLarge {
                overlap: self.chunk_overlap,
                size: self.chunk_size,
            });
        }
        Ok(())
    }
}

/// Split document text into overlapping chunks along natural boundaries.
///
/// Every returned chunk is an exact substring of `content`. Chunks whose
/// trimmed length is below `min_chunk_size` are dropped rather than merged.
#[inline]
pub fn split_text(content: &str, config: &ChunkingConfig) -> Result<Vec<String>, ChunkingError> {
    let spans = split_spans(content, config)?;
    let produced = spans.len();

    let chunks: Vec<String> = spans
        .into_iter()
        .filter_map(|span| content.get(span))
        .filter(|chunk| chunk.trim().chars().count() >= config.min_chunk_size)
        .map(str::to_owned)
        .collect();

    debug!(
        "Split {} bytes into {} chunks ({} below minimum size dropped)",
        content.len(),
        chunks.len(),
        produced - chunks.len()
    );

    Ok(chunks)
}

/// Rough number of chunks a document will produce, before boundary snapping
#[inline]
pub fn estimate_chunks(content: &str, config: &ChunkingConfig) -> usize {
    let stride = config.chunk_size.saturating_sub(config.chunk_overlap).max(1);
    content.chars().count().div_ceil(stride)
}

/// First `TRUNCATED_FALLBACK_CHARS` characters of a document
#[inline]
pub fn truncated_fallback(content: &str) -> String {
    content
        .char_indices()
        .nth(TRUNCATED_FALLBACK_CHARS)
        .and_then(|(end, _)| content.get(..end))
        .unwrap_or(content)
        .to_string()
}

/// Compute byte ranges of every chunk, before the minimum size filter
fn split_spans(text: &str, config: &ChunkingConfig) -> Result<Vec<Range<usize>>, ChunkingError> {
    config.check()?;

    // Byte offset of every character position, plus the end of the text
    let bounds: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let total = bounds.len() - 1;

    let mut spans = Vec::new();
    if total == 0 {
        return Ok(spans);
    }

    let mut start = 0;
    loop {
        if spans.len() >= config.max_chunks {
            return Err(ChunkingError::TooManyChunks {
                limit: config.max_chunks,
            });
        }

        if total - start <= config.chunk_size {
            spans.push(bounds[start]..bounds[total]);
            break;
        }

        let window_end = start + config.chunk_size;
        let cut = find_cut(text, &bounds, start, window_end, config.chunk_overlap);
        spans.push(bounds[start]..bounds[cut]);
        start = next_start(text, &bounds, cut, config.chunk_overlap);
    }

    Ok(spans)
}

/// Pick the end of the chunk starting at `start`. The cut always lands
/// after `start + overlap` so the following chunk makes progress.
fn find_cut(text: &str, bounds: &[usize], start: usize, window_end: usize, overlap: usize) -> usize {
    let window = char_slice(text, bounds, start, window_end);
    let floor = start + overlap;

    for tier in BOUNDARY_TIERS {
        let best = tier
            .iter()
            .filter_map(|sep| window.rfind(sep).map(|at| bounds[start] + at + sep.len()))
            .filter_map(|byte| bounds.binary_search(&byte).ok())
            .max();

        if let Some(cut) = best.filter(|&cut| cut > floor) {
            return cut;
        }
    }

    window_end
}

/// Start of the chunk following a cut: `overlap` characters back, snapped
/// forward to a word start while still sharing at least one character.
fn next_start(text: &str, bounds: &[usize], cut: usize, overlap: usize) -> usize {
    if overlap == 0 {
        return cut;
    }

    let from = cut - overlap;
    let at_word_start = from == 0
        || char_slice(text, bounds, from - 1, from)
            .chars()
            .all(char::is_whitespace);
    if at_word_start {
        return from;
    }

    char_slice(text, bounds, from, cut)
        .chars()
        .enumerate()
        .find(|&(offset, c)| c.is_whitespace() && from + offset + 1 < cut)
        .map_or(from, |(offset, _)| from + offset + 1)
}

/// Substring between two character positions
fn char_slice<'a>(text: &'a str, bounds: &[usize], from: usize, to: usize) -> &'a str {
    text.get(bounds[from]..bounds[to]).unwrap_or_default()
}

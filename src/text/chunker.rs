//! Sentence-aware segmentation of narration text into bounded chunks.
//!
//! Chunks are built from whole sentences:
//! - sentences are accumulated greedily up to the word limit
//! - a single sentence longer than the limit becomes its own chunk
//! - a chunk that opens with a quotation mark gives its first sentence back
//!   to the previous chunk, so dialogue is not cut from its lead-in
//!
//! Joining the chunks with single spaces reproduces the input word for word.

use crate::error::{NarratorError, Result};
use regex::Regex;
use std::sync::LazyLock;

/// Sentence boundary: terminal punctuation followed by whitespace.
static SENTENCE_BOUNDARY: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"[.?!]\s+").expect("hardcoded sentence boundary pattern")
});

/// Characters that open a quotation and mark a chunk as dialogue continuation.
pub const OPENING_QUOTES: [char; 5] = ['"', '\u{201C}', '\u{201D}', '\u{00AB}', '\u{201E}'];

/// Splits normalized text into word-bounded chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    words_per_chunk: usize,
}

impl Chunker {
    /// Create a chunker. A limit of zero words is invalid input.
    pub fn new(words_per_chunk: usize) -> Result<Self> {
        if words_per_chunk == 0 {
            return Err(NarratorError::InvalidChunkSize { size: 0 });
        }
        Ok(Self { words_per_chunk })
    }

    pub fn words_per_chunk(&self) -> usize {
        self.words_per_chunk
    }

    /// Segment `text` into chunks. Empty input yields no chunks.
    pub fn chunk(&self, text: &str) -> Vec<String> {
        let mut chunks = self.accumulate(split_sentences(text));
        merge_quote_continuations(&mut chunks);
        chunks.retain(|c| !c.is_empty());
        chunks
    }

    fn accumulate<'a>(&self, sentences: impl Iterator<Item = &'a str>) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut current = String::new();
        let mut current_words = 0;

        for sentence in sentences {
            let words = word_count(sentence);
            if !current.is_empty() && current_words + words > self.words_per_chunk {
                chunks.push(std::mem::take(&mut current));
                current_words = 0;
            }
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(sentence);
            current_words += words;
        }

        if !current.is_empty() {
            chunks.push(current);
        }
        chunks
    }
}

/// Split text into trimmed, non-empty sentences.
///
/// A trailing fragment without terminal punctuation is still a sentence.
pub fn split_sentences(text: &str) -> impl Iterator<Item = &str> {
    let mut start = 0;
    let mut boundaries = SENTENCE_BOUNDARY.find_iter(text);
    std::iter::from_fn(move || {
        loop {
            let (end, next_start) = match boundaries.next() {
                // Punctuation is ASCII, so `m.start() + 1` is a char boundary.
                Some(m) => (m.start() + 1, m.end()),
                None if start < text.len() => (text.len(), text.len()),
                None => return None,
            };
            let sentence = text[start..end].trim();
            start = next_start;
            if !sentence.is_empty() {
                return Some(sentence);
            }
        }
    })
}

/// Split off the first sentence of a chunk: `(first, rest)`.
fn split_first_sentence(chunk: &str) -> (&str, &str) {
    match SENTENCE_BOUNDARY.find(chunk) {
        Some(m) => (chunk[..m.start() + 1].trim(), chunk[m.end()..].trim()),
        None => (chunk.trim(), ""),
    }
}

pub fn starts_with_opening_quote(text: &str) -> bool {
    text.trim_start()
        .chars()
        .next()
        .is_some_and(|c| OPENING_QUOTES.contains(&c))
}

/// Move quote-led sentences back onto the previous chunk until no chunk
/// after the first opens with a quotation mark.
fn merge_quote_continuations(chunks: &mut Vec<String>) {
    let mut i = 1;
    while i < chunks.len() {
        if !starts_with_opening_quote(&chunks[i]) {
            i += 1;
            continue;
        }

        let (first, rest) = split_first_sentence(&chunks[i]);
        let (first, rest) = (first.to_string(), rest.to_string());

        let previous = &mut chunks[i - 1];
        if !previous.is_empty() {
            previous.push(' ');
        }
        previous.push_str(&first);

        if rest.is_empty() {
            chunks.remove(i);
        } else {
            chunks[i] = rest;
        }
    }
}

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

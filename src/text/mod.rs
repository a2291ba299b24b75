//! Text preparation: normalization and chunking.

pub mod chunker;
pub mod normalizer;

pub use chunker::{Chunker, split_sentences, starts_with_opening_quote, word_count};
#[cfg(feature = "http")]
pub use normalizer::ChatNormalizer;
pub use normalizer::{IdentityNormalizer, Normalizer, collapse_whitespace};

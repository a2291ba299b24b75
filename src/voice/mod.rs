//! Voice samples and per-chunk reference selection.

pub mod library;
pub mod reference;

pub use library::{VoiceInfo, VoiceLibrary};
pub use reference::{ReferenceSource, VoiceReferenceManager, reference_source};

//! The text-to-speech generation resource.

#[cfg(feature = "http")]
pub mod http;
pub mod synthesizer;

#[cfg(feature = "http")]
pub use http::HttpSynthesizer;
pub use synthesizer::{MockSynthesizer, RecordedCall, SynthesisRequest, Synthesizer};

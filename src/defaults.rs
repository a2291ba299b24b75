//! Default configuration constants for narrator.
//!
//! Shared by the config types, the orchestrator and the CLI so the same
//! values are used everywhere.

/// Default chunk size in words.
///
/// Roughly 30-40 seconds of narration: long enough for stable prosody,
/// short enough that a failed chunk is cheap to regenerate.
pub const WORDS_PER_CHUNK: usize = 100;

/// Default sampling temperature for the generation resource.
pub const TEMPERATURE: f32 = 0.2;

/// Default nucleus-sampling threshold.
pub const TOP_P: f32 = 0.95;

/// Voice id that selects auto-discovered voice.
///
/// The model picks a voice for chunk 0; that output is then fed back as the
/// reference for every later chunk.
pub const AUTO_VOICE: &str = "auto";

/// Line spoken by `voices test` when no text is given.
pub const PREVIEW_TEXT: &str = "This is a test of my cloned voice. How does it sound?";

/// Default number of background workers in the daemon.
///
/// Runs serialize on the exclusive-access gate, so extra workers only queue.
pub const WORKERS: usize = 2;

/// Default generation server endpoint.
pub const GENERATION_ENDPOINT: &str = "http://127.0.0.1:8000";

/// Default OpenAI-compatible API base for text normalization.
pub const NORMALIZER_BASE_URL: &str = "https://api.openai.com/v1";

/// Default chat model used for text normalization.
pub const NORMALIZER_MODEL: &str = "gpt-4o-mini";

/// Environment variable holding the normalizer API key.
pub const NORMALIZER_API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Normalizer request timeout in seconds.
///
/// Normalization is best-effort; on timeout the original text is used.
pub const NORMALIZER_TIMEOUT_SECS: u64 = 60;

/// Sample rate assumed for generated audio when a server does not say otherwise.
pub const SAMPLE_RATE: u32 = 24000;

//! narrator - Long-form text narration
//!
//! Splits text into sentence-aligned chunks, generates each chunk against a
//! single exclusive generation resource while keeping one voice throughout,
//! and stitches the results into one audio file.

// Enforce error handling discipline
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod audio;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod daemon;
pub mod defaults;
pub mod error;
pub mod ipc;
pub mod job;
#[cfg(feature = "cli")]
pub mod output;
pub mod pipeline;
pub mod synth;
pub mod text;
pub mod voice;

// Composition root for the one-shot command
#[cfg(feature = "cli")]
pub mod app;

// Core traits (text → generation → storage)
pub use job::JobStore;
pub use pipeline::ProgressReporter;
pub use synth::Synthesizer;
pub use text::Normalizer;

// Pipeline
pub use pipeline::{ExclusiveGate, JobRequest, Orchestrator, RunOutcome, WorkerPool};

// Test doubles usable by downstream integration tests
pub use job::MemoryJobStore;
pub use synth::MockSynthesizer;

// Error handling
pub use error::{NarratorError, Result};

// Config
pub use config::Config;

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.0+abc1234"` when git hash is available, `"0.1.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}

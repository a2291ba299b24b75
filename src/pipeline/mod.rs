//! Job execution pipeline.
//!
//! A run walks a job through normalization, chunking and per-chunk
//! generation, persisting after every step so it can resume after a crash.
//! Runs share one generation resource through [`ExclusiveGate`].

pub mod cancel;
pub mod gate;
pub mod orchestrator;
pub mod reporter;
pub mod stitcher;
pub mod worker;

pub use cancel::CancelToken;
pub use gate::ExclusiveGate;
pub use orchestrator::{JobRequest, Orchestrator, PreviewVoice, RunOutcome};
pub use reporter::{LogReporter, ProgressEvent, ProgressReporter};
pub use stitcher::stitch;
pub use worker::{JobTask, WorkerPool};

//! Job records and their persistence.

pub mod store;
pub mod types;

pub use store::{FileJobStore, JobStore, MemoryJobStore, validate_job_id};
pub use types::{
    Chunk, ChunkFailure, ChunkStatus, GenerationParams, Job, JobStatus, JobSummary, Progress,
    VoiceSelection,
};

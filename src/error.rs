//! Error types for narrator.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum NarratorError {
    // Configuration errors
    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    // Input errors (rejected before a job is persisted)
    #[error("Text is empty after normalization")]
    EmptyText,

    #[error("Invalid chunk size {size}: must be at least one word")]
    InvalidChunkSize { size: i64 },

    #[error("Invalid {name}: {message}")]
    InvalidParameter { name: String, message: String },

    #[error("Voice not found: {voice}")]
    VoiceNotFound { voice: String },

    #[error("Invalid voice sample: {message}")]
    InvalidVoiceSample { message: String },

    #[error("Chunk index {index} out of range (job has {total} chunks)")]
    ChunkIndexOutOfRange { index: usize, total: usize },

    #[error("Job {id} cannot be {action} while {status}")]
    InvalidJobState {
        id: String,
        action: String,
        status: String,
    },

    #[error("Job {id} has no normalized text")]
    NotNormalized { id: String },

    // Job store errors
    #[error("Job not found: {id}")]
    JobNotFound { id: String },

    #[error("Job already exists: {id}")]
    JobAlreadyExists { id: String },

    #[error("Invalid job id: {id}")]
    InvalidJobId { id: String },

    #[error("Job record {id} is corrupt: {message}")]
    CorruptRecord { id: String, message: String },

    #[error("Job store error: {message}")]
    JobStore { message: String },

    // Audio errors
    #[error("Audio artifact error: {message}")]
    Audio { message: String },

    #[error("Generation produced no audio")]
    EmptyAudio,

    #[error("Cannot stitch: chunk {index} is {status}")]
    ChunkNotReady { index: usize, status: String },

    // Generation resource errors
    #[error("Generation failed: {message}")]
    Generation { message: String },

    // Text normalization errors (never fatal: the input text is used instead)
    #[error("Normalization failed: {message}")]
    Normalization { message: String },

    // IPC errors
    #[error("IPC socket error: {message}")]
    IpcSocket { message: String },

    #[error("IPC protocol error: {message}")]
    IpcProtocol { message: String },

    #[error("IPC connection failed: {message}")]
    IpcConnection { message: String },

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

impl NarratorError {
    /// True for errors caused by caller input rather than system failure.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            NarratorError::EmptyText
                | NarratorError::InvalidChunkSize { .. }
                | NarratorError::InvalidParameter { .. }
                | NarratorError::VoiceNotFound { .. }
                | NarratorError::InvalidVoiceSample { .. }
                | NarratorError::ChunkIndexOutOfRange { .. }
                | NarratorError::InvalidJobState { .. }
                | NarratorError::NotNormalized { .. }
                | NarratorError::InvalidJobId { .. }
        )
    }
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, NarratorError>;

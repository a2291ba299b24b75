//! Progress reporting for job runs.

use crate::job::{JobStatus, Progress};
use std::fmt;

/// A checkpoint reached by a run, emitted after the matching state is
/// persisted.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    JobStarted {
        job_id: String,
    },
    TextPrepared {
        job_id: String,
        chunks: usize,
        normalized: bool,
    },
    ChunkStarted {
        job_id: String,
        index: usize,
        total: usize,
    },
    ChunkCompleted {
        job_id: String,
        index: usize,
        elapsed_secs: f64,
    },
    ChunkFailed {
        job_id: String,
        index: usize,
        error: String,
    },
    JobSettled {
        job_id: String,
        status: JobStatus,
        progress: Progress,
    },
    JobCancelled {
        job_id: String,
    },
    JobFailed {
        job_id: String,
        error: String,
    },
}

impl fmt::Display for ProgressEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProgressEvent::JobStarted { job_id } => write!(f, "{job_id}: started"),
            ProgressEvent::TextPrepared {
                job_id,
                chunks,
                normalized,
            } => {
                let note = if *normalized { " (normalized)" } else { "" };
                write!(f, "{job_id}: split into {chunks} chunks{note}")
            }
            ProgressEvent::ChunkStarted {
                job_id,
                index,
                total,
            } => write!(f, "{job_id}: chunk {}/{total}", index + 1),
            ProgressEvent::ChunkCompleted {
                job_id,
                index,
                elapsed_secs,
            } => write!(f, "{job_id}: chunk {index} done in {elapsed_secs:.1}s"),
            ProgressEvent::ChunkFailed {
                job_id,
                index,
                error,
            } => write!(f, "{job_id}: chunk {index} failed: {error}"),
            ProgressEvent::JobSettled {
                job_id,
                status,
                progress,
            } => write!(
                f,
                "{job_id}: {status} ({}/{} chunks)",
                progress.completed, progress.total
            ),
            ProgressEvent::JobCancelled { job_id } => write!(f, "{job_id}: cancelled"),
            ProgressEvent::JobFailed { job_id, error } => write!(f, "{job_id}: failed: {error}"),
        }
    }
}

/// Trait for observing run progress.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: &ProgressEvent);
}

/// Reporter that writes every event through `log`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

impl ProgressReporter for LogReporter {
    fn report(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::ChunkFailed { .. } => log::warn!("{event}"),
            ProgressEvent::JobFailed { .. } => log::error!("{event}"),
            ProgressEvent::ChunkStarted { .. } => log::debug!("{event}"),
            _ => log::info!("{event}"),
        }
    }
}

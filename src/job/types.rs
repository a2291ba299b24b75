//! Job and chunk records.
//!
//! These are the persisted shapes: the store serializes them as JSON and the
//! orchestrator mutates them through read-modify-write cycles.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Lifecycle status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Normalizing,
    Processing,
    Cancelling,
    Review,
    Completed,
    Failed,
}

impl JobStatus {
    pub const ALL: [JobStatus; 7] = [
        JobStatus::Pending,
        JobStatus::Normalizing,
        JobStatus::Processing,
        JobStatus::Cancelling,
        JobStatus::Review,
        JobStatus::Completed,
        JobStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Normalizing => "normalizing",
            JobStatus::Processing => "processing",
            JobStatus::Cancelling => "cancelling",
            JobStatus::Review => "review",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// Completed and failed jobs are never mutated again, only deleted.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// States in which a cancellation request is accepted.
    pub fn is_cancellable(&self) -> bool {
        matches!(
            self,
            JobStatus::Pending | JobStatus::Normalizing | JobStatus::Processing
        )
    }

    /// States in which a run owns (or is about to own) the job.
    pub fn is_active(&self) -> bool {
        self.is_cancellable() || *self == JobStatus::Cancelling
    }

    /// States a drive loop picks up again after a restart. Cancelling jobs
    /// are picked up to finish their cleanup.
    pub fn is_resumable(&self) -> bool {
        self.is_active()
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        JobStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| {
                let known: Vec<&str> = JobStatus::ALL.iter().map(|s| s.as_str()).collect();
                format!("unknown status '{s}' (expected one of: {})", known.join(", "))
            })
    }
}

/// Status of a single chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ChunkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkStatus::Pending => "pending",
            ChunkStatus::Processing => "processing",
            ChunkStatus::Completed => "completed",
            ChunkStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for ChunkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sampling parameters, fixed at job creation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub temperature: f32,
    pub top_p: f32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: crate::defaults::TEMPERATURE,
            top_p: crate::defaults::TOP_P,
        }
    }
}

/// Which voice conditions the generation calls of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VoiceSelection {
    /// The model picks a voice for chunk 0; that audio conditions the rest.
    Auto,
    /// A pre-supplied sample conditions every chunk.
    Sample { voice_id: String, path: PathBuf },
}

impl VoiceSelection {
    pub fn is_auto(&self) -> bool {
        matches!(self, VoiceSelection::Auto)
    }

    /// Voice id as shown to users.
    pub fn id(&self) -> &str {
        match self {
            VoiceSelection::Auto => crate::defaults::AUTO_VOICE,
            VoiceSelection::Sample { voice_id, .. } => voice_id,
        }
    }
}

/// One bounded segment of a job's text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub index: usize,
    pub text: String,
    pub status: ChunkStatus,
    /// Artifact name of the produced audio; set iff completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<String>,
    /// Failure description; set iff failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elapsed_secs: Option<f64>,
}

impl Chunk {
    pub fn new(index: usize, text: impl Into<String>) -> Self {
        Self {
            index,
            text: text.into(),
            status: ChunkStatus::Pending,
            audio: None,
            error: None,
            started_at: None,
            elapsed_secs: None,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == ChunkStatus::Completed && self.audio.is_some()
    }

    pub fn mark_processing(&mut self, now: DateTime<Utc>) {
        self.status = ChunkStatus::Processing;
        self.audio = None;
        self.error = None;
        self.started_at = Some(now);
        self.elapsed_secs = None;
    }

    pub fn mark_completed(&mut self, audio: String, now: DateTime<Utc>) {
        self.status = ChunkStatus::Completed;
        self.audio = Some(audio);
        self.error = None;
        self.record_elapsed(now);
    }

    pub fn mark_failed(&mut self, error: impl Into<String>, now: DateTime<Utc>) {
        self.status = ChunkStatus::Failed;
        self.audio = None;
        self.error = Some(error.into());
        self.record_elapsed(now);
    }

    fn record_elapsed(&mut self, now: DateTime<Utc>) {
        self.elapsed_secs = self
            .started_at
            .map(|start| (now - start).num_milliseconds().max(0) as f64 / 1000.0);
    }
}

/// Derived progress counters. Recomputed from the chunk list, never trusted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
    pub percent: u8,
}

impl Progress {
    pub fn of(chunks: &[Chunk]) -> Self {
        let total = chunks.len();
        let completed = chunks.iter().filter(|c| c.is_completed()).count();
        let percent = if total == 0 {
            0
        } else {
            (completed * 100 / total) as u8
        };
        Self {
            completed,
            total,
            percent,
        }
    }
}

/// One narration request and its chunks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub status: JobStatus,
    pub original_text: String,
    /// Whether normalization was requested.
    pub normalize: bool,
    /// Whether the normalizer actually changed the text.
    #[serde(default)]
    pub was_normalized: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normalized_text: Option<String>,
    pub params: GenerationParams,
    pub words_per_chunk: usize,
    pub voice: VoiceSelection,
    /// Artifact name of the auto-discovered voice reference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_reference: Option<String>,
    #[serde(default)]
    pub chunks: Vec<Chunk>,
    #[serde(default)]
    pub progress: Progress,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_artifact: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Generate a fresh job id.
    pub fn new_id() -> String {
        format!("job_{}", uuid::Uuid::new_v4().simple())
    }

    /// A new pending job with no chunks yet.
    pub fn new(
        original_text: String,
        normalize: bool,
        params: GenerationParams,
        words_per_chunk: usize,
        voice: VoiceSelection,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Self::new_id(),
            name: None,
            status: JobStatus::Pending,
            original_text,
            normalize,
            was_normalized: false,
            normalized_text: None,
            params,
            words_per_chunk,
            voice,
            voice_reference: None,
            chunks: Vec::new(),
            progress: Progress::default(),
            final_artifact: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn refresh_progress(&mut self) {
        self.progress = Progress::of(&self.chunks);
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Status a job settles into once no chunk is in flight.
    pub fn settled_status(&self) -> JobStatus {
        if !self.chunks.is_empty() && self.chunks.iter().all(Chunk::is_completed) {
            JobStatus::Completed
        } else {
            JobStatus::Review
        }
    }

    pub fn failed_chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.chunks
            .iter()
            .filter(|c| c.status == ChunkStatus::Failed)
    }

    /// Chunks neither completed nor failed.
    pub fn unfinished_chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.chunks
            .iter()
            .filter(|c| matches!(c.status, ChunkStatus::Pending | ChunkStatus::Processing))
    }

    /// Whether chunk 0 has produced audio.
    pub fn first_chunk_completed(&self) -> bool {
        self.chunks.first().is_some_and(Chunk::is_completed)
    }
}

/// A failed chunk as shown to users.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkFailure {
    pub index: usize,
    pub error: String,
}

/// User-facing view of a job: where it stands and which chunks need work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSummary {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub status: JobStatus,
    pub voice: String,
    pub progress: Progress,
    #[serde(default)]
    pub failed: Vec<ChunkFailure>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_artifact: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Job> for JobSummary {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id.clone(),
            name: job.name.clone(),
            status: job.status,
            voice: job.voice.id().to_string(),
            progress: Progress::of(&job.chunks),
            failed: job
                .failed_chunks()
                .map(|c| ChunkFailure {
                    index: c.index,
                    error: c.error.clone().unwrap_or_default(),
                })
                .collect(),
            final_artifact: job.final_artifact.clone(),
            error: job.error.clone(),
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn status_parses_from_its_display_form() {
        for status in JobStatus::ALL {
            assert_eq!(status.to_string().parse::<JobStatus>(), Ok(status));
        }
        assert!("done".parse::<JobStatus>().is_err());
    }

    fn job_with_chunks(n: usize) -> Job {
        let mut job = Job::new(
            "text".to_string(),
            false,
            GenerationParams::default(),
            100,
            VoiceSelection::Auto,
        );
        job.chunks = (0..n).map(|i| Chunk::new(i, format!("chunk {i}"))).collect();
        job
    }

    #[test]
    fn job_ids_are_unique_and_prefixed() {
        let a = Job::new_id();
        let b = Job::new_id();
        assert_ne!(a, b);
        assert!(a.starts_with("job_"));
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'));
    }

    #[test]
    fn status_strings_are_snake_case() {
        assert_eq!(JobStatus::Cancelling.to_string(), "cancelling");
        assert_eq!(
            serde_json::to_string(&JobStatus::Review).unwrap(),
            "\"review\""
        );
        assert_eq!(ChunkStatus::Failed.to_string(), "failed");
    }

    #[test]
    fn cancellable_states() {
        assert!(JobStatus::Pending.is_cancellable());
        assert!(JobStatus::Normalizing.is_cancellable());
        assert!(JobStatus::Processing.is_cancellable());
        assert!(!JobStatus::Cancelling.is_cancellable());
        assert!(!JobStatus::Review.is_cancellable());
        assert!(!JobStatus::Completed.is_cancellable());
        assert!(JobStatus::Cancelling.is_active());
        assert!(JobStatus::Failed.is_terminal());
    }

    #[test]
    fn progress_percent_rounds_down() {
        let mut job = job_with_chunks(3);
        job.chunks[0].mark_completed("a.wav".into(), Utc::now());
        job.refresh_progress();
        assert_eq!(
            job.progress,
            Progress {
                completed: 1,
                total: 3,
                percent: 33
            }
        );
        assert_eq!(Progress::of(&[]).percent, 0);
    }

    #[test]
    fn settled_status_requires_every_chunk_completed() {
        let mut job = job_with_chunks(2);
        assert_eq!(job.settled_status(), JobStatus::Review);

        job.chunks[0].mark_completed("0.wav".into(), Utc::now());
        job.chunks[1].mark_failed("boom", Utc::now());
        assert_eq!(job.settled_status(), JobStatus::Review);
        assert_eq!(job.failed_chunks().count(), 1);

        job.chunks[1].mark_completed("1.wav".into(), Utc::now());
        assert_eq!(job.settled_status(), JobStatus::Completed);
        assert_eq!(job_with_chunks(0).settled_status(), JobStatus::Review);
    }

    #[test]
    fn chunk_transitions_keep_audio_and_error_exclusive() {
        let start = Utc::now();
        let mut chunk = Chunk::new(0, "Hello.");
        chunk.mark_processing(start);
        assert_eq!(chunk.status, ChunkStatus::Processing);

        chunk.mark_failed("server down", start + Duration::milliseconds(1500));
        assert_eq!(chunk.error.as_deref(), Some("server down"));
        assert!(chunk.audio.is_none());
        assert_eq!(chunk.elapsed_secs, Some(1.5));

        chunk.mark_processing(start);
        assert!(chunk.error.is_none());
        chunk.mark_completed("x.wav".into(), start + Duration::seconds(2));
        assert!(chunk.error.is_none());
        assert_eq!(chunk.audio.as_deref(), Some("x.wav"));
        assert!(chunk.is_completed());
    }

    #[test]
    fn voice_selection_serializes_with_kind_tag() {
        let sample = VoiceSelection::Sample {
            voice_id: "narrator-a".into(),
            path: PathBuf::from("/voices/narrator-a.wav"),
        };
        let json = serde_json::to_value(&sample).unwrap();
        assert_eq!(json["kind"], "sample");
        assert_eq!(sample.id(), "narrator-a");
        assert_eq!(VoiceSelection::Auto.id(), "auto");
        assert_eq!(
            serde_json::to_value(VoiceSelection::Auto).unwrap()["kind"],
            "auto"
        );
    }

    #[test]
    fn job_round_trips_through_json() {
        let mut job = job_with_chunks(2);
        job.chunks[1].mark_failed("nope", Utc::now());
        let json = serde_json::to_string(&job).unwrap();
        let back: Job = serde_json::from_str(&json).unwrap();
        assert_eq!(back, job);
    }

    #[test]
    fn summary_lists_failed_chunks_with_errors() {
        let mut job = job_with_chunks(3);
        job.chunks[0].mark_completed("0.wav".into(), Utc::now());
        job.chunks[2].mark_failed("server said no", Utc::now());
        let summary = JobSummary::from(&job);

        assert_eq!(summary.voice, "auto");
        assert_eq!(summary.progress.completed, 1);
        assert_eq!(
            summary.failed,
            vec![ChunkFailure {
                index: 2,
                error: "server said no".into()
            }]
        );
    }
}

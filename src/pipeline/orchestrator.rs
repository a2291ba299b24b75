//! Drives narration jobs through their chunk state machine.
//!
//! Every persisted change goes through one read-modify-write step that
//! re-reads the record first and yields to a pending cancellation instead of
//! writing. A run holds the exclusive-access gate from its first read to its
//! last write, so at most one writer touches a job's chunks at a time.

use crate::audio::{ArtifactStore, Waveform, chunk_artifact_name};
use crate::defaults;
use crate::error::{NarratorError, Result};
use crate::job::{
    Chunk, ChunkStatus, GenerationParams, Job, JobStatus, JobStore, JobSummary, VoiceSelection,
};
use crate::pipeline::cancel::CancelToken;
use crate::pipeline::gate::ExclusiveGate;
use crate::pipeline::reporter::{LogReporter, ProgressEvent, ProgressReporter};
use crate::pipeline::stitcher;
use crate::synth::{SynthesisRequest, Synthesizer};
use crate::text::{Chunker, IdentityNormalizer, Normalizer, collapse_whitespace};
use crate::voice::{VoiceLibrary, VoiceReferenceManager};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

/// A request to narrate a text.
#[derive(Debug, Clone, PartialEq)]
pub struct JobRequest {
    pub text: String,
    pub name: Option<String>,
    /// Voice id from the library, or `auto`.
    pub voice: String,
    pub normalize: bool,
    pub params: GenerationParams,
    pub words_per_chunk: usize,
}

impl JobRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            name: None,
            voice: defaults::AUTO_VOICE.to_string(),
            normalize: false,
            params: GenerationParams::default(),
            words_per_chunk: defaults::WORDS_PER_CHUNK,
        }
    }

    pub fn with_voice(mut self, voice: &str) -> Self {
        self.voice = voice.to_string();
        self
    }

    pub fn with_words_per_chunk(mut self, words: usize) -> Self {
        self.words_per_chunk = words;
        self
    }

    pub fn with_normalize(mut self, normalize: bool) -> Self {
        self.normalize = normalize;
        self
    }

    pub fn with_params(mut self, params: GenerationParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// A voice to audition without creating a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreviewVoice {
    /// A voice id from the library.
    Library(String),
    /// A WAV file that has not been imported.
    Sample(PathBuf),
}

/// How a run or regeneration ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every chunk has audio.
    Completed,
    /// Some chunks need attention before the job can be stitched.
    Review {
        failed: Vec<usize>,
        unfinished: Vec<usize>,
    },
    /// The job was cancelled; its record and artifacts are gone.
    Cancelled,
    /// An unrecoverable error ended the job.
    Failed { error: String },
}

impl RunOutcome {
    fn settled(job: &Job) -> Self {
        if job.status == JobStatus::Completed {
            RunOutcome::Completed
        } else {
            RunOutcome::Review {
                failed: job.failed_chunks().map(|c| c.index).collect(),
                unfinished: job.unfinished_chunks().map(|c| c.index).collect(),
            }
        }
    }
}

/// Why a read-modify-write step did not go ahead.
enum Interruption {
    /// Cancellation was requested; carries the fresh record.
    Cancelled(Job),
    /// The record was deleted out from under the run.
    Vanished,
}

type Step = std::result::Result<Job, Interruption>;

pub struct Orchestrator {
    store: Arc<dyn JobStore>,
    artifacts: ArtifactStore,
    voices: VoiceLibrary,
    references: VoiceReferenceManager,
    synthesizer: Arc<dyn Synthesizer>,
    normalizer: Arc<dyn Normalizer>,
    reporter: Arc<dyn ProgressReporter>,
    gate: ExclusiveGate,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn JobStore>,
        artifacts: ArtifactStore,
        voices: VoiceLibrary,
        synthesizer: Arc<dyn Synthesizer>,
        gate: ExclusiveGate,
    ) -> Self {
        Self {
            store,
            references: VoiceReferenceManager::new(artifacts.clone()),
            artifacts,
            voices,
            synthesizer,
            normalizer: Arc::new(IdentityNormalizer),
            reporter: Arc::new(LogReporter),
            gate,
        }
    }

    pub fn with_normalizer(mut self, normalizer: Arc<dyn Normalizer>) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    pub fn artifacts(&self) -> &ArtifactStore {
        &self.artifacts
    }

    pub fn voices(&self) -> &VoiceLibrary {
        &self.voices
    }

    pub fn gate(&self) -> &ExclusiveGate {
        &self.gate
    }

    fn report(&self, event: ProgressEvent) {
        self.reporter.report(&event);
    }

    /// Validate a request and persist it as a pending job.
    ///
    /// Invalid input is rejected before anything is stored.
    pub fn create_job(&self, request: JobRequest) -> Result<Job> {
        let text = collapse_whitespace(&request.text);
        if text.is_empty() {
            return Err(NarratorError::EmptyText);
        }
        Chunker::new(request.words_per_chunk)?;
        validate_params(&request.params)?;

        let voice = if request.voice == defaults::AUTO_VOICE {
            VoiceSelection::Auto
        } else {
            VoiceSelection::Sample {
                path: self.voices.resolve(&request.voice)?,
                voice_id: request.voice.clone(),
            }
        };

        let mut job = Job::new(
            text,
            request.normalize,
            request.params,
            request.words_per_chunk,
            voice,
        );
        job.name = request.name.filter(|n| !n.trim().is_empty());
        self.store.create(&job)?;
        log::info!(
            "{}: created ({} words)",
            job.id,
            crate::text::word_count(&job.original_text)
        );
        Ok(job)
    }

    pub fn summary(&self, job_id: &str) -> Result<JobSummary> {
        Ok(JobSummary::from(&self.store.read(job_id)?))
    }

    pub fn list(&self, filter: &dyn Fn(&Job) -> bool) -> Result<Vec<JobSummary>> {
        Ok(self
            .store
            .list(filter)?
            .iter()
            .map(JobSummary::from)
            .collect())
    }

    /// The cleaned-up text a job was narrated from.
    ///
    /// Only jobs whose normalization actually changed the text have one.
    pub fn normalized_text(&self, job_id: &str) -> Result<String> {
        let job = self.store.read(job_id)?;
        match job.normalized_text {
            Some(text) if job.was_normalized && !text.is_empty() => Ok(text),
            _ => Err(NarratorError::NotNormalized { id: job.id }),
        }
    }

    /// Speak `text` in a voice without creating a job.
    ///
    /// Waits for the exclusive-access gate like a job run, so a preview
    /// never overlaps chunk generation.
    pub async fn preview_voice(
        &self,
        voice: &PreviewVoice,
        text: &str,
        params: GenerationParams,
    ) -> Result<Waveform> {
        let text = collapse_whitespace(text);
        if text.is_empty() {
            return Err(NarratorError::EmptyText);
        }
        validate_params(&params)?;
        let reference = self.preview_sample(voice)?;

        let request = SynthesisRequest {
            text,
            reference: Some(reference),
            temperature: params.temperature,
            top_p: params.top_p,
        };
        let wave = self
            .gate
            .with_exclusive_access(move || self.synthesizer.synthesize(request))
            .await?;
        if wave.is_empty() {
            return Err(NarratorError::EmptyAudio);
        }
        log::info!("voice preview generated ({:.1}s)", wave.duration_secs());
        Ok(wave)
    }

    fn preview_sample(&self, voice: &PreviewVoice) -> Result<Waveform> {
        let path = match voice {
            PreviewVoice::Library(id) => self.voices.resolve(id)?,
            PreviewVoice::Sample(path) => path.clone(),
        };
        let wave = Waveform::read(&path).map_err(|e| NarratorError::InvalidVoiceSample {
            message: e.to_string(),
        })?;
        if wave.is_empty() {
            return Err(NarratorError::InvalidVoiceSample {
                message: format!("{} contains no audio", path.display()),
            });
        }
        Ok(wave)
    }

    /// Run a job to completion, review, cancellation or failure.
    ///
    /// Safe to call again on an interrupted job: completed chunks are kept
    /// and only the rest are generated.
    pub async fn run(&self, job_id: &str, cancel: &CancelToken) -> Result<RunOutcome> {
        self.gate
            .with_exclusive_access(|| self.drive(job_id, cancel))
            .await
    }

    async fn drive(&self, job_id: &str, cancel: &CancelToken) -> Result<RunOutcome> {
        let job = self.store.read(job_id)?;
        match job.status {
            JobStatus::Completed => return Ok(RunOutcome::Completed),
            JobStatus::Failed => {
                return Ok(RunOutcome::Failed {
                    error: job.error.unwrap_or_default(),
                });
            }
            JobStatus::Cancelling => return Ok(self.cleanup(&job)),
            _ if cancel.is_cancelled() => return Ok(self.cleanup(&job)),
            _ => {}
        }

        self.report(ProgressEvent::JobStarted {
            job_id: job.id.clone(),
        });
        let mut working = job;
        match self.drive_chunks(&mut working, cancel).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => Ok(self.fail(working, e)),
        }
    }

    async fn drive_chunks(&self, working: &mut Job, cancel: &CancelToken) -> Result<RunOutcome> {
        let job_id = working.id.clone();

        if working.chunks.is_empty() {
            if let Err(stop) = self.prepare_text(working, cancel).await? {
                return Ok(self.stop(stop, working));
            }
        } else if working.status != JobStatus::Processing {
            match self.mutate(&job_id, cancel, |job| job.status = JobStatus::Processing)? {
                Ok(job) => *working = job,
                Err(stop) => return Ok(self.stop(stop, working)),
            }
        }

        let total = working.chunks.len();
        for index in 0..total {
            match self.checkpoint(&job_id, cancel)? {
                Ok(job) => *working = job,
                Err(stop) => return Ok(self.stop(stop, working)),
            }
            let Some(chunk) = working.chunks.get(index) else {
                return Err(NarratorError::CorruptRecord {
                    id: job_id,
                    message: format!("chunk {index} disappeared"),
                });
            };
            if chunk.is_completed() {
                continue;
            }

            match self.start_chunk(&job_id, index, cancel, |_| {})? {
                Ok(job) => *working = job,
                Err(stop) => return Ok(self.stop(stop, working)),
            }
            let result = self.generate_chunk(working, index).await;
            match self.finish_chunk(working, index, result, cancel)? {
                Ok(job) => *working = job,
                Err(stop) => return Ok(self.stop(stop, working)),
            }
        }

        self.settle(working, cancel)
    }

    /// Normalize (if requested), chunk and persist the chunk list.
    async fn prepare_text(
        &self,
        working: &mut Job,
        cancel: &CancelToken,
    ) -> Result<std::result::Result<(), Interruption>> {
        let job_id = working.id.clone();
        let mut text = working.original_text.clone();
        let mut changed = false;

        if working.normalize {
            match self.mutate(&job_id, cancel, |job| job.status = JobStatus::Normalizing)? {
                Ok(job) => *working = job,
                Err(stop) => return Ok(Err(stop)),
            }
            let normalized = collapse_whitespace(&self.normalizer.normalize(&text).await);
            if !normalized.is_empty() && normalized != text {
                text = normalized;
                changed = true;
            }
        }

        let chunks: Vec<Chunk> = Chunker::new(working.words_per_chunk)?
            .chunk(&text)
            .into_iter()
            .enumerate()
            .map(|(i, t)| Chunk::new(i, t))
            .collect();
        if chunks.is_empty() {
            return Err(NarratorError::EmptyText);
        }
        let count = chunks.len();

        match self.mutate(&job_id, cancel, move |job| {
            job.was_normalized = changed;
            job.normalized_text = changed.then_some(text);
            job.chunks = chunks;
            job.status = JobStatus::Processing;
        })? {
            Ok(job) => *working = job,
            Err(stop) => return Ok(Err(stop)),
        }

        self.report(ProgressEvent::TextPrepared {
            job_id,
            chunks: count,
            normalized: changed,
        });
        Ok(Ok(()))
    }

    /// Mark a chunk processing, with extra changes applied in the same write.
    fn start_chunk(
        &self,
        job_id: &str,
        index: usize,
        cancel: &CancelToken,
        extra: impl FnOnce(&mut Job),
    ) -> Result<Step> {
        let now = Utc::now();
        let step = self.mutate(job_id, cancel, |job| {
            extra(job);
            if let Some(chunk) = job.chunks.get_mut(index) {
                chunk.mark_processing(now);
            }
        })?;
        if let Ok(job) = &step {
            self.report(ProgressEvent::ChunkStarted {
                job_id: job.id.clone(),
                index,
                total: job.chunks.len(),
            });
        }
        Ok(step)
    }

    /// Generate one chunk and store its audio. Returns the artifact name.
    async fn generate_chunk(&self, job: &Job, index: usize) -> Result<String> {
        let chunk = job
            .chunks
            .get(index)
            .ok_or(NarratorError::ChunkIndexOutOfRange {
                index,
                total: job.chunks.len(),
            })?;
        let reference = self.references.context_for(job, index)?;
        log::debug!(
            "{}: chunk {index} ({} words, reference: {})",
            job.id,
            crate::text::word_count(&chunk.text),
            if reference.is_some() { "yes" } else { "no" }
        );

        let wave = self
            .synthesizer
            .synthesize(SynthesisRequest {
                text: chunk.text.clone(),
                reference,
                temperature: job.params.temperature,
                top_p: job.params.top_p,
            })
            .await?;
        if wave.is_empty() {
            return Err(NarratorError::EmptyAudio);
        }

        let name = chunk_artifact_name(&job.id, index);
        self.artifacts.write(&name, &wave)?;
        Ok(name)
    }

    /// Record a chunk's result and, for chunk 0 of an auto-voice job, adopt
    /// its audio as the job's voice reference in the same write.
    fn finish_chunk(
        &self,
        working: &Job,
        index: usize,
        result: Result<String>,
        cancel: &CancelToken,
    ) -> Result<Step> {
        let job_id = working.id.as_str();
        let result = result
            .and_then(|name| {
                let reference = if index == 0 {
                    self.references.adopt_first_chunk(working, &name)?
                } else {
                    None
                };
                Ok((name, reference))
            })
            .map_err(|e| e.to_string());
        let now = Utc::now();

        let job = match self.mutate(job_id, cancel, |job| match &result {
            Ok((name, reference)) => {
                if let Some(chunk) = job.chunks.get_mut(index) {
                    chunk.mark_completed(name.clone(), now);
                }
                if job.voice_reference.is_none() {
                    job.voice_reference = reference.clone();
                }
            }
            Err(message) => {
                if let Some(chunk) = job.chunks.get_mut(index) {
                    chunk.mark_failed(message.clone(), now);
                }
            }
        })? {
            Ok(job) => job,
            Err(stop) => return Ok(Err(stop)),
        };

        match &result {
            Ok(_) => self.report(ProgressEvent::ChunkCompleted {
                job_id: job_id.to_string(),
                index,
                elapsed_secs: job
                    .chunks
                    .get(index)
                    .and_then(|c| c.elapsed_secs)
                    .unwrap_or_default(),
            }),
            Err(error) => self.report(ProgressEvent::ChunkFailed {
                job_id: job_id.to_string(),
                index,
                error: error.clone(),
            }),
        }
        Ok(Ok(job))
    }

    /// Settle the job into completed or review.
    fn settle(&self, working: &mut Job, cancel: &CancelToken) -> Result<RunOutcome> {
        let job_id = working.id.clone();
        match self.mutate(&job_id, cancel, |job| job.status = job.settled_status())? {
            Ok(job) => *working = job,
            Err(stop) => return Ok(self.stop(stop, working)),
        }
        self.report(ProgressEvent::JobSettled {
            job_id,
            status: working.status,
            progress: working.progress,
        });
        Ok(RunOutcome::settled(working))
    }

    /// Regenerate a single chunk of a job in review or completed.
    ///
    /// The chunk's previous audio and any stitched output are discarded
    /// first. The job's status is then recomputed over all chunks.
    pub async fn regenerate(
        &self,
        job_id: &str,
        index: usize,
        cancel: &CancelToken,
    ) -> Result<RunOutcome> {
        check_regenerable(&self.store.read(job_id)?, index)?;
        self.gate
            .with_exclusive_access(|| self.regenerate_locked(job_id, index, cancel))
            .await
    }

    /// Check that `index` of `job_id` can be regenerated right now, without
    /// queueing anything.
    pub fn check_regeneration(&self, job_id: &str, index: usize) -> Result<()> {
        check_regenerable(&self.store.read(job_id)?, index)
    }

    async fn regenerate_locked(
        &self,
        job_id: &str,
        index: usize,
        cancel: &CancelToken,
    ) -> Result<RunOutcome> {
        let job = match self.checkpoint(job_id, cancel)? {
            Ok(job) => job,
            Err(Interruption::Cancelled(job)) => return Ok(self.cleanup(&job)),
            Err(Interruption::Vanished) => {
                return Err(NarratorError::JobNotFound {
                    id: job_id.to_string(),
                });
            }
        };
        // The job may have changed while waiting for the gate.
        check_regenerable(&job, index)?;

        if let Some(old) = &job.chunks[index].audio {
            self.artifacts.delete(old)?;
        }
        if let Some(stitched) = &job.final_artifact {
            self.artifacts.delete(stitched)?;
        }

        let mut working = job;
        match self.regenerate_chunk(&mut working, index, cancel).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => Ok(self.fail(working, e)),
        }
    }

    async fn regenerate_chunk(
        &self,
        working: &mut Job,
        index: usize,
        cancel: &CancelToken,
    ) -> Result<RunOutcome> {
        let job_id = working.id.clone();
        match self.start_chunk(&job_id, index, cancel, |job| {
            job.status = JobStatus::Processing;
            job.final_artifact = None;
        })? {
            Ok(job) => *working = job,
            Err(stop) => return Ok(self.stop(stop, working)),
        }

        let result = self.generate_chunk(working, index).await;
        match self.finish_chunk(working, index, result, cancel)? {
            Ok(job) => *working = job,
            Err(stop) => return Ok(self.stop(stop, working)),
        }
        self.settle(working, cancel)
    }

    /// Ask a running or queued job to stop at its next chunk boundary.
    pub fn request_cancel(&self, job_id: &str) -> Result<Job> {
        let mut job = self.store.read(job_id)?;
        if job.status == JobStatus::Cancelling {
            return Ok(job);
        }
        if !job.status.is_cancellable() {
            return Err(invalid_state(&job, "cancelled"));
        }
        job.status = JobStatus::Cancelling;
        job.touch();
        self.store.write(&job)?;
        log::info!("{job_id}: cancellation requested");
        Ok(job)
    }

    /// Stitch every chunk into the job's final artifact.
    pub fn stitch(&self, job_id: &str) -> Result<Job> {
        let job = self.store.read(job_id)?;
        let name = stitcher::stitch(&job, &self.artifacts)?;

        let mut fresh = self.store.read(job_id)?;
        if fresh.status == JobStatus::Cancelling {
            return Err(invalid_state(&fresh, "stitched"));
        }
        fresh.final_artifact = Some(name);
        fresh.touch();
        self.store.write(&fresh)?;
        Ok(fresh)
    }

    /// Remove a job and all of its artifacts. Jobs that may still be running
    /// must be cancelled instead.
    pub fn delete(&self, job_id: &str) -> Result<()> {
        let job = self.store.read(job_id)?;
        if job.status.is_cancellable() {
            return Err(invalid_state(&job, "deleted"));
        }
        self.artifacts.purge_job(&job.id, job.chunks.len());
        self.store.delete(&job.id)?;
        log::info!("{job_id}: deleted");
        Ok(())
    }

    /// Re-read the record and stop if cancellation was requested.
    fn checkpoint(&self, job_id: &str, cancel: &CancelToken) -> Result<Step> {
        let job = match self.store.read(job_id) {
            Ok(job) => job,
            Err(NarratorError::JobNotFound { .. }) => return Ok(Err(Interruption::Vanished)),
            Err(e) => return Err(e),
        };
        if job.status == JobStatus::Cancelling || cancel.is_cancelled() {
            return Ok(Err(Interruption::Cancelled(job)));
        }
        Ok(Ok(job))
    }

    /// Apply `f` to the freshly read record and write it back, unless the
    /// job is being cancelled or is gone.
    fn mutate(
        &self,
        job_id: &str,
        cancel: &CancelToken,
        f: impl FnOnce(&mut Job),
    ) -> Result<Step> {
        let mut job = match self.checkpoint(job_id, cancel)? {
            Ok(job) => job,
            Err(stop) => return Ok(Err(stop)),
        };
        f(&mut job);
        job.refresh_progress();
        job.touch();
        match self.store.write(&job) {
            Ok(()) => Ok(Ok(job)),
            Err(NarratorError::JobNotFound { .. }) => Ok(Err(Interruption::Vanished)),
            Err(e) => Err(e),
        }
    }

    fn stop(&self, stop: Interruption, working: &Job) -> RunOutcome {
        match stop {
            Interruption::Cancelled(job) => self.cleanup(&job),
            Interruption::Vanished => {
                log::info!("{}: record removed mid-run, discarding audio", working.id);
                self.artifacts
                    .purge_job(&working.id, working.chunks.len());
                self.report(ProgressEvent::JobCancelled {
                    job_id: working.id.clone(),
                });
                RunOutcome::Cancelled
            }
        }
    }

    /// Release every artifact of a cancelled job and its record.
    fn cleanup(&self, job: &Job) -> RunOutcome {
        self.artifacts.purge_job(&job.id, job.chunks.len());
        if let Err(e) = self.store.delete(&job.id) {
            log::error!("{}: failed to remove cancelled job: {e}", job.id);
        }
        self.report(ProgressEvent::JobCancelled {
            job_id: job.id.clone(),
        });
        RunOutcome::Cancelled
    }

    /// Mark the job failed, closing out any in-flight chunk with the same
    /// error.
    fn fail(&self, mut working: Job, error: NarratorError) -> RunOutcome {
        if let Ok(fresh) = self.store.read(&working.id)
            && fresh.status == JobStatus::Cancelling
        {
            return self.cleanup(&fresh);
        }

        let message = error.to_string();
        let now = Utc::now();
        for chunk in working
            .chunks
            .iter_mut()
            .filter(|c| c.status == ChunkStatus::Processing)
        {
            chunk.mark_failed(message.clone(), now);
        }
        working.status = JobStatus::Failed;
        working.error = Some(message.clone());
        working.refresh_progress();
        working.touch();
        if let Err(e) = self.store.write(&working) {
            log::error!("{}: could not record failure: {e}", working.id);
        }

        self.report(ProgressEvent::JobFailed {
            job_id: working.id.clone(),
            error: message.clone(),
        });
        RunOutcome::Failed { error: message }
    }
}

fn invalid_state(job: &Job, action: &str) -> NarratorError {
    NarratorError::InvalidJobState {
        id: job.id.clone(),
        action: action.to_string(),
        status: job.status.to_string(),
    }
}

fn check_regenerable(job: &Job, index: usize) -> Result<()> {
    if !matches!(job.status, JobStatus::Review | JobStatus::Completed) {
        return Err(invalid_state(job, "regenerated"));
    }
    if index >= job.chunks.len() {
        return Err(NarratorError::ChunkIndexOutOfRange {
            index,
            total: job.chunks.len(),
        });
    }
    Ok(())
}

fn validate_params(params: &GenerationParams) -> Result<()> {
    if !params.temperature.is_finite() || params.temperature < 0.0 {
        return Err(NarratorError::InvalidParameter {
            name: "temperature".to_string(),
            message: format!("{} is not a non-negative number", params.temperature),
        });
    }
    if !(params.top_p > 0.0 && params.top_p <= 1.0) {
        return Err(NarratorError::InvalidParameter {
            name: "top_p".to_string(),
            message: format!("{} is outside (0, 1]", params.top_p),
        });
    }
    Ok(())
}

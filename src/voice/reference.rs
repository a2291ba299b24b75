//! Choice of conditioning audio for each generation call.
//!
//! The generation resource keeps no memory between calls, so voice
//! consistency comes from feeding the same reference clip into every call:
//!
//! | voice  | chunk 0                     | chunk n >= 1                      |
//! |--------|-----------------------------|-----------------------------------|
//! | sample | the sample                  | the sample                        |
//! | auto   | recorded reference, if any  | recorded reference, if any, else  |
//! |        |                             | chunk 0's audio, if completed     |

use crate::audio::{ArtifactStore, Waveform, voice_artifact_name};
use crate::error::{NarratorError, Result};
use crate::job::{Job, VoiceSelection};
use std::path::PathBuf;

/// Where the context for a chunk comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferenceSource {
    /// The model chooses freely.
    None,
    /// A pre-supplied voice sample on disk.
    Sample(PathBuf),
    /// An artifact in the job's artifact store.
    Artifact(String),
}

/// Decide the context source for `index` without touching storage.
pub fn reference_source(job: &Job, index: usize) -> ReferenceSource {
    match &job.voice {
        VoiceSelection::Sample { path, .. } => ReferenceSource::Sample(path.clone()),
        VoiceSelection::Auto => match (&job.voice_reference, job.chunks.first()) {
            (Some(reference), _) => ReferenceSource::Artifact(reference.clone()),
            (None, _) if index == 0 => ReferenceSource::None,
            (None, Some(first)) if first.is_completed() => first
                .audio
                .clone()
                .map_or(ReferenceSource::None, ReferenceSource::Artifact),
            _ => ReferenceSource::None,
        },
    }
}

/// Loads reference audio and records the auto-discovered voice.
#[derive(Debug, Clone)]
pub struct VoiceReferenceManager {
    artifacts: ArtifactStore,
}

impl VoiceReferenceManager {
    pub fn new(artifacts: ArtifactStore) -> Self {
        Self { artifacts }
    }

    /// Reference audio for a chunk, or `None` to let the model choose.
    ///
    /// A missing voice sample is an error for that chunk. A missing job
    /// artifact degrades to no context rather than blocking the chunk.
    pub fn context_for(&self, job: &Job, index: usize) -> Result<Option<Waveform>> {
        match reference_source(job, index) {
            ReferenceSource::None => Ok(None),
            ReferenceSource::Sample(path) => {
                if !path.is_file() {
                    return Err(NarratorError::VoiceNotFound {
                        voice: job.voice.id().to_string(),
                    });
                }
                Waveform::read(&path).map(Some)
            }
            ReferenceSource::Artifact(name) => {
                if !self.artifacts.exists(&name) {
                    log::warn!(
                        "{}: reference {name} for chunk {index} is missing, generating without context",
                        job.id
                    );
                    return Ok(None);
                }
                self.artifacts.read(&name).map(Some)
            }
        }
    }

    /// Copy freshly generated chunk 0 audio of an auto-voice job into the
    /// job's permanent voice reference artifact.
    ///
    /// Returns the artifact name to record alongside the chunk, or `None`
    /// when the job already has a reference or uses a voice sample.
    pub fn adopt_first_chunk(&self, job: &Job, audio: &str) -> Result<Option<String>> {
        if !job.voice.is_auto() || job.voice_reference.is_some() {
            return Ok(None);
        }
        let name = voice_artifact_name(&job.id);
        self.artifacts.copy(audio, &name)?;
        Ok(Some(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::chunk_artifact_name;
    use crate::job::{Chunk, GenerationParams};
    use chrono::Utc;
    use tempfile::TempDir;

    fn auto_job(chunks: usize) -> Job {
        let mut job = Job::new(
            "t".into(),
            false,
            GenerationParams::default(),
            10,
            VoiceSelection::Auto,
        );
        job.chunks = (0..chunks).map(|i| Chunk::new(i, "x")).collect();
        job
    }

    fn manager() -> (TempDir, ArtifactStore, VoiceReferenceManager) {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::open(dir.path()).unwrap();
        (dir, store.clone(), VoiceReferenceManager::new(store))
    }

    #[test]
    fn auto_first_chunk_has_no_context_until_reference_recorded() {
        let mut job = auto_job(3);
        assert_eq!(reference_source(&job, 0), ReferenceSource::None);
        job.voice_reference = Some("job_voice.wav".into());
        assert_eq!(
            reference_source(&job, 0),
            ReferenceSource::Artifact("job_voice.wav".into())
        );
    }

    #[test]
    fn auto_later_chunks_use_first_chunk_only_when_completed() {
        let mut job = auto_job(3);
        assert_eq!(reference_source(&job, 2), ReferenceSource::None);

        job.chunks[0].mark_failed("x", Utc::now());
        assert_eq!(reference_source(&job, 2), ReferenceSource::None);

        let name = chunk_artifact_name(&job.id, 0);
        job.chunks[0].mark_completed(name.clone(), Utc::now());
        job.chunks[1].mark_completed("other.wav".into(), Utc::now());
        assert_eq!(reference_source(&job, 2), ReferenceSource::Artifact(name));
    }

    #[test]
    fn recorded_reference_wins_over_first_chunk_audio() {
        let mut job = auto_job(3);
        job.chunks[0].mark_completed(chunk_artifact_name(&job.id, 0), Utc::now());
        let reference = voice_artifact_name(&job.id);
        job.voice_reference = Some(reference.clone());
        for i in 0..3 {
            assert_eq!(
                reference_source(&job, i),
                ReferenceSource::Artifact(reference.clone())
            );
        }

        job.chunks[0].mark_failed("x", Utc::now());
        assert_eq!(
            reference_source(&job, 2),
            ReferenceSource::Artifact(reference)
        );
    }

    #[test]
    fn sample_voice_applies_to_every_chunk() {
        let mut job = auto_job(2);
        job.voice = VoiceSelection::Sample {
            voice_id: "clone_a".into(),
            path: PathBuf::from("/v/a.wav"),
        };
        for i in 0..2 {
            assert_eq!(
                reference_source(&job, i),
                ReferenceSource::Sample(PathBuf::from("/v/a.wav"))
            );
        }
    }

    #[test]
    fn context_loads_first_chunk_audio() {
        let (_dir, store, refs) = manager();
        let mut job = auto_job(3);
        let wave = Waveform::new(vec![0.7; 5], 24000);
        let name = chunk_artifact_name(&job.id, 0);
        store.write(&name, &wave).unwrap();
        job.chunks[0].mark_completed(name, Utc::now());

        assert_eq!(refs.context_for(&job, 2).unwrap(), Some(wave));
        assert_eq!(refs.context_for(&job, 0).unwrap(), None);
    }

    #[test]
    fn missing_artifact_degrades_to_no_context() {
        let (_dir, _store, refs) = manager();
        let mut job = auto_job(2);
        job.chunks[0].mark_completed("gone.wav".into(), Utc::now());
        assert_eq!(refs.context_for(&job, 1).unwrap(), None);
    }

    #[test]
    fn missing_sample_is_an_error() {
        let (_dir, _store, refs) = manager();
        let mut job = auto_job(1);
        job.voice = VoiceSelection::Sample {
            voice_id: "clone_gone".into(),
            path: PathBuf::from("/nonexistent/clone_gone.wav"),
        };
        assert!(matches!(
            refs.context_for(&job, 0),
            Err(NarratorError::VoiceNotFound { .. })
        ));
    }

    #[test]
    fn first_chunk_is_adopted_once() {
        let (_dir, store, refs) = manager();
        let mut job = auto_job(2);
        let first = Waveform::new(vec![0.1; 4], 24000);
        let name = chunk_artifact_name(&job.id, 0);
        store.write(&name, &first).unwrap();

        let adopted = refs.adopt_first_chunk(&job, &name).unwrap().unwrap();
        assert_eq!(adopted, voice_artifact_name(&job.id));
        assert_eq!(store.read(&adopted).unwrap(), first);

        job.voice_reference = Some(adopted);
        store.write(&name, &Waveform::new(vec![0.9; 4], 24000)).unwrap();
        assert_eq!(refs.adopt_first_chunk(&job, &name).unwrap(), None);
        assert_eq!(store.read(&voice_artifact_name(&job.id)).unwrap(), first);
    }

    #[test]
    fn sample_voice_jobs_adopt_nothing() {
        let (_dir, store, refs) = manager();
        let mut job = auto_job(1);
        job.voice = VoiceSelection::Sample {
            voice_id: "clone_a".into(),
            path: PathBuf::from("/v/a.wav"),
        };
        let name = chunk_artifact_name(&job.id, 0);
        store.write(&name, &Waveform::new(vec![0.1; 4], 24000)).unwrap();
        assert_eq!(refs.adopt_first_chunk(&job, &name).unwrap(), None);
        assert!(!store.exists(&voice_artifact_name(&job.id)));
    }

    #[test]
    fn adopting_missing_audio_is_an_error() {
        let (_dir, _store, refs) = manager();
        let job = auto_job(1);
        assert!(refs.adopt_first_chunk(&job, "gone.wav").is_err());
    }
}

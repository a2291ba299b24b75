//! Ordered concatenation of chunk audio into the final artifact.

use crate::audio::{ArtifactStore, Waveform, final_artifact_name};
use crate::error::{NarratorError, Result};
use crate::job::Job;

/// Concatenate every chunk's audio in index order and write the job's final
/// artifact, replacing any earlier one. Returns the artifact name.
///
/// Fails on the first chunk that is not completed; nothing is written then.
/// All chunks are assumed to share one sample rate.
pub fn stitch(job: &Job, artifacts: &ArtifactStore) -> Result<String> {
    if job.chunks.is_empty() {
        return Err(NarratorError::ChunkNotReady {
            index: 0,
            status: "missing".to_string(),
        });
    }

    let mut parts = Vec::with_capacity(job.chunks.len());
    for chunk in &job.chunks {
        let audio = match (&chunk.audio, chunk.is_completed()) {
            (Some(audio), true) => audio,
            _ => {
                return Err(NarratorError::ChunkNotReady {
                    index: chunk.index,
                    status: chunk.status.to_string(),
                });
            }
        };
        parts.push(audio.as_str());
    }

    let waves = parts
        .into_iter()
        .map(|name| artifacts.read(name))
        .collect::<Result<Vec<Waveform>>>()?;
    let combined = Waveform::concat(&waves);

    let name = final_artifact_name(&job.id);
    artifacts.write(&name, &combined)?;
    log::info!(
        "{}: stitched {} chunks ({:.1}s)",
        job.id,
        waves.len(),
        combined.duration_secs()
    );
    Ok(name)
}

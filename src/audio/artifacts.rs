//! On-disk audio artifacts, named deterministically from job id and chunk index.
//!
//! Names are stable so that regeneration supersedes a prior chunk artifact by
//! name and cleanup can find every artifact of a job without consulting the
//! job record.

use crate::audio::wav::Waveform;
use crate::error::{NarratorError, Result};
use std::fs;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

/// Artifact name for one chunk of a job.
pub fn chunk_artifact_name(job_id: &str, index: usize) -> String {
    format!("{job_id}_chunk_{index}.wav")
}

/// Artifact name for the auto-discovered voice reference of a job.
pub fn voice_artifact_name(job_id: &str) -> String {
    format!("{job_id}_voice.wav")
}

/// Artifact name for the stitched narration of a job.
pub fn final_artifact_name(job_id: &str) -> String {
    format!("{job_id}_final.wav")
}

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Directory of WAV artifacts.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    /// Open (creating if needed) an artifact directory.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| NarratorError::Audio {
            message: format!(
                "Failed to create artifact directory {}: {}",
                root.display(),
                e
            ),
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Full path for an artifact name. Rejects names that would escape the root.
    pub fn path_for(&self, name: &str) -> Result<PathBuf> {
        if !is_plain_file_name(name) {
            return Err(NarratorError::Audio {
                message: format!("Invalid artifact name: {name}"),
            });
        }
        Ok(self.root.join(name))
    }

    pub fn exists(&self, name: &str) -> bool {
        self.path_for(name).map(|p| p.is_file()).unwrap_or(false)
    }

    /// Write a waveform under `name`, replacing any existing artifact atomically.
    pub fn write(&self, name: &str, wave: &Waveform) -> Result<PathBuf> {
        let path = self.path_for(name)?;
        let temp = self.root.join(format!(
            ".{name}.{}.{}.tmp",
            std::process::id(),
            TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));

        let write_result = (|| -> Result<()> {
            let file = fs::File::create(&temp)?;
            let mut writer = BufWriter::new(file);
            wave.write_to(&mut writer)?;
            let file = writer.into_inner().map_err(|e| NarratorError::Audio {
                message: format!("Failed to flush {}: {}", temp.display(), e.error()),
            })?;
            file.sync_all()?;
            Ok(())
        })();

        if let Err(e) = write_result {
            if let Err(cleanup) = fs::remove_file(&temp) {
                log::warn!("failed to remove temp artifact {}: {cleanup}", temp.display());
            }
            return Err(e);
        }

        fs::rename(&temp, &path).map_err(|e| NarratorError::Audio {
            message: format!("Failed to move artifact into place at {}: {}", path.display(), e),
        })?;
        Ok(path)
    }

    pub fn read(&self, name: &str) -> Result<Waveform> {
        Waveform::read(&self.path_for(name)?)
    }

    /// Copy an artifact under a new name.
    pub fn copy(&self, from: &str, to: &str) -> Result<PathBuf> {
        let wave = self.read(from)?;
        self.write(to, &wave)
    }

    /// Delete an artifact. A missing artifact is not an error.
    pub fn delete(&self, name: &str) -> Result<()> {
        let path = self.path_for(name)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(NarratorError::Audio {
                message: format!("Failed to delete {}: {}", path.display(), e),
            }),
        }
    }

    /// Delete every artifact a job may own.
    ///
    /// Failures are logged and skipped so cleanup always gets as far as it can.
    pub fn purge_job(&self, job_id: &str, chunk_count: usize) {
        let names = (0..chunk_count)
            .map(|i| chunk_artifact_name(job_id, i))
            .chain([voice_artifact_name(job_id), final_artifact_name(job_id)]);
        for name in names {
            if let Err(e) = self.delete(&name) {
                log::warn!("cleanup of {job_id}: {e}");
            }
        }
    }
}

fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains('/')
        && !name.contains('\\')
        && !name.contains('\0')
}

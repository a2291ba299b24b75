//! Library of user-supplied voice samples.
//!
//! Each voice is a WAV sample `<id>.wav` next to a metadata file `<id>.json`.

use crate::audio::Waveform;
use crate::defaults;
use crate::error::{NarratorError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Metadata of a stored voice sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceInfo {
    pub id: String,
    pub name: String,
    pub duration_secs: f64,
    pub sample_rate: u32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct VoiceLibrary {
    root: PathBuf,
}

impl VoiceLibrary {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn sample_path(&self, id: &str) -> PathBuf {
        self.root.join(format!("{id}.wav"))
    }

    fn meta_path(&self, id: &str) -> PathBuf {
        self.root.join(format!("{id}.json"))
    }

    fn check_id(id: &str) -> Result<()> {
        let valid = !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if valid && id != defaults::AUTO_VOICE {
            Ok(())
        } else {
            Err(NarratorError::VoiceNotFound {
                voice: id.to_string(),
            })
        }
    }

    /// Import a WAV sample under a display name.
    ///
    /// The sample is decoded first; unreadable or silent-length audio is
    /// rejected before anything is written.
    pub fn add(&self, name: &str, sample: &Path) -> Result<VoiceInfo> {
        let name = name.trim();
        if name.is_empty() {
            return Err(NarratorError::InvalidVoiceSample {
                message: "voice name must not be empty".to_string(),
            });
        }

        let wave = Waveform::read(sample).map_err(|e| NarratorError::InvalidVoiceSample {
            message: e.to_string(),
        })?;
        if wave.is_empty() {
            return Err(NarratorError::InvalidVoiceSample {
                message: format!("{} contains no audio", sample.display()),
            });
        }

        let id = format!("clone_{}", &uuid::Uuid::new_v4().simple().to_string()[..12]);
        let info = VoiceInfo {
            id: id.clone(),
            name: name.to_string(),
            duration_secs: wave.duration_secs(),
            sample_rate: wave.sample_rate,
            created_at: Utc::now(),
        };

        fs::write(self.sample_path(&id), wave.to_wav_bytes()?)?;
        if let Err(e) = self.write_meta(&info) {
            if let Err(cleanup) = fs::remove_file(self.sample_path(&id)) {
                log::warn!("failed to remove orphan voice sample {id}: {cleanup}");
            }
            return Err(e);
        }
        log::info!("added voice {} ({:.1}s)", info.id, info.duration_secs);
        Ok(info)
    }

    fn write_meta(&self, info: &VoiceInfo) -> Result<()> {
        let json = serde_json::to_string_pretty(info)?;
        fs::write(self.meta_path(&info.id), json)?;
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<VoiceInfo> {
        Self::check_id(id)?;
        let text = fs::read_to_string(self.meta_path(id)).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                NarratorError::VoiceNotFound {
                    voice: id.to_string(),
                }
            } else {
                NarratorError::Io(e)
            }
        })?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Every stored voice, sorted by name. Unreadable metadata is skipped.
    pub fn list(&self) -> Result<Vec<VoiceInfo>> {
        let mut voices = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match fs::read_to_string(&path)
                .map_err(NarratorError::from)
                .and_then(|t| serde_json::from_str::<VoiceInfo>(&t).map_err(NarratorError::from))
            {
                Ok(info) => voices.push(info),
                Err(e) => log::warn!("skipping voice metadata {}: {e}", path.display()),
            }
        }
        voices.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(voices)
    }

    pub fn rename(&self, id: &str, name: &str) -> Result<VoiceInfo> {
        let name = name.trim();
        if name.is_empty() {
            return Err(NarratorError::InvalidVoiceSample {
                message: "voice name must not be empty".to_string(),
            });
        }
        let mut info = self.get(id)?;
        info.name = name.to_string();
        self.write_meta(&info)?;
        Ok(info)
    }

    pub fn remove(&self, id: &str) -> Result<()> {
        self.get(id)?;
        fs::remove_file(self.meta_path(id))?;
        match fs::remove_file(self.sample_path(id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Path of the sample for a voice id. Unknown ids are an input error.
    pub fn resolve(&self, id: &str) -> Result<PathBuf> {
        Self::check_id(id)?;
        let path = self.sample_path(id);
        if path.is_file() {
            Ok(path)
        } else {
            Err(NarratorError::VoiceNotFound {
                voice: id.to_string(),
            })
        }
    }
}

//! Audio waveforms and on-disk artifacts.

pub mod artifacts;
pub mod wav;

pub use artifacts::{
    ArtifactStore, chunk_artifact_name, final_artifact_name, voice_artifact_name,
};
pub use wav::Waveform;

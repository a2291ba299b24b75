//! Line-delimited JSON messages between the CLI and the daemon.

use crate::job::{GenerationParams, JobStatus, JobSummary};
use crate::pipeline::{JobRequest, PreviewVoice};
use crate::voice::VoiceInfo;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Commands sent by the CLI to the daemon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    /// Create a job and queue it for generation.
    Submit(SubmitRequest),
    /// Summary of one job.
    Status { job_id: String },
    /// Summaries of all jobs, optionally only those in one status.
    List {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status: Option<JobStatus>,
    },
    Cancel { job_id: String },
    /// Queue regeneration of one chunk of a settled job.
    Regenerate { job_id: String, index: usize },
    /// Join a completed job's chunks into its final audio.
    Stitch { job_id: String },
    Delete { job_id: String },
    /// Text a job was narrated from after normalization changed it.
    NormalizedText { job_id: String },
    Voices,
    AddVoice { name: String, path: PathBuf },
    RenameVoice { voice_id: String, name: String },
    RemoveVoice { voice_id: String },
    /// Speak a line in a voice and write the audio to `output`, which must
    /// be absolute.
    PreviewVoice {
        voice: PreviewVoice,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        temperature: Option<f32>,
        output: PathBuf,
    },
    Ping,
    Shutdown,
}

/// Parameters of a new job. Unset fields fall back to the daemon's config.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,
    #[serde(default)]
    pub normalize: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub words_per_chunk: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
}

impl SubmitRequest {
    /// Resolve unset fields against the daemon's defaults.
    pub fn into_job_request(
        self,
        defaults: &GenerationParams,
        words_per_chunk: usize,
    ) -> JobRequest {
        let mut request = JobRequest::new(self.text)
            .with_normalize(self.normalize)
            .with_words_per_chunk(self.words_per_chunk.unwrap_or(words_per_chunk))
            .with_params(GenerationParams {
                temperature: self.temperature.unwrap_or(defaults.temperature),
                top_p: self.top_p.unwrap_or(defaults.top_p),
            });
        if let Some(voice) = self.voice {
            request = request.with_voice(&voice);
        }
        if let Some(name) = self.name {
            request = request.with_name(name);
        }
        request
    }
}

impl Command {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

/// Responses sent by the daemon to the CLI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    Ok,
    Pong { version: String },
    Job { job: JobSummary },
    Jobs { jobs: Vec<JobSummary> },
    Voice { voice: VoiceInfo },
    Voices { voices: Vec<VoiceInfo> },
    Text { text: String },
    Preview { path: PathBuf, duration_secs: f64 },
    /// `input` is set when the request itself was rejected.
    Error {
        message: String,
        #[serde(default)]
        input: bool,
    },
}

impl Response {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    pub fn error(err: &crate::error::NarratorError) -> Self {
        Response::Error {
            message: err.to_string(),
            input: err.is_input_error(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NarratorError;

    #[test]
    fn commands_use_snake_case_tags() {
        let json = Command::RemoveVoice {
            voice_id: "clone_a".into(),
        }
        .to_json()
        .unwrap();
        assert!(json.contains("\"type\":\"remove_voice\""), "got {json}");
        assert_eq!(
            Command::from_json(r#"{"type":"ping"}"#).unwrap(),
            Command::Ping
        );
    }

    #[test]
    fn submit_fields_are_flattened_into_the_command() {
        let cmd = Command::from_json(r#"{"type":"submit","text":"Hello there.","voice":"auto"}"#)
            .unwrap();
        let Command::Submit(request) = cmd else {
            panic!("expected submit, got {cmd:?}");
        };
        assert_eq!(request.text, "Hello there.");
        assert_eq!(request.voice.as_deref(), Some("auto"));
        assert!(!request.normalize);
        assert_eq!(request.words_per_chunk, None);
    }

    #[test]
    fn list_status_filter_is_optional() {
        assert_eq!(
            Command::from_json(r#"{"type":"list"}"#).unwrap(),
            Command::List { status: None }
        );
        assert_eq!(
            Command::from_json(r#"{"type":"list","status":"review"}"#).unwrap(),
            Command::List {
                status: Some(JobStatus::Review)
            }
        );
    }

    #[test]
    fn preview_names_voice_kind() {
        let cmd = Command::from_json(
            r#"{"type":"preview_voice","voice":{"library":"clone_a"},"output":"/tmp/p.wav"}"#,
        )
        .unwrap();
        assert_eq!(
            cmd,
            Command::PreviewVoice {
                voice: PreviewVoice::Library("clone_a".into()),
                text: None,
                temperature: None,
                output: PathBuf::from("/tmp/p.wav"),
            }
        );
        let json = Command::PreviewVoice {
            voice: PreviewVoice::Sample(PathBuf::from("/s.wav")),
            text: Some("Hi.".into()),
            temperature: None,
            output: PathBuf::from("/o.wav"),
        }
        .to_json()
        .unwrap();
        assert!(json.contains(r#""voice":{"sample":"/s.wav"}"#), "got {json}");
        assert!(!json.contains("temperature"), "got {json}");
    }

    #[test]
    fn normalized_text_round_trip_tags() {
        assert_eq!(
            Command::from_json(r#"{"type":"normalized_text","job_id":"job_1"}"#).unwrap(),
            Command::NormalizedText {
                job_id: "job_1".into()
            }
        );
        let json = Response::Text { text: "HI.".into() }.to_json().unwrap();
        assert_eq!(json, r#"{"type":"text","text":"HI."}"#);
    }

    #[test]
    fn submit_defaults_fill_unset_fields() {
        let defaults = GenerationParams {
            temperature: 0.4,
            top_p: 0.8,
        };
        let request = SubmitRequest {
            text: "Hi.".into(),
            top_p: Some(0.5),
            ..Default::default()
        }
        .into_job_request(&defaults, 42);
        assert_eq!(request.words_per_chunk, 42);
        assert_eq!(request.params.temperature, 0.4);
        assert_eq!(request.params.top_p, 0.5);
        assert_eq!(request.voice, crate::defaults::AUTO_VOICE);
    }

    #[test]
    fn error_response_flags_input_errors() {
        let resp = Response::error(&NarratorError::EmptyText);
        assert_eq!(
            resp,
            Response::Error {
                message: "Text is empty after normalization".into(),
                input: true
            }
        );
        let resp = Response::error(&NarratorError::Generation {
            message: "down".into(),
        });
        assert!(matches!(resp, Response::Error { input: false, .. }));
    }

    #[test]
    fn error_without_input_flag_parses() {
        let resp = Response::from_json(r#"{"type":"error","message":"boom"}"#).unwrap();
        assert_eq!(
            resp,
            Response::Error {
                message: "boom".into(),
                input: false
            }
        );
    }
}

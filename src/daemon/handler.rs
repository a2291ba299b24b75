//! Command handler for daemon IPC commands.

use crate::daemon::DaemonState;
use crate::defaults;
use crate::error::{NarratorError, Result};
use crate::ipc::protocol::{Command, Response, SubmitRequest};
use crate::ipc::server::{CommandHandler, ShutdownHandle};
use crate::job::{Job, JobStatus, JobSummary};
use crate::pipeline::{JobTask, PreviewVoice};
use std::path::Path;
use std::sync::Arc;

pub struct DaemonCommandHandler {
    state: Arc<DaemonState>,
    shutdown: ShutdownHandle,
}

impl DaemonCommandHandler {
    pub fn new(state: Arc<DaemonState>, shutdown: ShutdownHandle) -> Self {
        Self { state, shutdown }
    }

    fn submit(&self, request: SubmitRequest) -> Result<Response> {
        let request = request.into_job_request(
            &self.state.default_params(),
            self.state.config.generation.words_per_chunk,
        );
        let job = self.state.orchestrator().create_job(request)?;
        self.state.pool.submit(JobTask::Run {
            job_id: job.id.clone(),
        })?;
        Ok(job_response(JobSummary::from(&job)))
    }

    fn list(&self, status: Option<JobStatus>) -> Result<Response> {
        let jobs = self
            .state
            .orchestrator()
            .list(&|job: &Job| status.is_none_or(|s| job.status == s))?;
        Ok(Response::Jobs { jobs })
    }

    fn regenerate(&self, job_id: &str, index: usize) -> Result<Response> {
        let orchestrator = self.state.orchestrator();
        orchestrator.check_regeneration(job_id, index)?;
        self.state.pool.submit(JobTask::Regenerate {
            job_id: job_id.to_string(),
            index,
        })?;
        Ok(job_response(orchestrator.summary(job_id)?))
    }

    fn add_voice(&self, name: &str, path: &Path) -> Result<Response> {
        let voice = self.state.orchestrator().voices().add(name, path)?;
        Ok(Response::Voice { voice })
    }

    async fn preview_voice(
        &self,
        voice: PreviewVoice,
        text: Option<String>,
        temperature: Option<f32>,
        output: &Path,
    ) -> Result<Response> {
        if !output.is_absolute() {
            return Err(NarratorError::InvalidParameter {
                name: "output".to_string(),
                message: format!("{} is not an absolute path", output.display()),
            });
        }
        let mut params = self.state.default_params();
        if let Some(temperature) = temperature {
            params.temperature = temperature;
        }
        let text = text.unwrap_or_else(|| defaults::PREVIEW_TEXT.to_string());
        let wave = self
            .state
            .orchestrator()
            .preview_voice(&voice, &text, params)
            .await?;
        std::fs::write(output, wave.to_wav_bytes()?)?;
        Ok(Response::Preview {
            path: output.to_path_buf(),
            duration_secs: wave.duration_secs(),
        })
    }

    async fn dispatch(&self, command: Command) -> Result<Response> {
        let orchestrator = self.state.orchestrator();
        match command {
            Command::Submit(request) => self.submit(request),
            Command::Status { job_id } => Ok(job_response(orchestrator.summary(&job_id)?)),
            Command::List { status } => self.list(status),
            Command::Cancel { job_id } => {
                let job = self.state.pool.cancel(&job_id)?;
                Ok(job_response(JobSummary::from(&job)))
            }
            Command::Regenerate { job_id, index } => self.regenerate(&job_id, index),
            Command::Stitch { job_id } => {
                let job = orchestrator.stitch(&job_id)?;
                Ok(job_response(JobSummary::from(&job)))
            }
            Command::Delete { job_id } => {
                orchestrator.delete(&job_id)?;
                Ok(Response::Ok)
            }
            Command::NormalizedText { job_id } => Ok(Response::Text {
                text: orchestrator.normalized_text(&job_id)?,
            }),
            Command::Voices => Ok(Response::Voices {
                voices: orchestrator.voices().list()?,
            }),
            Command::AddVoice { name, path } => self.add_voice(&name, &path),
            Command::RenameVoice { voice_id, name } => Ok(Response::Voice {
                voice: orchestrator.voices().rename(&voice_id, &name)?,
            }),
            Command::RemoveVoice { voice_id } => {
                orchestrator.voices().remove(&voice_id)?;
                Ok(Response::Ok)
            }
            Command::PreviewVoice {
                voice,
                text,
                temperature,
                output,
            } => {
                self.preview_voice(voice, text, temperature, &output)
                    .await
            }
            Command::Ping => Ok(Response::Pong {
                version: crate::version_string(),
            }),
            Command::Shutdown => {
                log::info!("shutdown requested over IPC");
                self.shutdown.shutdown();
                Ok(Response::Ok)
            }
        }
    }
}

fn job_response(job: JobSummary) -> Response {
    Response::Job { job }
}

#[async_trait::async_trait]
impl CommandHandler for DaemonCommandHandler {
    async fn handle(&self, command: Command) -> Response {
        log::debug!("command: {:?}", command);
        match self.dispatch(command).await {
            Ok(response) => response,
            Err(e) => {
                if e.is_input_error() {
                    log::debug!("rejected: {e}");
                } else {
                    log::warn!("command failed: {e}");
                }
                Response::error(&e)
            }
        }
    }
}

//! Long-running narration daemon: worker pool plus IPC server.

pub mod handler;

use crate::audio::ArtifactStore;
use crate::config::Config;
use crate::error::{NarratorError, Result};
use crate::ipc::server::IpcServer;
use crate::job::{FileJobStore, GenerationParams};
use crate::pipeline::{ExclusiveGate, Orchestrator, WorkerPool};
use crate::synth::Synthesizer;
use crate::voice::VoiceLibrary;
use std::path::PathBuf;
use std::sync::Arc;

/// Everything a command handler needs.
pub struct DaemonState {
    pub config: Config,
    pub pool: WorkerPool,
}

impl DaemonState {
    pub fn new(config: Config, pool: WorkerPool) -> Self {
        Self { config, pool }
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        self.pool.orchestrator()
    }

    /// Sampling parameters for submissions that leave them unset.
    pub fn default_params(&self) -> GenerationParams {
        GenerationParams {
            temperature: self.config.generation.temperature,
            top_p: self.config.generation.top_p,
        }
    }
}

/// Wire the orchestrator from config: file-backed job store, artifact and
/// voice directories, generation server and optional normalizer.
pub fn build_orchestrator(config: &Config) -> Result<Orchestrator> {
    let store = FileJobStore::open(config.storage.jobs_dir())?;
    let artifacts = ArtifactStore::open(config.storage.audio_dir())?;
    let voices = VoiceLibrary::open(config.storage.voices_dir())?;
    let orchestrator = Orchestrator::new(
        Arc::new(store),
        artifacts,
        voices,
        build_synthesizer(config)?,
        ExclusiveGate::new(),
    );
    Ok(with_normalizer(orchestrator, config))
}

#[cfg(feature = "http")]
fn build_synthesizer(config: &Config) -> Result<Arc<dyn Synthesizer>> {
    let synth = crate::synth::HttpSynthesizer::from_config(&config.generation)?;
    log::info!("generation server: {}", synth.endpoint());
    Ok(Arc::new(synth))
}

#[cfg(not(feature = "http"))]
fn build_synthesizer(_config: &Config) -> Result<Arc<dyn Synthesizer>> {
    Err(NarratorError::Other(
        "narrator was built without the `http` feature; no generation backend available"
            .to_string(),
    ))
}

#[cfg(feature = "http")]
fn with_normalizer(orchestrator: Orchestrator, config: &Config) -> Orchestrator {
    if !config.normalizer.enabled {
        return orchestrator;
    }
    match crate::text::ChatNormalizer::from_config(&config.normalizer) {
        Ok(normalizer) => orchestrator.with_normalizer(Arc::new(normalizer)),
        Err(e) => {
            log::warn!("text normalization disabled: {e}");
            orchestrator
        }
    }
}

#[cfg(not(feature = "http"))]
fn with_normalizer(orchestrator: Orchestrator, config: &Config) -> Orchestrator {
    if config.normalizer.enabled {
        log::warn!("text normalization needs the `http` feature; passing text through");
    }
    orchestrator
}

/// Run the daemon until SIGINT, SIGTERM or a `shutdown` command.
///
/// Jobs left unfinished by a previous process are queued before the socket
/// opens.
pub async fn run_daemon(config: Config, socket_path: Option<PathBuf>) -> Result<()> {
    config.validate()?;
    let orchestrator = Arc::new(build_orchestrator(&config)?);
    let pool = WorkerPool::start(orchestrator, config.daemon.workers);

    let resumed = pool.resume_interrupted()?;
    if !resumed.is_empty() {
        log::info!("resumed {} interrupted job(s)", resumed.len());
    }

    let socket_path = socket_path
        .or_else(|| config.daemon.socket.clone())
        .unwrap_or_else(IpcServer::default_socket_path);
    let server = IpcServer::new(socket_path);
    let shutdown = server.shutdown_handle();

    let state = Arc::new(DaemonState::new(config, pool));
    let handler = Arc::new(handler::DaemonCommandHandler::new(
        Arc::clone(&state),
        shutdown.clone(),
    ));
    let mut server_task = tokio::spawn(async move { server.serve(handler).await });

    let served = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            log::info!("received SIGINT, shutting down");
            None
        }
        res = wait_for_sigterm() => {
            if let Err(e) = res {
                log::error!("{e}");
            }
            log::info!("received SIGTERM, shutting down");
            None
        }
        res = &mut server_task => Some(res),
    };

    shutdown.shutdown();
    let served = match served {
        Some(res) => res,
        None => server_task.await,
    };
    state.pool.shutdown();

    match served {
        Ok(result) => result,
        Err(e) => Err(NarratorError::Other(format!("IPC server task failed: {e}"))),
    }
}

#[cfg(unix)]
async fn wait_for_sigterm() -> Result<()> {
    use tokio::signal::unix::{SignalKind, signal};
    let mut sigterm = signal(SignalKind::terminate()).map_err(|e| {
        NarratorError::Other(format!("Failed to register SIGTERM handler: {}", e))
    })?;
    sigterm.recv().await;
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_sigterm() -> Result<()> {
    std::future::pending::<()>().await;
    Ok(())
}

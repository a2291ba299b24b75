//! One-shot narration without the daemon.
//!
//! Creates the job in the same store the daemon uses, runs it in this
//! process and stitches the result. Ctrl-C requests cancellation, which
//! takes effect at the next chunk boundary.

use crate::cli::JobArgs;
use crate::config::Config;
use crate::daemon::build_orchestrator;
use crate::error::{NarratorError, Result};
use crate::ipc::protocol::{Command, SubmitRequest};
use crate::job::GenerationParams;
use crate::output::ConsoleReporter;
use crate::pipeline::{CancelToken, PreviewVoice, RunOutcome};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Read the text to narrate: `--text`, a file, or stdin for `-`.
pub fn read_text(args: &JobArgs) -> Result<String> {
    if let Some(text) = &args.text {
        return Ok(text.clone());
    }
    match args.file.as_deref() {
        Some(path) if path == Path::new("-") => read_stdin(),
        Some(path) => std::fs::read_to_string(path).map_err(|e| {
            NarratorError::Other(format!("Failed to read {}: {}", path.display(), e))
        }),
        None => Err(NarratorError::Other(
            "No text given: pass a FILE, `-` for stdin, or --text".to_string(),
        )),
    }
}

fn read_stdin() -> Result<String> {
    let mut text = String::new();
    std::io::stdin().read_to_string(&mut text)?;
    Ok(text)
}

/// Turn CLI job options into a submission; unset values stay unset so the
/// receiving side applies its own config.
pub fn submit_request(args: &JobArgs) -> Result<SubmitRequest> {
    Ok(SubmitRequest {
        text: read_text(args)?,
        name: args.name.clone().or_else(|| {
            args.file
                .as_deref()
                .filter(|p| *p != Path::new("-"))
                .and_then(|p| p.file_stem())
                .map(|s| s.to_string_lossy().into_owned())
        }),
        voice: args.voice.clone(),
        normalize: args.normalize,
        words_per_chunk: args.words_per_chunk,
        temperature: args.temperature,
        top_p: args.top_p,
    })
}

/// Build a voice preview request. `voice` is taken as a WAV file when one
/// exists at that path, otherwise as a library voice id.
///
/// Paths are made absolute since the daemon may run in another directory.
pub fn preview_command(
    voice: &str,
    text: Option<String>,
    temperature: Option<f32>,
    output: &Path,
) -> Result<Command> {
    let sample = Path::new(voice);
    let voice = if sample.is_file() {
        PreviewVoice::Sample(std::fs::canonicalize(sample)?)
    } else {
        PreviewVoice::Library(voice.to_string())
    };
    Ok(Command::PreviewVoice {
        voice,
        text,
        temperature,
        output: std::path::absolute(output)?,
    })
}

/// Result of a one-shot narration.
#[derive(Debug)]
pub struct Narration {
    pub job_id: String,
    pub outcome: RunOutcome,
    /// Stitched audio, when the job completed.
    pub audio: Option<PathBuf>,
}

/// Narrate `args` to completion in this process.
pub async fn run_narrate(config: Config, args: JobArgs, output: Option<PathBuf>) -> Result<Narration> {
    config.validate()?;
    let defaults = GenerationParams {
        temperature: config.generation.temperature,
        top_p: config.generation.top_p,
    };
    let request =
        submit_request(&args)?.into_job_request(&defaults, config.generation.words_per_chunk);

    let orchestrator =
        Arc::new(build_orchestrator(&config)?.with_reporter(Arc::new(ConsoleReporter)));
    let job = orchestrator.create_job(request)?;
    let job_id = job.id.clone();

    let cancel = CancelToken::new();
    let watcher = {
        let orchestrator = Arc::clone(&orchestrator);
        let cancel = cancel.clone();
        let job_id = job_id.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("\nCancelling after the current chunk...");
                if let Err(e) = orchestrator.request_cancel(&job_id) {
                    log::warn!("{job_id}: {e}");
                }
                cancel.cancel();
            }
        })
    };

    let outcome = orchestrator.run(&job_id, &cancel).await;
    watcher.abort();
    let outcome = outcome?;

    let audio = match outcome {
        RunOutcome::Completed => {
            let job = orchestrator.stitch(&job_id)?;
            let name = job
                .final_artifact
                .ok_or_else(|| NarratorError::Other(format!("{job_id}: stitch left no audio")))?;
            let stitched = orchestrator.artifacts().path_for(&name)?;
            match output {
                Some(dest) => {
                    std::fs::copy(&stitched, &dest).map_err(|e| {
                        NarratorError::Other(format!("Failed to write {}: {}", dest.display(), e))
                    })?;
                    Some(dest)
                }
                None => Some(stitched),
            }
        }
        _ => None,
    };

    Ok(Narration {
        job_id,
        outcome,
        audio,
    })
}

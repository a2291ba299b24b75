use anyhow::{Context, Result, bail};
use clap::{CommandFactory, Parser};
use narrator::app::{preview_command, run_narrate, submit_request};
use narrator::cli::{Cli, Commands, ConfigAction, VoicesAction};
use narrator::config::Config;
use narrator::daemon::run_daemon;
use narrator::ipc::client::send_command;
use narrator::ipc::protocol::{Command, Response};
use narrator::ipc::server::IpcServer;
use narrator::job::JobSummary;
use narrator::output::{clear_line, format_job, format_job_table, format_voices, progress_bar};
use narrator::pipeline::RunOutcome;
use owo_colors::OwoColorize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// How often `submit --wait` polls the daemon.
const WAIT_POLL: Duration = Duration::from_millis(500);

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(cli.log_filter()))
        .format_timestamp(None)
        .format_target(false)
        .init();

    match cli.command {
        Commands::Daemon => {
            let config = load_config(cli.config.as_deref())?;
            run_daemon(config, cli.socket).await?;
        }
        Commands::Narrate { job, output } => {
            let config = load_config(cli.config.as_deref())?;
            let narration = run_narrate(config, job, output).await?;
            match narration.outcome {
                RunOutcome::Completed => {
                    if let Some(path) = narration.audio {
                        println!("{}", path.display());
                    }
                }
                RunOutcome::Review { failed, unfinished } => {
                    eprintln!(
                        "{} {} needs review: failed chunks {:?}, unfinished {:?}",
                        "!".yellow(),
                        narration.job_id,
                        failed,
                        unfinished
                    );
                    eprintln!(
                        "Retry with `narrator regenerate {} INDEX` once the daemon is running.",
                        narration.job_id
                    );
                    std::process::exit(2);
                }
                RunOutcome::Cancelled => {
                    eprintln!("{}", "Cancelled".yellow());
                    std::process::exit(130);
                }
                RunOutcome::Failed { error } => bail!("{}: {}", narration.job_id, error),
            }
        }
        Commands::Config { action } => handle_config_command(action, cli.config.as_deref())?,
        Commands::Completions { shell } => {
            clap_complete::generate(
                shell,
                &mut Cli::command(),
                "narrator",
                &mut std::io::stdout(),
            );
        }
        command => {
            let config = load_config(cli.config.as_deref())?;
            let socket = cli
                .socket
                .clone()
                .or_else(|| config.daemon.socket.clone())
                .unwrap_or_else(IpcServer::default_socket_path);
            handle_client_command(command, &config, &socket).await?;
        }
    }

    Ok(())
}

/// Load configuration from file or use defaults.
///
/// Priority order:
/// 1. Custom config path from CLI (--config)
/// 2. Default config path (~/.config/narrator/config.toml)
/// 3. Built-in defaults with environment variable overrides
fn load_config(custom_path: Option<&Path>) -> Result<Config> {
    let config = match custom_path {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::load_or_default(&Config::default_path())?,
    };
    Ok(config.with_env_overrides())
}

fn handle_config_command(action: ConfigAction, custom_path: Option<&Path>) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_config(custom_path)?;
            print!("{}", toml::to_string_pretty(&config)?);
        }
        ConfigAction::Path => {
            let path = custom_path
                .map(PathBuf::from)
                .unwrap_or_else(Config::default_path);
            println!("{}", path.display());
        }
    }
    Ok(())
}

/// Commands answered by a running daemon.
async fn handle_client_command(command: Commands, config: &Config, socket: &Path) -> Result<()> {
    match command {
        Commands::Submit { job, wait } => {
            let request = submit_request(&job)?;
            let summary = expect_job(request_daemon(socket, Command::Submit(request)).await?)?;
            println!("{}", summary.id);
            if wait {
                let settled = wait_for_job(socket, &summary.id).await?;
                eprint!("{}", format_job(&settled, chrono::Utc::now()));
            }
        }
        Commands::Status { job_id, json } => {
            let summary = expect_job(request_daemon(socket, Command::Status { job_id }).await?)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                print!("{}", format_job(&summary, chrono::Utc::now()));
            }
        }
        Commands::List { status, json } => {
            match request_daemon(socket, Command::List { status }).await? {
                Response::Jobs { jobs } if json => {
                    println!("{}", serde_json::to_string_pretty(&jobs)?)
                }
                Response::Jobs { jobs } => print!("{}", format_job_table(&jobs, chrono::Utc::now())),
                other => bail!("Unexpected response: {:?}", other),
            }
        }
        Commands::Cancel { job_id } => {
            let summary = expect_job(request_daemon(socket, Command::Cancel { job_id }).await?)?;
            println!("{} {} is {}", "✓".green(), summary.id, summary.status);
        }
        Commands::Regenerate { job_id, index } => {
            request_daemon(socket, Command::Regenerate { job_id: job_id.clone(), index }).await?;
            println!("{} Chunk {} of {} queued", "✓".green(), index, job_id);
        }
        Commands::Stitch { job_id, output } => {
            let summary = expect_job(request_daemon(socket, Command::Stitch { job_id }).await?)?;
            let name = summary
                .final_artifact
                .context("Daemon stitched the job but reported no audio file")?;
            let stitched = config.storage.audio_dir().join(name);
            match output {
                Some(dest) => {
                    std::fs::copy(&stitched, &dest).with_context(|| {
                        format!("Failed to copy {} to {}", stitched.display(), dest.display())
                    })?;
                    println!("{}", dest.display());
                }
                None => println!("{}", stitched.display()),
            }
        }
        Commands::Delete { job_id } => {
            request_daemon(socket, Command::Delete { job_id: job_id.clone() }).await?;
            println!("{} Deleted {}", "✓".green(), job_id);
        }
        Commands::Text { job_id, output } => {
            let text = match request_daemon(socket, Command::NormalizedText { job_id }).await? {
                Response::Text { text } => text,
                other => bail!("Unexpected response: {:?}", other),
            };
            match output {
                Some(dest) => {
                    std::fs::write(&dest, format!("{text}\n"))
                        .with_context(|| format!("Failed to write {}", dest.display()))?;
                    println!("{}", dest.display());
                }
                None => println!("{text}"),
            }
        }
        Commands::Voices { action } => handle_voices_command(action, socket).await?,
        other => bail!("{:?} does not go through the daemon", other),
    }
    Ok(())
}

async fn handle_voices_command(action: VoicesAction, socket: &Path) -> Result<()> {
    match action {
        VoicesAction::List => match request_daemon(socket, Command::Voices).await? {
            Response::Voices { voices } => print!("{}", format_voices(&voices)),
            other => bail!("Unexpected response: {:?}", other),
        },
        VoicesAction::Add { name, path } => {
            // The daemon may run in another directory.
            let path = std::fs::canonicalize(&path)
                .with_context(|| format!("Cannot read voice sample {}", path.display()))?;
            match request_daemon(socket, Command::AddVoice { name, path }).await? {
                Response::Voice { voice } => {
                    println!("{} Added {} ({})", "✓".green(), voice.name, voice.id)
                }
                other => bail!("Unexpected response: {:?}", other),
            }
        }
        VoicesAction::Rename { voice_id, name } => {
            request_daemon(socket, Command::RenameVoice { voice_id, name }).await?;
            println!("{} Renamed", "✓".green());
        }
        VoicesAction::Remove { voice_id } => {
            request_daemon(socket, Command::RemoveVoice { voice_id: voice_id.clone() }).await?;
            println!("{} Removed {}", "✓".green(), voice_id);
        }
        VoicesAction::Test {
            voice,
            text,
            temperature,
            output,
        } => {
            let command = preview_command(&voice, text, temperature, &output)?;
            match request_daemon(socket, command).await? {
                Response::Preview {
                    path,
                    duration_secs,
                } => println!("{} ({:.1}s)", path.display(), duration_secs),
                other => bail!("Unexpected response: {:?}", other),
            }
        }
    }
    Ok(())
}

/// Send one command, turning an error response into an error.
async fn request_daemon(socket: &Path, command: Command) -> Result<Response> {
    match send_command(socket, &command).await? {
        Response::Error { message, .. } => bail!("{}", message.red()),
        response => Ok(response),
    }
}

fn expect_job(response: Response) -> Result<JobSummary> {
    match response {
        Response::Job { job } => Ok(job),
        other => bail!("Unexpected response: {:?}", other),
    }
}

/// Poll until the job leaves its active states, drawing progress on stderr.
///
/// A job that was cancelled disappears from the daemon, so a missing record
/// after at least one successful poll ends the wait.
async fn wait_for_job(socket: &Path, job_id: &str) -> Result<JobSummary> {
    let mut last = None;
    loop {
        let response = send_command(
            socket,
            &Command::Status {
                job_id: job_id.to_string(),
            },
        )
        .await?;
        let summary = match response {
            Response::Job { job } => job,
            Response::Error { message, .. } => {
                clear_line();
                match last {
                    Some(summary) => {
                        eprintln!("{}", format!("{job_id} is gone ({message})").yellow());
                        return Ok(summary);
                    }
                    None => bail!("{}", message.red()),
                }
            }
            other => bail!("Unexpected response: {:?}", other),
        };
        if !summary.status.is_active() {
            clear_line();
            return Ok(summary);
        }
        clear_line();
        eprint!(
            "{} {}",
            progress_bar(summary.progress.completed, summary.progress.total),
            summary.status.dimmed()
        );
        std::io::stderr().flush().ok();
        last = Some(summary);
        tokio::time::sleep(WAIT_POLL).await;
    }
}

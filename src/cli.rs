//! Command-line interface for narrator
//!
//! Provides argument parsing using clap derive macros.

use crate::job::JobStatus;
use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

/// Long-form text narration with voice-consistent chunked generation
#[derive(Parser, Debug)]
#[command(name = "narrator", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Daemon socket (default: $XDG_RUNTIME_DIR/narrator.sock)
    #[arg(long, global = true, value_name = "PATH")]
    pub socket: Option<PathBuf>,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// More log output (-v: debug, -vv: trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    /// Default log filter for the chosen verbosity. `RUST_LOG` still wins.
    pub fn log_filter(&self) -> &'static str {
        match (self.quiet, self.verbose) {
            (true, _) => "warn",
            (false, 0) => "info",
            (false, 1) => "debug",
            (false, _) => "trace",
        }
    }
}

/// Text and generation options shared by `submit` and `narrate`.
#[derive(Args, Debug, Clone, Default)]
pub struct JobArgs {
    /// Text file to narrate ("-" reads stdin)
    #[arg(value_name = "FILE", conflicts_with = "text")]
    pub file: Option<PathBuf>,

    /// Narrate this text instead of a file
    #[arg(long, short = 't')]
    pub text: Option<String>,

    /// Display name for the job
    #[arg(long)]
    pub name: Option<String>,

    /// Voice id from `narrator voices list`, or "auto"
    #[arg(long)]
    pub voice: Option<String>,

    /// Maximum words per chunk
    #[arg(long, short = 'w', value_name = "WORDS")]
    pub words_per_chunk: Option<usize>,

    /// Clean the text up for narration before chunking
    #[arg(long)]
    pub normalize: bool,

    /// Sampling temperature
    #[arg(long)]
    pub temperature: Option<f32>,

    /// Nucleus-sampling threshold in (0, 1]
    #[arg(long)]
    pub top_p: Option<f32>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the background daemon (foreground process)
    Daemon,

    /// Queue a narration job on the daemon
    Submit {
        #[command(flatten)]
        job: JobArgs,

        /// Wait until the job settles and print its final state
        #[arg(long)]
        wait: bool,
    },

    /// Show a job's status and progress
    Status {
        job_id: String,

        /// Print the raw JSON summary
        #[arg(long)]
        json: bool,
    },

    /// List jobs
    List {
        /// Only jobs in this status (pending, processing, review, ...)
        #[arg(long, value_parser = parse_status)]
        status: Option<JobStatus>,

        /// Print the raw JSON summaries
        #[arg(long)]
        json: bool,
    },

    /// Cancel a queued or running job and discard its audio
    Cancel { job_id: String },

    /// Regenerate one chunk of a job in review or completed
    Regenerate {
        job_id: String,
        /// Zero-based chunk index
        index: usize,
    },

    /// Join a completed job's chunks into one audio file
    Stitch {
        job_id: String,

        /// Copy the stitched audio here
        #[arg(long, short = 'o', value_name = "PATH")]
        output: Option<PathBuf>,
    },

    /// Delete a settled job and all of its audio
    Delete { job_id: String },

    /// Print the text a job was narrated from after normalization
    Text {
        job_id: String,

        /// Write the text to this file instead of stdout
        #[arg(long, short = 'o', value_name = "PATH")]
        output: Option<PathBuf>,
    },

    /// Manage voice samples
    Voices {
        #[command(subcommand)]
        action: VoicesAction,
    },

    /// Narrate a text in this process, without the daemon
    Narrate {
        #[command(flatten)]
        job: JobArgs,

        /// Where to write the stitched audio
        #[arg(long, short = 'o', value_name = "PATH")]
        output: Option<PathBuf>,
    },

    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

/// Voice library actions
#[derive(Subcommand, Debug)]
pub enum VoicesAction {
    /// List stored voices
    List,
    /// Import a WAV sample as a voice
    Add {
        /// Display name
        name: String,
        /// WAV file with a clean voice sample
        path: PathBuf,
    },
    /// Change a voice's display name
    Rename { voice_id: String, name: String },
    /// Delete a voice sample
    Remove { voice_id: String },
    /// Speak a short line in a voice before narrating with it
    Test {
        /// Voice id, or a WAV file to try without importing it
        voice: String,

        /// Line to speak
        #[arg(long, short = 't')]
        text: Option<String>,

        /// Sampling temperature
        #[arg(long)]
        temperature: Option<f32>,

        /// Where to write the audio
        #[arg(long, short = 'o', value_name = "PATH", default_value = "voice_test.wav")]
        output: PathBuf,
    },
}

/// Configuration actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
    /// Print the configuration file path
    Path,
}

fn parse_status(s: &str) -> Result<JobStatus, String> {
    s.trim().to_ascii_lowercase().parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn subcommand_is_required() {
        assert!(Cli::try_parse_from(["narrator"]).is_err());
    }

    #[test]
    fn verbosity_selects_log_filter() {
        let filter = |args: &[&str]| Cli::try_parse_from(args).unwrap().log_filter();
        assert_eq!(filter(&["narrator", "daemon"]), "info");
        assert_eq!(filter(&["narrator", "-v", "daemon"]), "debug");
        assert_eq!(filter(&["narrator", "daemon", "-vv"]), "trace");
        assert_eq!(filter(&["narrator", "-q", "-v", "daemon"]), "warn");
    }

    #[test]
    fn submit_with_file_and_options() {
        let cli = Cli::try_parse_from([
            "narrator",
            "submit",
            "book.txt",
            "--voice",
            "clone_abc",
            "-w",
            "80",
            "--normalize",
            "--wait",
        ])
        .unwrap();
        match cli.command {
            Commands::Submit { job, wait } => {
                assert_eq!(job.file, Some(PathBuf::from("book.txt")));
                assert_eq!(job.voice.as_deref(), Some("clone_abc"));
                assert_eq!(job.words_per_chunk, Some(80));
                assert!(job.normalize);
                assert!(wait);
                assert_eq!(job.temperature, None);
            }
            other => panic!("expected submit, got {other:?}"),
        }
    }

    #[test]
    fn file_and_text_conflict() {
        let result = Cli::try_parse_from(["narrator", "submit", "a.txt", "--text", "Hello."]);
        assert!(result.is_err());
    }

    #[test]
    fn list_parses_status_filter() {
        let cli = Cli::try_parse_from(["narrator", "list", "--status", "Review"]).unwrap();
        match cli.command {
            Commands::List { status, json } => {
                assert_eq!(status, Some(JobStatus::Review));
                assert!(!json);
            }
            other => panic!("expected list, got {other:?}"),
        }
        assert!(Cli::try_parse_from(["narrator", "list", "--status", "bogus"]).is_err());
    }

    #[test]
    fn regenerate_takes_index() {
        let cli = Cli::try_parse_from(["narrator", "regenerate", "job_1", "3"]).unwrap();
        match cli.command {
            Commands::Regenerate { job_id, index } => {
                assert_eq!(job_id, "job_1");
                assert_eq!(index, 3);
            }
            other => panic!("expected regenerate, got {other:?}"),
        }
        assert!(Cli::try_parse_from(["narrator", "regenerate", "job_1", "-1"]).is_err());
    }

    #[test]
    fn voices_subcommands() {
        let cli = Cli::try_parse_from(["narrator", "voices", "add", "Ada", "ada.wav"]).unwrap();
        match cli.command {
            Commands::Voices {
                action: VoicesAction::Add { name, path },
            } => {
                assert_eq!(name, "Ada");
                assert_eq!(path, PathBuf::from("ada.wav"));
            }
            other => panic!("expected voices add, got {other:?}"),
        }
        assert!(Cli::try_parse_from(["narrator", "voices"]).is_err());
    }

    #[test]
    fn voices_test_defaults_output() {
        let cli = Cli::try_parse_from(["narrator", "voices", "test", "clone_abc", "-t", "Hi."])
            .unwrap();
        match cli.command {
            Commands::Voices {
                action:
                    VoicesAction::Test {
                        voice,
                        text,
                        temperature,
                        output,
                    },
            } => {
                assert_eq!(voice, "clone_abc");
                assert_eq!(text.as_deref(), Some("Hi."));
                assert_eq!(temperature, None);
                assert_eq!(output, PathBuf::from("voice_test.wav"));
            }
            other => panic!("expected voices test, got {other:?}"),
        }
    }

    #[test]
    fn text_takes_job_id() {
        let cli = Cli::try_parse_from(["narrator", "text", "job_1", "-o", "clean.txt"]).unwrap();
        match cli.command {
            Commands::Text { job_id, output } => {
                assert_eq!(job_id, "job_1");
                assert_eq!(output, Some(PathBuf::from("clean.txt")));
            }
            other => panic!("expected text, got {other:?}"),
        }
        assert!(Cli::try_parse_from(["narrator", "text"]).is_err());
    }

    #[test]
    fn global_socket_after_subcommand() {
        let cli =
            Cli::try_parse_from(["narrator", "status", "job_1", "--socket", "/tmp/n.sock"]).unwrap();
        assert_eq!(cli.socket, Some(PathBuf::from("/tmp/n.sock")));
    }

    #[test]
    fn narrate_with_output() {
        let cli = Cli::try_parse_from(["narrator", "narrate", "-t", "Hi.", "-o", "out.wav"])
            .unwrap();
        match cli.command {
            Commands::Narrate { job, output } => {
                assert_eq!(job.text.as_deref(), Some("Hi."));
                assert_eq!(output, Some(PathBuf::from("out.wav")));
            }
            other => panic!("expected narrate, got {other:?}"),
        }
    }
}

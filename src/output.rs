//! Terminal rendering of jobs, voices and live progress.
//! Used by the CLI commands and by `narrator narrate`.

use crate::job::{JobStatus, JobSummary};
use crate::pipeline::{ProgressEvent, ProgressReporter};
use crate::voice::VoiceInfo;
use chrono::{DateTime, Utc};
use std::io::{self, Write};
use std::time::Duration;

const DIM: &str = "\x1b[2m";
const BOLD: &str = "\x1b[1m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const RED: &str = "\x1b[31m";
const CYAN: &str = "\x1b[36m";
const RESET: &str = "\x1b[0m";

/// Width of the progress bar in characters.
const BAR_WIDTH: usize = 24;

/// Clear the current terminal line (replaces the progress line).
pub fn clear_line() {
    eprint!("\r\x1b[2K");
}

fn status_color(status: JobStatus) -> &'static str {
    match status {
        JobStatus::Completed => GREEN,
        JobStatus::Review | JobStatus::Cancelling => YELLOW,
        JobStatus::Failed => RED,
        JobStatus::Pending | JobStatus::Normalizing | JobStatus::Processing => CYAN,
    }
}

/// Status name padded to the widest status, colored by severity.
pub fn status_label(status: JobStatus) -> String {
    format!("{}{:<11}{RESET}", status_color(status), status.as_str())
}

/// `[#####-----]  12/30  40%`
pub fn progress_bar(completed: usize, total: usize) -> String {
    let filled = (completed * BAR_WIDTH)
        .checked_div(total)
        .unwrap_or(0)
        .min(BAR_WIDTH);
    let percent = (completed * 100).checked_div(total).unwrap_or(0);
    format!(
        "[{}{}] {completed:>3}/{total:<3} {percent:>3}%",
        "#".repeat(filled),
        "-".repeat(BAR_WIDTH - filled),
    )
}

/// Coarse age such as `3m` or `2h 5m`, relative to `now`.
pub fn format_age(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - at).num_seconds().max(0) as u64;
    // At most two units show, so the column stays short.
    let rounded = match secs {
        0..60 => secs,
        60..3600 => secs - secs % 60,
        _ => secs - secs % 300,
    };
    humantime::format_duration(Duration::from_secs(rounded)).to_string()
}

/// Multi-line view of one job for `narrator status`.
pub fn format_job(job: &JobSummary, now: DateTime<Utc>) -> String {
    let mut out = String::new();
    let name = job
        .name
        .as_ref()
        .map(|n| format!(" {DIM}({n}){RESET}"))
        .unwrap_or_default();
    out.push_str(&format!("{BOLD}{}{RESET}{name}\n", job.id));
    out.push_str(&format!(
        "  status    {}  {DIM}voice {}{RESET}\n",
        status_label(job.status),
        job.voice
    ));
    out.push_str(&format!(
        "  progress  {}\n",
        progress_bar(job.progress.completed, job.progress.total)
    ));
    out.push_str(&format!(
        "  updated   {} ago\n",
        format_age(job.updated_at, now)
    ));
    if let Some(error) = &job.error {
        out.push_str(&format!("  {RED}error{RESET}     {error}\n"));
    }
    for failure in &job.failed {
        out.push_str(&format!(
            "  {YELLOW}chunk {:>3}{RESET} {}\n",
            failure.index, failure.error
        ));
    }
    if let Some(path) = &job.final_artifact {
        out.push_str(&format!("  audio     {GREEN}{path}{RESET}\n"));
    }
    out
}

/// One line per job for `narrator list`.
pub fn format_job_table(jobs: &[JobSummary], now: DateTime<Utc>) -> String {
    if jobs.is_empty() {
        return format!("{DIM}No jobs{RESET}\n");
    }
    jobs.iter()
        .map(|job| {
            format!(
                "{:<40} {} {:>4}/{:<4} {DIM}{:>8} ago{RESET}  {}\n",
                job.id,
                status_label(job.status),
                job.progress.completed,
                job.progress.total,
                format_age(job.created_at, now),
                job.name.as_deref().unwrap_or("")
            )
        })
        .collect()
}

pub fn format_voices(voices: &[VoiceInfo]) -> String {
    if voices.is_empty() {
        return format!("{DIM}No voices. Add one with `narrator voices add NAME FILE`{RESET}\n");
    }
    voices
        .iter()
        .map(|v| {
            format!(
                "{:<20} {:<24} {DIM}{:>6.1}s {} Hz{RESET}\n",
                v.id, v.name, v.duration_secs, v.sample_rate
            )
        })
        .collect()
}

/// Live progress on stderr for in-process runs.
#[derive(Debug, Default)]
pub struct ConsoleReporter;

impl ProgressReporter for ConsoleReporter {
    fn report(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::JobStarted { job_id } => {
                eprintln!("{DIM}Started {job_id}{RESET}");
            }
            ProgressEvent::TextPrepared {
                chunks, normalized, ..
            } => {
                let note = if *normalized { " (normalized)" } else { "" };
                eprintln!("{DIM}Split into {chunks} chunk(s){note}{RESET}");
            }
            ProgressEvent::ChunkStarted { index, total, .. } => {
                clear_line();
                eprint!("{} generating chunk {}", progress_bar(*index, *total), index + 1);
                io::stderr().flush().ok();
            }
            ProgressEvent::ChunkCompleted { .. } => {}
            ProgressEvent::ChunkFailed { index, error, .. } => {
                clear_line();
                eprintln!("{YELLOW}chunk {index} failed:{RESET} {error}");
            }
            ProgressEvent::JobSettled {
                status, progress, ..
            } => {
                clear_line();
                eprintln!(
                    "{} {}",
                    progress_bar(progress.completed, progress.total),
                    status_label(*status)
                );
            }
            ProgressEvent::JobCancelled { job_id } => {
                clear_line();
                eprintln!("{YELLOW}Cancelled {job_id}{RESET}");
            }
            ProgressEvent::JobFailed { error, .. } => {
                clear_line();
                eprintln!("{RED}Failed:{RESET} {error}");
            }
        }
    }
}

mod aggregate;
mod capture;
mod diff;
mod error;
mod git;
mod logging;
mod preferences;
mod render;
mod resolver;
mod store;
mod transcript;
mod types;
mod watch;

use aggregate::CaptureOutcome;
use anyhow::{Context, Result, bail};
use capture::Capture;
use clap::{Parser, Subcommand};
use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::process;
use store::StoreLayout;
use store::record::{AssistantSession, SessionMode};
use tracing::warn;
use types::HookInput;

#[derive(Parser)]
#[command(name = "promptlog", version, about = "Record prompts and the code changes they caused")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Handle one hook event read from stdin (the default).
    Hook,
    /// Capture a transcript outside the hook flow.
    Capture {
        /// Transcript file (JSONL).
        #[arg(long)]
        transcript: PathBuf,
        /// Directory inside the repository. Defaults to the current directory.
        #[arg(long)]
        cwd: Option<PathBuf>,
        /// Record a one-off run: the session is ended right away.
        #[arg(long)]
        single_shot: bool,
    },
    /// Render a recorded diff.
    Show {
        /// Session id. Defaults to the most recent session.
        session: Option<String>,
        /// Show only the diff of this prompt (1-based).
        #[arg(long)]
        prompt: Option<usize>,
        #[arg(long)]
        cwd: Option<PathBuf>,
        /// Print the parsed diff as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Print in-progress sessions whenever the store changes.
    Watch {
        #[arg(long)]
        cwd: Option<PathBuf>,
    },
}

fn read_stdin() -> Result<String> {
    let mut buffer = String::new();
    io::stdin().read_to_string(&mut buffer)?;
    Ok(buffer)
}

fn cwd_or_current(cwd: Option<PathBuf>) -> Result<PathBuf> {
    match cwd {
        Some(dir) => Ok(dir),
        None => std::env::current_dir().context("reading current directory"),
    }
}

/// Hook mode. Whatever happens, the process exits 0 so the assistant is
/// never blocked by a capture problem.
fn hook() {
    let input = match read_stdin() {
        Ok(s) => s,
        Err(e) => {
            warn!(error = %e, "reading hook input");
            return;
        }
    };
    let hook_input: HookInput = match serde_json::from_str(&input) {
        Ok(h) => h,
        Err(e) => {
            warn!(error = %e, "invalid hook input");
            return;
        }
    };
    if let Some(output) = capture::run_hook(&hook_input) {
        match serde_json::to_string(&output) {
            Ok(json) => println!("{json}"),
            Err(e) => warn!(error = %e, "serializing hook output"),
        }
    }
}

fn capture_command(transcript: &Path, cwd: Option<PathBuf>, single_shot: bool) -> Result<()> {
    let cwd = cwd_or_current(cwd)?;
    let mode = if single_shot {
        SessionMode::SingleShot
    } else {
        SessionMode::Interactive
    };
    let result = Capture::open(&cwd).and_then(|c| c.capture(transcript, None, mode));
    match result {
        Ok(CaptureOutcome::Recorded {
            session_id,
            prompts,
            files,
            ..
        }) => println!("{session_id}: recorded {prompts} prompt(s), {files} file(s) changed"),
        Ok(CaptureOutcome::NoChange) => println!("no new prompts"),
        Err(err) => capture::report(&err),
    }
    Ok(())
}

/// The session to show: the latest record with `id`, or the latest overall.
fn pick_session<'a>(sessions: &'a [AssistantSession], id: Option<&str>) -> Option<&'a AssistantSession> {
    match id {
        Some(id) => sessions.iter().rev().find(|s| s.id == id),
        None => sessions.last(),
    }
}

fn show_command(
    session: Option<String>,
    prompt: Option<usize>,
    cwd: Option<PathBuf>,
    json: bool,
) -> Result<()> {
    let cwd = cwd_or_current(cwd)?;
    let repo = git::GitRepo::discover(&cwd)?;
    let layout = StoreLayout::for_workdir(repo.workdir());
    let sessions = store::state::load_sessions(&layout)?;
    let Some(record) = pick_session(&sessions, session.as_deref()) else {
        match session {
            Some(id) => bail!("no session {id}"),
            None => bail!("no sessions recorded in {}", layout.dir().display()),
        }
    };
    let text = match prompt {
        None => &record.diff,
        Some(n) => {
            let change = n
                .checked_sub(1)
                .and_then(|i| record.changes.get(i))
                .with_context(|| {
                    format!("session {} has {} prompt(s)", record.id, record.changes.len())
                })?;
            &change.diff
        }
    };
    let files = diff::parse_diff(text);
    if json {
        println!("{}", serde_json::to_string_pretty(&files)?);
    } else if files.is_empty() {
        println!("{}: no changes", record.id);
    } else {
        print!("{}", render::render_files(&files, io::stdout().is_terminal()));
    }
    Ok(())
}

fn main() {
    logging::init();
    let cli = Cli::parse();

    let result = match cli.command {
        None | Some(Command::Hook) => {
            hook();
            Ok(())
        }
        Some(Command::Capture {
            transcript,
            cwd,
            single_shot,
        }) => capture_command(&transcript, cwd, single_shot),
        Some(Command::Show {
            session,
            prompt,
            cwd,
            json,
        }) => show_command(session, prompt, cwd, json),
        Some(Command::Watch { cwd }) => cwd_or_current(cwd).and_then(|dir| {
            let repo = git::GitRepo::discover(&dir)?;
            watch::run(repo.workdir())
        }),
    };

    if let Err(err) = result {
        eprintln!("promptlog: {err:#}");
        process::exit(1);
    }
}

use crate::aggregate::{
    Boundary, CaptureContext, CaptureOutcome, DiffPolicy, end_session, pending_turns,
    prospective_files, record_capture,
};
use crate::error::{CaptureError, CaptureResult};
use crate::git::GitRepo;
use crate::preferences::Preferences;
use crate::resolver::{ChangeSet, WorkingTree};
use crate::store::StoreLayout;
use crate::store::record::SessionMode;
use crate::store::state::RepoState;
use crate::transcript::{PromptFilter, Transcript, transcript_id};
use crate::types::{HookInput, HookOutput, SessionEndInput, StopInput, SubagentStopInput};
use std::fs;
use std::io;
use std::path::Path;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::{debug, info, warn};

const MESSAGE_PREFIX: &str = "[promptlog]";

/// Read and parse a transcript. A missing file is an empty transcript;
/// malformed lines are logged and skipped.
pub fn read_transcript(path: &Path, filter: &PromptFilter) -> CaptureResult<Transcript> {
    let contents = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Transcript::empty()),
        Err(e) => return Err(CaptureError::storage(path, e)),
    };
    let (transcript, errors) = Transcript::parse(&contents, filter);
    for (line, err) in &errors {
        debug!(path = %path.display(), line, error = %err, "skipping transcript line");
    }
    Ok(transcript)
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default()
}

/// One capture invocation bound to a repository.
pub struct Capture {
    repo: GitRepo,
    layout: StoreLayout,
    prefs: Preferences,
    filter: PromptFilter,
}

impl Capture {
    /// Find the repository containing `cwd` and load its preferences.
    /// Broken preferences fall back to defaults.
    pub fn open(cwd: &Path) -> CaptureResult<Self> {
        let repo = GitRepo::discover(cwd)?;
        let layout = StoreLayout::for_workdir(repo.workdir());
        let prefs = Preferences::load(layout.dir()).unwrap_or_else(|e| {
            warn!(error = %format!("{e:#}"), "using default preferences");
            Preferences::default()
        });
        let filter = PromptFilter::new(&prefs.instruction_tags);
        Ok(Self {
            repo,
            layout,
            prefs,
            filter,
        })
    }

    /// Capture new prompts from `transcript_path` and the files changed
    /// since the previous capture. `fallback_id` names the session when the
    /// path has no usable file stem.
    pub fn capture(
        &self,
        transcript_path: &Path,
        fallback_id: Option<&str>,
        mode: SessionMode,
    ) -> CaptureResult<CaptureOutcome> {
        let id = transcript_id(transcript_path)
            .or_else(|| fallback_id.map(String::from))
            .ok_or_else(|| {
                CaptureError::Environment(format!(
                    "no transcript id for {}",
                    transcript_path.display()
                ))
            })?;
        let transcript = read_transcript(transcript_path, &self.filter)?;
        if transcript.is_empty() {
            debug!(transcript_id = %id, "transcript has no prompts");
            return Ok(CaptureOutcome::NoChange);
        }
        let mut state = RepoState::load(self.layout.clone())?;

        // Nothing new: skip every git query and leave the store untouched.
        if pending_turns(&state, &id, transcript.turns()).is_empty() {
            debug!(transcript_id = %id, turns = transcript.len(), "no new prompts");
            return Ok(CaptureOutcome::NoChange);
        }

        let boundary = Boundary::detect(state.cursor(), &id);
        debug!(transcript_id = %id, transition = boundary.is_transition(), "resolving changes");
        let changes = ChangeSet::compute(&self.repo, &boundary.baseline(state.fingerprints()))?;
        let cumulative = match self.prefs.diff_policy {
            DiffPolicy::Latest => None,
            DiffPolicy::Cumulative => {
                let files = prospective_files(&state, &id, &changes.changed);
                Some(self.repo.diff_for(&files)?)
            }
        };

        let facts = self.repo.facts();
        let now = now_rfc3339();
        let ctx = CaptureContext {
            transcript_id: &id,
            turns: transcript.turns(),
            repo: &facts,
            changes: &changes,
            cumulative_diff: cumulative.as_deref(),
            policy: self.prefs.diff_policy,
            mode,
            summary_template: &self.prefs.summary_template,
            now: &now,
        };
        let outcome = record_capture(&mut state, &ctx)?;
        state.save()?;

        if let CaptureOutcome::Recorded {
            prompts,
            files,
            ref ended,
            ..
        } = outcome
        {
            info!(transcript_id = %id, prompts, files, ended = ?ended, "captured");
        }
        Ok(outcome)
    }

    /// Stop and SubagentStop: capture, and tell the assistant what was
    /// recorded when announcing is on.
    pub fn handle_stop(&self, input: &StopInput) -> CaptureResult<Option<HookOutput>> {
        debug!(
            session_id = %input.common.session_id,
            stop_hook_active = input.stop_hook_active,
            permission_mode = ?input.common.permission_mode,
            "stop"
        );
        let outcome = self.capture(
            Path::new(&input.common.transcript_path),
            Some(&input.common.session_id),
            SessionMode::Interactive,
        )?;
        Ok(self.announce(&outcome))
    }

    pub fn handle_subagent_stop(
        &self,
        input: &SubagentStopInput,
    ) -> CaptureResult<Option<HookOutput>> {
        debug!(
            session_id = %input.common.session_id,
            agent_id = ?input.agent_id,
            stop_hook_active = input.stop_hook_active,
            "subagent stop"
        );
        let outcome = self.capture(
            Path::new(&input.common.transcript_path),
            Some(&input.common.session_id),
            SessionMode::Interactive,
        )?;
        Ok(self.announce(&outcome))
    }

    /// The assistant closed the session: end its record and clear the
    /// fingerprint snapshot. The cursor is kept.
    pub fn handle_session_end(&self, input: &SessionEndInput) -> CaptureResult<Option<HookOutput>> {
        let id = transcript_id(Path::new(&input.common.transcript_path))
            .unwrap_or_else(|| input.common.session_id.clone());
        let mut state = RepoState::load(self.layout.clone())?;
        if end_session(&mut state, &id, &now_rfc3339(), self.repo.head_hash()) {
            state.save()?;
            info!(transcript_id = %id, reason = ?input.reason, "session ended");
        } else {
            debug!(transcript_id = %id, "no session in progress");
        }
        Ok(None)
    }

    fn announce(&self, outcome: &CaptureOutcome) -> Option<HookOutput> {
        if !self.prefs.announce {
            return None;
        }
        match outcome {
            CaptureOutcome::NoChange => None,
            CaptureOutcome::Recorded { prompts, files, .. } => Some(HookOutput::message(format!(
                "{MESSAGE_PREFIX} recorded {prompts} prompt{}, {files} file{} changed",
                plural(*prompts),
                plural(*files),
            ))),
        }
    }
}

fn plural(n: usize) -> &'static str {
    if n == 1 { "" } else { "s" }
}

/// Log a capture failure at the level its kind deserves.
pub fn report(err: &CaptureError) {
    if err.is_environment() {
        debug!(error = %err, "capture skipped");
    } else {
        warn!(error = %err, "capture failed");
    }
}

/// Hook entry point. Never fails: every error is logged and swallowed so
/// the assistant is never interrupted.
pub fn run_hook(input: &HookInput) -> Option<HookOutput> {
    let Some(common) = input.common() else {
        debug!("ignoring hook event");
        return None;
    };
    let result = Capture::open(Path::new(&common.cwd)).and_then(|c| match input {
        HookInput::Stop(e) => c.handle_stop(e),
        HookInput::SubagentStop(e) => c.handle_subagent_stop(e),
        HookInput::SessionEnd(e) => c.handle_session_end(e),
        HookInput::Other => Ok(None),
    });
    match result {
        Ok(output) => output,
        Err(err) => {
            report(&err);
            None
        }
    }
}

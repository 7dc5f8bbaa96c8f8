use crate::error::{CaptureError, CaptureResult};
use crate::git::RepoFacts;
use crate::preferences::DEFAULT_SUMMARY_TEMPLATE;
use crate::resolver::ChangeSet;
use crate::store::cursor::PromptCursor;
use crate::store::fingerprint::FingerprintSnapshot;
use crate::store::record::{AssistantSession, PromptChange, SessionMode, merge_files};
use crate::store::state::RepoState;
use crate::transcript::Turn;
use minijinja::{Environment, context};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

// ===================================================================
// Policy
// ===================================================================

/// What a session record's `diff` holds after each capture.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffPolicy {
    /// The most recent capture's scoped diff.
    #[default]
    Latest,
    /// The HEAD-relative diff of every file the session has touched.
    Cumulative,
}

// ===================================================================
// Session boundary
// ===================================================================

/// Relationship between the stored cursor and the transcript being captured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Boundary {
    /// Same transcript as last time.
    Continue,
    /// A different (or first) transcript. `previous` is the id whose
    /// in-progress record must be ended, if any.
    Transition { previous: Option<String> },
}

impl Boundary {
    pub fn detect(cursor: &PromptCursor, transcript_id: &str) -> Self {
        if cursor.tracks(transcript_id) {
            Boundary::Continue
        } else {
            Boundary::Transition {
                previous: cursor.transcript_id.clone(),
            }
        }
    }

    pub fn is_transition(&self) -> bool {
        matches!(self, Boundary::Transition { .. })
    }

    /// The cursor to slice with: the stored one, or a fresh one after a transition.
    pub fn cursor_for(&self, stored: &PromptCursor, transcript_id: &str) -> PromptCursor {
        match self {
            Boundary::Continue => stored.clone(),
            Boundary::Transition { .. } => PromptCursor::starting_at(transcript_id),
        }
    }

    /// The snapshot new changes are judged against; empty after a transition.
    pub fn baseline(&self, stored: &FingerprintSnapshot) -> FingerprintSnapshot {
        match self {
            Boundary::Continue => stored.clone(),
            Boundary::Transition { .. } => FingerprintSnapshot::default(),
        }
    }
}

/// Turns not yet captured for `transcript_id`, honouring a pending transition.
pub fn pending_turns<'a>(state: &RepoState, transcript_id: &str, turns: &'a [Turn]) -> &'a [Turn] {
    Boundary::detect(state.cursor(), transcript_id)
        .cursor_for(state.cursor(), transcript_id)
        .pending(turns)
}

/// Files the target session will hold once `changed` is merged in. Used to
/// scope the cumulative diff before the record is updated.
pub fn prospective_files(state: &RepoState, transcript_id: &str, changed: &[String]) -> Vec<String> {
    let mut files = match Boundary::detect(state.cursor(), transcript_id) {
        Boundary::Continue => state
            .active_session(transcript_id)
            .map(|s| s.files.clone())
            .unwrap_or_default(),
        Boundary::Transition { .. } => Vec::new(),
    };
    merge_files(&mut files, changed);
    files
}

// ===================================================================
// Capture
// ===================================================================

/// Everything one capture contributes, gathered by the caller.
pub struct CaptureContext<'a> {
    pub transcript_id: &'a str,
    /// All filtered turns of the transcript, not just the new ones.
    pub turns: &'a [Turn],
    pub repo: &'a RepoFacts,
    pub changes: &'a ChangeSet,
    /// HEAD-relative diff of `prospective_files`, under `DiffPolicy::Cumulative`.
    pub cumulative_diff: Option<&'a str>,
    pub policy: DiffPolicy,
    pub mode: SessionMode,
    pub summary_template: &'a str,
    pub now: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// Nothing new; the store was not touched.
    NoChange,
    Recorded {
        session_id: String,
        prompts: usize,
        files: usize,
        /// Id of a session this capture superseded.
        ended: Option<String>,
    },
}

/// Merge one capture into `state`. Pure with respect to I/O: the caller
/// loads the state before and saves it after.
///
/// When the transcript has no turns past the cursor nothing is modified,
/// which makes repeated invocations without new prompts write-free.
pub fn record_capture(state: &mut RepoState, ctx: &CaptureContext) -> CaptureResult<CaptureOutcome> {
    let boundary = Boundary::detect(state.cursor(), ctx.transcript_id);
    let mut cursor = boundary.cursor_for(state.cursor(), ctx.transcript_id);
    let new_turns = cursor.pending(ctx.turns);
    if new_turns.is_empty() {
        debug!(transcript_id = ctx.transcript_id, "no new prompts");
        return Ok(CaptureOutcome::NoChange);
    }

    // Close out the previous transcript's session.
    let mut ended = None;
    if let Boundary::Transition {
        previous: Some(previous),
    } = &boundary
    {
        if end_active(state, previous, ctx.now, ctx.repo.head.clone()) {
            info!(session_id = %previous, superseded_by = ctx.transcript_id, "session ended");
            ended = Some(previous.clone());
        }
    }

    let changes = build_changes(new_turns, ctx);
    let prompts = changes.len();
    let files = ctx.changes.changed.len();

    let sessions = state.sessions_mut();
    let index = match sessions
        .iter()
        .position(|s| s.id == ctx.transcript_id && s.in_progress)
    {
        Some(i) => i,
        None => {
            sessions.push(AssistantSession::open(
                ctx.transcript_id,
                &ctx.repo.repo_path,
                ctx.repo.head.clone(),
                ctx.mode,
                ctx.now,
            ));
            sessions.len() - 1
        }
    };
    let session = &mut sessions[index];
    session.push_changes(changes);
    session.updated_at = ctx.now.to_string();
    session.branch = ctx.repo.branch.clone();
    match ctx.policy {
        DiffPolicy::Latest => {
            if !ctx.changes.diff.is_empty() {
                session.diff = ctx.changes.diff.clone();
            }
        }
        DiffPolicy::Cumulative => {
            if let Some(diff) = ctx.cumulative_diff {
                session.diff = diff.to_string();
            }
        }
    }
    session.summary = summarize(ctx.summary_template, session);
    if ctx.mode == SessionMode::SingleShot {
        session.end(ctx.now, ctx.repo.head.clone());
    }

    cursor.advance_to(ctx.turns.len());
    state.set_cursor(cursor);
    state.set_fingerprints(ctx.changes.snapshot.clone());

    Ok(CaptureOutcome::Recorded {
        session_id: ctx.transcript_id.to_string(),
        prompts,
        files,
        ended,
    })
}

/// One change per new turn. The file delta goes to the last of them: it is
/// the prompt the assistant just finished working on.
fn build_changes(new_turns: &[Turn], ctx: &CaptureContext) -> Vec<PromptChange> {
    let last = new_turns.len().saturating_sub(1);
    new_turns
        .iter()
        .enumerate()
        .map(|(i, turn)| {
            let (files, diff) = if i == last {
                (ctx.changes.changed.clone(), ctx.changes.diff.clone())
            } else {
                (Vec::new(), String::new())
            };
            PromptChange {
                prompt: turn.prompt.clone(),
                response: turn.response.clone(),
                timestamp: turn.timestamp.clone().unwrap_or_else(|| ctx.now.to_string()),
                commit_hash: ctx.repo.head.clone(),
                files,
                diff,
            }
        })
        .collect()
}

/// End the in-progress record for `id`. Returns whether one existed.
fn end_active(state: &mut RepoState, id: &str, now: &str, post_hash: Option<String>) -> bool {
    if state.active_session(id).is_none() {
        return false;
    }
    for session in state.sessions_mut().iter_mut().filter(|s| s.id == id && s.in_progress) {
        session.end(now, post_hash.clone());
    }
    true
}

/// End the session for `transcript_id` because the assistant reported it
/// finished. The fingerprint snapshot is cleared so a resumed transcript
/// starts a fresh record with first-capture semantics; the cursor is kept so
/// it does not re-emit prompts that were already captured.
pub fn end_session(state: &mut RepoState, transcript_id: &str, now: &str, post_hash: Option<String>) -> bool {
    if !end_active(state, transcript_id, now, post_hash) {
        return false;
    }
    if state.cursor().tracks(transcript_id) {
        state.set_fingerprints(FingerprintSnapshot::default());
    }
    true
}

// ===================================================================
// Summary rendering
// ===================================================================

/// Render `template` for `session`, falling back to the default template
/// when the configured one is broken.
pub fn summarize(template: &str, session: &AssistantSession) -> String {
    match render_summary(template, session) {
        Ok(s) => s,
        Err(e) => {
            warn!(error = %e, "falling back to default summary template");
            render_summary(DEFAULT_SUMMARY_TEMPLATE, session)
                .unwrap_or_else(|_| format!("{} prompts", session.prompt_count()))
        }
    }
}

pub fn render_summary(template: &str, session: &AssistantSession) -> CaptureResult<String> {
    let env = Environment::new();
    let tmpl = env
        .template_from_str(template)
        .map_err(|e| CaptureError::Template(format!("parsing template: {e}")))?;
    tmpl.render(context! {
        prompt_count => session.prompt_count(),
        file_count => session.files.len(),
        change_count => session.changes.iter().filter(|c| !c.files.is_empty()).count(),
    })
    .map_err(|e| CaptureError::Template(format!("rendering template: {e}")))
}

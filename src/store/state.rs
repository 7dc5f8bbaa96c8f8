use super::cursor::PromptCursor;
use super::fingerprint::FingerprintSnapshot;
use super::record::AssistantSession;
use super::{StoreLayout, read_json_file, write_json_atomic};
use crate::error::CaptureResult;
use tracing::debug;

/// Everything one invocation reads from and writes to the store.
///
/// Loaded whole at the start of a capture, mutated in memory, and saved
/// at the end. Only the parts that were touched are written back.
#[derive(Debug)]
pub struct RepoState {
    layout: StoreLayout,
    sessions: Vec<AssistantSession>,
    fingerprints: FingerprintSnapshot,
    cursor: PromptCursor,
    dirty: Dirty,
}

#[derive(Debug, Default, Clone, Copy)]
struct Dirty {
    sessions: bool,
    fingerprints: bool,
    cursor: bool,
}

impl RepoState {
    /// An empty state for `layout`, as if the store had never been written.
    pub fn new(layout: StoreLayout) -> Self {
        Self {
            layout,
            sessions: Vec::new(),
            fingerprints: FingerprintSnapshot::default(),
            cursor: PromptCursor::default(),
            dirty: Dirty::default(),
        }
    }

    pub fn load(layout: StoreLayout) -> CaptureResult<Self> {
        let sessions = read_json_file(&layout.sessions_path())?.unwrap_or_default();
        let fingerprints = FingerprintSnapshot::load(&layout.fingerprints_path())?;
        let cursor = PromptCursor::load(&layout.cursor_path())?;
        Ok(Self {
            layout,
            sessions,
            fingerprints,
            cursor,
            dirty: Dirty::default(),
        })
    }

    /// Write back every part that changed since load. A no-op when nothing did.
    pub fn save(&mut self) -> CaptureResult<()> {
        if !self.is_dirty() {
            return Ok(());
        }
        if self.dirty.sessions {
            write_json_atomic(&self.layout.sessions_path(), &self.sessions)?;
        }
        if self.dirty.fingerprints {
            self.fingerprints.save(&self.layout.fingerprints_path())?;
        }
        if self.dirty.cursor {
            self.cursor.save(&self.layout.cursor_path())?;
        }
        debug!(
            sessions = self.dirty.sessions,
            fingerprints = self.dirty.fingerprints,
            cursor = self.dirty.cursor,
            "store saved"
        );
        self.dirty = Dirty::default();
        Ok(())
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.sessions || self.dirty.fingerprints || self.dirty.cursor
    }

    pub fn sessions(&self) -> &[AssistantSession] {
        &self.sessions
    }

    pub fn sessions_mut(&mut self) -> &mut Vec<AssistantSession> {
        self.dirty.sessions = true;
        &mut self.sessions
    }

    pub fn fingerprints(&self) -> &FingerprintSnapshot {
        &self.fingerprints
    }

    pub fn set_fingerprints(&mut self, snapshot: FingerprintSnapshot) {
        self.fingerprints = snapshot;
        self.dirty.fingerprints = true;
    }

    pub fn cursor(&self) -> &PromptCursor {
        &self.cursor
    }

    pub fn set_cursor(&mut self, cursor: PromptCursor) {
        self.cursor = cursor;
        self.dirty.cursor = true;
    }

    /// The in-progress record for `id`, if there is one.
    pub fn active_session(&self, id: &str) -> Option<&AssistantSession> {
        self.sessions.iter().find(|s| s.id == id && s.in_progress)
    }
}

/// Read just the session list, for consumers outside the capture path.
pub fn load_sessions(layout: &StoreLayout) -> CaptureResult<Vec<AssistantSession>> {
    Ok(read_json_file(&layout.sessions_path())?.unwrap_or_default())
}

use super::{read_json_file, write_json_atomic};
use crate::error::CaptureResult;
use crate::transcript::Turn;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// How many filtered turns of the current transcript are already captured.
/// Stored as `.promptlog/cursor.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptCursor {
    #[serde(default)]
    pub transcript_id: Option<String>,
    #[serde(default)]
    pub count: usize,
}

impl PromptCursor {
    pub fn starting_at(transcript_id: &str) -> Self {
        Self {
            transcript_id: Some(transcript_id.to_string()),
            count: 0,
        }
    }

    /// Whether this cursor tracks `transcript_id`.
    pub fn tracks(&self, transcript_id: &str) -> bool {
        self.transcript_id.as_deref() == Some(transcript_id)
    }

    /// The turns past the cursor. Empty when the cursor is at or beyond
    /// the end, e.g. after a transcript was rewritten shorter.
    pub fn pending<'a>(&self, turns: &'a [Turn]) -> &'a [Turn] {
        turns.get(self.count..).unwrap_or(&[])
    }

    /// Move the cursor forward to `len`. Never moves backwards.
    pub fn advance_to(&mut self, len: usize) {
        self.count = self.count.max(len);
    }

    pub fn load(path: &Path) -> CaptureResult<Self> {
        Ok(read_json_file(path)?.unwrap_or_default())
    }

    pub fn save(&self, path: &Path) -> CaptureResult<()> {
        write_json_atomic(path, self)
    }
}

//! Persisted session records, one array entry per assistant session in
//! `.promptlog/sessions.json`. Field names are camelCase for the viewers.

use serde::{Deserialize, Serialize};

/// How the session was driven.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionMode {
    #[default]
    Interactive,
    SingleShot,
}

/// One captured increment: a prompt and the file delta attributed to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptChange {
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    pub timestamp: String,
    #[serde(default)]
    pub commit_hash: Option<String>,
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub diff: String,
}

/// All prompt changes sharing one transcript identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssistantSession {
    pub id: String,
    pub repo_path: String,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub pre_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_hash: Option<String>,
    /// The session's first captured prompt.
    pub prompt: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub diff: String,
    pub created_at: String,
    pub updated_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<String>,
    #[serde(default)]
    pub mode: SessionMode,
    #[serde(default)]
    pub in_progress: bool,
    #[serde(default)]
    pub changes: Vec<PromptChange>,
}

impl AssistantSession {
    /// Fresh in-progress record, seeded from the capture that opened it.
    pub fn open(
        id: &str,
        repo_path: &str,
        pre_hash: Option<String>,
        mode: SessionMode,
        now: &str,
    ) -> Self {
        Self {
            id: id.to_string(),
            repo_path: repo_path.to_string(),
            branch: None,
            pre_hash,
            post_hash: None,
            prompt: String::new(),
            summary: String::new(),
            files: Vec::new(),
            diff: String::new(),
            created_at: now.to_string(),
            updated_at: now.to_string(),
            ended_at: None,
            mode,
            in_progress: true,
            changes: Vec::new(),
        }
    }

    /// Append changes, keeping `files` the ordered union of every change's files.
    pub fn push_changes(&mut self, changes: Vec<PromptChange>) {
        for change in changes {
            if self.prompt.is_empty() {
                self.prompt = change.prompt.clone();
            }
            merge_files(&mut self.files, &change.files);
            self.changes.push(change);
        }
    }

    /// Mark the session as superseded or finished.
    pub fn end(&mut self, now: &str, post_hash: Option<String>) {
        if !self.in_progress {
            return;
        }
        self.in_progress = false;
        self.ended_at = Some(now.to_string());
        self.post_hash = post_hash;
        self.updated_at = now.to_string();
    }

    /// Number of captured prompts.
    pub fn prompt_count(&self) -> usize {
        self.changes.len()
    }
}

/// Append each path in `incoming` not already in `files`, preserving order.
pub fn merge_files(files: &mut Vec<String>, incoming: &[String]) {
    for path in incoming {
        if !files.contains(path) {
            files.push(path.clone());
        }
    }
}

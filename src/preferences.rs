use crate::aggregate::DiffPolicy;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;

const FILENAME: &str = "promptlog.toml";

pub const DEFAULT_SUMMARY_TEMPLATE: &str = "{{ prompt_count }} prompt{{ 's' if prompt_count != 1 }}, \
{{ file_count }} file{{ 's' if file_count != 1 }} changed";

/// User-facing preferences stored in `.promptlog/promptlog.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Preferences {
    /// What a session's `diff` holds: only the latest capture's scoped
    /// diff (`"latest"`) or the HEAD-relative diff of every file the
    /// session touched (`"cumulative"`).
    #[serde(default)]
    pub diff_policy: DiffPolicy,

    /// Jinja2 template for the session summary. Receives `prompt_count`,
    /// `file_count` and `change_count`.
    #[serde(default = "default_summary_template")]
    pub summary_template: String,

    /// Print a `systemMessage` back to the assistant after a capture.
    #[serde(default = "default_announce")]
    pub announce: bool,

    /// Extra `<tag>...</tag>` blocks to strip from prompts, on top of the
    /// built-in instruction and environment tags.
    #[serde(default)]
    pub instruction_tags: Vec<String>,
}

fn default_summary_template() -> String {
    DEFAULT_SUMMARY_TEMPLATE.into()
}

fn default_announce() -> bool {
    true
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            diff_policy: DiffPolicy::default(),
            summary_template: default_summary_template(),
            announce: default_announce(),
            instruction_tags: Vec::new(),
        }
    }
}

impl Preferences {
    /// Load preferences from `.promptlog/promptlog.toml`.
    ///
    /// If the file doesn't exist it is created with defaults. Missing keys
    /// in an existing file are filled in with defaults via serde.
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(FILENAME);
        match fs::read_to_string(&path) {
            Ok(contents) => {
                let prefs: Preferences = toml::from_str(&contents)
                    .with_context(|| format!("parsing {}", path.display()))?;
                Ok(prefs)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                let prefs = Preferences::default();
                let toml_str = toml::to_string_pretty(&prefs)
                    .context("serializing default preferences")?;
                fs::create_dir_all(dir)
                    .with_context(|| format!("creating {}", dir.display()))?;
                fs::write(&path, &toml_str)
                    .with_context(|| format!("writing default {}", path.display()))?;
                Ok(prefs)
            }
            Err(e) => Err(e).with_context(|| format!("reading {}", path.display())),
        }
    }
}

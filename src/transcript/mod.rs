use regex::Regex;
use serde::Deserialize;
use std::path::Path;

// ===================================================================
// Top-level transcript event — one per JSONL line
// ===================================================================

/// A single line of an assistant transcript.
///
/// Three dialects are understood: Claude Code (`user` / `assistant`
/// entries wrapping a `message`), Codex rollouts (`response_item` entries
/// wrapping a `payload`), and bare `message` records. Anything else parses
/// as `Other` and is ignored.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum TranscriptEvent {
    #[serde(rename = "user")]
    User(ConversationEvent),
    #[serde(rename = "assistant")]
    Assistant(ConversationEvent),
    #[serde(rename = "response_item")]
    ResponseItem(ResponseItemEvent),
    #[serde(rename = "message")]
    Message(BareMessage),
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationEvent {
    #[serde(default)]
    pub timestamp: Option<String>,
    /// Injected caveats and command output carry `isMeta: true`.
    #[serde(default)]
    pub is_meta: Option<bool>,
    #[serde(default)]
    pub is_sidechain: bool,
    pub message: Message,
}

#[derive(Debug, Deserialize)]
pub struct ResponseItemEvent {
    #[serde(default)]
    pub timestamp: Option<String>,
    pub payload: ResponsePayload,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum ResponsePayload {
    #[serde(rename = "message")]
    Message(Message),
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
pub struct BareMessage {
    #[serde(default)]
    pub timestamp: Option<String>,
    pub role: String,
    pub content: MessageContent,
}

#[derive(Debug, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: MessageContent,
}

/// `content` can be a plain string or an array of content blocks.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

/// Only the block type and its text matter here; tool calls, tool results,
/// thinking and images are carried through untyped and contribute no text.
#[derive(Debug, Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub block_type: String,
    #[serde(default)]
    pub text: Option<String>,
}

const TEXT_BLOCK_TYPES: &[&str] = &["text", "input_text", "output_text"];

impl MessageContent {
    /// Concatenated text of all text-bearing parts, `None` if there are none.
    pub fn text(&self) -> Option<String> {
        match self {
            MessageContent::Text(t) => Some(t.clone()).filter(|t| !t.trim().is_empty()),
            MessageContent::Blocks(blocks) => {
                let parts: Vec<&str> = blocks
                    .iter()
                    .filter(|b| TEXT_BLOCK_TYPES.contains(&b.block_type.as_str()))
                    .filter_map(|b| b.text.as_deref())
                    .filter(|t| !t.trim().is_empty())
                    .collect();
                if parts.is_empty() {
                    None
                } else {
                    Some(parts.join("\n\n"))
                }
            }
        }
    }
}

/// Who authored a piece of transcript text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speaker {
    User,
    Assistant,
}

impl TranscriptEvent {
    /// The authored text this event contributes to the conversation, if any.
    pub fn utterance(&self) -> Option<(Speaker, String, Option<&str>)> {
        let (role, content, timestamp) = match self {
            Self::User(e) | Self::Assistant(e) => {
                if e.is_sidechain || e.is_meta == Some(true) {
                    return None;
                }
                (&e.message.role, &e.message.content, &e.timestamp)
            }
            Self::ResponseItem(e) => match &e.payload {
                ResponsePayload::Message(m) => (&m.role, &m.content, &e.timestamp),
                ResponsePayload::Other => return None,
            },
            Self::Message(m) => (&m.role, &m.content, &m.timestamp),
            Self::Other => return None,
        };
        let speaker = match role.as_str() {
            "user" => Speaker::User,
            "assistant" => Speaker::Assistant,
            _ => return None,
        };
        content
            .text()
            .map(|text| (speaker, text, timestamp.as_deref()))
    }
}

// ===================================================================
// Prompt filtering — strip injected instructions and environment blocks
// ===================================================================

/// Delimiter tags whose contents are never part of what the user typed.
pub const INSTRUCTION_TAGS: &[&str] = &[
    "user_instructions",
    "environment_context",
    "INSTRUCTIONS",
    "system-reminder",
    "system_instructions",
    "local-command-caveat",
];

/// Removes system/instruction boilerplate from prompt text.
pub struct PromptFilter {
    delimited: Vec<Regex>,
}

impl Default for PromptFilter {
    fn default() -> Self {
        Self::new(&[])
    }
}

impl PromptFilter {
    /// Build a filter for the built-in tags plus `extra_tags`.
    pub fn new(extra_tags: &[String]) -> Self {
        let delimited = INSTRUCTION_TAGS
            .iter()
            .copied()
            .chain(extra_tags.iter().map(String::as_str))
            .filter(|tag| !tag.trim().is_empty())
            .filter_map(|tag| {
                let tag = regex::escape(tag.trim());
                Regex::new(&format!(r"(?s)<{tag}(?:\s[^>]*)?>.*?</{tag}>")).ok()
            })
            .collect();
        Self { delimited }
    }

    /// Strip delimited blocks anywhere in the text, then any contiguous
    /// leading instruction paragraphs. Returns the trimmed remainder, which
    /// is empty when the prompt was nothing but boilerplate.
    pub fn strip(&self, prompt: &str) -> String {
        let mut text = prompt.to_string();
        for re in &self.delimited {
            text = re.replace_all(&text, "").into_owned();
        }

        let mut rest = text.trim_start();
        while is_instruction_heading(rest.lines().next().unwrap_or("")) {
            rest = match paragraph_end(rest) {
                Some(end) => rest[end..].trim_start(),
                None => "",
            };
        }
        rest.trim().to_string()
    }
}

/// Byte offset of the first blank line. Whitespace-only lines, including a
/// lone `\r`, count as blank.
fn paragraph_end(text: &str) -> Option<usize> {
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        if offset > 0 && line.trim().is_empty() {
            return Some(offset);
        }
        offset += line.len();
    }
    None
}

/// A markdown heading announcing an injected instructions file, e.g.
/// `# AGENTS.md instructions for /repo`. Headings that merely mention
/// instructions are the user's own text.
fn is_instruction_heading(line: &str) -> bool {
    let Some(title) = line.trim().strip_prefix('#') else {
        return false;
    };
    let mut words = title.trim_start_matches('#').split_whitespace();
    let (Some(file), Some(word)) = (words.next(), words.next()) else {
        return false;
    };
    file.to_ascii_lowercase().ends_with(".md")
        && word.to_ascii_lowercase().starts_with("instructions")
}

// ===================================================================
// Turns
// ===================================================================

/// One user prompt and the assistant text that followed it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub prompt: String,
    pub response: Option<String>,
    pub timestamp: Option<String>,
}

struct PendingTurn {
    prompt: String,
    timestamp: Option<String>,
    responses: Vec<String>,
}

/// Accumulates utterances into turns, dropping prompts that filter to nothing.
struct TurnBuilder<'f> {
    filter: &'f PromptFilter,
    current: Option<PendingTurn>,
    turns: Vec<Turn>,
}

impl<'f> TurnBuilder<'f> {
    fn new(filter: &'f PromptFilter) -> Self {
        Self {
            filter,
            current: None,
            turns: Vec::new(),
        }
    }

    fn push(&mut self, speaker: Speaker, text: String, timestamp: Option<&str>) {
        match speaker {
            Speaker::User => {
                self.flush();
                self.current = Some(PendingTurn {
                    prompt: text,
                    timestamp: timestamp.map(String::from),
                    responses: Vec::new(),
                });
            }
            Speaker::Assistant => {
                // Assistant text before the first prompt has no turn to join.
                if let Some(turn) = self.current.as_mut() {
                    turn.responses.push(text.trim().to_string());
                }
            }
        }
    }

    fn flush(&mut self) {
        let Some(pending) = self.current.take() else {
            return;
        };
        let prompt = self.filter.strip(&pending.prompt);
        if prompt.is_empty() {
            return;
        }
        let response = if pending.responses.is_empty() {
            None
        } else {
            Some(pending.responses.join("\n\n"))
        };
        self.turns.push(Turn {
            prompt,
            response,
            timestamp: pending.timestamp,
        });
    }

    fn finish(mut self) -> Vec<Turn> {
        self.flush();
        self.turns
    }
}

// ===================================================================
// Transcript — the ordered, filtered turns of one transcript file
// ===================================================================

pub struct Transcript {
    turns: Vec<Turn>,
}

impl Transcript {
    /// An empty transcript (no turns).
    pub fn empty() -> Self {
        Self { turns: Vec::new() }
    }

    /// Parse JSONL transcript contents into turns. Returns the transcript
    /// and any lines that failed to parse (with 1-based line number and
    /// error). A final line with no terminating newline that fails to parse
    /// is an in-progress write; it is skipped without being reported.
    pub fn parse(contents: &str, filter: &PromptFilter) -> (Self, Vec<(usize, String)>) {
        let mut builder = TurnBuilder::new(filter);
        let mut errors = Vec::new();
        let complete = contents.ends_with('\n');
        let lines: Vec<&str> = contents.lines().collect();

        for (i, line) in lines.iter().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<TranscriptEvent>(line) {
                Ok(event) => {
                    if let Some((speaker, text, timestamp)) = event.utterance() {
                        builder.push(speaker, text, timestamp);
                    }
                }
                Err(_) if i + 1 == lines.len() && !complete => {}
                Err(e) => errors.push((i + 1, format!("{e}"))),
            }
        }

        (
            Self {
                turns: builder.finish(),
            },
            errors,
        )
    }

    /// All turns in transcript order.
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

/// Session identifier for a transcript: the file stem of its path.
pub fn transcript_id(path: &Path) -> Option<String> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

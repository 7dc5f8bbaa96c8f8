//! Unified diff parsing for renderers.
//!
//! Accepts `git diff` output as well as plain `---`/`+++` unified diffs.
//! Parsing is best-effort: unrecognised or malformed fragments are skipped
//! and whatever could be understood is returned.

use serde::Serialize;
use std::iter::Peekable;
use std::str::Lines;

const DEV_NULL: &str = "/dev/null";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileDiff {
    pub old_path: String,
    pub new_path: String,
    pub hunks: Vec<Hunk>,
    pub additions: usize,
    pub deletions: usize,
}

impl FileDiff {
    /// The path to show for this file: the new path unless the file was deleted.
    pub fn display_path(&self) -> &str {
        if self.new_path.is_empty() || self.new_path == DEV_NULL {
            &self.old_path
        } else {
            &self.new_path
        }
    }

    fn push_hunk(&mut self, hunk: Hunk) {
        if self.hunks.contains(&hunk) {
            return;
        }
        for line in &hunk.lines {
            match line.kind {
                LineKind::Addition => self.additions += 1,
                LineKind::Deletion => self.deletions += 1,
                LineKind::Context => {}
            }
        }
        self.hunks.push(hunk);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Hunk {
    /// The `@@ ... @@` line as it appeared.
    pub header: String,
    pub old_start: u32,
    pub old_lines: u32,
    pub new_start: u32,
    pub new_lines: u32,
    pub lines: Vec<DiffLine>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LineKind {
    Addition,
    Deletion,
    Context,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffLine {
    pub kind: LineKind,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_line: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_line: Option<u32>,
}

/// Parse unified diff text into per-file structures. Never fails; empty or
/// whitespace-only input yields an empty list.
pub fn parse_diff(text: &str) -> Vec<FileDiff> {
    if text.trim().is_empty() {
        return Vec::new();
    }
    let mut parser = Parser::default();
    let mut lines = text.lines().peekable();
    while let Some(line) = lines.next() {
        parser.line(line, &mut lines);
    }
    parser.finish()
}

// ===================================================================
// Parser state
// ===================================================================

#[derive(Default)]
struct Parser {
    files: Vec<FileDiff>,
    file: Option<OpenFile>,
    hunk: Option<OpenHunk>,
    /// Inside a hunk whose header could not be parsed.
    skipping: bool,
}

struct OpenFile {
    diff: FileDiff,
    /// A `---` marker was already applied to this file.
    saw_old_marker: bool,
    /// A `+++` marker was already applied to this file.
    saw_new_marker: bool,
}

struct OpenHunk {
    hunk: Hunk,
    old_remaining: u32,
    new_remaining: u32,
    old_no: u32,
    new_no: u32,
}

impl OpenHunk {
    fn wants_more(&self) -> bool {
        self.old_remaining > 0 || self.new_remaining > 0
    }

    /// Consume one body line. Returns false when the line does not belong
    /// to the hunk body.
    fn take(&mut self, line: &str) -> bool {
        let (kind, content) = match line.chars().next() {
            None => (LineKind::Context, ""),
            Some('+') => (LineKind::Addition, &line[1..]),
            Some('-') => (LineKind::Deletion, &line[1..]),
            Some(' ') => (LineKind::Context, &line[1..]),
            Some(_) => return false,
        };
        let (old_line, new_line) = match kind {
            LineKind::Addition => {
                self.new_remaining = self.new_remaining.saturating_sub(1);
                (None, Some(step(&mut self.new_no)))
            }
            LineKind::Deletion => {
                self.old_remaining = self.old_remaining.saturating_sub(1);
                (Some(step(&mut self.old_no)), None)
            }
            LineKind::Context => {
                self.old_remaining = self.old_remaining.saturating_sub(1);
                self.new_remaining = self.new_remaining.saturating_sub(1);
                (Some(step(&mut self.old_no)), Some(step(&mut self.new_no)))
            }
        };
        self.hunk.lines.push(DiffLine {
            kind,
            content: content.to_string(),
            old_line,
            new_line,
        });
        true
    }
}

/// Return the current line number and advance it, saturating at `u32::MAX`.
fn step(line_no: &mut u32) -> u32 {
    let current = *line_no;
    *line_no = current.saturating_add(1);
    current
}

impl Parser {
    fn line(&mut self, line: &str, rest: &mut Peekable<Lines<'_>>) {
        if line.starts_with('\\') {
            // "\ No newline at end of file"
            return;
        }
        if let Some(hunk) = self.hunk.as_mut() {
            if hunk.wants_more() && hunk.take(line) {
                return;
            }
            self.close_hunk();
        }

        if let Some(paths) = line.strip_prefix("diff --git ") {
            self.close_file();
            let (old, new) = split_git_paths(paths);
            self.open_file(old, new);
            return;
        }
        if line.starts_with("@@") {
            self.start_hunk(line);
            return;
        }
        if let Some(marker) = line.strip_prefix("--- ") {
            self.old_marker(marker, rest);
            return;
        }
        if self.skipping {
            return;
        }
        let Some(file) = self.file.as_mut() else {
            return;
        };
        if let Some(marker) = line.strip_prefix("+++ ") {
            if !file.saw_new_marker {
                file.diff.new_path = marker_path(marker);
                file.saw_new_marker = true;
            }
        } else if let Some(path) = line
            .strip_prefix("rename from ")
            .or_else(|| line.strip_prefix("copy from "))
        {
            file.diff.old_path = unquote(path);
        } else if let Some(path) = line
            .strip_prefix("rename to ")
            .or_else(|| line.strip_prefix("copy to "))
        {
            file.diff.new_path = unquote(path);
        }
        // Metadata (mode, index, similarity, binary) and stray text are skipped.
    }

    /// A `---` line outside a hunk either names the old side of the current
    /// file or, when followed by `+++`, starts a plain unified diff file.
    fn old_marker(&mut self, marker: &str, rest: &mut Peekable<Lines<'_>>) {
        let next_is_new_marker = rest.peek().is_some_and(|l| l.starts_with("+++ "));
        let refines_current = !self.skipping
            && self
                .file
                .as_ref()
                .is_some_and(|f| !f.saw_old_marker && f.diff.hunks.is_empty());
        if !refines_current {
            if !next_is_new_marker {
                return;
            }
            self.close_file();
            self.open_file(String::new(), String::new());
        }
        self.skipping = false;
        if let Some(file) = self.file.as_mut() {
            file.diff.old_path = marker_path(marker);
            file.saw_old_marker = true;
        }
    }

    fn open_file(&mut self, old_path: String, new_path: String) {
        self.file = Some(OpenFile {
            diff: FileDiff {
                old_path,
                new_path,
                ..Default::default()
            },
            saw_old_marker: false,
            saw_new_marker: false,
        });
    }

    fn start_hunk(&mut self, header: &str) {
        let Some(range) = parse_hunk_header(header) else {
            self.skipping = true;
            return;
        };
        self.skipping = false;
        if self.file.is_none() {
            // A bare hunk with no file header.
            self.open_file(String::new(), String::new());
        }
        let (old_start, old_lines, new_start, new_lines) = range;
        self.hunk = Some(OpenHunk {
            hunk: Hunk {
                header: header.to_string(),
                old_start,
                old_lines,
                new_start,
                new_lines,
                lines: Vec::new(),
            },
            old_remaining: old_lines,
            new_remaining: new_lines,
            old_no: old_start,
            new_no: new_start,
        });
    }

    fn close_hunk(&mut self) {
        if let Some(open) = self.hunk.take()
            && let Some(file) = self.file.as_mut()
        {
            file.diff.push_hunk(open.hunk);
        }
    }

    fn close_file(&mut self) {
        self.close_hunk();
        self.skipping = false;
        if let Some(file) = self.file.take() {
            self.files.push(file.diff);
        }
    }

    fn finish(mut self) -> Vec<FileDiff> {
        self.close_file();
        self.files
    }
}

// ===================================================================
// Header parsing
// ===================================================================

/// Parse `@@ -a[,b] +c[,d] @@`. Omitted counts default to 1.
fn parse_hunk_header(line: &str) -> Option<(u32, u32, u32, u32)> {
    let body = line.strip_prefix("@@ ")?;
    let end = body.find(" @@")?;
    let mut ranges = body[..end].split_whitespace();
    let old = ranges.next()?.strip_prefix('-')?;
    let new = ranges.next()?.strip_prefix('+')?;
    if ranges.next().is_some() {
        return None;
    }
    let (old_start, old_lines) = parse_range(old)?;
    let (new_start, new_lines) = parse_range(new)?;
    Some((old_start, old_lines, new_start, new_lines))
}

/// A range whose last line number does not fit in `u32` is malformed.
fn parse_range(range: &str) -> Option<(u32, u32)> {
    let (start, count): (u32, u32) = match range.split_once(',') {
        Some((start, count)) => (start.parse().ok()?, count.parse().ok()?),
        None => (range.parse().ok()?, 1),
    };
    start.checked_add(count)?;
    Some((start, count))
}

/// Split the `a/<old> b/<new>` tail of a `diff --git` line.
fn split_git_paths(rest: &str) -> (String, String) {
    if rest.starts_with('"') {
        let (old, tail) = take_quoted(rest);
        let new = tail.trim_start();
        return (strip_side(&old), strip_side(&unquote(new)));
    }
    // Unquoted paths may contain spaces. Prefer the split that makes both
    // sides name the same file, as git emits for anything but renames.
    let bytes = rest.len();
    if bytes >= 5 && (bytes - 5) % 2 == 0 {
        let half = (bytes - 5) / 2;
        if let (Some(old), Some(new)) = (rest.get(2..2 + half), rest.get(5 + half..))
            && rest.starts_with("a/")
            && rest.get(2 + half..5 + half) == Some(" b/")
            && old == new
        {
            return (old.to_string(), new.to_string());
        }
    }
    if let Some(i) = rest.find(" b/") {
        return (strip_side(&rest[..i]), strip_side(&rest[i + 1..]));
    }
    match rest.split_once(' ') {
        Some((old, new)) => (strip_side(old), strip_side(&unquote(new))),
        None => (strip_side(rest), strip_side(rest)),
    }
}

/// Path from a `---`/`+++` marker: unquoted, timestamp removed, side prefix stripped.
fn marker_path(marker: &str) -> String {
    let path = marker.split('\t').next().unwrap_or(marker).trim_end();
    let path = unquote(path);
    if path == DEV_NULL {
        path
    } else {
        strip_side(&path)
    }
}

fn strip_side(path: &str) -> String {
    path.strip_prefix("a/")
        .or_else(|| path.strip_prefix("b/"))
        .unwrap_or(path)
        .to_string()
}

/// Decode a C-style quoted path as git writes it, or return the input
/// unchanged when it is not quoted.
fn unquote(path: &str) -> String {
    if path.starts_with('"') {
        take_quoted(path).0
    } else {
        path.to_string()
    }
}

/// Decode the quoted string at the start of `s`. Returns the decoded text
/// and whatever follows the closing quote.
fn take_quoted(s: &str) -> (String, &str) {
    let mut out: Vec<u8> = Vec::new();
    let bytes = s.as_bytes();
    let mut i = 1;
    while i < bytes.len() {
        match bytes[i] {
            b'"' => return (String::from_utf8_lossy(&out).into_owned(), &s[i + 1..]),
            b'\\' if i + 1 < bytes.len() => {
                let c = bytes[i + 1];
                i += 2;
                match c {
                    b'n' => out.push(b'\n'),
                    b't' => out.push(b'\t'),
                    b'r' => out.push(b'\r'),
                    b'a' => out.push(0x07),
                    b'b' => out.push(0x08),
                    b'f' => out.push(0x0c),
                    b'v' => out.push(0x0b),
                    b'0'..=b'7' => {
                        let mut value = u32::from(c - b'0');
                        let mut digits = 1;
                        while digits < 3 && i < bytes.len() && (b'0'..=b'7').contains(&bytes[i]) {
                            value = value * 8 + u32::from(bytes[i] - b'0');
                            i += 1;
                            digits += 1;
                        }
                        out.push((value & 0xff) as u8);
                    }
                    other => out.push(other),
                }
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    // No closing quote: take everything after the opening one.
    (String::from_utf8_lossy(&out).into_owned(), "")
}

//! Terminal rendering of parsed diffs for `promptlog show`.

use crate::diff::{DiffLine, FileDiff, LineKind};
use crossterm::style::Stylize;
use std::fmt::Write;

/// Render `files` as text with old/new line number gutters. ANSI colour is
/// applied only when `color` is set.
pub fn render_files(files: &[FileDiff], color: bool) -> String {
    let width = gutter_width(files);
    let mut out = String::new();
    for file in files {
        let title = format!(
            "{} (+{} -{})",
            file.display_path(),
            file.additions,
            file.deletions
        );
        let _ = writeln!(out, "{}", paint(&title, Paint::Title, color));
        if file.old_path != file.new_path
            && !file.old_path.is_empty()
            && file.old_path != "/dev/null"
            && file.new_path != "/dev/null"
        {
            let _ = writeln!(out, "  renamed from {}", file.old_path);
        }
        for hunk in &file.hunks {
            let _ = writeln!(out, "{}", paint(&hunk.header, Paint::Hunk, color));
            for line in &hunk.lines {
                let _ = writeln!(out, "{}", render_line(line, width, color));
            }
        }
        out.push('\n');
    }
    out
}

fn render_line(line: &DiffLine, width: usize, color: bool) -> String {
    let num = |n: Option<u32>| n.map(|n| n.to_string()).unwrap_or_default();
    let (sign, kind) = match line.kind {
        LineKind::Addition => ('+', Paint::Addition),
        LineKind::Deletion => ('-', Paint::Deletion),
        LineKind::Context => (' ', Paint::Context),
    };
    let body = format!("{sign}{}", line.content);
    format!(
        "{:>width$} {:>width$} │{}",
        num(line.old_line),
        num(line.new_line),
        paint(&body, kind, color),
    )
}

fn gutter_width(files: &[FileDiff]) -> usize {
    files
        .iter()
        .flat_map(|f| &f.hunks)
        .flat_map(|h| &h.lines)
        .flat_map(|l| [l.old_line, l.new_line])
        .flatten()
        .max()
        .map_or(1, |n| n.to_string().len())
}

#[derive(Clone, Copy)]
enum Paint {
    Title,
    Hunk,
    Addition,
    Deletion,
    Context,
}

fn paint(text: &str, how: Paint, color: bool) -> String {
    if !color {
        return text.to_string();
    }
    match how {
        Paint::Title => text.bold().to_string(),
        Paint::Hunk => text.cyan().to_string(),
        Paint::Addition => text.green().to_string(),
        Paint::Deletion => text.red().to_string(),
        Paint::Context => text.to_string(),
    }
}

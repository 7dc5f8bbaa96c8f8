//! Live view of in-progress sessions. Re-reads `sessions.json` whenever the
//! store directory signals a change; never writes.

use crate::store::StoreLayout;
use crate::store::record::AssistantSession;
use crate::store::state::load_sessions;
use anyhow::{Context, Result};
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::Path;
use std::sync::mpsc;
use std::time::Duration;
use tracing::{debug, warn};

/// Coalescing window for bursts of events from one atomic write.
const SETTLE: Duration = Duration::from_millis(100);

/// Remembers what was last shown so unchanged reloads print nothing.
pub struct SessionSubscriber {
    layout: StoreLayout,
    last: Option<Vec<String>>,
}

impl SessionSubscriber {
    pub fn new(layout: StoreLayout) -> Self {
        Self { layout, last: None }
    }

    /// Reload the store. Returns the new status lines if they differ from
    /// the previous reload.
    pub fn refresh(&mut self) -> Result<Option<Vec<String>>> {
        let sessions = load_sessions(&self.layout)
            .with_context(|| format!("reading {}", self.layout.sessions_path().display()))?;
        let lines = status_lines(&sessions);
        if self.last.as_ref() == Some(&lines) {
            return Ok(None);
        }
        self.last = Some(lines.clone());
        Ok(Some(lines))
    }
}

/// One line per in-progress session; a single placeholder line when idle.
pub fn status_lines(sessions: &[AssistantSession]) -> Vec<String> {
    let lines: Vec<String> = sessions
        .iter()
        .filter(|s| s.in_progress)
        .map(|s| {
            format!(
                "{} [{}] {} | {}",
                s.id,
                s.branch.as_deref().unwrap_or("detached"),
                s.summary,
                first_line(&s.prompt),
            )
        })
        .collect();
    if lines.is_empty() {
        vec!["no session in progress".to_string()]
    } else {
        lines
    }
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or("")
}

/// Block, printing status whenever `sessions.json` changes.
pub fn run(workdir: &Path) -> Result<()> {
    let layout = StoreLayout::for_workdir(workdir);
    std::fs::create_dir_all(layout.dir())
        .with_context(|| format!("creating {}", layout.dir().display()))?;
    let mut subscriber = SessionSubscriber::new(layout.clone());
    print_lines(subscriber.refresh()?);

    let (tx, rx) = mpsc::channel::<notify::Result<Event>>();
    let mut watcher = RecommendedWatcher::new(
        move |res| {
            let _ = tx.send(res);
        },
        Config::default(),
    )
    .context("creating filesystem watcher")?;
    watcher
        .watch(layout.dir(), RecursiveMode::NonRecursive)
        .with_context(|| format!("watching {}", layout.dir().display()))?;
    debug!(dir = %layout.dir().display(), "watching store");

    loop {
        match rx.recv().context("watcher channel closed")? {
            Ok(event) if touches_sessions(&event) => {}
            Ok(_) => continue,
            Err(e) => {
                warn!(error = %e, "watch error");
                continue;
            }
        }
        // Drain the rest of the burst.
        while rx.recv_timeout(SETTLE).is_ok() {}
        match subscriber.refresh() {
            Ok(lines) => print_lines(lines),
            Err(e) => warn!(error = %format!("{e:#}"), "reload failed"),
        }
    }
}

fn touches_sessions(event: &Event) -> bool {
    event
        .paths
        .iter()
        .any(|p| p.file_name().is_some_and(|n| n == "sessions.json"))
}

fn print_lines(lines: Option<Vec<String>>) {
    for line in lines.into_iter().flatten() {
        println!("{line}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::record::SessionMode;
    use crate::store::write_json_atomic;

    fn session(id: &str, in_progress: bool) -> AssistantSession {
        let mut s = AssistantSession::open(id, "/repo", None, SessionMode::Interactive, "t");
        s.prompt = "fix the parser\nwith details".into();
        s.summary = "1 prompt, 2 files changed".into();
        s.branch = Some("main".into());
        s.in_progress = in_progress;
        s
    }

    #[test]
    fn only_in_progress_sessions_are_listed() {
        let lines = status_lines(&[session("old", false), session("live", true)]);
        assert_eq!(lines, ["live [main] 1 prompt, 2 files changed | fix the parser"]);
        assert_eq!(status_lines(&[]), ["no session in progress"]);
    }

    #[test]
    fn refresh_reports_only_changes() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = StoreLayout::for_workdir(tmp.path());
        let mut sub = SessionSubscriber::new(layout.clone());

        assert_eq!(sub.refresh().unwrap().unwrap(), ["no session in progress"]);
        assert!(sub.refresh().unwrap().is_none());

        write_json_atomic(&layout.sessions_path(), &vec![session("a", true)]).unwrap();
        let lines = sub.refresh().unwrap().unwrap();
        assert!(lines[0].starts_with("a [main]"));
        assert!(sub.refresh().unwrap().is_none());
    }

    #[test]
    fn unreadable_store_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = StoreLayout::for_workdir(tmp.path());
        std::fs::create_dir_all(layout.dir()).unwrap();
        std::fs::write(layout.sessions_path(), "{not json").unwrap();
        let mut sub = SessionSubscriber::new(layout);
        assert!(sub.refresh().is_err());
    }
}

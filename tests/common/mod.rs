#![allow(dead_code)]

use serde_json::{Value, json};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

fn run(args: &[&str], stdin: &str) -> (i32, String, String) {
    let mut child = Command::new(env!("CARGO_BIN_EXE_promptlog"))
        .args(args)
        .env_remove("PROMPTLOG_LOG")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to spawn binary");

    child
        .stdin
        .as_mut()
        .unwrap()
        .write_all(stdin.as_bytes())
        .unwrap();

    let output = child.wait_with_output().unwrap();
    (
        output.status.code().unwrap_or(-1),
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
    )
}

/// Run the binary in hook mode with `stdin_json` on stdin.
pub fn run_cli(stdin_json: &str) -> (i32, String, String) {
    run(&[], stdin_json)
}

/// Run a subcommand with empty stdin.
pub fn run_args(args: &[&str]) -> (i32, String, String) {
    run(args, "")
}

/// Create a temp dir containing a git repo whose initial commit holds
/// `README.md` ("hello\n"). The `TempDir` must be kept alive for the
/// duration of the test.
pub fn temp_git_repo() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let repo = git2::Repository::init(dir.path()).unwrap();

    // Configure user identity for commits.
    let mut config = repo.config().unwrap();
    config.set_str("user.name", "Test").unwrap();
    config.set_str("user.email", "test@test.com").unwrap();

    fs::write(dir.path().join("README.md"), "hello\n").unwrap();
    let mut index = repo.index().unwrap();
    index.add_path(Path::new("README.md")).unwrap();
    index.write().unwrap();
    let sig = repo.signature().unwrap();
    let tree_oid = index.write_tree().unwrap();
    let tree = repo.find_tree(tree_oid).unwrap();
    repo.commit(Some("HEAD"), &sig, &sig, "initial", &tree, &[])
        .unwrap();

    dir
}

/// Write a Claude-style transcript with one user/assistant exchange per
/// prompt. The assistant replies "re: <prompt>".
pub fn write_transcript(path: &Path, prompts: &[&str]) {
    let mut out = String::new();
    for (i, prompt) in prompts.iter().enumerate() {
        let user = json!({
            "type": "user",
            "uuid": format!("u{i}"),
            "isSidechain": false,
            "timestamp": format!("2025-06-01T12:00:{i:02}Z"),
            "message": { "role": "user", "content": prompt }
        });
        let assistant = json!({
            "type": "assistant",
            "uuid": format!("a{i}"),
            "isSidechain": false,
            "message": {
                "role": "assistant",
                "content": [{ "type": "text", "text": format!("re: {prompt}") }]
            }
        });
        out.push_str(&format!("{user}\n{assistant}\n"));
    }
    fs::write(path, out).unwrap();
}

/// Hook input JSON for `event`.
pub fn hook_input(event: &str, cwd: &Path, transcript: &Path) -> String {
    let mut v = json!({
        "hook_event_name": event,
        "session_id": "fallback-session",
        "transcript_path": transcript,
        "cwd": cwd,
        "permission_mode": "default"
    });
    match event {
        "Stop" | "SubagentStop" => v["stop_hook_active"] = json!(false),
        "SessionEnd" => v["reason"] = json!("prompt_input_exit"),
        _ => {}
    }
    v.to_string()
}

pub fn store_dir(repo: &Path) -> PathBuf {
    repo.join(".promptlog")
}

/// Parsed `.promptlog/sessions.json`.
pub fn sessions(repo: &Path) -> Vec<Value> {
    let raw = fs::read_to_string(store_dir(repo).join("sessions.json")).unwrap();
    serde_json::from_str(&raw).unwrap()
}

pub fn read_store_file(repo: &Path, name: &str) -> Option<Vec<u8>> {
    fs::read(store_dir(repo).join(name)).ok()
}

/// Common fields pointing at a non-git /tmp dir.
pub const COMMON_NO_GIT: &str = r#"
    "session_id": "test-session",
    "transcript_path": "/tmp/t.jsonl",
    "cwd": "/tmp",
    "permission_mode": "default"
"#;

mod common;

use std::fs;

use common::{hook_input, run_args, run_cli, sessions, temp_git_repo, write_transcript};

/// Repo with one captured prompt that rewrote README.md.
fn captured_repo() -> (tempfile::TempDir, tempfile::TempDir) {
    let repo = temp_git_repo();
    let transcripts = tempfile::tempdir().unwrap();
    let transcript = transcripts.path().join("session-a.jsonl");
    write_transcript(&transcript, &["reword the readme"]);
    fs::write(repo.path().join("README.md"), "changed\n").unwrap();
    let (code, _, _) = run_cli(&hook_input("Stop", repo.path(), &transcript));
    assert_eq!(code, 0);
    (repo, transcripts)
}

#[test]
fn capture_single_shot() {
    let repo = temp_git_repo();
    let transcripts = tempfile::tempdir().unwrap();
    let transcript = transcripts.path().join("run-42.jsonl");
    write_transcript(&transcript, &["fix the build"]);
    fs::write(repo.path().join("build.rs"), "fn main() {}\n").unwrap();

    let (code, stdout, stderr) = run_args(&[
        "capture",
        "--transcript",
        transcript.to_str().unwrap(),
        "--cwd",
        repo.path().to_str().unwrap(),
        "--single-shot",
    ]);
    assert_eq!(code, 0, "stderr: {stderr}");
    assert_eq!(stdout.trim(), "run-42: recorded 1 prompt(s), 1 file(s) changed");

    let s = &sessions(repo.path())[0];
    assert_eq!(s["mode"], "single-shot");
    assert_eq!(s["inProgress"], false);
    assert!(s["endedAt"].is_string());

    let (_, again, _) = run_args(&[
        "capture",
        "--transcript",
        transcript.to_str().unwrap(),
        "--cwd",
        repo.path().to_str().unwrap(),
    ]);
    assert_eq!(again.trim(), "no new prompts");
}

#[test]
fn show_renders_the_latest_diff() {
    let (repo, _transcripts) = captured_repo();
    let (code, stdout, stderr) = run_args(&["show", "--cwd", repo.path().to_str().unwrap()]);
    assert_eq!(code, 0, "stderr: {stderr}");
    assert!(stdout.starts_with("README.md (+1 -1)\n"), "{stdout}");
    assert!(stdout.contains("@@ -1 +1 @@"));
    assert!(stdout.contains("1   │-hello"));
    assert!(stdout.contains("  1 │+changed"));
}

#[test]
fn show_json_for_one_prompt() {
    let (repo, _transcripts) = captured_repo();
    let (code, stdout, _) = run_args(&[
        "show",
        "session-a",
        "--prompt",
        "1",
        "--json",
        "--cwd",
        repo.path().to_str().unwrap(),
    ]);
    assert_eq!(code, 0);
    let files: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(files[0]["newPath"], "README.md");
    assert_eq!(files[0]["additions"], 1);
    assert_eq!(files[0]["deletions"], 1);
    assert_eq!(files[0]["hunks"][0]["lines"][1]["kind"], "addition");
}

#[test]
fn show_reports_bad_selections() {
    let (repo, _transcripts) = captured_repo();
    let cwd = repo.path().to_str().unwrap();

    let (code, _, stderr) = run_args(&["show", "--prompt", "2", "--cwd", cwd]);
    assert_eq!(code, 1);
    assert!(stderr.contains("has 1 prompt(s)"), "{stderr}");

    let (code, _, stderr) = run_args(&["show", "nope", "--cwd", cwd]);
    assert_eq!(code, 1);
    assert!(stderr.contains("no session nope"), "{stderr}");
}

#[test]
fn show_with_empty_store() {
    let repo = temp_git_repo();
    let (code, _, stderr) = run_args(&["show", "--cwd", repo.path().to_str().unwrap()]);
    assert_eq!(code, 1);
    assert!(stderr.contains("no sessions recorded"), "{stderr}");
}

#[test]
fn explicit_hook_subcommand_matches_default() {
    let (code, stdout, _) = run_args(&["hook"]);
    // Empty stdin is invalid input: logged, never fatal.
    assert_eq!(code, 0);
    assert!(stdout.is_empty());
}

mod common;

use std::fs;

use common::{hook_input, read_store_file, run_cli, sessions, temp_git_repo, write_transcript};

#[test]
fn session_end_closes_the_record() {
    let repo = temp_git_repo();
    let transcripts = tempfile::tempdir().unwrap();
    let transcript = transcripts.path().join("session-a.jsonl");
    write_transcript(&transcript, &["hello"]);
    fs::write(repo.path().join("README.md"), "changed\n").unwrap();
    run_cli(&hook_input("Stop", repo.path(), &transcript));

    let (code, stdout, stderr) = run_cli(&hook_input("SessionEnd", repo.path(), &transcript));
    assert_eq!(code, 0);
    assert!(stdout.is_empty());
    assert!(stderr.is_empty(), "expected no stderr, got: {stderr}");

    let s = &sessions(repo.path())[0];
    assert_eq!(s["inProgress"], false);
    assert!(s["endedAt"].is_string());
    assert!(s["postHash"].as_str().is_some_and(|h| h.len() == 40));

    // Snapshot cleared, cursor kept.
    let fingerprints: serde_json::Value =
        serde_json::from_slice(&read_store_file(repo.path(), "fingerprints.json").unwrap()).unwrap();
    assert_eq!(fingerprints["files"], serde_json::json!({}));
    let cursor: serde_json::Value =
        serde_json::from_slice(&read_store_file(repo.path(), "cursor.json").unwrap()).unwrap();
    assert_eq!(cursor["count"], 1);
}

#[test]
fn resumed_transcript_after_end_starts_a_new_record() {
    let repo = temp_git_repo();
    let transcripts = tempfile::tempdir().unwrap();
    let transcript = transcripts.path().join("session-a.jsonl");
    write_transcript(&transcript, &["hello"]);
    run_cli(&hook_input("Stop", repo.path(), &transcript));
    run_cli(&hook_input("SessionEnd", repo.path(), &transcript));

    write_transcript(&transcript, &["hello", "again"]);
    run_cli(&hook_input("Stop", repo.path(), &transcript));

    let all = sessions(repo.path());
    assert_eq!(all.len(), 2);
    assert_eq!(all[1]["id"], "session-a");
    assert_eq!(all[1]["prompt"], "again");
    assert_eq!(all[1]["changes"].as_array().unwrap().len(), 1);
}

#[test]
fn session_end_without_a_session_writes_nothing() {
    let repo = temp_git_repo();
    let transcripts = tempfile::tempdir().unwrap();
    let transcript = transcripts.path().join("session-a.jsonl");

    let (code, stdout, _) = run_cli(&hook_input("SessionEnd", repo.path(), &transcript));
    assert_eq!(code, 0);
    assert!(stdout.is_empty());
    assert!(read_store_file(repo.path(), "sessions.json").is_none());
}

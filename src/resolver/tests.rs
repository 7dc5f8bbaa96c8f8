use super::*;
use crate::error::CaptureError;
use std::cell::RefCell;
use std::collections::BTreeMap;

// ===================================================================
// Test helpers
// ===================================================================

/// In-memory working tree: path → content, plus a log of diff requests.
#[derive(Default)]
struct FakeTree {
    files: BTreeMap<String, String>,
    diff_requests: RefCell<Vec<Vec<String>>>,
    fail: bool,
}

impl FakeTree {
    fn with(files: &[(&str, &str)]) -> Self {
        Self {
            files: files
                .iter()
                .map(|(p, c)| (p.to_string(), c.to_string()))
                .collect(),
            ..Default::default()
        }
    }

    fn set(&mut self, path: &str, content: &str) {
        self.files.insert(path.to_string(), content.to_string());
    }
}

impl WorkingTree for FakeTree {
    fn changed_paths(&self) -> CaptureResult<Vec<String>> {
        if self.fail {
            return Err(CaptureError::Environment("not a repository".into()));
        }
        Ok(self.files.keys().cloned().collect())
    }

    fn fingerprint(&self, path: &str) -> CaptureResult<String> {
        Ok(format!("h:{}", self.files[path]))
    }

    fn diff_for(&self, paths: &[String]) -> CaptureResult<String> {
        self.diff_requests.borrow_mut().push(paths.to_vec());
        Ok(paths
            .iter()
            .map(|p| format!("diff --git a/{p} b/{p}\n"))
            .collect())
    }
}

fn paths(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

// ===================================================================
// resolve_changes
// ===================================================================

#[test]
fn first_capture_counts_every_differing_file() {
    let current = paths(&["a.rs", "b.rs", "c.rs"]);
    let res = resolve_changes(&current, &FingerprintSnapshot::default(), |p| {
        Ok(format!("h-{p}"))
    })
    .unwrap();
    assert_eq!(res.changed, current);
    assert_eq!(res.snapshot.files.len(), 3);
}

#[test]
fn unchanged_fingerprints_are_excluded() {
    let mut previous = FingerprintSnapshot::default();
    previous.insert("a.rs", "1");
    previous.insert("b.rs", "2");
    let current = paths(&["a.rs", "b.rs", "new.rs"]);
    let res = resolve_changes(&current, &previous, |p| {
        Ok(match p {
            "a.rs" => "1",
            "b.rs" => "changed",
            _ => "9",
        }
        .to_string())
    })
    .unwrap();
    assert_eq!(res.changed, paths(&["b.rs", "new.rs"]));
    assert_eq!(res.snapshot.get("b.rs"), Some("changed"));
}

#[test]
fn snapshot_drops_paths_no_longer_differing() {
    let mut previous = FingerprintSnapshot::default();
    previous.insert("reverted.rs", "1");
    previous.insert("kept.rs", "2");
    let res = resolve_changes(&paths(&["kept.rs"]), &previous, |_| Ok("2".into())).unwrap();
    assert!(res.changed.is_empty());
    assert_eq!(res.snapshot.files.len(), 1);
    assert!(res.snapshot.get("reverted.rs").is_none());
}

#[test]
fn fingerprint_errors_propagate() {
    let err = resolve_changes(&paths(&["a"]), &FingerprintSnapshot::default(), |_| {
        Err(CaptureError::Environment("boom".into()))
    })
    .unwrap_err();
    assert!(err.is_environment());
}

// ===================================================================
// ChangeSet::compute
// ===================================================================

#[test]
fn diff_is_scoped_to_changed_files() {
    let mut tree = FakeTree::with(&[("a.rs", "one"), ("b.rs", "two")]);
    let first = ChangeSet::compute(&tree, &FingerprintSnapshot::default()).unwrap();
    assert_eq!(first.changed, paths(&["a.rs", "b.rs"]));

    tree.set("b.rs", "two, edited");
    let second = ChangeSet::compute(&tree, &first.snapshot).unwrap();
    assert_eq!(second.changed, paths(&["b.rs"]));
    assert_eq!(second.diff, "diff --git a/b.rs b/b.rs\n");
    assert_eq!(tree.diff_requests.borrow().last().unwrap(), &paths(&["b.rs"]));
}

#[test]
fn nothing_changed_skips_the_diff_query() {
    let tree = FakeTree::with(&[("a.rs", "one")]);
    let first = ChangeSet::compute(&tree, &FingerprintSnapshot::default()).unwrap();
    let requests_before = tree.diff_requests.borrow().len();
    let second = ChangeSet::compute(&tree, &first.snapshot).unwrap();
    assert!(second.changed.is_empty());
    assert!(second.diff.is_empty());
    assert_eq!(tree.diff_requests.borrow().len(), requests_before);
    assert_eq!(second.snapshot, first.snapshot);
}

#[test]
fn vcs_failure_is_an_environment_error() {
    let tree = FakeTree {
        fail: true,
        ..Default::default()
    };
    let err = ChangeSet::compute(&tree, &FingerprintSnapshot::default()).unwrap_err();
    assert!(err.is_environment());
}

//! Incremental diff resolution: which of the files that currently differ
//! from HEAD actually changed since the previous capture, and the diff of
//! exactly those files.

use crate::error::CaptureResult;
use crate::store::fingerprint::FingerprintSnapshot;

/// Read-only view of a working tree. Implemented by `git::GitRepo`.
pub trait WorkingTree {
    /// Relative paths that differ from the committed state, sorted.
    fn changed_paths(&self) -> CaptureResult<Vec<String>>;

    /// Stable hash of the current contents of `path`.
    fn fingerprint(&self, path: &str) -> CaptureResult<String>;

    /// Unified diff against HEAD restricted to `paths`.
    fn diff_for(&self, paths: &[String]) -> CaptureResult<String>;
}

/// Which paths changed and the fingerprints they were judged against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub changed: Vec<String>,
    pub snapshot: FingerprintSnapshot,
}

/// Compare `current` paths against `previous`.
///
/// An empty `previous` means this is the first capture of a session, and
/// every differing path counts as changed. The returned snapshot covers
/// exactly the paths in `current`.
pub fn resolve_changes<F>(
    current: &[String],
    previous: &FingerprintSnapshot,
    mut fingerprint: F,
) -> CaptureResult<Resolution>
where
    F: FnMut(&str) -> CaptureResult<String>,
{
    let first_capture = previous.is_empty();
    let mut changed = Vec::new();
    let mut snapshot = FingerprintSnapshot::default();

    for path in current {
        let hash = fingerprint(path)?;
        if first_capture || previous.differs(path, &hash) {
            changed.push(path.clone());
        }
        snapshot.insert(path.clone(), hash);
    }

    Ok(Resolution { changed, snapshot })
}

/// Resolution plus the diff scoped to the changed paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeSet {
    pub changed: Vec<String>,
    pub diff: String,
    pub snapshot: FingerprintSnapshot,
}

impl ChangeSet {
    pub fn compute(tree: &impl WorkingTree, previous: &FingerprintSnapshot) -> CaptureResult<Self> {
        let current = tree.changed_paths()?;
        let Resolution { changed, snapshot } =
            resolve_changes(&current, previous, |path| tree.fingerprint(path))?;
        let diff = if changed.is_empty() {
            String::new()
        } else {
            tree.diff_for(&changed)?
        };
        Ok(Self {
            changed,
            diff,
            snapshot,
        })
    }
}

#[cfg(test)]
mod tests;

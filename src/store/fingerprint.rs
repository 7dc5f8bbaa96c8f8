use super::{read_json_file, write_json_atomic};
use crate::error::CaptureResult;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Fingerprint recorded for a path that differs from HEAD because it was
/// removed from the working tree.
pub const DELETED: &str = "deleted";

/// Path → content hash, as observed at the last successful capture.
/// Stored as `.promptlog/fingerprints.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FingerprintSnapshot {
    #[serde(default)]
    pub files: BTreeMap<String, String>,
}

impl FingerprintSnapshot {
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn get(&self, path: &str) -> Option<&str> {
        self.files.get(path).map(String::as_str)
    }

    pub fn insert(&mut self, path: impl Into<String>, fingerprint: impl Into<String>) {
        self.files.insert(path.into(), fingerprint.into());
    }

    /// Whether `path` counts as changed against this snapshot. A path the
    /// snapshot has never seen is changed.
    pub fn differs(&self, path: &str, fingerprint: &str) -> bool {
        self.get(path) != Some(fingerprint)
    }

    pub fn load(path: &Path) -> CaptureResult<Self> {
        Ok(read_json_file(path)?.unwrap_or_default())
    }

    pub fn save(&self, path: &Path) -> CaptureResult<()> {
        write_json_atomic(path, self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unseen_and_modified_paths_differ() {
        let mut snap = FingerprintSnapshot::default();
        snap.insert("a.rs", "111");
        assert!(!snap.differs("a.rs", "111"));
        assert!(snap.differs("a.rs", "222"));
        assert!(snap.differs("b.rs", "111"));
    }

    #[test]
    fn save_and_load() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("fingerprints.json");
        let mut snap = FingerprintSnapshot::default();
        snap.insert("src/lib.rs", "abc");
        snap.insert("gone.txt", DELETED);
        snap.save(&path).unwrap();
        assert_eq!(FingerprintSnapshot::load(&path).unwrap(), snap);
    }

    #[test]
    fn load_missing_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let snap = FingerprintSnapshot::load(&tmp.path().join("nope.json")).unwrap();
        assert!(snap.is_empty());
    }
}

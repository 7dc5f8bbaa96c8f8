//! Per-repository store under `<workdir>/.promptlog/`.
//!
//! Every file is read whole and rewritten whole through a temp file in the
//! same directory followed by a rename, so readers never see a torn write.

pub mod cursor;
pub mod fingerprint;
pub mod record;
pub mod state;

use crate::error::{CaptureError, CaptureResult};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Name of the store directory at the root of the working tree.
pub const STORE_DIR: &str = ".promptlog";

const SESSIONS_FILE: &str = "sessions.json";
const FINGERPRINTS_FILE: &str = "fingerprints.json";
const CURSOR_FILE: &str = "cursor.json";

/// Paths of the store files for one repository.
#[derive(Debug, Clone)]
pub struct StoreLayout {
    dir: PathBuf,
}

impl StoreLayout {
    pub fn for_workdir(workdir: &Path) -> Self {
        Self {
            dir: workdir.join(STORE_DIR),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn sessions_path(&self) -> PathBuf {
        self.dir.join(SESSIONS_FILE)
    }

    pub fn fingerprints_path(&self) -> PathBuf {
        self.dir.join(FINGERPRINTS_FILE)
    }

    pub fn cursor_path(&self) -> PathBuf {
        self.dir.join(CURSOR_FILE)
    }
}

/// Read and deserialize a JSON file, returning `None` if it doesn't exist.
pub fn read_json_file<T: DeserializeOwned>(path: &Path) -> CaptureResult<Option<T>> {
    match fs::read_to_string(path) {
        Ok(s) if s.trim().is_empty() => Ok(None),
        Ok(s) => serde_json::from_str(&s)
            .map(Some)
            .map_err(|source| CaptureError::Malformed {
                path: path.to_path_buf(),
                source,
            }),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(CaptureError::storage(path, e)),
    }
}

/// Serialize `value` as pretty JSON and atomically replace `path` with it.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> CaptureResult<()> {
    let json = serde_json::to_vec_pretty(value).map_err(|source| CaptureError::Malformed {
        path: path.to_path_buf(),
        source,
    })?;
    write_atomic(path, &json)
}

/// Atomic write: write to temp file in same dir, then rename.
pub fn write_atomic(path: &Path, data: &[u8]) -> CaptureResult<()> {
    let parent = path.parent().ok_or_else(|| {
        CaptureError::storage(
            path,
            io::Error::new(io::ErrorKind::InvalidInput, "no parent directory"),
        )
    })?;
    fs::create_dir_all(parent).map_err(|e| CaptureError::storage(parent, e))?;
    let mut tmp = tempfile::NamedTempFile::new_in(parent)
        .map_err(|e| CaptureError::storage(parent, e))?;
    tmp.write_all(data)
        .and_then(|()| tmp.flush())
        .map_err(|e| CaptureError::storage(path, e))?;
    tmp.persist(path)
        .map_err(|e| CaptureError::storage(path, e.error))?;
    Ok(())
}

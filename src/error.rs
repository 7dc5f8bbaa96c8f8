//! Error taxonomy for the capture path.
//!
//! Every variant is non-fatal to the hook process: `capture::run_hook`
//! classifies and logs them, then exits as if nothing new was found.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CaptureError {
    /// Not inside a repository, bare repository, or a git query failed.
    #[error("environment: {0}")]
    Environment(String),

    /// Git library error while querying the working tree.
    #[error("git query failed: {0}")]
    Git(#[from] git2::Error),

    /// Reading or writing one of the store files failed.
    #[error("storage error at {}: {source}", path.display())]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A store file exists but does not hold the expected JSON.
    #[error("malformed store file {}: {source}", path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Summary template could not be parsed or rendered.
    #[error("summary template: {0}")]
    Template(String),
}

impl CaptureError {
    pub fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Storage {
            path: path.into(),
            source,
        }
    }

    /// Environment errors mean "no capture possible here" and are expected
    /// whenever the hook fires outside a repository.
    pub fn is_environment(&self) -> bool {
        matches!(self, Self::Environment(_) | Self::Git(_))
    }
}

pub type CaptureResult<T> = Result<T, CaptureError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_environment_errors() {
        assert!(CaptureError::Environment("not a repo".into()).is_environment());
        assert!(CaptureError::Git(git2::Error::from_str("boom")).is_environment());
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        assert!(!CaptureError::storage("/tmp/x", io).is_environment());
        assert!(!CaptureError::Template("bad".into()).is_environment());
    }

    #[test]
    fn storage_error_names_the_path() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = CaptureError::storage("/repo/.promptlog/sessions.json", io);
        assert_eq!(
            err.to_string(),
            "storage error at /repo/.promptlog/sessions.json: gone"
        );
    }
}

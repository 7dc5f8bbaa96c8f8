//! Read-only queries against the working repository. Nothing here mutates
//! the repository, its index, or its refs.

use crate::error::{CaptureError, CaptureResult};
use crate::resolver::WorkingTree;
use crate::store::STORE_DIR;
use crate::store::fingerprint::DELETED;
use std::io;
use std::path::{Path, PathBuf};

/// Repository facts recorded alongside each capture.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepoFacts {
    pub repo_path: String,
    pub branch: Option<String>,
    pub head: Option<String>,
}

pub struct GitRepo {
    repo: git2::Repository,
    workdir: PathBuf,
}

impl GitRepo {
    /// Find the repository containing `cwd`.
    pub fn discover(cwd: &Path) -> CaptureResult<Self> {
        let repo = git2::Repository::discover(cwd).map_err(|e| {
            CaptureError::Environment(format!("no git repository at {}: {}", cwd.display(), e.message()))
        })?;
        let workdir = repo
            .workdir()
            .ok_or_else(|| CaptureError::Environment("git repo is bare, no working directory".into()))?
            .to_path_buf();
        Ok(Self { repo, workdir })
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Hash of the commit HEAD points at, `None` before the first commit.
    pub fn head_hash(&self) -> Option<String> {
        self.repo
            .head()
            .ok()
            .and_then(|h| h.peel_to_commit().ok())
            .map(|c| c.id().to_string())
    }

    /// Short name of the checked-out branch. Works on an unborn branch too;
    /// `None` when HEAD is detached.
    pub fn branch(&self) -> Option<String> {
        if let Ok(head) = self.repo.head() {
            return if head.is_branch() {
                head.shorthand().map(String::from)
            } else {
                None
            };
        }
        self.repo
            .find_reference("HEAD")
            .ok()
            .and_then(|r| r.symbolic_target().map(String::from))
            .map(|target| target.trim_start_matches("refs/heads/").to_string())
    }

    pub fn facts(&self) -> RepoFacts {
        RepoFacts {
            repo_path: self
                .workdir
                .to_string_lossy()
                .trim_end_matches('/')
                .to_string(),
            branch: self.branch(),
            head: self.head_hash(),
        }
    }

    fn head_tree(&self) -> Option<git2::Tree<'_>> {
        self.repo.head().ok().and_then(|h| h.peel_to_tree().ok())
    }
}

impl WorkingTree for GitRepo {
    fn changed_paths(&self) -> CaptureResult<Vec<String>> {
        let mut opts = git2::StatusOptions::new();
        opts.include_untracked(true)
            .recurse_untracked_dirs(true)
            .include_ignored(false)
            .exclude_submodules(true);
        let statuses = self.repo.statuses(Some(&mut opts))?;
        let mut paths: Vec<String> = statuses
            .iter()
            .filter(|s| !s.status().is_ignored() && s.status() != git2::Status::CURRENT)
            .filter_map(|s| s.path().map(String::from))
            .filter(|p| !Path::new(p).starts_with(STORE_DIR))
            .collect();
        paths.sort();
        paths.dedup();
        Ok(paths)
    }

    fn fingerprint(&self, path: &str) -> CaptureResult<String> {
        let full = self.workdir.join(path);
        match full.symlink_metadata() {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(DELETED.to_string()),
            Err(e) => return Err(CaptureError::storage(full, e)),
        }
        let oid = git2::Oid::hash_file(git2::ObjectType::Blob, &full)?;
        Ok(oid.to_string())
    }

    fn diff_for(&self, paths: &[String]) -> CaptureResult<String> {
        if paths.is_empty() {
            return Ok(String::new());
        }
        let mut opts = git2::DiffOptions::new();
        for path in paths {
            opts.pathspec(path);
        }
        opts.disable_pathspec_match(true)
            .include_untracked(true)
            .recurse_untracked_dirs(true)
            .show_untracked_content(true);

        let tree = self.head_tree();
        let diff = self
            .repo
            .diff_tree_to_workdir_with_index(tree.as_ref(), Some(&mut opts))?;

        let mut out = String::new();
        diff.print(git2::DiffFormat::Patch, |_delta, _hunk, line| {
            if let origin @ ('+' | '-' | ' ') = line.origin() {
                out.push(origin);
            }
            out.push_str(&String::from_utf8_lossy(line.content()));
            true
        })?;
        Ok(out)
    }
}

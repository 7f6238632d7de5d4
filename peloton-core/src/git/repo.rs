//! Git repository detection and last-commit diffs

use std::path::{Path, PathBuf};

use git2::{Commit, DiffFormat, DiffOptions, Repository};

use crate::{Error, Result};

/// A git repository wrapper exposing what the templating commands need
pub struct GitRepo {
    repo: Repository,
    root: PathBuf,
}

impl std::fmt::Debug for GitRepo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitRepo")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

impl GitRepo {
    /// Open a git repository at the given path
    ///
    /// This will search upward from the given path to find the repository root.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let repo = Repository::discover(path).map_err(|e| {
            if e.code() == git2::ErrorCode::NotFound {
                Error::Config(format!("Not a git repository: {}", path.display()))
            } else {
                Error::Git(e)
            }
        })?;

        let root = repo
            .workdir()
            .ok_or_else(|| Error::Config("Bare repositories are not supported".to_string()))?
            .to_path_buf();

        Ok(Self { repo, root })
    }

    /// Get the repository root path
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Check if the given path is inside a git repository
    pub fn is_git_repo(path: impl AsRef<Path>) -> bool {
        Repository::discover(path.as_ref()).is_ok()
    }

    fn head_and_parent(&self) -> Result<(Commit<'_>, Commit<'_>)> {
        let head = self.repo.head()?.peel_to_commit()?;
        let parent = head.parent(0).map_err(|_| {
            Error::Other("HEAD has no parent commit to compare against".to_string())
        })?;
        Ok((head, parent))
    }

    fn last_commit_diff(&self, pathspec: Option<&Path>) -> Result<git2::Diff<'_>> {
        let (head, parent) = self.head_and_parent()?;

        let mut opts = DiffOptions::new();
        if let Some(path) = pathspec {
            opts.pathspec(path).disable_pathspec_match(true);
        }

        Ok(self.repo.diff_tree_to_tree(
            Some(&parent.tree()?),
            Some(&head.tree()?),
            Some(&mut opts),
        )?)
    }

    /// Files changed between `HEAD^` and `HEAD`, relative to the root
    pub fn changed_files(&self) -> Result<Vec<PathBuf>> {
        let diff = self.last_commit_diff(None)?;

        Ok(diff
            .deltas()
            .filter_map(|delta| {
                delta
                    .new_file()
                    .path()
                    .or_else(|| delta.old_file().path())
                    .map(Path::to_path_buf)
            })
            .collect())
    }

    /// Unified diff of one file between `HEAD^` and `HEAD`
    pub fn file_diff(&self, path: &Path) -> Result<String> {
        let diff = self.last_commit_diff(Some(path))?;

        let mut text = String::new();
        diff.print(DiffFormat::Patch, |_delta, _hunk, line| {
            if matches!(line.origin(), '+' | '-' | ' ') {
                text.push(line.origin());
            }
            text.push_str(&String::from_utf8_lossy(line.content()));
            true
        })?;

        Ok(text.trim_end().to_string())
    }
}

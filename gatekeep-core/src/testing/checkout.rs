//! Throwaway worktrees holding the branch under test

use std::path::{Path, PathBuf};

use git2::Repository;

use crate::{git, Error, Result};

/// `~/.cache/gatekeep/worktrees`, or the temp dir without a cache dir
pub fn default_worktree_root() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("gatekeep")
        .join("worktrees")
}

/// Filesystem-safe directory name for a branch
pub fn worktree_name(branch: &str, suffix: &str) -> String {
    let safe_branch = branch.replace(['/', '\\', ':'], "-");
    format!("{}-{}", safe_branch, suffix)
}

/// A detached worktree at the tip of one branch
#[derive(Debug)]
pub struct BranchCheckout {
    repo: PathBuf,
    path: PathBuf,
    commit: String,
}

impl BranchCheckout {
    /// Check out `branch` of the repository containing `repo` at `path`
    ///
    /// The branch is fetched from `remote` first when that remote exists; the
    /// remote-tracking ref wins over a local branch of the same name.
    pub async fn create(repo: &Path, remote: &str, branch: &str, path: &Path) -> Result<Self> {
        let (root, has_remote) = inspect(repo)?;

        if has_remote {
            if let Err(e) = git::run(&root, &["fetch", remote, branch]).await {
                tracing::warn!(%branch, error = %e, "Fetch failed, using local refs");
            }
        }

        let commit = resolve_branch(&root, remote, branch)?;

        if path.exists() {
            tracing::debug!(path = %path.display(), "Replacing stale worktree");
            remove_worktree(&root, path).await;
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::TestGate(format!("Failed to create worktree directory: {}", e))
            })?;
        }

        let target = path.to_string_lossy();
        git::run(&root, &["worktree", "add", "--detach", &target, &commit])
            .await
            .map_err(Error::TestGate)?;

        tracing::debug!(%branch, commit = %commit, path = %path.display(), "Branch checked out");
        Ok(Self {
            repo: root,
            path: path.to_path_buf(),
            commit,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Full SHA the worktree was created at
    pub fn commit(&self) -> &str {
        &self.commit
    }

    pub async fn remove(self) {
        remove_worktree(&self.repo, &self.path).await;
    }
}

/// Working directory root, and whether any remote is configured
fn inspect(repo: &Path) -> Result<(PathBuf, bool)> {
    let repository = Repository::discover(repo).map_err(|e| {
        Error::TestGate(format!("Not a git repository: {} ({})", repo.display(), e))
    })?;
    let root = repository
        .workdir()
        .ok_or_else(|| Error::TestGate("Bare repositories are not supported".to_string()))?
        .to_path_buf();
    let has_remote = repository
        .remotes()
        .map(|names| !names.is_empty())
        .unwrap_or(false);
    Ok((root, has_remote))
}

fn resolve_branch(root: &Path, remote: &str, branch: &str) -> Result<String> {
    let repository = Repository::open(root)
        .map_err(|e| Error::TestGate(format!("Git error: {}", e)))?;

    let candidates = [
        format!("refs/remotes/{}/{}", remote, branch),
        format!("refs/heads/{}", branch),
    ];
    for name in &candidates {
        let found = repository
            .find_reference(name)
            .and_then(|reference| reference.peel_to_commit());
        if let Ok(commit) = found {
            return Ok(commit.id().to_string());
        }
    }

    Err(Error::TestGate(format!("Branch '{}' not found", branch)))
}

async fn remove_worktree(root: &Path, path: &Path) {
    let target = path.to_string_lossy();
    if let Err(e) = git::run(root, &["worktree", "remove", "--force", &target]).await {
        tracing::debug!(error = %e, "worktree remove failed, deleting directory");
        if path.exists() {
            if let Err(e) = std::fs::remove_dir_all(path) {
                tracing::warn!(path = %path.display(), error = %e, "Could not remove worktree");
            }
        }
        let _ = git::run(root, &["worktree", "prune"]).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::fixtures::Upstream;
    use tempfile::TempDir;

    #[test]
    fn test_worktree_name_is_flat() {
        assert_eq!(worktree_name("feature/a:b\\c", "1a2b3c4d"), "feature-a-b-c-1a2b3c4d");
    }

    #[tokio::test]
    async fn test_checkout_holds_branch_contents() {
        let upstream = Upstream::new();
        upstream.push_branch("feature/x", "extra.txt", "x\n");
        let scratch = TempDir::new().unwrap();
        let path = scratch.path().join("feature-x");

        let checkout = BranchCheckout::create(&upstream.work, "origin", "feature/x", &path)
            .await
            .unwrap();
        assert_eq!(checkout.path(), path.as_path());
        assert_eq!(checkout.commit().len(), 40);
        assert!(path.join("extra.txt").exists());
        assert!(!upstream.work.join("extra.txt").exists());

        checkout.remove().await;
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_stale_worktree_is_replaced() {
        let upstream = Upstream::new();
        upstream.push_branch("feature/x", "extra.txt", "x\n");
        let scratch = TempDir::new().unwrap();
        let path = scratch.path().join("feature-x");

        let first = BranchCheckout::create(&upstream.work, "origin", "feature/x", &path)
            .await
            .unwrap();
        std::fs::write(path.join("leftover.txt"), "junk").unwrap();
        drop(first);

        let second = BranchCheckout::create(&upstream.work, "origin", "feature/x", &path)
            .await
            .unwrap();
        assert!(!path.join("leftover.txt").exists());
        second.remove().await;
    }

    #[tokio::test]
    async fn test_missing_branch() {
        let upstream = Upstream::new();
        let scratch = TempDir::new().unwrap();
        let result = BranchCheckout::create(
            &upstream.work,
            "origin",
            "feature/missing",
            &scratch.path().join("missing"),
        )
        .await;
        assert!(matches!(result, Err(Error::TestGate(msg)) if msg.contains("feature/missing")));
    }

    #[tokio::test]
    async fn test_not_a_repository() {
        let dir = TempDir::new().unwrap();
        let result =
            BranchCheckout::create(dir.path(), "origin", "main", &dir.path().join("wt")).await;
        assert!(matches!(result, Err(Error::TestGate(_))));
    }
}

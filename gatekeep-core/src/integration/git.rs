//! Merges through the git command line

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use git2::{Oid, Repository, RepositoryState};

use crate::{git, Error, Result};

use super::IntegrationExecutor;

/// Fetches, merges with `--no-ff` and pushes using the local git binary
#[derive(Debug, Clone)]
pub struct GitMergeExecutor {
    root: PathBuf,
    remote: String,
    target_branch: String,
}

impl GitMergeExecutor {
    /// Open the repository containing `path`
    ///
    /// The target branch is detected (main, then master) when not given.
    pub fn open(
        path: impl AsRef<Path>,
        remote: impl Into<String>,
        target_branch: Option<String>,
    ) -> Result<Self> {
        let path = path.as_ref();
        let remote = remote.into();

        let repo = Repository::discover(path).map_err(|e| {
            if e.code() == git2::ErrorCode::NotFound {
                Error::Config(format!("Not a git repository: {}", path.display()))
            } else {
                Error::Integration(format!("Git error: {}", e))
            }
        })?;

        let root = repo
            .workdir()
            .ok_or_else(|| Error::Config("Bare repositories are not supported".to_string()))?
            .to_path_buf();

        if repo.find_remote(&remote).is_err() {
            return Err(Error::Config(format!(
                "Remote '{}' is not configured in {}",
                remote,
                root.display()
            )));
        }

        let target_branch = match target_branch {
            Some(branch) => branch,
            None => default_branch(&repo, &remote),
        };

        tracing::debug!(
            root = %root.display(),
            %remote,
            target = %target_branch,
            "Merge executor ready"
        );

        Ok(Self {
            root,
            remote,
            target_branch,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn target_branch(&self) -> &str {
        &self.target_branch
    }

    /// The git invocations one merge consists of, in order
    pub fn plan(&self, branch: &str, message: &str) -> Vec<Vec<String>> {
        let remote_branch = format!("{}/{}", self.remote, branch);
        [
            vec!["fetch", &self.remote, branch, &self.target_branch],
            vec!["checkout", &self.target_branch],
            vec!["pull", "--ff-only", &self.remote, &self.target_branch],
            vec!["merge", "--no-ff", &remote_branch, "-m", message],
            vec!["push", &self.remote, &self.target_branch],
        ]
        .into_iter()
        .map(|args| args.into_iter().map(str::to_string).collect())
        .collect()
    }

    async fn git(&self, args: &[&str]) -> Result<()> {
        git::run(&self.root, args).await.map_err(Error::Integration)
    }

    fn open_repo(&self) -> Result<Repository> {
        Repository::open(&self.root)
            .map_err(|e| Error::Integration(format!("Git error: {}", e)))
    }

    fn head_commit(&self) -> Result<Oid> {
        let repo = self.open_repo()?;
        let head = repo
            .head()
            .and_then(|head| head.peel_to_commit())
            .map_err(|e| Error::Integration(format!("Cannot resolve HEAD: {}", e)))?;
        Ok(head.id())
    }

    /// Abort a half-finished merge left behind by an earlier run
    async fn clear_merge_state(&self) -> Result<()> {
        let state = self.open_repo()?.state();
        if state == RepositoryState::Clean {
            return Ok(());
        }

        tracing::warn!(
            root = %self.root.display(),
            ?state,
            "Repository is not clean, aborting leftover operation"
        );
        self.abort_merge().await;

        let state = self.open_repo()?.state();
        if state != RepositoryState::Clean {
            return Err(Error::Integration(format!(
                "Repository {} is stuck in {:?} state",
                self.root.display(),
                state
            )));
        }
        Ok(())
    }

    async fn abort_merge(&self) {
        if let Err(abort) = self.git(&["merge", "--abort"]).await {
            tracing::debug!(error = %abort, "merge --abort failed, resetting");
            if let Err(e) = self.git(&["reset", "--merge"]).await {
                tracing::warn!(error = %e, "Could not reset merge state");
            }
        }
    }

    /// Undo the local effects of a failed step
    async fn roll_back(&self, subcommand: &str, before_merge: Option<Oid>) {
        match (subcommand, before_merge) {
            ("merge", _) => self.abort_merge().await,
            ("push", Some(oid)) => {
                let oid = oid.to_string();
                if let Err(e) = self.git(&["reset", "--hard", &oid]).await {
                    tracing::warn!(error = %e, commit = %oid, "Could not drop unpushed merge");
                }
            }
            _ => {}
        }
    }
}

#[async_trait]
impl IntegrationExecutor for GitMergeExecutor {
    async fn merge(&self, branch: &str, message: &str) -> Result<()> {
        tracing::info!(%branch, target = %self.target_branch, "Starting automatic merge");
        self.clear_merge_state().await?;

        let mut before_merge = None;
        for step in self.plan(branch, message) {
            let args: Vec<&str> = step.iter().map(String::as_str).collect();
            if args[0] == "merge" {
                before_merge = Some(self.head_commit()?);
            }

            if let Err(e) = self.git(&args).await {
                tracing::warn!(%branch, error = %e, "Merge step failed, rolling back");
                self.roll_back(args[0], before_merge).await;
                return Err(e);
            }
        }

        tracing::info!(%branch, target = %self.target_branch, "Merge pushed");
        Ok(())
    }
}

/// main or master, preferring the remote's refs over local ones
fn default_branch(repo: &Repository, remote: &str) -> String {
    let candidates = [
        format!("refs/remotes/{}/main", remote),
        format!("refs/remotes/{}/master", remote),
        "refs/heads/main".to_string(),
        "refs/heads/master".to_string(),
    ];

    candidates
        .iter()
        .find(|name| repo.find_reference(name).is_ok())
        .and_then(|name| name.rsplit('/').next())
        .unwrap_or("main")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn repo_with_origin() -> TempDir {
        let dir = TempDir::new().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        repo.remote("origin", "https://example.com/repo.git").unwrap();
        dir
    }

    #[test]
    fn test_open_non_git_dir() {
        let dir = TempDir::new().unwrap();
        let result = GitMergeExecutor::open(dir.path(), "origin", None);
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_open_missing_remote() {
        let dir = TempDir::new().unwrap();
        Repository::init(dir.path()).unwrap();
        let result = GitMergeExecutor::open(dir.path(), "origin", None);
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_default_branch_falls_back_to_main() {
        let dir = repo_with_origin();
        let executor = GitMergeExecutor::open(dir.path(), "origin", None).unwrap();
        assert_eq!(executor.target_branch(), "main");
    }

    #[test]
    fn test_explicit_target_branch() {
        let dir = repo_with_origin();
        let executor =
            GitMergeExecutor::open(dir.path(), "origin", Some("develop".to_string())).unwrap();
        assert_eq!(executor.target_branch(), "develop");
    }

    #[test]
    fn test_merge_plan() {
        let dir = repo_with_origin();
        let executor = GitMergeExecutor::open(dir.path(), "origin", None).unwrap();

        let plan = executor.plan("feature/x", "Merge abc1234 (review approved)");
        assert_eq!(plan.len(), 5);
        assert_eq!(plan[0], ["fetch", "origin", "feature/x", "main"]);
        assert_eq!(plan[2], ["pull", "--ff-only", "origin", "main"]);
        assert_eq!(
            plan[3],
            ["merge", "--no-ff", "origin/feature/x", "-m", "Merge abc1234 (review approved)"]
        );
        assert_eq!(plan[4], ["push", "origin", "main"]);
    }

    mod against_remote {
        use super::*;
        use crate::git::fixtures::{git, Upstream};

        const MESSAGE: &str = "Merge 4444444 (review approved)";

        fn executor(upstream: &Upstream) -> GitMergeExecutor {
            GitMergeExecutor::open(&upstream.work, "origin", None).unwrap()
        }

        fn remote_subject(upstream: &Upstream) -> String {
            git(&upstream.bare, &["log", "-1", "--format=%s", "main"])
                .trim()
                .to_string()
        }

        fn state(upstream: &Upstream) -> RepositoryState {
            Repository::open(&upstream.work).unwrap().state()
        }

        #[tokio::test]
        async fn test_clean_merge_is_pushed() {
            let upstream = Upstream::new();
            upstream.push_branch("feature/b", "other.txt", "b\n");

            executor(&upstream).merge("feature/b", MESSAGE).await.unwrap();
            assert_eq!(remote_subject(&upstream), MESSAGE);
        }

        #[tokio::test]
        async fn test_conflict_does_not_block_next_merge() {
            let upstream = Upstream::new();
            upstream.push_branch("feature/a", "file.txt", "from a\n");
            upstream.advance_main("file.txt", "from main\n");
            upstream.push_branch("feature/b", "other.txt", "b\n");
            let executor = executor(&upstream);

            let err = executor.merge("feature/a", "conflicting").await.unwrap_err();
            let message = err.to_string();
            assert!(message.contains("git merge failed"), "{}", message);
            assert!(message.contains("CONFLICT"), "{}", message);
            assert_eq!(state(&upstream), RepositoryState::Clean);
            assert_eq!(remote_subject(&upstream), "main moves on");

            executor.merge("feature/b", MESSAGE).await.unwrap();
            assert_eq!(remote_subject(&upstream), MESSAGE);
        }

        #[tokio::test]
        async fn test_leftover_merge_state_is_cleared() {
            let upstream = Upstream::new();
            upstream.push_branch("feature/a", "file.txt", "from a\n");
            upstream.advance_main("file.txt", "from main\n");
            upstream.push_branch("feature/b", "other.txt", "b\n");

            // An interrupted run that never cleaned up
            let status = std::process::Command::new("git")
                .args(["merge", "--no-ff", "feature/a"])
                .current_dir(&upstream.work)
                .output()
                .unwrap()
                .status;
            assert!(!status.success());
            assert_eq!(state(&upstream), RepositoryState::Merge);

            executor(&upstream).merge("feature/b", MESSAGE).await.unwrap();
            assert_eq!(state(&upstream), RepositoryState::Clean);
            assert_eq!(remote_subject(&upstream), MESSAGE);
        }

        #[cfg(unix)]
        #[tokio::test]
        async fn test_rejected_push_drops_local_merge() {
            use std::os::unix::fs::PermissionsExt;

            let upstream = Upstream::new();
            upstream.push_branch("feature/b", "other.txt", "b\n");
            let hook = upstream.bare.join("hooks").join("pre-receive");
            std::fs::write(&hook, "#!/bin/sh\necho rejected >&2\nexit 1\n").unwrap();
            std::fs::set_permissions(&hook, std::fs::Permissions::from_mode(0o755)).unwrap();

            let executor = executor(&upstream);
            let before = executor.head_commit().unwrap();

            let err = executor.merge("feature/b", MESSAGE).await.unwrap_err();
            assert!(err.to_string().contains("git push failed"), "{}", err);
            assert_eq!(executor.head_commit().unwrap(), before);
            assert_eq!(remote_subject(&upstream), "base");
        }
    }
}

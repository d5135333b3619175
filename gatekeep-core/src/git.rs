//! Thin wrapper around the git binary

use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;

/// Characters of git output kept in an error message
const DETAIL_CHARS: usize = 300;

/// Run `git <args>` in `dir`
///
/// On failure the error carries the subcommand and git's complaint. Merge
/// conflicts are reported on stdout, so stdout stands in for an empty stderr.
pub(crate) async fn run(dir: &Path, args: &[&str]) -> std::result::Result<(), String> {
    let subcommand = args.first().copied().unwrap_or_default();
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| format!("git {} could not start: {}", subcommand, e))?;

    if output.status.success() {
        return Ok(());
    }

    Err(format!(
        "git {} failed: {}",
        subcommand,
        failure_detail(&output.stdout, &output.stderr)
    ))
}

fn failure_detail(stdout: &[u8], stderr: &[u8]) -> String {
    let stderr = String::from_utf8_lossy(stderr);
    let detail = if stderr.trim().is_empty() {
        String::from_utf8_lossy(stdout)
    } else {
        stderr
    };
    detail.trim().chars().take(DETAIL_CHARS).collect()
}

/// Real repositories with a bare `origin`, built with the git binary
#[cfg(test)]
pub(crate) mod fixtures {
    use std::path::{Path, PathBuf};
    use std::process::Command;

    use tempfile::TempDir;

    /// Run git, panicking on failure; returns stdout
    pub fn git(dir: &Path, args: &[&str]) -> String {
        let output = Command::new("git")
            .args(args)
            .current_dir(dir)
            .output()
            .expect("git binary");
        assert!(
            output.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8_lossy(&output.stdout).into_owned()
    }

    pub fn commit_file(dir: &Path, name: &str, contents: &str, message: &str) {
        std::fs::write(dir.join(name), contents).unwrap();
        git(dir, &["add", name]);
        git(dir, &["commit", "-q", "-m", message]);
    }

    /// A working clone on `main` plus its bare remote
    pub struct Upstream {
        _dir: TempDir,
        pub work: PathBuf,
        pub bare: PathBuf,
    }

    impl Upstream {
        /// Both repositories hold one commit with `file.txt` on `main`
        pub fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let bare = dir.path().join("remote.git");
            let work = dir.path().join("work");
            std::fs::create_dir_all(&work).unwrap();

            git(dir.path(), &["init", "-q", "--bare", "remote.git"]);
            git(&work, &["init", "-q"]);
            git(&work, &["symbolic-ref", "HEAD", "refs/heads/main"]);
            git(&work, &["config", "user.name", "Gatekeep Test"]);
            git(&work, &["config", "user.email", "gatekeep@example.com"]);
            git(&work, &["config", "commit.gpgsign", "false"]);
            git(&work, &["remote", "add", "origin", &bare.to_string_lossy()]);

            commit_file(&work, "file.txt", "base\n", "base");
            git(&work, &["push", "-q", "origin", "main"]);

            Self {
                _dir: dir,
                work,
                bare,
            }
        }

        /// Create `branch` from `main` with one commit and push it
        pub fn push_branch(&self, branch: &str, file: &str, contents: &str) {
            git(&self.work, &["checkout", "-q", "-b", branch, "main"]);
            commit_file(&self.work, file, contents, branch);
            git(&self.work, &["push", "-q", "origin", branch]);
            git(&self.work, &["checkout", "-q", "main"]);
        }

        /// Commit on `main` and push it
        pub fn advance_main(&self, file: &str, contents: &str) {
            commit_file(&self.work, file, contents, "main moves on");
            git(&self.work, &["push", "-q", "origin", "main"]);
        }
    }
}

//! Submit command - put a change on the review queue

use std::io::Read;
use std::path::PathBuf;

use clap::Args;
use gatekeep_core::Config;
use gatekeep_db::{NewQueueItem, SubmittedTests};

use super::open_queue;

/// Arguments for the submit command
#[derive(Args, Debug)]
pub struct SubmitArgs {
    /// Commit identifier
    #[arg(short, long)]
    pub commit: String,

    /// Branch carrying the change
    #[arg(short, long)]
    pub branch: String,

    /// Agent that authored the change
    #[arg(short, long)]
    pub author: String,

    /// File holding the unified diff ("-" reads stdin)
    #[arg(short, long, default_value = "-")]
    pub diff: PathBuf,

    /// Changed files; taken from the diff headers when omitted
    #[arg(short, long, value_delimiter = ',')]
    pub files: Vec<String>,

    /// Higher priorities are reviewed first
    #[arg(short, long, default_value = "0")]
    pub priority: i64,

    /// Line coverage of the submitted test run, in percent
    #[arg(long)]
    pub coverage: Option<f64>,

    /// Passed tests of the submitted run
    #[arg(long, requires = "coverage", default_value = "0")]
    pub passed: u32,

    /// Failed tests of the submitted run
    #[arg(long, requires = "coverage", default_value = "0")]
    pub failed: u32,
}

impl SubmitArgs {
    /// Execute the submit command
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let diff = if self.diff.as_os_str() == "-" {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        } else {
            std::fs::read_to_string(&self.diff).map_err(|e| {
                anyhow::anyhow!("Failed to read diff {}: {}", self.diff.display(), e)
            })?
        };

        let files = if self.files.is_empty() {
            files_from_diff(&diff)
        } else {
            self.files.clone()
        };

        let mut item = NewQueueItem::new(&self.commit, &self.branch, &self.author, diff, files)
            .with_priority(self.priority);
        if let Some(coverage) = self.coverage {
            item = item.with_test_results(
                SubmittedTests::new(coverage).with_counts(self.passed, self.failed),
            );
        }

        let queue = open_queue(config).await?;
        let id = queue.submit(item).await?;

        tracing::info!(queue_id = %id, commit = %self.commit, "Change submitted");
        println!("{}", id);

        Ok(())
    }
}

/// Paths named by `+++ b/<path>` headers, in order, without /dev/null
fn files_from_diff(diff: &str) -> Vec<String> {
    let mut files: Vec<String> = Vec::new();
    for line in diff.lines() {
        let Some(path) = line.strip_prefix("+++ ") else {
            continue;
        };
        let path = path.split('\t').next().unwrap_or(path).trim();
        if path == "/dev/null" {
            continue;
        }
        let path = path.strip_prefix("b/").unwrap_or(path).to_string();
        if !files.contains(&path) {
            files.push(path);
        }
    }
    files
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_files_from_diff() {
        let diff = "\
diff --git a/src/lib.rs b/src/lib.rs
--- a/src/lib.rs
+++ b/src/lib.rs
@@ -1 +1 @@
-a
+b
diff --git a/old.txt b/old.txt
--- a/old.txt
+++ /dev/null
diff --git a/docs/README.md b/docs/README.md
--- /dev/null
+++ b/docs/README.md\t2024-01-01
";
        assert_eq!(files_from_diff(diff), vec!["src/lib.rs", "docs/README.md"]);
    }

    #[test]
    fn test_files_from_plain_text() {
        assert!(files_from_diff("not a diff").is_empty());
    }
}

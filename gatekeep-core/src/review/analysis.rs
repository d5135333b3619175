//! Structural analysis, coverage validation and documentation checks

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use gatekeep_db::SubmittedTests;

use crate::Result;

/// Findings of a structural analysis pass, grouped by concern
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub security: Vec<String>,
    pub performance: Vec<String>,
    pub patterns: Vec<String>,
    pub readability: Vec<String>,
    /// Set when the analyzer could not run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unavailable: Option<String>,
}

impl AnalysisReport {
    /// Report standing in for an analyzer that failed or timed out
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            unavailable: Some(reason.into()),
            ..Default::default()
        }
    }

    pub fn finding_count(&self) -> usize {
        self.security.len() + self.performance.len() + self.patterns.len() + self.readability.len()
    }

    pub fn is_clean(&self) -> bool {
        self.unavailable.is_none() && self.finding_count() == 0
    }
}

/// Structural analysis capability
#[async_trait]
pub trait Analyzer: Send + Sync {
    /// Get the name of this analyzer
    fn name(&self) -> &'static str;

    /// Analyze a diff and the files it touches
    async fn analyze(&self, diff: &str, files: &[String]) -> Result<AnalysisReport>;
}

#[derive(Debug, Clone, Copy)]
enum Concern {
    Security,
    Performance,
    Pattern,
}

/// Markers looked for in added lines (lowercased)
const MARKERS: &[(Concern, &str, &str)] = &[
    (Concern::Security, "password =", "Possible hardcoded password"),
    (Concern::Security, "password=", "Possible hardcoded password"),
    (Concern::Security, "api_key", "Possible hardcoded API key"),
    (Concern::Security, "secret =", "Possible hardcoded secret"),
    (Concern::Security, "private key", "Private key material in diff"),
    (Concern::Security, "eval(", "Dynamic code evaluation"),
    (Concern::Security, "shell=true", "Shell command built from input"),
    (Concern::Security, "unsafe {", "New unsafe block"),
    (Concern::Security, "verify=false", "TLS verification disabled"),
    (Concern::Performance, "select *", "Unbounded SELECT *"),
    (Concern::Performance, "sleep(", "Blocking sleep"),
    (Concern::Performance, "thread::sleep", "Blocking sleep"),
    (Concern::Performance, ".collect::<vec<_>>().len()", "Collecting only to count"),
    (Concern::Pattern, ".unwrap()", "Unchecked unwrap"),
    (Concern::Pattern, "todo!", "Unimplemented code path"),
    (Concern::Pattern, "fixme", "FIXME left in change"),
    (Concern::Pattern, "console.log(", "Debug output left in change"),
    (Concern::Pattern, "println!(\"debug", "Debug output left in change"),
    (Concern::Pattern, "except:", "Bare except clause"),
];

const MAX_LINE_WIDTH: usize = 120;

/// Line scan of added diff lines for well-known risk markers
#[derive(Debug, Clone, Default)]
pub struct HeuristicAnalyzer;

impl HeuristicAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// Scan synchronously
    pub fn scan(&self, diff: &str, files: &[String]) -> AnalysisReport {
        let mut report = AnalysisReport::default();

        for (idx, line) in added_lines(diff) {
            let lowered = line.to_lowercase();

            for (concern, marker, message) in MARKERS {
                if !lowered.contains(marker) {
                    continue;
                }
                let bucket = match concern {
                    Concern::Security => &mut report.security,
                    Concern::Performance => &mut report.performance,
                    Concern::Pattern => &mut report.patterns,
                };
                push_unique(bucket, format!("{} (diff line {})", message, idx));
            }

            if is_sql_string_building(&lowered) {
                push_unique(
                    &mut report.security,
                    format!("SQL built by string concatenation (diff line {})", idx),
                );
            }

            if line.chars().count() > MAX_LINE_WIDTH {
                push_unique(
                    &mut report.readability,
                    format!("Line wider than {} columns (diff line {})", MAX_LINE_WIDTH, idx),
                );
            }
        }

        if files.len() > 20 {
            report.readability.push(format!(
                "Change touches {} files; consider splitting it",
                files.len()
            ));
        }

        report
    }
}

#[async_trait]
impl Analyzer for HeuristicAnalyzer {
    fn name(&self) -> &'static str {
        "heuristic"
    }

    async fn analyze(&self, diff: &str, files: &[String]) -> Result<AnalysisReport> {
        Ok(self.scan(diff, files))
    }
}

/// Added lines of a unified diff with their 1-based position in the diff
fn added_lines(diff: &str) -> impl Iterator<Item = (usize, &str)> {
    diff.lines()
        .enumerate()
        .filter(|(_, line)| line.starts_with('+') && !line.starts_with("+++"))
        .map(|(idx, line)| (idx + 1, &line[1..]))
}

fn is_sql_string_building(lowered: &str) -> bool {
    let has_sql = ["select ", "insert into", "update ", "delete from"]
        .iter()
        .any(|kw| lowered.contains(kw));
    let concatenates = lowered.contains("\" +")
        || lowered.contains("' +")
        || lowered.contains("format!(")
        || lowered.contains("f\"")
        || lowered.contains("% (");
    has_sql && concatenates
}

fn push_unique(bucket: &mut Vec<String>, finding: String) {
    if !bucket.contains(&finding) {
        bucket.push(finding);
    }
}

/// Outcome of checking submitted test results against the coverage floor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TestValidation {
    /// No results were supplied; tests are required
    NoTests { required: bool },
    /// Results were supplied and checked
    Validated {
        coverage: f64,
        threshold: f64,
        ok: bool,
        failed: u32,
        /// Touched files considered critical (`core` or `agent` in the path)
        critical_files: Vec<String>,
    },
}

impl TestValidation {
    pub fn evaluate(tests: Option<&SubmittedTests>, files: &[String], threshold: f64) -> Self {
        match tests {
            None => TestValidation::NoTests { required: true },
            Some(tests) => TestValidation::Validated {
                coverage: tests.coverage,
                threshold,
                ok: tests.coverage >= threshold && tests.failed == 0,
                failed: tests.failed,
                critical_files: files
                    .iter()
                    .filter(|f| f.contains("core") || f.contains("agent"))
                    .cloned()
                    .collect(),
            },
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, TestValidation::Validated { ok: true, .. })
    }
}

/// Whether the change carries documentation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocsCheck {
    pub has_docs: bool,
    pub required: bool,
}

impl DocsCheck {
    /// A doc-bearing file was touched, or the branch is documentation work
    pub fn evaluate(files: &[String], branch: &str) -> Self {
        let touches_docs = files.iter().any(|f| {
            let lowered = f.to_lowercase();
            lowered.contains("readme.md") || lowered.contains("docs/") || lowered.ends_with(".md")
        });
        let has_docs = touches_docs || branch.to_lowercase().contains("docs");
        Self {
            has_docs,
            required: !has_docs,
        }
    }
}

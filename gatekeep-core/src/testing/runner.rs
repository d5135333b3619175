//! Test framework detection and execution

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;

use serde::Serialize;
use tokio::process::Command;

/// Supported test frameworks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TestFramework {
    Cargo,
    Go,
    Pytest,
    PythonUnittest,
    Jest,
    Vitest,
    Mocha,
}

impl TestFramework {
    /// Detect the test framework from project files in the given directory
    pub fn detect(path: &Path) -> Option<Self> {
        if path.join("Cargo.toml").exists() {
            return Some(Self::Cargo);
        }
        if path.join("go.mod").exists() {
            return Some(Self::Go);
        }

        let file_contains = |name: &str, needle: &str| {
            std::fs::read_to_string(path.join(name))
                .map(|content| content.contains(needle))
                .unwrap_or(false)
        };

        if path.join("pytest.ini").exists()
            || path.join("conftest.py").exists()
            || file_contains("pyproject.toml", "[tool.pytest")
            || file_contains("setup.cfg", "[tool:pytest]")
        {
            return Some(Self::Pytest);
        }
        if ["setup.py", "pyproject.toml", "requirements.txt"]
            .iter()
            .any(|f| path.join(f).exists())
        {
            return Some(Self::PythonUnittest);
        }

        let package_json = std::fs::read_to_string(path.join("package.json")).ok()?;
        let js = [
            ("vitest", Self::Vitest),
            ("jest", Self::Jest),
            ("mocha", Self::Mocha),
        ];
        // Declared dependency first, then any mention (e.g. in scripts)
        js.iter()
            .find(|(name, _)| package_json.contains(&format!("\"{}\"", name)))
            .or_else(|| js.iter().find(|(name, _)| package_json.contains(name)))
            .map(|(_, framework)| *framework)
            .or(Some(Self::Jest))
    }

    /// Command running this framework's tests, narrowed by `filter`
    pub fn command(&self, filter: Option<&str>) -> Command {
        let (program, base): (&str, &[&str]) = match self {
            Self::Cargo => ("cargo", &["test", "--no-fail-fast"]),
            Self::Go => ("go", &["test", "-v", "./..."]),
            Self::Pytest => ("pytest", &["--tb=short", "-v"]),
            Self::PythonUnittest => ("python", &["-m", "unittest", "discover", "-v"]),
            Self::Jest => ("npx", &["jest"]),
            Self::Vitest => ("npx", &["vitest", "run"]),
            Self::Mocha => ("npx", &["mocha"]),
        };

        let mut cmd = Command::new(program);
        cmd.args(base);

        if let Some(filter) = filter {
            let flag = match self {
                Self::Cargo => None,
                Self::Go => Some("-run"),
                Self::Pytest | Self::PythonUnittest => Some("-k"),
                Self::Jest | Self::Vitest => Some("-t"),
                Self::Mocha => Some("--grep"),
            };
            if let Some(flag) = flag {
                cmd.arg(flag);
            }
            cmd.arg(filter);
        }

        cmd
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Cargo => "cargo test",
            Self::Go => "go test",
            Self::Pytest => "pytest",
            Self::PythonUnittest => "unittest",
            Self::Jest => "jest",
            Self::Vitest => "vitest",
            Self::Mocha => "mocha",
        }
    }

    /// Parse the framework's summary output
    pub fn parse(&self, stdout: &str, stderr: &str) -> TestResults {
        let combined = format!("{}\n{}", stdout, stderr);
        match self {
            Self::Cargo => parse_cargo(&combined),
            Self::Go => parse_go(&combined),
            Self::Pytest => parse_pytest(stdout),
            Self::PythonUnittest => parse_unittest(&combined),
            Self::Jest | Self::Vitest => parse_jest(&combined),
            Self::Mocha => parse_mocha(stdout),
        }
    }
}

/// Results of one test run
#[derive(Debug, Clone, Default, Serialize)]
pub struct TestResults {
    pub passed: u32,
    pub failed: u32,
    pub skipped: u32,
    pub duration_ms: u64,
    /// Set if the test command itself could not run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_error: Option<String>,
}

impl TestResults {
    pub fn with_error(error: impl Into<String>) -> Self {
        Self {
            execution_error: Some(error.into()),
            ..Default::default()
        }
    }

    /// All ran tests passed and at least one ran
    pub fn is_green(&self) -> bool {
        self.execution_error.is_none() && self.failed == 0 && self.passed > 0
    }

    pub fn no_tests_found(&self) -> bool {
        self.execution_error.is_none() && self.passed == 0 && self.failed == 0 && self.skipped == 0
    }

    pub fn summary(&self) -> String {
        if let Some(ref error) = self.execution_error {
            return format!("Execution error: {}", error);
        }
        if self.no_tests_found() {
            return "No tests found".to_string();
        }
        format!(
            "{} passed, {} failed, {} skipped ({}ms)",
            self.passed, self.failed, self.skipped, self.duration_ms
        )
    }
}

/// Runs a project's tests in a working directory
#[derive(Debug, Clone)]
pub struct TestRunner {
    workdir: PathBuf,
    framework: Option<TestFramework>,
}

impl TestRunner {
    /// Create a runner, detecting the framework from project files
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        let workdir = workdir.into();
        let framework = TestFramework::detect(&workdir);
        Self { workdir, framework }
    }

    /// Explicitly set the test framework
    pub fn with_framework(mut self, framework: TestFramework) -> Self {
        self.framework = Some(framework);
        self
    }

    pub fn framework(&self) -> Option<TestFramework> {
        self.framework
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Run the tests matching `filter` (all tests when `None`)
    pub async fn run(&self, filter: Option<&str>) -> TestResults {
        let Some(framework) = self.framework else {
            return TestResults::with_error("No test framework detected");
        };

        let mut cmd = framework.command(filter);
        cmd.current_dir(&self.workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let start = Instant::now();
        let output = match cmd.output().await {
            Ok(output) => output,
            Err(e) => {
                return TestResults::with_error(format!(
                    "Failed to run {}: {}",
                    framework.name(),
                    e
                ))
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let mut results = framework.parse(&stdout, &stderr);
        results.duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

        // A non-zero exit with nothing parsed still counts as a failure
        if results.no_tests_found() && !output.status.success() {
            results.failed = 1;
        }

        tracing::debug!(
            framework = framework.name(),
            filter = filter.unwrap_or("*"),
            summary = %results.summary(),
            "Test run finished"
        );

        results
    }
}

/// Sum the numbers preceding each keyword in a summary fragment
///
/// `"5 passed; 2 failed"` with keywords `passed`/`failed` yields `[5, 2]`.
fn tally<const N: usize>(text: &str, keywords: [&[&str]; N]) -> [u32; N] {
    let mut counts = [0u32; N];
    let words: Vec<&str> = text
        .split(|c: char| c.is_whitespace() || c == ',' || c == ';')
        .filter(|w| !w.is_empty())
        .collect();

    for pair in words.windows(2) {
        let Ok(n) = pair[0].parse::<u32>() else {
            continue;
        };
        let word = pair[1].trim_matches(|c: char| !c.is_alphanumeric());
        if let Some(slot) = keywords.iter().position(|names| names.contains(&word)) {
            counts[slot] += n;
        }
    }
    counts
}

fn results([passed, failed, skipped]: [u32; 3]) -> TestResults {
    TestResults {
        passed,
        failed,
        skipped,
        ..Default::default()
    }
}

/// "test result: ok. 5 passed; 0 failed; 1 ignored"
fn parse_cargo(output: &str) -> TestResults {
    let mut totals = [0u32; 3];
    for line in output.lines() {
        if let Some(rest) = line.trim().strip_prefix("test result:") {
            let counts = tally(rest, [&["passed"], &["failed"], &["ignored"]]);
            for (total, n) in totals.iter_mut().zip(counts) {
                *total += n;
            }
        }
    }
    results(totals)
}

/// "=== 5 passed, 2 failed, 1 skipped in 0.1s ==="
fn parse_pytest(stdout: &str) -> TestResults {
    let mut totals = [0u32; 3];
    for line in stdout.lines().filter(|l| l.contains("===")) {
        let counts = tally(line, [&["passed"], &["failed", "error", "errors"], &["skipped"]]);
        for (total, n) in totals.iter_mut().zip(counts) {
            *total += n;
        }
    }
    results(totals)
}

/// "Ran 5 tests" followed by "OK" or "FAILED (failures=2, errors=1)"
fn parse_unittest(output: &str) -> TestResults {
    let mut ran = 0u32;
    let mut failed = 0u32;
    let mut skipped = 0u32;

    for line in output.lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("Ran ") {
            ran = rest
                .split_whitespace()
                .next()
                .and_then(|n| n.parse().ok())
                .unwrap_or(0);
        }
        if line.starts_with("FAILED") || line.starts_with("OK (") {
            let inner = line
                .split_once('(')
                .and_then(|(_, rest)| rest.split_once(')'))
                .map(|(inner, _)| inner)
                .unwrap_or("");
            for part in inner.split(',') {
                let Some((key, value)) = part.trim().split_once('=') else {
                    continue;
                };
                let value: u32 = value.parse().unwrap_or(0);
                match key {
                    "failures" | "errors" => failed += value,
                    "skipped" => skipped += value,
                    _ => {}
                }
            }
        }
    }

    results([ran.saturating_sub(failed + skipped), failed, skipped])
}

/// "Tests:       2 passed, 1 skipped, 3 total"
fn parse_jest(output: &str) -> TestResults {
    let mut totals = [0u32; 3];
    for line in output.lines() {
        if let Some((_, rest)) = line.split_once("Tests:") {
            let counts = tally(rest, [&["passed"], &["failed"], &["skipped", "pending", "todo"]]);
            for (total, n) in totals.iter_mut().zip(counts) {
                *total += n;
            }
        }
    }
    results(totals)
}

/// "5 passing (10ms)", "2 failing", "1 pending"
fn parse_mocha(stdout: &str) -> TestResults {
    results(tally(stdout, [&["passing"], &["failing"], &["pending"]]))
}

/// Counts "--- PASS:", "--- FAIL:" and "--- SKIP:" lines; package
/// summaries when no per-test lines exist
fn parse_go(output: &str) -> TestResults {
    let count = |marker: &str| output.lines().filter(|l| l.contains(marker)).count() as u32;
    let (passed, failed, skipped) = (count("--- PASS:"), count("--- FAIL:"), count("--- SKIP:"));

    if passed == 0 && failed == 0 {
        let packages = |prefix: &str| {
            output
                .lines()
                .filter(|l| l.starts_with(prefix) && l.contains('\t'))
                .count() as u32
        };
        return results([packages("ok"), packages("FAIL"), skipped]);
    }

    results([passed, failed, skipped])
}

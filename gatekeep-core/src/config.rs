//! Configuration management for Gatekeep
//!
//! Configuration is loaded with the following priority (highest to lowest):
//! 1. CLI flags
//! 2. Environment variables (GATEKEEP_*)
//! 3. Config file (~/.config/gatekeep/config.toml)
//! 4. Default values

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Agents covered by the periodic retrospective
pub const DEFAULT_AGENT_ROSTER: [&str; 8] = [
    "python_agent",
    "javascript_agent",
    "typescript_agent",
    "go_agent",
    "rust_agent",
    "java_agent",
    "csharp_agent",
    "php_agent",
];

/// Scheduler loop configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Sleep between cycles
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,

    /// Maximum items fetched per cycle
    pub batch_size: usize,

    /// Merge approved changes automatically
    pub auto_merge: bool,

    /// Run the tests an approval asks for before merging
    pub run_tests: bool,

    /// Age in days after which merged items are swept
    pub retention_days: u32,

    /// Run a retrospective every N cycles (0 disables)
    pub retrospective_every: u64,

    /// Look-back window of a retrospective, in days
    pub retrospective_period_days: u32,

    /// Approval percentage under which training is dispatched
    pub approval_rate_floor: f64,

    /// Agents covered by the retrospective
    pub agent_roster: Vec<String>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(60),
            batch_size: 3,
            auto_merge: true,
            run_tests: true,
            retention_days: 30,
            retrospective_every: 10,
            retrospective_period_days: 7,
            approval_rate_floor: 60.0,
            agent_roster: DEFAULT_AGENT_ROSTER.iter().map(|a| a.to_string()).collect(),
        }
    }
}

/// Review policy configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Number of recent reviews checked for duplicates
    pub history_window: usize,

    /// Characters of the diff that go into the fingerprint
    pub fingerprint_prefix: usize,

    /// Minimum acceptable coverage, in percent
    pub coverage_threshold: f64,

    /// Characters of the diff included in the advisor request
    pub diff_excerpt: usize,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            history_window: 10,
            fingerprint_prefix: 500,
            coverage_threshold: 75.0,
            diff_excerpt: 1000,
        }
    }
}

/// Advisor (claude CLI) configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdvisorConfig {
    /// Path to the claude executable
    pub claude_path: String,

    /// Model to use for Claude
    pub model: Option<String>,

    /// Bound on a single advisor or analyzer call
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for AdvisorConfig {
    fn default() -> Self {
        Self {
            claude_path: "claude".to_string(),
            model: None, // Let claude use its default
            timeout: Duration::from_secs(30),
        }
    }
}

/// Test gate configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TestsConfig {
    /// Repository the branch under test is checked out from
    pub workdir: PathBuf,

    /// Bound on one test gate invocation
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for TestsConfig {
    fn default() -> Self {
        Self {
            workdir: PathBuf::from("."),
            timeout: Duration::from_secs(45),
        }
    }
}

/// Merge executor configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IntegrationConfig {
    /// Repository the merges happen in
    pub repo_path: PathBuf,

    /// Remote to fetch from and push to
    pub remote: String,

    /// Branch approved changes land on; detected when unset
    pub target_branch: Option<String>,

    /// Bound on one merge
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for IntegrationConfig {
    fn default() -> Self {
        Self {
            repo_path: PathBuf::from("."),
            remote: "origin".to_string(),
            target_branch: None,
            timeout: Duration::from_secs(60),
        }
    }
}

/// Queue database location
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub path: PathBuf,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: gatekeep_db::Database::default_path(),
        }
    }
}

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub scheduler: SchedulerConfig,
    pub policy: PolicyConfig,
    pub advisor: AdvisorConfig,
    pub tests: TestsConfig,
    pub integration: IntegrationConfig,
    pub database: DatabaseSettings,
}

/// Values given on the command line
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub db_path: Option<PathBuf>,
    pub repo_path: Option<PathBuf>,
    pub claude_path: Option<String>,
    pub model: Option<String>,
    pub poll_interval: Option<Duration>,
    pub batch_size: Option<usize>,
    pub auto_merge: Option<bool>,
    pub run_tests: Option<bool>,
}

impl Config {
    /// Load configuration from the default config file location
    ///
    /// Returns default config if file doesn't exist
    pub fn load() -> Result<Self> {
        if let Some(path) = Self::default_config_path() {
            if path.exists() {
                return Self::load_from_file(&path);
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))
    }

    /// Get the default config file path
    ///
    /// Returns `~/.config/gatekeep/config.toml` on Unix
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("gatekeep").join("config.toml"))
    }

    /// Apply environment variable overrides
    ///
    /// Supported variables:
    /// - GATEKEEP_POLL_INTERVAL_SECONDS, GATEKEEP_BATCH_SIZE
    /// - GATEKEEP_AUTO_MERGE, GATEKEEP_RUN_TESTS (true/1/yes)
    /// - GATEKEEP_RETENTION_DAYS
    /// - GATEKEEP_CLAUDE_PATH, GATEKEEP_MODEL
    /// - GATEKEEP_DB_PATH, GATEKEEP_REPO_PATH
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable source
    pub fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(secs) = parsed::<u64>(&lookup, "GATEKEEP_POLL_INTERVAL_SECONDS") {
            self.scheduler.poll_interval = Duration::from_secs(secs);
        }
        if let Some(size) = parsed::<usize>(&lookup, "GATEKEEP_BATCH_SIZE") {
            self.scheduler.batch_size = size;
        }
        if let Some(flag) = lookup("GATEKEEP_AUTO_MERGE") {
            self.scheduler.auto_merge = parse_flag(&flag);
        }
        if let Some(flag) = lookup("GATEKEEP_RUN_TESTS") {
            self.scheduler.run_tests = parse_flag(&flag);
        }
        if let Some(days) = parsed::<u32>(&lookup, "GATEKEEP_RETENTION_DAYS") {
            self.scheduler.retention_days = days;
        }
        if let Some(claude_path) = lookup("GATEKEEP_CLAUDE_PATH") {
            self.advisor.claude_path = claude_path;
        }
        if let Some(model) = lookup("GATEKEEP_MODEL") {
            self.advisor.model = Some(model);
        }
        if let Some(path) = lookup("GATEKEEP_DB_PATH") {
            self.database.path = PathBuf::from(path);
        }
        if let Some(path) = lookup("GATEKEEP_REPO_PATH") {
            self.integration.repo_path = PathBuf::from(path);
        }

        self
    }

    /// Apply CLI flag overrides
    pub fn with_cli_overrides(mut self, cli: CliOverrides) -> Self {
        if let Some(path) = cli.db_path {
            self.database.path = path;
        }
        if let Some(path) = cli.repo_path {
            self.integration.repo_path = path;
        }
        if let Some(path) = cli.claude_path {
            self.advisor.claude_path = path;
        }
        if let Some(m) = cli.model {
            self.advisor.model = Some(m);
        }
        if let Some(interval) = cli.poll_interval {
            self.scheduler.poll_interval = interval;
        }
        if let Some(size) = cli.batch_size {
            self.scheduler.batch_size = size;
        }
        if let Some(flag) = cli.auto_merge {
            self.scheduler.auto_merge = flag;
        }
        if let Some(flag) = cli.run_tests {
            self.scheduler.run_tests = flag;
        }

        self
    }

    /// Load configuration with all overrides applied
    ///
    /// Priority: CLI > env > config file > defaults
    pub fn load_with_overrides(cli: CliOverrides) -> Result<Self> {
        Ok(Self::load()?.with_env_overrides().with_cli_overrides(cli))
    }

    /// Render the effective configuration as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to render config: {}", e)))
    }
}

/// Boolean environment values: true/1/yes, case-insensitive
fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes"
    )
}

fn parsed<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "Ignoring unparsable environment override");
            None
        }
    }
}

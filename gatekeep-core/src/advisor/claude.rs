//! Claude CLI advisor

use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;

use crate::{Error, Result};

use super::{Advisor, AdvisorRequest, REVIEWER_SYSTEM_PROMPT};

/// Advisor backed by the `claude` CLI in print mode
#[derive(Debug, Clone)]
pub struct ClaudeAdvisor {
    pub claude_path: String,
    pub model: Option<String>,
}

impl ClaudeAdvisor {
    /// Create a new Claude advisor with default settings
    pub fn new() -> Self {
        Self {
            claude_path: "claude".to_string(),
            model: None,
        }
    }

    /// Use a custom claude executable
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.claude_path = path.into();
        self
    }

    /// Use a specific model
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Build the command for one request (prompt appended by the caller)
    pub fn build_command(&self) -> Command {
        let mut cmd = Command::new(&self.claude_path);
        cmd.arg("--print")
            .arg("--output-format")
            .arg("text")
            .arg("--system-prompt")
            .arg(REVIEWER_SYSTEM_PROMPT);

        if let Some(ref model) = self.model {
            cmd.arg("--model").arg(model);
        }

        // The caller bounds the call with a timeout; dropping the future
        // must not leave the process behind.
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        cmd
    }

    /// Check if the claude executable is installed
    pub fn is_available(&self) -> bool {
        std::process::Command::new(&self.claude_path)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .is_ok()
    }
}

impl Default for ClaudeAdvisor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Advisor for ClaudeAdvisor {
    fn name(&self) -> &'static str {
        "claude"
    }

    async fn advise(&self, request: &AdvisorRequest) -> Result<String> {
        let mut cmd = self.build_command();
        cmd.arg(request.render_prompt());

        let output = cmd.output().await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::Advisor(format!(
                    "Claude executable not found at '{}'. Is Claude Code installed?",
                    self.claude_path
                ))
            } else {
                Error::Io(e)
            }
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Advisor(format!(
                "claude exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let reply = String::from_utf8_lossy(&output.stdout).trim().to_string();
        tracing::debug!(
            commit = %request.commit_id,
            reply_len = reply.len(),
            "Advisor replied"
        );
        Ok(reply)
    }
}

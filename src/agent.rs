// src/agent.rs
// Subprocess wrapper around the external text-analysis CLI. Everything the
// rest of the crate knows about the tool lives here: the argument shape, the
// timeout handling, and the structured-output parsing for session resume.

use std::process::Stdio;
use std::time::Duration;

use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, warn};

/// Default per-invocation timeout (matches the pipeline's 5-minute budget).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

const ENV_AGENT_BIN: &str = "AGENT_BIN";
const DEFAULT_AGENT_BIN: &str = "claude";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    fn as_arg(self) -> &'static str {
        match self {
            OutputFormat::Text => "text",
            OutputFormat::Json => "json",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("agent binary '{0}' not found in PATH")]
    NotFound(String),

    /// The child is killed on timeout, never left orphaned.
    #[error("agent timed out after {0}s (process killed)")]
    Timeout(u64),

    #[error("agent exited with {code:?}: {stderr}")]
    Failed { code: Option<i32>, stderr: String },

    #[error("agent returned invalid JSON: {0}")]
    BadOutput(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Structured reply when invoked with JSON output (stateful interactions).
#[derive(Debug, Clone, Deserialize)]
pub struct AgentReply {
    #[serde(default)]
    pub result: String,
    /// Continuation token for resuming this conversation. Empty when the
    /// tool issued none.
    #[serde(default)]
    pub session_id: String,
}

impl AgentReply {
    pub fn session(&self) -> Option<&str> {
        if self.session_id.is_empty() {
            None
        } else {
            Some(self.session_id.as_str())
        }
    }
}

#[derive(Debug, Clone)]
pub struct AgentClient {
    bin: String,
}

impl AgentClient {
    pub fn new(bin: impl Into<String>) -> Self {
        Self { bin: bin.into() }
    }

    /// Binary name from `AGENT_BIN`, falling back to the stock CLI name.
    pub fn from_env() -> Self {
        Self::new(std::env::var(ENV_AGENT_BIN).unwrap_or_else(|_| DEFAULT_AGENT_BIN.into()))
    }

    pub fn bin(&self) -> &str {
        &self.bin
    }

    /// One-shot invocation, raw text output.
    pub async fn run_text(
        &self,
        prompt: &str,
        allowed_tools: &str,
        timeout: Duration,
    ) -> Result<String, AgentError> {
        let stdout = self
            .run(prompt, allowed_tools, OutputFormat::Text, None, timeout)
            .await?;
        Ok(stdout)
    }

    /// Stateful invocation: JSON output with an optional resume token in,
    /// and a (possibly new) continuation token out.
    pub async fn run_json(
        &self,
        prompt: &str,
        allowed_tools: &str,
        resume: Option<&str>,
        timeout: Duration,
    ) -> Result<AgentReply, AgentError> {
        let stdout = self
            .run(prompt, allowed_tools, OutputFormat::Json, resume, timeout)
            .await?;
        let reply: AgentReply = serde_json::from_str(stdout.trim())?;
        Ok(reply)
    }

    async fn run(
        &self,
        prompt: &str,
        allowed_tools: &str,
        format: OutputFormat,
        resume: Option<&str>,
        timeout: Duration,
    ) -> Result<String, AgentError> {
        let mut cmd = Command::new(&self.bin);
        cmd.arg("-p")
            .arg(prompt)
            .arg("--allowedTools")
            .arg(allowed_tools)
            .arg("--output-format")
            .arg(format.as_arg());
        if let Some(token) = resume {
            cmd.arg("--resume").arg(token);
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // Dropping the wait future on timeout must take the child with it.
            .kill_on_drop(true);

        debug!(bin = %self.bin, format = format.as_arg(), "invoking agent");

        let child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AgentError::NotFound(self.bin.clone())
            } else {
                AgentError::Io(e)
            }
        })?;

        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(bin = %self.bin, secs = timeout.as_secs(), "agent timed out, killing");
                return Err(AgentError::Timeout(timeout.as_secs()));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(AgentError::Failed {
                code: output.status.code(),
                stderr,
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

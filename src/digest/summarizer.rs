// src/digest/summarizer.rs
// Consolidation step: one agent invocation over the whole run folder. The
// agent is instructed to write its own summary artifact; its stdout is only
// a fallback.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use tracing::{info, warn};

use crate::agent::AgentClient;
use crate::digest::run::{DigestSummary, METADATA_FILENAME};
use crate::error::DigestError;

pub const SUMMARY_FILENAME: &str = "summary.md";

/// Capabilities granted to the consolidation invocation.
pub const SUMMARY_TOOLS: &str = "Read,Glob,Write";

#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, run_dir: &Path) -> Result<DigestSummary, DigestError>;
}

pub struct AgentSummarizer {
    agent: AgentClient,
    prompt_file: PathBuf,
    timeout: Duration,
}

impl AgentSummarizer {
    pub fn new(agent: AgentClient, prompt_file: PathBuf, timeout: Duration) -> Self {
        Self {
            agent,
            prompt_file,
            timeout,
        }
    }
}

/// Source artifacts in a run folder: every `.md` except the summary itself.
pub fn artifact_files(run_dir: &Path) -> Result<Vec<PathBuf>, DigestError> {
    let entries = fs::read_dir(run_dir)
        .with_context(|| format!("reading run folder {}", run_dir.display()))
        .map_err(DigestError::Other)?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(anyhow::Error::from)?.path();
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
        if name == SUMMARY_FILENAME || name == METADATA_FILENAME {
            continue;
        }
        if path.extension().and_then(|e| e.to_str()) == Some("md") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[async_trait]
impl Summarizer for AgentSummarizer {
    async fn summarize(&self, run_dir: &Path) -> Result<DigestSummary, DigestError> {
        let artifacts = artifact_files(run_dir)?;
        if artifacts.is_empty() {
            return Err(DigestError::Aggregation(format!(
                "no content to summarize in {}",
                run_dir.display()
            )));
        }

        if !self.prompt_file.exists() {
            return Err(DigestError::Configuration(format!(
                "summary prompt not found: {}",
                self.prompt_file.display()
            )));
        }
        let base = fs::read_to_string(&self.prompt_file)
            .with_context(|| format!("reading {}", self.prompt_file.display()))
            .map_err(DigestError::Other)?;
        let prompt = format!("{base}\n\n---\n\nAnalyze the files in folder: {}/", run_dir.display());

        info!(folder = %run_dir.display(), files = artifacts.len(), "running digest summary");

        let stdout = self
            .agent
            .run_text(&prompt, SUMMARY_TOOLS, self.timeout)
            .await
            .map_err(|e| DigestError::Aggregation(e.to_string()))?;

        // Prefer the artifact the agent wrote; it tends to carry richer
        // formatting than the output stream.
        let summary_path = run_dir.join(SUMMARY_FILENAME);
        let text = if summary_path.exists() {
            fs::read_to_string(&summary_path)
                .with_context(|| format!("reading {}", summary_path.display()))
                .map_err(DigestError::Other)?
        } else {
            warn!(folder = %run_dir.display(), "summary artifact missing, using agent stdout");
            stdout
        };

        Ok(DigestSummary {
            text,
            item_count: artifacts.len(),
            generated_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifacts_exclude_summary_and_metadata() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("a.md"), "a").unwrap();
        fs::write(tmp.path().join("b.md"), "b").unwrap();
        fs::write(tmp.path().join(SUMMARY_FILENAME), "old summary").unwrap();
        fs::write(tmp.path().join(METADATA_FILENAME), "{}").unwrap();
        fs::write(tmp.path().join("notes.txt"), "ignored").unwrap();

        let files = artifact_files(tmp.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["a.md", "b.md"]);
    }

    #[tokio::test]
    async fn empty_folder_is_an_aggregation_error() {
        let tmp = tempfile::tempdir().unwrap();
        let summarizer = AgentSummarizer::new(
            AgentClient::new("true"),
            tmp.path().join("prompt.md"),
            Duration::from_secs(5),
        );
        let err = summarizer.summarize(tmp.path()).await.unwrap_err();
        assert!(matches!(err, DigestError::Aggregation(_)));
        assert!(err.to_string().contains("no content to summarize"));
    }
}

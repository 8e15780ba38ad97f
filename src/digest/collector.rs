// src/digest/collector.rs
// Per-source collection: one agent invocation per source, sentinel detection
// for "no new content", and verbatim persistence of the agent's output under
// a filename derived from the source URL.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use once_cell::sync::OnceCell;
use regex::Regex;
use tracing::info;

use crate::agent::AgentClient;
use crate::digest::run::{FetchOutcome, SourceItem};
use crate::digest::sources::Source;
use crate::error::DigestError;

/// Exact sentinel the agent emits when a source has nothing new. Matched as
/// a substring anywhere in the output.
pub const NO_NEW_CONTENT: &str = "NO_NEW_CONTENT";

/// Capabilities granted to the per-source fetch invocation.
pub const FETCH_TOOLS: &str = "WebFetch,WebSearch,Read,Write";

/// Seam for the pipeline; the production impl shells out to the agent,
/// tests substitute canned outcomes.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn fetch(&self, source: &Source, out_dir: &Path) -> Result<SourceItem, DigestError>;
}

pub struct AgentFetcher {
    agent: AgentClient,
    prompt_file: PathBuf,
    timeout: Duration,
}

impl AgentFetcher {
    pub fn new(agent: AgentClient, prompt_file: PathBuf, timeout: Duration) -> Self {
        Self {
            agent,
            prompt_file,
            timeout,
        }
    }

    fn build_prompt(&self, source: &Source) -> Result<String, DigestError> {
        if !self.prompt_file.exists() {
            return Err(DigestError::Configuration(format!(
                "fetch prompt not found: {}",
                self.prompt_file.display()
            )));
        }
        let base = fs::read_to_string(&self.prompt_file)
            .with_context(|| format!("reading {}", self.prompt_file.display()))
            .map_err(DigestError::Other)?;
        // Name and URL are appended verbatim; the template stays fixed.
        Ok(format!(
            "{base}\n\n---\n\nSource to check:\n- NAME: {}\n- URL: {}",
            source.name, source.url
        ))
    }
}

#[async_trait]
impl SourceFetcher for AgentFetcher {
    async fn fetch(&self, source: &Source, out_dir: &Path) -> Result<SourceItem, DigestError> {
        let prompt = self.build_prompt(source)?;

        info!(source = %source.name, url = %source.url, "fetching source");

        let output = self
            .agent
            .run_text(&prompt, FETCH_TOOLS, self.timeout)
            .await
            .map_err(|e| DigestError::SourceFetch {
                name: source.name.clone(),
                reason: e.to_string(),
            })?;
        let output = output.trim();

        if output.contains(NO_NEW_CONTENT) {
            info!(source = %source.name, "no new content");
            return Ok(SourceItem {
                source: source.clone(),
                outcome: FetchOutcome::NoNewContent,
            });
        }

        let path = unique_artifact_path(out_dir, &url_to_filename(&source.url));
        fs::write(&path, output)
            .with_context(|| format!("writing {}", path.display()))
            .map_err(DigestError::Other)?;
        info!(source = %source.name, path = %path.display(), "saved source artifact");

        Ok(SourceItem {
            source: source.clone(),
            outcome: FetchOutcome::Found(path),
        })
    }
}

/// Derives a stable artifact filename from a source URL: scheme stripped,
/// runs of non-word characters collapsed to a single underscore.
pub fn url_to_filename(url: &str) -> String {
    static RE_SCHEME: OnceCell<Regex> = OnceCell::new();
    static RE_UNSAFE: OnceCell<Regex> = OnceCell::new();
    static RE_RUNS: OnceCell<Regex> = OnceCell::new();

    let re_scheme = RE_SCHEME.get_or_init(|| Regex::new(r"^https?://").unwrap());
    let re_unsafe = RE_UNSAFE.get_or_init(|| Regex::new(r"[^\w.]").unwrap());
    let re_runs = RE_RUNS.get_or_init(|| Regex::new(r"_+").unwrap());

    let stem = re_scheme.replace(url, "");
    let stem = re_unsafe.replace_all(&stem, "_");
    let stem = re_runs.replace_all(&stem, "_");
    let stem = stem.trim_matches('_');
    format!("{stem}.md")
}

/// Collision fallback: two sources may normalize to the same filename, so
/// existing paths get a numeric suffix instead of being overwritten.
pub fn unique_artifact_path(dir: &Path, filename: &str) -> PathBuf {
    let candidate = dir.join(filename);
    if !candidate.exists() {
        return candidate;
    }
    let stem = filename.strip_suffix(".md").unwrap_or(filename);
    for n in 2.. {
        let candidate = dir.join(format!("{stem}_{n}.md"));
        if !candidate.exists() {
            return candidate;
        }
    }
    unreachable!("suffix search is unbounded");
}

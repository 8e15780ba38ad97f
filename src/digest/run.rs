// src/digest/run.rs
// One scheduled run: the (week, year)-keyed working folder, collected source
// items, the run state machine, and the persisted run metadata.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, Local, Utc};
use serde::Serialize;
use tracing::debug;

use crate::digest::sources::Source;

/// `Idle → Collecting → Collected|CollectedEmpty → Summarizing → Delivered|Failed`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Collecting,
    Collected,
    CollectedEmpty,
    Summarizing,
    Delivered,
    Failed,
}

/// Outcome of fetching one source. The enum keeps the three outcomes
/// mutually exclusive; an artifact path exists only for `Found`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Found(PathBuf),
    NoNewContent,
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct SourceItem {
    pub source: Source,
    pub outcome: FetchOutcome,
}

impl SourceItem {
    pub fn artifact(&self) -> Option<&Path> {
        match &self.outcome {
            FetchOutcome::Found(path) => Some(path),
            _ => None,
        }
    }
}

/// Consolidated digest text for one run.
#[derive(Debug, Clone)]
pub struct DigestSummary {
    pub text: String,
    pub item_count: usize,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct RunMetadata {
    processed_at: String,
    item_count: usize,
    week: u32,
    year: i32,
}

pub const METADATA_FILENAME: &str = "_metadata.json";

#[derive(Debug)]
pub struct DigestRun {
    pub week: u32,
    pub year: i32,
    pub dir: PathBuf,
    state: RunState,
    items: Vec<SourceItem>,
}

impl DigestRun {
    /// Creates (or reuses) the run folder for the ISO week containing `now`.
    pub fn create(base_dir: &Path, now: DateTime<Local>) -> Result<Self> {
        let week = now.iso_week().week();
        let year = now.year();
        let dir = base_dir.join(format!("{week:02}_{year}"));
        fs::create_dir_all(&dir)
            .with_context(|| format!("creating run folder {}", dir.display()))?;
        Ok(Self {
            week,
            year,
            dir,
            state: RunState::Idle,
            items: Vec::new(),
        })
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn items(&self) -> &[SourceItem] {
        &self.items
    }

    pub fn begin_collecting(&mut self) {
        self.transition(RunState::Collecting);
    }

    pub fn record(&mut self, item: SourceItem) {
        self.items.push(item);
    }

    /// Number of sources that produced an artifact.
    pub fn found_count(&self) -> usize {
        self.items.iter().filter(|i| i.artifact().is_some()).count()
    }

    /// Closes the collection phase: `Collected` when at least one source
    /// produced an artifact, `CollectedEmpty` otherwise.
    pub fn finish_collecting(&mut self) -> RunState {
        let next = if self.found_count() > 0 {
            RunState::Collected
        } else {
            RunState::CollectedEmpty
        };
        self.transition(next);
        next
    }

    pub fn begin_summarizing(&mut self) {
        self.transition(RunState::Summarizing);
    }

    pub fn mark_delivered(&mut self) {
        self.transition(RunState::Delivered);
    }

    pub fn mark_failed(&mut self) {
        self.transition(RunState::Failed);
    }

    fn transition(&mut self, next: RunState) {
        debug!(from = ?self.state, to = ?next, week = self.week, "run state");
        self.state = next;
    }

    /// Writes `_metadata.json` into the run folder.
    pub fn write_metadata(&self) -> Result<()> {
        let meta = RunMetadata {
            processed_at: Utc::now().to_rfc3339(),
            item_count: self.found_count(),
            week: self.week,
            year: self.year,
        };
        let path = self.dir.join(METADATA_FILENAME);
        let body = serde_json::to_string_pretty(&meta).context("serializing run metadata")?;
        fs::write(&path, body).with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }
}

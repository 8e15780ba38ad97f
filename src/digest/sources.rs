// src/digest/sources.rs
// Source manifest (read once per run start) and the sender allow-list used
// by the mailbox front end.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::error::DigestError;

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Source {
    pub url: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct Manifest {
    sources: Vec<Source>,
}

/// Loads `{"sources": [{"url", "name"}, ...]}`. A missing manifest is a
/// configuration error, not an empty run.
pub fn load_sources(path: &Path) -> Result<Vec<Source>, DigestError> {
    if !path.exists() {
        return Err(DigestError::Configuration(format!(
            "source manifest not found: {}",
            path.display()
        )));
    }
    let manifest: Manifest = read_json(path)?;
    Ok(manifest.sources)
}

#[derive(Debug, Deserialize)]
struct SenderList {
    senders: Vec<String>,
}

/// Case-insensitive sender allow-list. Entries match either a full address
/// or, when prefixed with `@`, a domain suffix. Empty means allow all.
#[derive(Debug, Clone, Default)]
pub struct SenderFilter {
    entries: Vec<String>,
}

impl SenderFilter {
    pub fn allow_all() -> Self {
        Self::default()
    }

    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|e| e.as_ref().to_ascii_lowercase())
                .collect(),
        }
    }

    /// Loads the allow-list file; `None` or a missing file allows everything.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::allow_all());
        };
        if !path.exists() {
            return Ok(Self::allow_all());
        }
        let list: SenderList = read_json(path)?;
        Ok(Self::new(list.senders))
    }

    pub fn allows(&self, address: &str) -> bool {
        if self.entries.is_empty() {
            return true;
        }
        let addr = address.to_ascii_lowercase();
        self.entries.iter().any(|entry| {
            if entry.starts_with('@') {
                addr.ends_with(entry.as_str())
            } else {
                addr == *entry
            }
        })
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))
}

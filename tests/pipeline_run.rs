// tests/pipeline_run.rs
// End-to-end pipeline scenarios with scripted fetchers and a recording
// delivery channel: partial source failure, empty weeks, aggregation
// failure, and a delivery failure mid-message.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use tempfile::TempDir;

use weekly_digest::digest::collector::{unique_artifact_path, url_to_filename, SourceFetcher};
use weekly_digest::digest::run::{DigestSummary, FetchOutcome, RunState, SourceItem};
use weekly_digest::digest::sources::Source;
use weekly_digest::digest::summarizer::{artifact_files, Summarizer};
use weekly_digest::digest::{DigestPipeline, EMPTY_DIGEST, FAILURE_PREFIX};
use weekly_digest::{DeliveryChannel, DigestError};

#[derive(Clone, Copy)]
enum Script {
    Found(&'static str),
    NoNew,
    Fail,
}

struct ScriptedFetcher {
    outcomes: HashMap<String, Script>,
}

#[async_trait]
impl SourceFetcher for ScriptedFetcher {
    async fn fetch(&self, source: &Source, out_dir: &Path) -> Result<SourceItem, DigestError> {
        match self.outcomes[&source.name] {
            Script::Found(body) => {
                let path = unique_artifact_path(out_dir, &url_to_filename(&source.url));
                std::fs::write(&path, body).unwrap();
                Ok(SourceItem {
                    source: source.clone(),
                    outcome: FetchOutcome::Found(path),
                })
            }
            Script::NoNew => Ok(SourceItem {
                source: source.clone(),
                outcome: FetchOutcome::NoNewContent,
            }),
            Script::Fail => Err(DigestError::SourceFetch {
                name: source.name.clone(),
                reason: "agent exited with Some(1): boom".into(),
            }),
        }
    }
}

struct StubSummarizer {
    calls: Arc<AtomicUsize>,
    text: String,
    fail: bool,
}

impl StubSummarizer {
    fn ok(text: &str) -> Self {
        Self {
            calls: Arc::new(AtomicUsize::new(0)),
            text: text.into(),
            fail: false,
        }
    }

    fn failing() -> Self {
        Self {
            calls: Arc::new(AtomicUsize::new(0)),
            text: String::new(),
            fail: true,
        }
    }
}

#[async_trait]
impl Summarizer for StubSummarizer {
    async fn summarize(&self, run_dir: &Path) -> Result<DigestSummary, DigestError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(DigestError::Aggregation("agent timed out after 300s".into()));
        }
        Ok(DigestSummary {
            text: self.text.clone(),
            item_count: artifact_files(run_dir)?.len(),
            generated_at: Utc::now(),
        })
    }
}

#[derive(Default)]
struct MockChannel {
    sent: Mutex<Vec<String>>,
    fail_from: Option<usize>,
}

impl MockChannel {
    fn failing_from(n: usize) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail_from: Some(n),
        }
    }

    fn messages(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeliveryChannel for MockChannel {
    async fn send(&self, _chat_id: i64, text: &str) -> anyhow::Result<()> {
        let mut sent = self.sent.lock().unwrap();
        if let Some(n) = self.fail_from {
            if sent.len() >= n {
                anyhow::bail!("channel closed");
            }
        }
        sent.push(text.to_string());
        Ok(())
    }
}

fn write_manifest(dir: &TempDir, names: &[&str]) -> std::path::PathBuf {
    let sources: Vec<serde_json::Value> = names
        .iter()
        .map(|n| serde_json::json!({ "url": format!("https://{n}.example/blog"), "name": n }))
        .collect();
    let path = dir.path().join("sources.json");
    std::fs::write(
        &path,
        serde_json::json!({ "sources": sources }).to_string(),
    )
    .unwrap();
    path
}

fn pipeline(
    dir: &TempDir,
    names: &[&str],
    outcomes: HashMap<String, Script>,
    summarizer: StubSummarizer,
) -> DigestPipeline {
    DigestPipeline::new(
        "tech-blogs",
        write_manifest(dir, names),
        dir.path().join("runs"),
        Box::new(ScriptedFetcher { outcomes }),
        Box::new(summarizer),
    )
}

#[tokio::test]
async fn partial_source_failure_still_delivers() {
    let tmp = TempDir::new().unwrap();
    let outcomes = HashMap::from([
        ("alpha".to_string(), Script::Found("alpha news")),
        ("beta".to_string(), Script::Found("beta news")),
        ("gamma".to_string(), Script::Fail),
    ]);
    let summarizer = StubSummarizer::ok("the week in review");
    let channel = MockChannel::default();

    let p = pipeline(&tmp, &["alpha", "beta", "gamma"], outcomes, summarizer);
    let state = p.run_and_deliver(&channel, 7).await.unwrap();
    assert_eq!(state, RunState::Delivered);

    let messages = channel.messages();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].starts_with("📰 tech-blogs digest: 2 sources"));
    assert!(messages[0].contains("the week in review"));

    // Exactly the two successful artifacts plus metadata on disk.
    let run_dir = std::fs::read_dir(tmp.path().join("runs"))
        .unwrap()
        .next()
        .unwrap()
        .unwrap()
        .path();
    assert_eq!(artifact_files(&run_dir).unwrap().len(), 2);
    let meta: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(run_dir.join("_metadata.json")).unwrap())
            .unwrap();
    assert_eq!(meta["item_count"], 2);
}

#[tokio::test]
async fn all_quiet_skips_aggregation_and_sends_fixed_message() {
    let tmp = TempDir::new().unwrap();
    let outcomes = HashMap::from([
        ("alpha".to_string(), Script::NoNew),
        ("beta".to_string(), Script::NoNew),
    ]);
    let summarizer = StubSummarizer::ok("should never appear");
    let calls = summarizer.calls.clone();
    let channel = MockChannel::default();

    let p = pipeline(&tmp, &["alpha", "beta"], outcomes, summarizer);
    let state = p.run_and_deliver(&channel, 7).await.unwrap();
    assert_eq!(state, RunState::CollectedEmpty);

    // Summarizer never invoked on an empty week.
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let messages = channel.messages();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].contains(EMPTY_DIGEST));
}

#[tokio::test]
async fn aggregation_failure_reports_prefixed_error() {
    let tmp = TempDir::new().unwrap();
    let outcomes = HashMap::from([("alpha".to_string(), Script::Found("alpha news"))]);
    let channel = MockChannel::default();

    let p = pipeline(&tmp, &["alpha"], outcomes, StubSummarizer::failing());
    let err = p.run_and_deliver(&channel, 7).await.unwrap_err();
    assert!(matches!(err, DigestError::Aggregation(_)));

    let messages = channel.messages();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].starts_with(FAILURE_PREFIX));
    assert!(messages[0].contains("tech-blogs digest failed"));
}

#[tokio::test]
async fn delivery_failure_mid_message_is_surfaced() {
    let tmp = TempDir::new().unwrap();
    let outcomes = HashMap::from([("alpha".to_string(), Script::Found("alpha news"))]);
    // Long enough to need several 4096-char chunks.
    let summarizer = StubSummarizer::ok(&"x".repeat(10_000));
    let channel = MockChannel::failing_from(1);

    let p = pipeline(&tmp, &["alpha"], outcomes, summarizer);
    let err = p.run_and_deliver(&channel, 7).await.unwrap_err();
    match err {
        DigestError::Delivery { chunk, .. } => assert_eq!(chunk, 2),
        other => panic!("expected Delivery error, got {other}"),
    }
    // The first chunk did go out before the failure.
    assert_eq!(channel.messages().len(), 1);
}

#[tokio::test]
async fn missing_manifest_fails_before_collecting() {
    let tmp = TempDir::new().unwrap();
    let channel = MockChannel::default();
    let p = DigestPipeline::new(
        "tech-blogs",
        tmp.path().join("does-not-exist.json"),
        tmp.path().join("runs"),
        Box::new(ScriptedFetcher {
            outcomes: HashMap::new(),
        }),
        Box::new(StubSummarizer::ok("unused")),
    );
    let err = p.run_and_deliver(&channel, 7).await.unwrap_err();
    assert!(matches!(err, DigestError::Configuration(_)));
    assert!(channel.messages()[0].starts_with(FAILURE_PREFIX));
}

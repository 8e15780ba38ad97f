// src/digest/mod.rs
// The periodic digest pipeline: per-source collection, consolidation, and
// dispatch. One `DigestPipeline` per source family; the scheduler drives
// `run_and_deliver` once per configured weekly slot.

pub mod collector;
pub mod run;
pub mod scheduler;
pub mod sources;
pub mod summarizer;

use std::path::PathBuf;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use once_cell::sync::OnceCell;
use tracing::{error, info, warn};

use crate::deliver::{deliver, DeliveryChannel};
use crate::digest::collector::SourceFetcher;
use crate::digest::run::{DigestRun, DigestSummary, FetchOutcome, RunState, SourceItem};
use crate::digest::sources::load_sources;
use crate::digest::summarizer::Summarizer;
use crate::error::DigestError;

/// Fixed digest body when every source came back empty or failed.
pub const EMPTY_DIGEST: &str = "No new content from any source this week.";

/// Prefix on every user-visible failure so it cannot be mistaken for a digest.
pub const FAILURE_PREFIX: &str = "❌";

/// One-time metrics registration (so series show up on a host recorder).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("digest_runs_total", "Scheduled digest runs started.");
        describe_counter!("digest_runs_failed_total", "Digest runs that ended Failed.");
        describe_counter!(
            "digest_source_failures_total",
            "Per-source fetch failures absorbed by a run."
        );
        describe_counter!(
            "digest_chunks_sent_total",
            "Message chunks handed to the delivery channel."
        );
        describe_counter!(
            "digest_scheduler_backoffs_total",
            "Backoff sleeps taken by scheduler loops after failed runs."
        );
        describe_gauge!("digest_last_run_ts", "Unix ts when a digest run last started.");
    });
}

/// Final shape of one pipeline run, before dispatch. Carries the run so the
/// dispatcher can finish driving its state machine.
#[derive(Debug)]
pub enum DigestOutcome {
    Digest {
        run: DigestRun,
        summary: DigestSummary,
    },
    Empty {
        run: DigestRun,
    },
}

pub struct DigestPipeline {
    name: String,
    sources_file: PathBuf,
    base_dir: PathBuf,
    fetcher: Box<dyn SourceFetcher>,
    summarizer: Box<dyn Summarizer>,
}

impl DigestPipeline {
    pub fn new(
        name: impl Into<String>,
        sources_file: PathBuf,
        base_dir: PathBuf,
        fetcher: Box<dyn SourceFetcher>,
        summarizer: Box<dyn Summarizer>,
    ) -> Self {
        Self {
            name: name.into(),
            sources_file,
            base_dir,
            fetcher,
            summarizer,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Executes one full run: collect each source sequentially, persist run
    /// metadata, then consolidate. Per-source failures are absorbed; an
    /// empty collection short-circuits without touching the summarizer.
    pub async fn run_once(&self) -> Result<DigestOutcome, DigestError> {
        ensure_metrics_described();
        counter!("digest_runs_total").increment(1);
        gauge!("digest_last_run_ts").set(chrono::Utc::now().timestamp().max(0) as f64);

        let sources = load_sources(&self.sources_file)?;
        let mut run = DigestRun::create(&self.base_dir, chrono::Local::now())
            .map_err(DigestError::Other)?;
        run.begin_collecting();

        info!(pipeline = %self.name, sources = sources.len(), folder = %run.dir.display(), "digest run started");

        for source in &sources {
            match self.fetcher.fetch(source, &run.dir).await {
                Ok(item) => run.record(item),
                Err(e) => {
                    warn!(pipeline = %self.name, source = %source.name, error = %e, "source failed, continuing");
                    counter!("digest_source_failures_total").increment(1);
                    run.record(SourceItem {
                        source: source.clone(),
                        outcome: FetchOutcome::Failed(e.to_string()),
                    });
                }
            }
        }

        run.write_metadata().map_err(DigestError::Other)?;

        if run.finish_collecting() == RunState::CollectedEmpty {
            info!(pipeline = %self.name, "nothing collected, skipping aggregation");
            return Ok(DigestOutcome::Empty { run });
        }

        run.begin_summarizing();
        match self.summarizer.summarize(&run.dir).await {
            Ok(summary) => {
                info!(pipeline = %self.name, items = summary.item_count, "digest summarized");
                Ok(DigestOutcome::Digest { run, summary })
            }
            Err(e) => {
                run.mark_failed();
                Err(e)
            }
        }
    }

    /// Runs the pipeline and dispatches the result. Failures are reported to
    /// the channel with [`FAILURE_PREFIX`] (best effort) and returned to the
    /// scheduler loop.
    pub async fn run_and_deliver(
        &self,
        channel: &dyn DeliveryChannel,
        chat_id: i64,
    ) -> Result<RunState, DigestError> {
        let outcome = match self.run_once().await {
            Ok(outcome) => outcome,
            Err(e) => {
                counter!("digest_runs_failed_total").increment(1);
                self.report_failure(channel, chat_id, &e).await;
                return Err(e);
            }
        };

        match outcome {
            DigestOutcome::Empty { mut run } => {
                let message = format!("📭 {}: {EMPTY_DIGEST}", self.name);
                if let Err(e) = deliver(channel, chat_id, &message).await {
                    run.mark_failed();
                    counter!("digest_runs_failed_total").increment(1);
                    return Err(e);
                }
                // CollectedEmpty-with-message-sent is a terminal state.
                Ok(run.state())
            }
            DigestOutcome::Digest { mut run, summary } => {
                let header = format!(
                    "📰 {} digest: {} sources with updates\n\n",
                    self.name, summary.item_count
                );
                let message = header + &summary.text;
                if let Err(e) = deliver(channel, chat_id, &message).await {
                    run.mark_failed();
                    counter!("digest_runs_failed_total").increment(1);
                    self.report_failure(channel, chat_id, &e).await;
                    return Err(e);
                }
                run.mark_delivered();
                info!(pipeline = %self.name, "digest delivered");
                Ok(run.state())
            }
        }
    }

    async fn report_failure(&self, channel: &dyn DeliveryChannel, chat_id: i64, e: &DigestError) {
        let message = format!("{FAILURE_PREFIX} {} digest failed: {e}", self.name);
        if let Err(send_err) = channel.send(chat_id, &message).await {
            error!(pipeline = %self.name, error = %send_err, "failed to report digest failure");
        }
    }
}

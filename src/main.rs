//! weekly-digest — Binary Entrypoint
//! Loads configuration, wires the agent client and delivery channel, and
//! spawns one scheduler task per configured pipeline.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use weekly_digest::agent::AgentClient;
use weekly_digest::config::AppConfig;
use weekly_digest::deliver::telegram::TelegramChannel;
use weekly_digest::deliver::DeliveryChannel;
use weekly_digest::digest::collector::AgentFetcher;
use weekly_digest::digest::scheduler::DigestScheduler;
use weekly_digest::digest::summarizer::AgentSummarizer;
use weekly_digest::digest::DigestPipeline;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("weekly_digest=info,warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op when variables come from the host env.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = AppConfig::from_env()?;
    let agent = AgentClient::new(cfg.agent_bin.clone());
    let channel: Arc<dyn DeliveryChannel> = Arc::new(TelegramChannel::new(cfg.bot_token.clone()));

    let cancel = CancellationToken::new();
    let mut handles = Vec::new();

    for pc in &cfg.pipelines {
        let pipeline = DigestPipeline::new(
            pc.name.clone(),
            pc.sources_file.clone(),
            pc.base_dir.clone(),
            Box::new(AgentFetcher::new(
                agent.clone(),
                pc.fetch_prompt.clone(),
                pc.agent_timeout,
            )),
            Box::new(AgentSummarizer::new(
                agent.clone(),
                pc.summary_prompt.clone(),
                pc.agent_timeout,
            )),
        );
        let scheduler = DigestScheduler::new(pc.schedule, pipeline, channel.clone(), cfg.chat_id);
        handles.push(scheduler.spawn(cancel.clone()));
    }

    info!(pipelines = cfg.pipelines.len(), "weekly-digest started");

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");
    cancel.cancel();
    for handle in handles {
        let _ = handle.await;
    }

    Ok(())
}

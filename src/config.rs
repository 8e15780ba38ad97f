// src/config.rs
// Environment-driven configuration. `.env` is loaded by the binary before
// this runs; anything required and missing is a fatal ConfigurationError.

use std::path::PathBuf;
use std::time::Duration;

use crate::digest::scheduler::ScheduleConfig;
use crate::error::DigestError;

const ENV_BOT_TOKEN: &str = "TELEGRAM_BOT_TOKEN";
const ENV_CHAT_ID: &str = "DIGEST_CHAT_ID";
const ENV_AGENT_BIN: &str = "AGENT_BIN";

const ENV_SOURCES_FILE: &str = "BLOG_SOURCES_FILE";
const ENV_BASE_DIR: &str = "BLOG_DIGEST_DIR";
const ENV_SCHEDULE_DAY: &str = "BLOG_SCHEDULE_DAY";
const ENV_SCHEDULE_HOUR: &str = "BLOG_SCHEDULE_HOUR";
const ENV_SCHEDULE_MINUTE: &str = "BLOG_SCHEDULE_MINUTE";
const ENV_AGENT_TIMEOUT: &str = "AGENT_TIMEOUT_SECS";

/// One scheduled source family: its manifest, working dir, prompts, and slot.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub name: String,
    pub sources_file: PathBuf,
    pub base_dir: PathBuf,
    pub fetch_prompt: PathBuf,
    pub summary_prompt: PathBuf,
    pub schedule: ScheduleConfig,
    pub agent_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bot_token: String,
    pub chat_id: i64,
    pub agent_bin: String,
    pub pipelines: Vec<PipelineConfig>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, DigestError> {
        let bot_token = required(ENV_BOT_TOKEN)?;
        let chat_id = parse_num::<i64>(ENV_CHAT_ID, &required(ENV_CHAT_ID)?)?;
        let agent_bin = optional(ENV_AGENT_BIN).unwrap_or_else(|| "claude".into());

        // Defaults mirror the Sunday-evening blog digest; extra families can
        // be added here with their own env prefix and schedule.
        let schedule = ScheduleConfig::new(
            parse_env_or(ENV_SCHEDULE_DAY, 6)?,
            parse_env_or(ENV_SCHEDULE_HOUR, 21)?,
            parse_env_or(ENV_SCHEDULE_MINUTE, 0)?,
        )?;
        let blog = PipelineConfig {
            name: "tech-blogs".into(),
            sources_file: optional(ENV_SOURCES_FILE)
                .unwrap_or_else(|| "config/blog_sources.json".into())
                .into(),
            base_dir: optional(ENV_BASE_DIR)
                .unwrap_or_else(|| "tech-blog-summaries".into())
                .into(),
            fetch_prompt: PathBuf::from("prompts/blog_fetch.md"),
            summary_prompt: PathBuf::from("prompts/blog_summary.md"),
            schedule,
            agent_timeout: Duration::from_secs(parse_env_or(ENV_AGENT_TIMEOUT, 300u64)?),
        };

        Ok(Self {
            bot_token,
            chat_id,
            agent_bin,
            pipelines: vec![blog],
        })
    }
}

fn required(name: &str) -> Result<String, DigestError> {
    optional(name).ok_or_else(|| DigestError::Configuration(format!("{name} not set")))
}

fn optional(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn parse_num<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T, DigestError> {
    raw.parse()
        .map_err(|_| DigestError::Configuration(format!("{name} is not a valid number: {raw}")))
}

fn parse_env_or<T: std::str::FromStr>(name: &str, default: T) -> Result<T, DigestError> {
    match optional(name) {
        Some(raw) => parse_num(name, &raw),
        None => Ok(default),
    }
}

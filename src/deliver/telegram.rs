use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;

use super::DeliveryChannel;

/// Telegram Bot API channel. Tolerates interleaved calls from multiple
/// pipelines; ordering within one run is the dispatcher's job.
pub struct TelegramChannel {
    token: String,
    client: Client,
}

impl TelegramChannel {
    pub fn new(token: String) -> Self {
        Self {
            token,
            client: Client::new(),
        }
    }
}

#[async_trait]
impl DeliveryChannel for TelegramChannel {
    async fn send(&self, chat_id: i64, text: &str) -> Result<()> {
        let url = format!("https://api.telegram.org/bot{}/sendMessage", self.token);
        let body = serde_json::json!({ "chat_id": chat_id, "text": text });

        self.client
            .post(&url)
            .json(&body)
            .send()
            .await
            .context("telegram post")?
            .error_for_status()
            .context("telegram non-2xx")?;
        Ok(())
    }
}

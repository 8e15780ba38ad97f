// src/deliver/mod.rs
// Digest dispatch: splits text into transport-bounded chunks and pushes them
// through a delivery channel strictly in order.

pub mod telegram;

use async_trait::async_trait;
use metrics::counter;

use crate::error::DigestError;

/// Telegram's per-message bound, counted in characters.
pub const MAX_MESSAGE_LEN: usize = 4096;

#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    async fn send(&self, chat_id: i64, text: &str) -> anyhow::Result<()>;
}

/// Splits `text` into ordered chunks of at most `max_len` characters.
/// Concatenating the result reproduces the input exactly; the chunk count is
/// `ceil(chars / max_len)` (a zero-length tail is never emitted).
pub fn split_message(text: &str, max_len: usize) -> Vec<String> {
    assert!(max_len > 0, "max_len must be positive");
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= max_len {
        return vec![text.to_string()];
    }
    chars
        .chunks(max_len)
        .map(|window| window.iter().collect())
        .collect()
}

/// Sends `text` to `chat_id` as ordered chunks. The first rejected chunk
/// aborts delivery; earlier chunks are already out, which is why the caller
/// records the run as failed on error.
pub async fn deliver(
    channel: &dyn DeliveryChannel,
    chat_id: i64,
    text: &str,
) -> Result<usize, DigestError> {
    let chunks = split_message(text, MAX_MESSAGE_LEN);
    let total = chunks.len();
    for (idx, chunk) in chunks.iter().enumerate() {
        channel
            .send(chat_id, chunk)
            .await
            .map_err(|e| DigestError::Delivery {
                chunk: idx + 1,
                reason: e.to_string(),
            })?;
        counter!("digest_chunks_sent_total").increment(1);
    }
    Ok(total)
}

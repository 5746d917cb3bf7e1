use async_trait::async_trait;
use tracing::{debug, warn};

use crate::channel::Channel;
use crate::error::ChannelError;
use crate::types::{ChannelStatus, OutboundMessage};

/// Telegram's message limit is 4096 characters; 4090 leaves headroom for the
/// "(cont'd)" continuation marker. A plain line-boundary splitter suffices
/// since this adapter only ever sends plain-text failure summaries, never
/// Markdown-formatted chat turns.
const CHUNK_MAX: usize = 4090;

/// `Telegram.sendMessage(chatId, text)`, implemented against the Bot API's
/// `sendMessage` endpoint directly with `reqwest` rather than a full bot
/// framework — this adapter only ever originates messages, it never
/// receives updates, so a framework's polling/dispatch machinery has no
/// purpose here.
pub struct TelegramChannel {
    bot_token: String,
    default_chat_id: Option<String>,
    client: reqwest::Client,
    connected: bool,
}

impl TelegramChannel {
    pub fn new(bot_token: String, default_chat_id: Option<String>) -> Self {
        Self {
            bot_token,
            default_chat_id,
            client: reqwest::Client::new(),
            connected: false,
        }
    }

    fn api_url(&self, method: &str) -> String {
        format!("https://api.telegram.org/bot{}/{method}", self.bot_token)
    }
}

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn connect(&mut self) -> Result<(), ChannelError> {
        let resp = self
            .client
            .get(self.api_url("getMe"))
            .send()
            .await
            .map_err(|e| ChannelError::ConnectionFailed(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(ChannelError::ConnectionFailed(format!(
                "getMe returned {}",
                resp.status()
            )));
        }
        self.connected = true;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), ChannelError> {
        self.connected = false;
        Ok(())
    }

    async fn send(&self, msg: &OutboundMessage) -> Result<(), ChannelError> {
        let chat_id = if msg.recipient.is_empty() {
            self.default_chat_id
                .as_deref()
                .ok_or_else(|| ChannelError::ConfigError("no chat_id configured".into()))?
        } else {
            msg.recipient.as_str()
        };

        for chunk in split_chunks(&msg.text) {
            let resp = self
                .client
                .post(self.api_url("sendMessage"))
                .json(&serde_json::json!({ "chat_id": chat_id, "text": chunk }))
                .send()
                .await
                .map_err(|e| ChannelError::SendFailed(e.to_string()))?;

            if !resp.status().is_success() {
                let body = resp.text().await.unwrap_or_default();
                warn!(chat_id, body, "telegram sendMessage returned non-2xx");
                return Err(ChannelError::SendFailed(body));
            }
        }
        debug!(chat_id, "telegram message sent");
        Ok(())
    }

    fn status(&self) -> ChannelStatus {
        if self.connected {
            ChannelStatus::Connected
        } else {
            ChannelStatus::Disconnected
        }
    }
}

/// Split `text` on line boundaries into chunks no longer than [`CHUNK_MAX`].
fn split_chunks(text: &str) -> Vec<String> {
    if text.len() <= CHUNK_MAX {
        return vec![text.to_string()];
    }
    let mut chunks = Vec::new();
    let mut current = String::new();
    for line in text.split('\n') {
        let cost = if current.is_empty() { line.len() } else { line.len() + 1 };
        if !current.is_empty() && current.len() + cost > CHUNK_MAX {
            chunks.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push('\n');
        }
        current.push_str(line);
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_chunks_short_text_is_single_chunk() {
        assert_eq!(split_chunks("hello").len(), 1);
    }

    #[test]
    fn split_chunks_long_text_splits_on_lines() {
        let text = "line\n".repeat(2000);
        let chunks = split_chunks(&text);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.len() <= CHUNK_MAX);
        }
    }
}

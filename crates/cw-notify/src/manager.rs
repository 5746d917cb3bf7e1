use std::collections::HashMap;
use std::time::Duration;

use tracing::{info, warn};

use crate::channel::Channel;
use crate::types::{ChannelStatus, OutboundMessage};

const BACKOFF_BASE_SECS: u64 = 5;
const BACKOFF_MAX_SECS: u64 = 300;
const MAX_ATTEMPTS: u32 = 10;
const JITTER_FRACTION: f64 = 0.10;

/// Registry of notification adapters, connected best-effort at startup and
/// addressed by name thereafter.
#[derive(Default)]
pub struct ChannelManager {
    channels: HashMap<String, Box<dyn Channel>>,
}

impl ChannelManager {
    pub fn new() -> Self {
        Self { channels: HashMap::new() }
    }

    pub fn register(&mut self, channel: Box<dyn Channel>) {
        self.channels.insert(channel.name().to_string(), channel);
    }

    /// Connect every registered channel in turn, retrying each with
    /// exponential backoff up to [`MAX_ATTEMPTS`]. A channel that exhausts
    /// its attempts is logged and left disconnected; it never blocks the
    /// others or the caller's startup sequence.
    pub async fn connect_all(&mut self) {
        for (name, channel) in self.channels.iter_mut() {
            match connect_with_backoff(channel.as_mut()).await {
                Ok(()) => info!(channel = name.as_str(), "channel connected"),
                Err(e) => warn!(channel = name.as_str(), error = %e, "channel failed to connect, giving up"),
            }
        }
    }

    pub async fn disconnect_all(&mut self) {
        for (name, channel) in self.channels.iter_mut() {
            if let Err(e) = channel.disconnect().await {
                warn!(channel = name.as_str(), error = %e, "error disconnecting channel");
            }
        }
    }

    /// Best-effort send: logs and swallows any failure rather than
    /// propagating it to the caller — a Telegram outage must never block
    /// agent orchestration.
    pub async fn try_send(&self, channel_name: &str, msg: &OutboundMessage) {
        let Some(channel) = self.channels.get(channel_name) else {
            warn!(channel = channel_name, "no such channel registered");
            return;
        };
        if let Err(e) = channel.send(msg).await {
            warn!(channel = channel_name, error = %e, "notification send failed");
        }
    }

    pub fn statuses(&self) -> HashMap<String, ChannelStatus> {
        self.channels
            .iter()
            .map(|(name, c)| (name.clone(), c.status()))
            .collect()
    }
}

async fn connect_with_backoff(channel: &mut dyn Channel) -> Result<(), crate::error::ChannelError> {
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match channel.connect().await {
            Ok(()) => return Ok(()),
            Err(e) => {
                if attempt >= MAX_ATTEMPTS {
                    return Err(e);
                }
                let delay = backoff_secs(attempt);
                warn!(
                    channel = channel.name(),
                    attempt,
                    delay_secs = delay,
                    error = %e,
                    "channel connect attempt failed, retrying"
                );
                tokio::time::sleep(Duration::from_secs_f64(delay)).await;
            }
        }
    }
}

/// Exponential backoff with ±[`JITTER_FRACTION`] jitter, capped at
/// [`BACKOFF_MAX_SECS`]. Jitter is derived from the current time's
/// sub-second component rather than pulling in `rand` for one call site.
fn backoff_secs(attempt: u32) -> f64 {
    let base = (BACKOFF_BASE_SECS as f64) * 2f64.powi(attempt as i32 - 1);
    let capped = base.min(BACKOFF_MAX_SECS as f64);
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    let jitter_unit = (nanos % 1000) as f64 / 1000.0 * 2.0 - 1.0;
    (capped + capped * JITTER_FRACTION * jitter_unit).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_then_caps() {
        let early = backoff_secs(1);
        let later = backoff_secs(8);
        assert!(early < later);
        assert!(later <= BACKOFF_MAX_SECS as f64 * (1.0 + JITTER_FRACTION));
    }
}

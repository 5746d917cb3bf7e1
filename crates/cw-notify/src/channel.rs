use async_trait::async_trait;

use crate::error::ChannelError;
use crate::types::{ChannelStatus, OutboundMessage};

/// Common interface implemented by every notification transport. Telegram
/// is the only adapter required today; other transports (voice, mobile/web
/// UI) are out of scope for the core.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Stable lowercase identifier, used as the key inside [`crate::manager::ChannelManager`].
    fn name(&self) -> &str;

    async fn connect(&mut self) -> Result<(), ChannelError>;

    async fn disconnect(&mut self) -> Result<(), ChannelError>;

    /// Deliver one outbound message. `&self`, not `&mut self` — a connected
    /// adapter sends concurrently without needing exclusive access.
    async fn send(&self, msg: &OutboundMessage) -> Result<(), ChannelError>;

    fn status(&self) -> ChannelStatus;
}

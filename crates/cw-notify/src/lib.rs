mod channel;
mod error;
mod manager;
mod telegram;
mod types;

pub use channel::Channel;
pub use error::ChannelError;
pub use manager::ChannelManager;
pub use telegram::TelegramChannel;
pub use types::{ChannelStatus, OutboundMessage};

use serde::Serialize;

/// Runtime status of a registered channel adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelStatus {
    Disconnected,
    Connected,
}

/// A message bound for an external notification transport.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub recipient: String,
    pub text: String,
}

use thiserror::Error;

/// Errors that can occur within any channel adapter.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("send failed: {0}")]
    SendFailed(String),

    #[error("configuration error: {0}")]
    ConfigError(String),
}

impl From<ChannelError> for cw_core::CwError {
    fn from(e: ChannelError) -> Self {
        cw_core::CwError::ExternalTool(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ChannelError>;

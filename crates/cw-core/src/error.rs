use thiserror::Error;

/// Cross-cutting error taxonomy. Each crate defines its own
/// richer error enum; this is the shared shape used by `cw-core` itself and
/// by the gateway's HTTP-status mapping.
#[derive(Debug, Error)]
pub enum CwError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("conflict: {0}")]
    ConflictState(String),

    #[error("resource busy: {0}")]
    ResourceBusy(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("subprocess error: {0}")]
    Subprocess(String),

    #[error("external tool error: {0}")]
    ExternalTool(String),

    #[error("fatal error: {0}")]
    Fatal(String),
}

impl CwError {
    /// Short error code string sent to clients in the `{ok:false, error}` envelope.
    pub fn code(&self) -> &'static str {
        match self {
            CwError::Config(_) => "CONFIG_ERROR",
            CwError::Validation(_) => "VALIDATION_ERROR",
            CwError::ConflictState(_) => "CONFLICT",
            CwError::ResourceBusy(_) => "RESOURCE_BUSY",
            CwError::NotFound(_) => "NOT_FOUND",
            CwError::Storage(_) => "STORAGE_ERROR",
            CwError::Subprocess(_) => "SUBPROCESS_ERROR",
            CwError::ExternalTool(_) => "EXTERNAL_TOOL_ERROR",
            CwError::Fatal(_) => "FATAL_ERROR",
        }
    }

    /// HTTP status this error maps to at the API boundary.
    pub fn http_status(&self) -> u16 {
        match self {
            CwError::Config(_) => 500,
            CwError::Validation(_) => 400,
            CwError::ConflictState(_) => 409,
            CwError::ResourceBusy(_) => 429,
            CwError::NotFound(_) => 404,
            CwError::Storage(_) => 500,
            CwError::Subprocess(_) => 500,
            CwError::ExternalTool(_) => 500,
            CwError::Fatal(_) => 500,
        }
    }
}

pub type Result<T> = std::result::Result<T, CwError>;

//! Error types for the lead chat widget.

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),
}

/// Errors talking to the site API.
///
/// Every variant is a transport-level failure from the conversation's point
/// of view: the flow position is kept and the user may retry.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Request to {endpoint} failed: {reason}")]
    RequestFailed { endpoint: String, reason: String },

    #[error("Request to {endpoint} returned HTTP {status}")]
    Status { endpoint: String, status: u16 },

    #[error("Invalid response from {endpoint}: {reason}")]
    InvalidResponse { endpoint: String, reason: String },

    #[error("Invalid endpoint URL {path}: {reason}")]
    InvalidUrl { path: String, reason: String },
}

/// A flow-handler response that does not fit the wire contract.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("Response names next field {field:?} but carries no question")]
    MissingQuestion { field: String },
}

/// Result type alias for the crate.
pub type Result<T> = std::result::Result<T, Error>;

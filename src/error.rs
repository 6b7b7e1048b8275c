//! Error types used across the gateway.

use thiserror::Error;

/// Result alias for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Prefix marking a message as produced by the gateway itself rather than a backend
pub const GATEWAY_TAG: &str = "OpenAPI";

/// Tag a reason string as gateway-originated
pub fn gateway_tagged(reason: &str) -> String {
    format!("{} - {}", GATEWAY_TAG, reason)
}

/// Main error type for gateway operations
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Outbound call failed at the transport level
    #[error("Upstream transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Upstream response body exceeded the configured buffer cap
    #[error("Upstream response body exceeded {0} bytes")]
    UpstreamBodyTooLarge(usize),

    /// Method the forwarding engine refuses to relay
    #[error("Unsupported method: {0}")]
    UnsupportedMethod(String),

    /// A failure that carries its own HTTP status and reason
    #[error("{reason}")]
    Status { code: u16, reason: String },

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

impl GatewayError {
    /// HTTP status this failure surfaces as.
    pub fn status_code(&self) -> u16 {
        match self {
            GatewayError::Transport(_) | GatewayError::UpstreamBodyTooLarge(_) => 502,
            GatewayError::UnsupportedMethod(_) => 405,
            GatewayError::Status { code, .. } => *code,
            _ => 500,
        }
    }

    /// Caller-facing message. Raw internals stay in server logs.
    pub fn public_message(&self) -> String {
        match self {
            GatewayError::Transport(_) | GatewayError::UpstreamBodyTooLarge(_) => {
                gateway_tagged("Bad Gateway")
            }
            GatewayError::UnsupportedMethod(_) => gateway_tagged("Method Not Allowed"),
            GatewayError::Status { reason, .. } => gateway_tagged(reason),
            _ => gateway_tagged("Internal Server Error"),
        }
    }
}

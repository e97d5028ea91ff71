//! Typed failures at the generation-service boundary.

use thiserror::Error;

/// Why a gateway call failed.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum GatewayError {
    /// Network error, timeout, or non-success HTTP status.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The service answered but the payload was malformed or had no content.
    #[error("malformed response: {0}")]
    Protocol(String),

    /// The call was rejected before any request was sent.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The gateway could not be constructed from its configuration.
    #[error("gateway configuration error: {0}")]
    Config(String),
}

impl GatewayError {
    /// Taxonomy name used in logs and observations.
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::Transport(_) => "TransportError",
            GatewayError::Protocol(_) => "ProtocolError",
            GatewayError::InvalidRequest(_) => "InvalidRequest",
            GatewayError::Config(_) => "ConfigError",
        }
    }

    /// Transport and decode failures are worth another attempt; caller mistakes are not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, GatewayError::Transport(_) | GatewayError::Protocol(_))
    }
}

//! Node Error Types
//!
//! This module defines the crate-level error type. Expected failures such as a
//! frame that is not JSON-RPC or a peer that never answers are ordinary values
//! of this type; the [`Node`](crate::Node) façade converts them into
//! synthesized error responses or boolean outcomes before they reach the
//! application.

use std::time::Duration;
use thiserror::Error;

use crate::protocol::RpcError;

/// The main Error type for the node runtime
#[derive(Error, Debug)]
pub enum Error {
    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Transport-related errors
    #[error("Transport error: {0}")]
    Transport(String),

    /// The connection was closed by the remote end
    #[error("Connection closed")]
    ConnectionClosed,

    /// A frame was read that is not a valid JSON-RPC message
    #[error("Parse error: {0}")]
    Parse(String),

    /// No qualifying frame arrived in time
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// The broker refused or mangled a registration
    #[error("Registration error: {0}")]
    Registration(String),

    /// Other errors
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether this error means the connection can no longer be used
    pub fn is_closed(&self) -> bool {
        matches!(self, Error::ConnectionClosed)
    }

    /// Convert an error to the JSON-RPC error object reported for it locally
    ///
    /// Only parse failures have a wire meaning; everything else maps onto the
    /// application codes the requester synthesizes for itself.
    pub fn to_rpc_error(&self) -> RpcError {
        match self {
            Error::Parse(_) | Error::Json(_) => RpcError::local_parse_error(),
            Error::Timeout(_) => RpcError::connection_timeout(),
            Error::Io(_) | Error::Transport(_) | Error::ConnectionClosed => {
                RpcError::transport_error(&self.to_string())
            }
            Error::Registration(msg) | Error::Other(msg) => RpcError::internal_error(msg),
        }
    }
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::error_codes;

    #[test]
    fn test_local_error_mapping() {
        assert_eq!(
            Error::Parse("garbage".into()).to_rpc_error().code,
            error_codes::LOCAL_PARSE_ERROR
        );
        assert_eq!(
            Error::Timeout(Duration::from_millis(1000)).to_rpc_error().code,
            error_codes::CONNECTION_TIMEOUT
        );
        assert_eq!(Error::ConnectionClosed.to_rpc_error().code, error_codes::TRANSPORT_ERROR);
        assert_eq!(
            Error::Other("boom".into()).to_rpc_error().code,
            error_codes::INTERNAL_ERROR
        );
    }

    #[test]
    fn test_timeout_display() {
        let err = Error::Timeout(Duration::from_millis(250));
        assert_eq!(err.to_string(), "Timed out after 250ms");
        assert!(!err.is_closed());
        assert!(Error::ConnectionClosed.is_closed());
    }
}

//! Error types for the Tessera RPC channel.
//!
//! Every failure a caller of [`RpcEndpoint::send_request`] can observe is one
//! variant of [`RpcError`]. Malformed inbound payloads never surface here; the
//! endpoint logs and drops them.
//!
//! [`RpcEndpoint::send_request`]: crate::RpcEndpoint::send_request

use std::time::Duration;
use thiserror::Error;

/// Main error type for the RPC channel.
#[derive(Debug, Error)]
pub enum RpcError {
    /// The remote handler failed, or the remote has no handler for the method.
    #[error("{message}")]
    Remote { code: i32, message: String },

    #[error("Request timeout for method {method}")]
    Timeout { method: String, timeout: Duration },

    #[error("Transport error: {message}")]
    Transport { message: String },

    /// The window, frame or WebView the transport writes to is not available.
    #[error("Message target unavailable: {target}")]
    TargetUnavailable { target: String },

    #[error("RPC endpoint destroyed")]
    Destroyed,

    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    #[error("IO error: {message}")]
    Io {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Frame size {size} exceeds maximum {max}")]
    FrameTooLarge { size: usize, max: usize },

    #[error("Invalid params: {message}")]
    InvalidParams { message: String },
}

/// Result type alias for RPC operations.
pub type Result<T> = std::result::Result<T, RpcError>;

impl From<std::io::Error> for RpcError {
    fn from(err: std::io::Error) -> Self {
        RpcError::Io {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for RpcError {
    fn from(err: serde_json::Error) -> Self {
        RpcError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl RpcError {
    /// Create a transport error from any displayable cause.
    pub fn transport(message: impl std::fmt::Display) -> Self {
        RpcError::Transport {
            message: message.to_string(),
        }
    }

    /// Create a target-unavailable error.
    pub fn target_unavailable(target: impl Into<String>) -> Self {
        RpcError::TargetUnavailable {
            target: target.into(),
        }
    }

    /// Check if this error is a request timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, RpcError::Timeout { .. })
    }

    /// Check if re-issuing the request could succeed.
    ///
    /// Nothing is retried automatically; callers decide.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RpcError::Timeout { .. }
                | RpcError::Transport { .. }
                | RpcError::TargetUnavailable { .. }
        )
    }

    /// The error code to put on the wire when this error answers a request.
    ///
    /// Remote errors keep the code they arrived with; everything else uses
    /// the uniform handler error code.
    pub fn to_rpc_error_code(&self) -> i32 {
        match self {
            RpcError::Remote { code, .. } => *code,
            _ => crate::config::RpcConfig::HANDLER_ERROR_CODE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RpcError::Timeout {
            method: "loadMap".into(),
            timeout: Duration::from_millis(50),
        };
        assert_eq!(err.to_string(), "Request timeout for method loadMap");

        let err = RpcError::Remote {
            code: -32000,
            message: "boom".into(),
        };
        assert_eq!(err.to_string(), "boom");

        assert_eq!(RpcError::Destroyed.to_string(), "RPC endpoint destroyed");
    }

    #[test]
    fn test_rpc_error_codes() {
        assert_eq!(
            RpcError::Remote {
                code: 42,
                message: "x".into()
            }
            .to_rpc_error_code(),
            42
        );
        assert_eq!(RpcError::Destroyed.to_rpc_error_code(), -32000);
    }

    #[test]
    fn test_retryable_errors() {
        assert!(RpcError::transport("closed").is_retryable());
        assert!(RpcError::target_unavailable("iframe").is_retryable());
        assert!(!RpcError::Destroyed.is_retryable());
        assert!(!RpcError::Remote {
            code: -32000,
            message: "boom".into()
        }
        .is_retryable());
    }

    #[test]
    fn test_json_error_conversion() {
        let err: RpcError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert!(matches!(err, RpcError::Json { .. }));
    }
}

//! Client error types.

use crate::config::ConfigError;
use irods_protocol::{ErrorCode, MsgType};
use thiserror::Error;

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] irods_protocol::ProtocolError),

    #[error("not connected")]
    NotConnected,

    #[error("connection closed")]
    ConnectionClosed,

    #[error("connection abandoned in the middle of a call; reconnect")]
    Desynchronized,

    #[error("request timeout")]
    Timeout,

    #[error("server error: {code}{}", message_suffix(.message))]
    Api { code: ErrorCode, message: String },

    #[error("invalid argument: {0}")]
    Validation(String),

    #[error("security negotiation failed: {0}")]
    Negotiation(String),

    #[error("server requires TLS, which this client does not provide")]
    TlsUnsupported,

    #[error("expected {expected} message, got {found}")]
    UnexpectedMessage { expected: MsgType, found: MsgType },

    #[error("reply to {0} carried no body")]
    MissingReply(&'static str),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

fn message_suffix(message: &str) -> String {
    if message.is_empty() {
        String::new()
    } else {
        format!(": {message}")
    }
}

impl ClientError {
    /// Legacy error code carried by a server error.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            ClientError::Api { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Whether the connection can no longer be used after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ClientError::Io(_)
                | ClientError::Protocol(_)
                | ClientError::ConnectionClosed
                | ClientError::Desynchronized
                | ClientError::Timeout
                | ClientError::UnexpectedMessage { .. }
        )
    }

    pub(crate) fn api(code: i32, message: impl Into<String>) -> Self {
        ClientError::Api {
            code: ErrorCode(code),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_display() {
        let err = ClientError::api(-818000, "no access to /tempZone/home/alice");
        assert_eq!(
            err.to_string(),
            "server error: CAT_NO_ACCESS_PERMISSION (-818000): no access to /tempZone/home/alice"
        );
        assert_eq!(err.code(), Some(ErrorCode::CAT_NO_ACCESS_PERMISSION));
        assert!(!err.is_fatal());

        let err = ClientError::api(-808000, "");
        assert_eq!(err.to_string(), "server error: CAT_NO_ROWS_FOUND (-808000)");
    }

    #[test]
    fn test_fatal_errors() {
        assert!(ClientError::ConnectionClosed.is_fatal());
        assert!(ClientError::Timeout.is_fatal());
        assert!(!ClientError::Validation("x".into()).is_fatal());
        assert!(!ClientError::NotConnected.is_fatal());
    }
}

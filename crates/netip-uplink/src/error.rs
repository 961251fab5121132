//! Error types for the netip-uplink crate.
//!
//! Every failure carries an [`ErrorClass`] that decides how the connection
//! manager reacts: exit, long backoff, or short backoff.

use std::time::Duration;

use crate::protocol::QUOTA_SIGNAL;

/// How the connection manager treats a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Identity cannot be established; the process must exit
    Fatal,
    /// The control plane has no capacity for this node
    Quota,
    /// Anything worth retrying soon
    Transient,
}

/// Unified error type for uplink operations
#[derive(Debug, thiserror::Error)]
pub enum UplinkError {
    #[error("failed to resolve hostname: {0}")]
    Hostname(#[source] std::io::Error),

    #[error("failed to encode identity payload: {0}")]
    Identity(#[source] serde_json::Error),

    #[error("handshake request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("handshake endpoint answered {0}")]
    Status(reqwest::StatusCode),

    #[error("invalid handshake response: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("handshake refused: {0}")]
    Rejected(String),

    #[error("invalid stream endpoint {url}: {reason}")]
    Endpoint { url: String, reason: String },

    #[error("failed to dial {addr}: {source}")]
    Dial {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{stage} timed out after {after:?}")]
    Timeout { stage: &'static str, after: Duration },

    #[error("websocket error: {0}")]
    WebSocket(#[from] Box<tokio_tungstenite::tungstenite::Error>),

    #[error("stream closed by peer")]
    StreamClosed,

    #[error("no pong received within {0:?}")]
    PongTimeout(Duration),

    #[error("outbound queue full")]
    QueueFull,

    #[error("uplink closed")]
    Closed,
}

impl From<tokio_tungstenite::tungstenite::Error> for UplinkError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WebSocket(Box::new(e))
    }
}

impl UplinkError {
    pub(crate) fn timeout(stage: &'static str, after: Duration) -> Self {
        Self::Timeout { stage, after }
    }

    pub(crate) fn endpoint(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Endpoint {
            url: url.into(),
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Hostname(_) | Self::Identity(_) => ErrorClass::Fatal,
            Self::Rejected(message) if message.contains(QUOTA_SIGNAL) => ErrorClass::Quota,
            _ => ErrorClass::Transient,
        }
    }

    #[must_use]
    pub fn is_fatal(&self) -> bool {
        self.class() == ErrorClass::Fatal
    }
}

pub type Result<T> = std::result::Result<T, UplinkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_failures_are_fatal() {
        let err = UplinkError::Hostname(std::io::Error::other("no hostname"));
        assert_eq!(err.class(), ErrorClass::Fatal);
        assert!(err.is_fatal());

        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert_eq!(UplinkError::Identity(json_err).class(), ErrorClass::Fatal);
    }

    #[test]
    fn test_quota_rejection() {
        let err = UplinkError::Rejected("The number of nodes has been reached".to_string());
        assert_eq!(err.class(), ErrorClass::Quota);
    }

    #[test]
    fn test_other_rejection_is_transient() {
        let err = UplinkError::Rejected("bad key".to_string());
        assert_eq!(err.class(), ErrorClass::Transient);
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_transport_failures_are_transient() {
        let cases = [
            UplinkError::Status(reqwest::StatusCode::SERVICE_UNAVAILABLE),
            UplinkError::StreamClosed,
            UplinkError::QueueFull,
            UplinkError::PongTimeout(Duration::from_secs(180)),
            UplinkError::timeout("write", Duration::from_secs(8)),
            UplinkError::endpoint("ftp://x", "unsupported scheme"),
            UplinkError::from(tokio_tungstenite::tungstenite::Error::ConnectionClosed),
        ];
        for err in cases {
            assert_eq!(err.class(), ErrorClass::Transient, "{err}");
        }
    }

    #[test]
    fn test_error_display() {
        assert_eq!(UplinkError::Closed.to_string(), "uplink closed");
        assert_eq!(UplinkError::QueueFull.to_string(), "outbound queue full");
        assert_eq!(
            UplinkError::timeout("dial", Duration::from_secs(6)).to_string(),
            "dial timed out after 6s"
        );
        let err = UplinkError::Status(reqwest::StatusCode::BAD_GATEWAY);
        assert!(err.to_string().contains("502"));
    }
}

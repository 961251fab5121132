//! Error types for the netip agent.

use netip_uplink::{ErrorClass, UplinkError};

/// Errors that can stop the agent
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// Uplink failure
    #[error("Uplink error: {0}")]
    Uplink(#[from] UplinkError),

    /// Producer failure
    #[error("Collector error: {0}")]
    Collector(#[from] netip_collector::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AgentError {
    /// Whether the process must exit with a failure status
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        match self {
            AgentError::Uplink(e) => e.class() == ErrorClass::Fatal,
            AgentError::Io(_) => true,
            AgentError::Collector(_) | AgentError::Json(_) => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, AgentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_error_display_uplink() {
        let err = AgentError::Uplink(UplinkError::Rejected("bad key".to_string()));
        assert_eq!(err.to_string(), "Uplink error: handshake refused: bad key");
    }

    #[test]
    fn test_agent_error_display_collector() {
        let err = AgentError::Collector(netip_collector::Error::Busy);
        assert_eq!(err.to_string(), "Collector error: Benchmark already running");
    }

    #[test]
    fn test_agent_error_display_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{oops").unwrap_err();
        let err = AgentError::Json(json_err);
        assert!(err.to_string().contains("JSON error"));
    }

    #[test]
    fn test_agent_error_display_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "no signals");
        let err = AgentError::Io(io_err);
        assert!(err.to_string().contains("I/O error"));
        assert!(err.to_string().contains("no signals"));
    }

    #[test]
    fn test_agent_error_from_uplink_error() {
        let err: AgentError = UplinkError::Closed.into();
        assert!(matches!(err, AgentError::Uplink(UplinkError::Closed)));
    }

    #[test]
    fn test_agent_error_from_collector_error() {
        let err: AgentError = netip_collector::Error::Busy.into();
        assert!(matches!(err, AgentError::Collector(_)));
    }

    #[test]
    fn test_hostname_failure_is_fatal() {
        let err: AgentError = UplinkError::Hostname(std::io::Error::other("unset")).into();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_transient_failures_are_not_fatal() {
        let err: AgentError = UplinkError::StreamClosed.into();
        assert!(!err.is_fatal());
        assert!(!AgentError::Collector(netip_collector::Error::Busy).is_fatal());
    }

    #[test]
    fn test_agent_error_debug() {
        let err = AgentError::Uplink(UplinkError::Closed);
        assert!(format!("{err:?}").contains("Closed"));
    }
}

//! Wire messages of the handshake exchange.
//!
//! A connection attempt is two steps: an HTTP POST that trades the node's
//! identity for a one-time key, then a websocket whose first client frame
//! presents that key.

use netip_types::HostInfo;
use serde::{Deserialize, Serialize};

/// Route appended to the configured endpoint for the identity exchange
pub const HANDSHAKE_ROUTE: &str = "/nodes/handshake/v2";

pub const HEADER_KEY: &str = "X-Key";
pub const HEADER_VERSION: &str = "X-Version";
pub const HEADER_VERSION_HASH: &str = "X-Version-Hash";

/// Substring of a refusal message meaning the account has no free node slots
pub const QUOTA_SIGNAL: &str = "number of nodes has been reached";

/// Event name of the first client frame on the stream
pub const HANDSHAKE_EVENT: &str = "handshake";

/// Static identity of this node. The hostname is resolved per attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct Identity {
    pub service: String,
    pub info: HostInfo,
}

impl Identity {
    pub fn new(service: impl Into<String>, info: HostInfo) -> Self {
        Self {
            service: service.into(),
            info,
        }
    }
}

/// Body of the handshake POST
#[derive(Debug, Serialize)]
pub struct IdentityPayload<'a> {
    pub hostname: String,
    pub service: &'a str,
    pub info: &'a HostInfo,
}

/// Handshake POST response
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HandshakeResponse {
    pub ok: bool,
    pub message: String,
    #[serde(rename = "endpointIP")]
    pub endpoint_ip: String,
    pub endpoint_path: String,
    pub handshake_key: String,
}

impl HandshakeResponse {
    #[must_use]
    pub fn into_ticket(self) -> HandshakeTicket {
        let endpoint_ip = Some(self.endpoint_ip.trim().to_string()).filter(|ip| !ip.is_empty());
        HandshakeTicket {
            endpoint_ip,
            endpoint_path: self.endpoint_path,
            handshake_key: self.handshake_key,
        }
    }
}

/// What a successful handshake grants: where to connect and the single-use key.
///
/// Not `Clone`: opening a stream consumes the ticket, so a key is never
/// presented twice.
#[derive(Debug, PartialEq, Eq)]
pub struct HandshakeTicket {
    /// Literal address to dial instead of resolving the path's host
    pub endpoint_ip: Option<String>,
    pub endpoint_path: String,
    pub handshake_key: String,
}

/// First client frame on a new stream
#[derive(Debug, Serialize)]
pub struct HandshakeFrame<'a> {
    pub event: &'static str,
    pub key: &'a str,
    pub service: &'a str,
}

impl<'a> HandshakeFrame<'a> {
    #[must_use]
    pub fn new(key: &'a str, service: &'a str) -> Self {
        Self {
            event: HANDSHAKE_EVENT,
            key,
            service,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_handshake_response_full() {
        let resp: HandshakeResponse = serde_json::from_value(json!({
            "ok": true,
            "message": "",
            "endpointIP": "10.0.0.5",
            "endpointPath": "wss://host.example/ws",
            "handshakeKey": "k-123"
        }))
        .unwrap();

        let ticket = resp.into_ticket();
        assert_eq!(ticket.endpoint_ip.as_deref(), Some("10.0.0.5"));
        assert_eq!(ticket.endpoint_path, "wss://host.example/ws");
        assert_eq!(ticket.handshake_key, "k-123");
    }

    #[test]
    fn test_handshake_response_missing_fields() {
        let resp: HandshakeResponse =
            serde_json::from_str(r#"{"ok":false,"message":"nope"}"#).unwrap();
        assert!(!resp.ok);
        assert_eq!(resp.message, "nope");

        let ticket = resp.into_ticket();
        assert_eq!(ticket.endpoint_ip, None);
    }

    #[test]
    fn test_blank_endpoint_ip_means_no_override() {
        let resp = HandshakeResponse {
            ok: true,
            endpoint_ip: "  ".to_string(),
            ..Default::default()
        };
        assert_eq!(resp.into_ticket().endpoint_ip, None);
    }

    #[test]
    fn test_handshake_frame_shape() {
        let frame = serde_json::to_value(HandshakeFrame::new("k-1", "netip")).unwrap();
        assert_eq!(
            frame,
            json!({"event": "handshake", "key": "k-1", "service": "netip"})
        );
    }

    #[test]
    fn test_identity_payload_shape() {
        let info = HostInfo::default();
        let payload = IdentityPayload {
            hostname: "node-1".to_string(),
            service: "netip",
            info: &info,
        };
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["hostname"], json!("node-1"));
        assert_eq!(value["service"], json!("netip"));
        assert!(value["info"]["data"]["cpu"].is_object());
    }
}

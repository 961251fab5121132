//! Test module for netip-uplink
//!
//! End-to-end tests run the connection manager against a wiremock control
//! plane and a local websocket server:
//! - Initial connect with retry and backoff
//! - Handshake headers, body and override-IP dialing
//! - Ordered delivery and inbound frames
//! - Keepalive failure, coalesced reconnects and close

mod fixtures;

//! Resilient telemetry uplink for netip.
//!
//! This crate establishes identity with the control plane, upgrades to a
//! websocket stream, keeps it alive and reconnects with backoff, while
//! delivering outbound events in order over a single writer.
//!
//! # Architecture
//!
//! - [`handshake`]: HTTP identity exchange (`POST /nodes/handshake/v2`)
//! - [`transport`]: endpoint resolution, override-IP dialing and the stream handshake
//! - [`session`]: read and write loops of one live socket
//! - [`manager`]: lifecycle, failure classification, backoff and reconnect
//! - [`config`]: deadlines, backoff and queue sizes
//! - [`error`]: error type and classification
//!
//! # Example
//!
//! ```no_run
//! use netip_types::{HostInfo, OutboundEvent};
//! use netip_uplink::{ConnectionManager, Identity, UplinkConfig};
//!
//! # async fn example() -> netip_uplink::Result<()> {
//! let config = UplinkConfig {
//!     connect_key: "secret".to_string(),
//!     ..Default::default()
//! };
//! let identity = Identity::new("netip", HostInfo::default());
//! let (uplink, mut channels) = ConnectionManager::new(config, identity)?;
//!
//! uplink.start().await?;
//! uplink
//!     .send(OutboundEvent::new("processes", serde_json::Map::new()))
//!     .await?;
//!
//! while let Some(frame) = channels.inbound.recv().await {
//!     println!("{} bytes from control plane", frame.len());
//! }
//! uplink.close().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod handshake;
pub mod manager;
pub mod protocol;
pub mod session;
pub mod transport;

#[cfg(test)]
mod tests;

pub use config::{Backoff, FATAL_GRACE, Timeouts, UplinkConfig};
pub use error::{ErrorClass, Result, UplinkError};
pub use handshake::HandshakeClient;
pub use manager::{ConnectionManager, ConnectionState, UplinkChannels};
pub use protocol::{HandshakeTicket, Identity};
pub use session::{SessionEnd, SocketSession};
pub use transport::{DialTarget, SessionGauge};

//! netip host telemetry agent.
//!
//! Wires the producers from `netip-collector` to the uplink from
//! `netip-uplink` and dispatches control plane commands back to them.

pub mod agent;
pub mod config;
pub mod error;
pub mod hub;

pub use agent::run;
pub use config::{AgentConfig, Args};
pub use error::{AgentError, Result};
pub use hub::{Exit, Hub, decode_command};

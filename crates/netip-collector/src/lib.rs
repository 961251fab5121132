//! Telemetry producers for the netip agent.
//!
//! Each producer reads the kernel's pseudo filesystems or shells out to a
//! system tool and emits one payload type from `netip-types`:
//!
//! - [`metrics`]: per-second CPU, memory, I/O and temperature sample
//! - [`processes`]: process census
//! - [`who`]: login session changes
//! - [`disks`]: SMART, md RAID and ZFS sweep
//! - [`bench`]: on-demand benchmark suite
//!
//! [`Collector`] spawns them all; [`host::snapshot`] describes the host for
//! the handshake.

pub mod bench;
pub mod disks;
pub mod host;
pub mod metrics;
pub mod processes;
pub mod who;

mod collector;
mod error;
mod paths;
mod shell;

#[cfg(test)]
mod tests;

pub use bench::{BenchRunner, BenchTools};
pub use collector::{Collector, CollectorChannels, CollectorConfig};
pub use disks::DiskTools;
pub use error::{Error, Result};
pub use paths::HostPaths;
pub use who::WhoConfig;

//! Uplink configuration: endpoint credentials, deadlines and backoff.

use std::time::Duration;

use crate::error::ErrorClass;

/// Control plane base URL used when none is configured
pub const DEFAULT_ENDPOINT: &str = "https://cloudnetip.com/api";

/// Capacity of the outbound event queue
pub const DEFAULT_QUEUE_CAPACITY: usize = 16;

/// Capacity of the inbound frame queue
pub const DEFAULT_INBOUND_CAPACITY: usize = 16;

/// Delay between a fatal failure being reported and the process exiting
pub const FATAL_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct UplinkConfig {
    /// Base URL; the handshake route is appended to it
    pub endpoint: String,
    pub connect_key: String,
    pub version: String,
    pub version_hash: String,
    pub queue_capacity: usize,
    pub inbound_capacity: usize,
    pub timeouts: Timeouts,
    pub backoff: Backoff,
}

impl Default for UplinkConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            connect_key: String::new(),
            version: String::new(),
            version_hash: String::new(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            inbound_capacity: DEFAULT_INBOUND_CAPACITY,
            timeouts: Timeouts::default(),
            backoff: Backoff::default(),
        }
    }
}

/// Deadlines for every suspension point of a connection attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// End-to-end deadline of the HTTP handshake
    pub request: Duration,
    /// TCP connect, both for the HTTP handshake and the default stream dial
    pub connect: Duration,
    /// TCP connect when dialing an override IP
    pub override_connect: Duration,
    /// TLS plus websocket upgrade on the default path
    pub stream_handshake: Duration,
    /// TLS plus websocket upgrade when dialing an override IP
    pub override_handshake: Duration,
    /// Read deadline, reset by every pong
    pub pong_wait: Duration,
    /// Deadline of every single write
    pub write_wait: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            request: Duration::from_secs(16),
            connect: Duration::from_secs(6),
            override_connect: Duration::from_secs(12),
            stream_handshake: Duration::from_secs(10),
            override_handshake: Duration::from_secs(45),
            pong_wait: Duration::from_secs(180),
            write_wait: Duration::from_secs(8),
        }
    }
}

impl Timeouts {
    /// Keepalive ping interval, 90% of the pong window
    #[must_use]
    pub fn ping_period(&self) -> Duration {
        self.pong_wait * 9 / 10
    }
}

/// Delay before a reconnect, per failure class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub transient: Duration,
    pub quota: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            transient: Duration::from_secs(3),
            quota: Duration::from_secs(5 * 60),
        }
    }
}

impl Backoff {
    /// `None` for fatal failures, which are never retried.
    #[must_use]
    pub fn delay_for(&self, class: ErrorClass) -> Option<Duration> {
        match class {
            ErrorClass::Fatal => None,
            ErrorClass::Quota => Some(self.quota),
            ErrorClass::Transient => Some(self.transient),
        }
    }
}

//! Agent configuration from command line flags and environment variables.

use std::time::Duration;

use clap::Parser;
use netip_collector::CollectorConfig;
use netip_uplink::UplinkConfig;
use netip_uplink::config::DEFAULT_ENDPOINT;

/// Service tag sent with the handshake
pub const SERVICE_TAG: &str = "core";

/// How often the latest metrics sample is forwarded
pub const CORE_PERIOD: Duration = Duration::from_secs(1);

/// netip agent - streams host telemetry to the control plane
#[derive(Parser, Debug, Clone)]
#[command(name = "netip-agent")]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Control plane base URL
    #[arg(long, env = "ENDPOINT", default_value = DEFAULT_ENDPOINT)]
    pub endpoint: String,

    /// API key presented during the handshake
    #[arg(long, env = "CONNECT_KEY", default_value = "", hide_env_values = true)]
    pub connect_key: String,

    /// Version reported to the control plane
    #[arg(long, env = "VERSION", default_value = env!("CARGO_PKG_VERSION"))]
    pub agent_version: String,

    /// Build hash reported to the control plane
    #[arg(long, env = "VERSION_HASH", default_value = "")]
    pub version_hash: String,

    /// Log at debug level
    #[arg(long, env = "LOG_DEBUG")]
    pub log_debug: bool,
}

/// Everything the agent needs to run
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub service: String,
    pub uplink: UplinkConfig,
    pub collector: CollectorConfig,
    pub core_period: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            service: SERVICE_TAG.to_string(),
            uplink: UplinkConfig::default(),
            collector: CollectorConfig::default(),
            core_period: CORE_PERIOD,
        }
    }
}

impl From<&Args> for AgentConfig {
    fn from(args: &Args) -> Self {
        Self {
            uplink: UplinkConfig {
                endpoint: args.endpoint.trim_end_matches('/').to_string(),
                connect_key: args.connect_key.clone(),
                version: args.agent_version.clone(),
                version_hash: args.version_hash.clone(),
                ..UplinkConfig::default()
            },
            ..Self::default()
        }
    }
}

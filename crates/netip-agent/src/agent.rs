//! Startup sequence: identity, first session, producers, multiplexer.

use netip_collector::{Collector, host};
use netip_uplink::{ConnectionManager, Identity, UplinkError};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::AgentConfig;
use crate::error::Result;
use crate::hub::{Exit, Hub};

/// Run the agent until `shutdown` fires or the uplink gives up.
///
/// Producers only start once the first session is up.
///
/// # Errors
///
/// Returns an error if the uplink cannot be built.
pub async fn run(config: AgentConfig, shutdown: CancellationToken) -> Result<Exit> {
    let info = host::snapshot(&config.collector.paths);
    let identity = Identity::new(config.service.clone(), info);
    let (uplink, channels) = ConnectionManager::new(config.uplink.clone(), identity)?;

    info!("Connecting to {}", config.uplink.endpoint);
    let started = tokio::select! {
        biased;
        () = shutdown.cancelled() => Err(UplinkError::Closed),
        started = uplink.start() => started,
    };

    match started {
        Ok(()) => {}
        Err(UplinkError::Closed) => {
            uplink.close().await;
            return Ok(Exit::Interrupted);
        }
        Err(e) if e.is_fatal() => {
            uplink.close().await;
            return Ok(Exit::Fatal(e));
        }
        Err(e) => {
            warn!("Uplink failed to start: {}", e);
            uplink.close().await;
            return Err(e.into());
        }
    }

    let (collector, producers) = Collector::spawn(config.collector);
    let hub = Hub::new(uplink, channels, collector, producers, config.core_period);
    Ok(hub.run(shutdown).await)
}

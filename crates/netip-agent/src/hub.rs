//! Event multiplexer between the producers and the uplink.
//!
//! One loop, one ready source per iteration. Producer outputs become
//! outbound events; inbound frames become commands for the producers.

use std::time::Duration;

use bytes::Bytes;
use netip_collector::{Collector, CollectorChannels};
use netip_types::{Command, InboundCommand, OutboundEvent, TelemetryEvent};
use netip_uplink::{ConnectionManager, UplinkChannels, UplinkError};
use tokio::task::JoinSet;
use tokio::time::{Instant, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Why the agent stopped
#[derive(Debug)]
pub enum Exit {
    /// Interrupt or terminate signal
    Interrupted,
    /// The control plane sent `services-destroy`
    Destroyed,
    /// Identity could not be established
    Fatal(UplinkError),
}

impl Exit {
    /// Process exit status
    #[must_use]
    pub fn code(&self) -> i32 {
        match self {
            Exit::Interrupted | Exit::Destroyed => 0,
            Exit::Fatal(_) => 1,
        }
    }
}

/// Decode one inbound frame. `None` if it is not a command.
#[must_use]
pub fn decode_command(frame: &[u8]) -> Option<Command> {
    match serde_json::from_slice::<InboundCommand>(frame) {
        Ok(command) => Some(command.into()),
        Err(e) => {
            warn!(
                "Dropping undecodable frame ({} bytes): {}",
                frame.len(),
                e
            );
            None
        }
    }
}

pub struct Hub {
    uplink: ConnectionManager,
    channels: UplinkChannels,
    collector: Collector,
    producers: CollectorChannels,
    core_period: Duration,
    /// Benchmark results waiting for room in the outbound queue
    deliveries: JoinSet<()>,
}

impl Hub {
    #[must_use]
    pub fn new(
        uplink: ConnectionManager,
        channels: UplinkChannels,
        collector: Collector,
        producers: CollectorChannels,
        core_period: Duration,
    ) -> Self {
        Self {
            uplink,
            channels,
            collector,
            producers,
            core_period,
            deliveries: JoinSet::new(),
        }
    }

    /// Multiplex until a signal, a `services-destroy` command or a fatal
    /// uplink failure, then close the uplink and stop the producers.
    ///
    /// No branch waits on the outbound queue, so every source stays polled
    /// while the uplink is down.
    pub async fn run(mut self, shutdown: CancellationToken) -> Exit {
        let mut ticker = interval_at(Instant::now() + self.core_period, self.core_period);
        info!("Event multiplexer running");

        let exit = loop {
            tokio::select! {
                biased;

                () = shutdown.cancelled() => break Exit::Interrupted,

                Some(err) = self.channels.fatal.recv() => break Exit::Fatal(err),

                Some(frame) = self.channels.inbound.recv() => {
                    if let Some(exit) = self.dispatch(&frame) {
                        break exit;
                    }
                }

                _ = ticker.tick() => {
                    let collect_core = self.producers.core.borrow().clone();
                    self.forward(TelemetryEvent::CollectCore { collect_core });
                }

                Some(who_logged) = self.producers.who.recv() => {
                    self.forward(TelemetryEvent::WhoLogged { who_logged });
                }

                Some(processes) = self.producers.processes.recv() => {
                    self.forward(TelemetryEvent::Processes { processes });
                }

                Some(disks_info) = self.producers.disks.recv() => {
                    let disks_info = Box::new(disks_info);
                    self.forward(TelemetryEvent::DisksInfo { disks_info });
                }

                Some(result) = self.producers.bench.recv() => {
                    let bms_tests = Box::new(result);
                    self.deliver(TelemetryEvent::BmsGeneralTests { bms_tests });
                }

                Some(joined) = self.deliveries.join_next(), if !self.deliveries.is_empty() => {
                    if let Err(e) = joined {
                        debug!("Delivery task ended abnormally: {}", e);
                    }
                }
            }
        };

        info!("Stopping: {:?}", exit);
        self.uplink.close().await;
        self.deliveries.shutdown().await;
        self.collector.shutdown().await;
        exit
    }

    fn dispatch(&self, frame: &Bytes) -> Option<Exit> {
        match decode_command(frame)? {
            Command::GeneralTests { runtime } => {
                match self.collector.bench().start(runtime, false) {
                    Ok(_) => info!("Benchmark run started, {}s per test", runtime),
                    Err(e) => warn!("Benchmark request rejected: {}", e),
                }
                None
            }
            Command::ServicesDestroy => {
                info!("Control plane requested shutdown");
                Some(Exit::Destroyed)
            }
            Command::Unknown(name) => {
                info!("Ignoring unknown command '{}'", name);
                None
            }
        }
    }

    /// Periodic telemetry goes out only on a live session with room in the
    /// queue; otherwise it is dropped, the next sample replaces it.
    fn forward(&self, event: TelemetryEvent) {
        let name = event.name();
        if !self.uplink.is_alive() {
            trace!("Uplink down, dropping {}", name);
            return;
        }
        let Some(outbound) = encode(event) else {
            return;
        };

        match self.uplink.try_send(outbound) {
            Ok(()) => trace!("Queued {}", name),
            Err(UplinkError::QueueFull) => debug!("Outbound queue full, dropping {}", name),
            Err(e) => debug!("Dropped {}: {}", name, e),
        }
    }

    /// Queue an event from its own task, waiting for the next session if
    /// needed. `close` releases a waiting send.
    fn deliver(&mut self, event: TelemetryEvent) {
        let name = event.name();
        let Some(outbound) = encode(event) else {
            return;
        };

        let uplink = self.uplink.clone();
        self.deliveries.spawn(async move {
            match uplink.send(outbound).await {
                Ok(()) => debug!("Queued {}", name),
                Err(e) => debug!("Dropped {}: {}", name, e),
            }
        });
    }
}

fn encode(event: TelemetryEvent) -> Option<OutboundEvent> {
    let name = event.name();
    OutboundEvent::try_from(event)
        .map_err(|e| warn!("Failed to encode {}: {}", name, e))
        .ok()
}

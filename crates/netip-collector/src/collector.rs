//! Spawns every producer and hands their outputs to the caller.

use std::time::Duration;

use netip_types::{BenchResult, CollectCore, DisksInfo, Proc, WhoLogged};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::bench::{BenchRunner, BenchTools};
use crate::disks::{self, DISKS_PERIOD, DiskTools};
use crate::metrics::{self, Sampler};
use crate::paths::HostPaths;
use crate::processes::{self, PROCESSES_PERIOD};
use crate::who::{self, WhoConfig};

const WHO_CAPACITY: usize = 255;
const PROCESSES_CAPACITY: usize = 4;
const DISKS_CAPACITY: usize = 2;
const BENCH_CAPACITY: usize = 2;

#[derive(Debug, Clone)]
pub struct CollectorConfig {
    pub paths: HostPaths,
    pub who: WhoConfig,
    pub disks: DiskTools,
    pub bench: BenchTools,
    pub processes_period: Duration,
    pub disks_period: Duration,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            paths: HostPaths::default(),
            who: WhoConfig::default(),
            disks: DiskTools::default(),
            bench: BenchTools::default(),
            processes_period: PROCESSES_PERIOD,
            disks_period: DISKS_PERIOD,
        }
    }
}

/// Receiving ends of the producers
#[derive(Debug)]
pub struct CollectorChannels {
    /// Latest per-second sample; read on the caller's own tick
    pub core: watch::Receiver<CollectCore>,
    pub who: mpsc::Receiver<WhoLogged>,
    pub processes: mpsc::Receiver<Vec<Proc>>,
    pub disks: mpsc::Receiver<DisksInfo>,
    pub bench: mpsc::Receiver<BenchResult>,
}

/// Owns the producer tasks
#[derive(Debug)]
pub struct Collector {
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
    bench: BenchRunner,
}

impl Collector {
    /// Start all producers on the current runtime
    #[must_use]
    pub fn spawn(config: CollectorConfig) -> (Self, CollectorChannels) {
        let cancel = CancellationToken::new();

        let sampler = Sampler::new(config.paths.clone());
        let (core_tx, core_rx) = watch::channel(CollectCore::default());
        let (who_tx, who_rx) = mpsc::channel(WHO_CAPACITY);
        let (proc_tx, proc_rx) = mpsc::channel(PROCESSES_CAPACITY);
        let (disks_tx, disks_rx) = mpsc::channel(DISKS_CAPACITY);
        let (bench_tx, bench_rx) = mpsc::channel(BENCH_CAPACITY);

        let tasks = vec![
            tokio::spawn(metrics::run(sampler, core_tx, cancel.clone())),
            tokio::spawn(who::run(config.who, who_tx, cancel.clone())),
            tokio::spawn(processes::run(
                config.paths.clone(),
                config.processes_period,
                proc_tx,
                cancel.clone(),
            )),
            tokio::spawn(disks::run(
                config.disks,
                config.paths,
                config.disks_period,
                disks_tx,
                cancel.clone(),
            )),
        ];
        info!("Started {} producers", tasks.len());

        let collector = Self {
            cancel,
            tasks,
            bench: BenchRunner::new(config.bench, bench_tx),
        };
        let channels = CollectorChannels {
            core: core_rx,
            who: who_rx,
            processes: proc_rx,
            disks: disks_rx,
            bench: bench_rx,
        };
        (collector, channels)
    }

    #[must_use]
    pub fn bench(&self) -> &BenchRunner {
        &self.bench
    }

    /// Stop the producers and wait for them to exit
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for task in self.tasks {
            if let Err(e) = task.await {
                debug!("Producer task ended abnormally: {}", e);
            }
        }
        debug!("Collector stopped");
    }
}

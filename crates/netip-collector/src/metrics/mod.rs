//! Per-second host metrics (`collect-core`).

mod cpu;
mod io;
mod mem;
mod temperature;

use std::time::Duration;

use chrono::Utc;
use netip_types::CollectCore;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::paths::HostPaths;
use cpu::CpuTracker;
use io::IoTracker;
use temperature::Sensor;

pub const SAMPLE_PERIOD: Duration = Duration::from_secs(1);

/// Holds the previous counters needed to turn cumulative kernel totals into rates
#[derive(Debug)]
pub struct Sampler {
    paths: HostPaths,
    cpu: CpuTracker,
    io: IoTracker,
    sensors: Vec<Sensor>,
}

impl Sampler {
    #[must_use]
    pub fn new(paths: HostPaths) -> Self {
        let sensors = temperature::discover(&paths);
        debug!("Discovered {} temperature sensors", sensors.len());
        Self {
            paths,
            cpu: CpuTracker::default(),
            io: IoTracker::default(),
            sensors,
        }
    }

    /// Take one reading. Sources that cannot be read leave their section empty.
    pub fn sample(&mut self) -> CollectCore {
        let read = |name: &str| std::fs::read_to_string(self.paths.proc_file(name)).ok();

        let load_avg = read("loadavg")
            .map(|text| text.split_whitespace().take(3).map(str::to_string).collect())
            .unwrap_or_default();
        let stat = read("stat");
        let meminfo = read("meminfo");
        let diskstats = read("diskstats");

        CollectCore {
            time: Utc::now(),
            load_avg,
            cpu_stats: stat.map(|s| self.cpu.update(&s)).unwrap_or_default(),
            mem_stats: meminfo.map(|m| mem::parse_meminfo(&m)).unwrap_or_default(),
            io_stats: diskstats
                .map(|d| self.io.update(&d, &self.paths))
                .unwrap_or_default(),
            temp_stats: temperature::read(&self.sensors),
        }
    }
}

/// Publish a fresh sample every [`SAMPLE_PERIOD`] until cancelled
pub async fn run(mut sampler: Sampler, tx: watch::Sender<CollectCore>, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(SAMPLE_PERIOD);
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                tx.send_replace(sampler.sample());
            }
        }
    }
    debug!("Metrics sampler stopped");
}

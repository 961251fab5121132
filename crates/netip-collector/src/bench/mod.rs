//! On-demand benchmark suite (`bms-general-tests`).
//!
//! Four external tools run concurrently; each fills one section of the
//! [`BenchResult`]. Only one suite may run at a time.

mod fio;
mod speedtest;
mod sysbench;

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use netip_types::{BenchResult, CpuBench, IoBench, MemBench, NetBench};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::shell;

pub const GENERAL_TESTS: &str = "general-tests";
pub const BENCH_DEADLINE: Duration = Duration::from_secs(5 * 60);

/// Launchers for the benchmark tools
#[derive(Debug, Clone)]
pub struct BenchTools {
    pub sysbench: Vec<String>,
    pub fio: Vec<String>,
    pub speedtest: Vec<String>,
    /// Where fio places its scratch file
    pub work_dir: PathBuf,
}

impl Default for BenchTools {
    fn default() -> Self {
        Self {
            sysbench: vec!["sysbench".to_string()],
            fio: vec!["fio".to_string()],
            speedtest: vec!["speedtest-cli".to_string()],
            work_dir: std::env::temp_dir(),
        }
    }
}

async fn tool(prefix: &[String], args: &[&str]) -> Result<String> {
    let (program, args) =
        shell::with_prefix(prefix, args).ok_or_else(|| Error::parse("empty tool command"))?;
    shell::run(&program, &args).await
}

/// The JSON object in tool output that may carry warnings around it
fn json_body(output: &str) -> &str {
    match (output.find('{'), output.rfind('}')) {
        (Some(start), Some(end)) if start < end => &output[start..=end],
        _ => output,
    }
}

/// Run all four tests concurrently. Failed tests leave their section empty.
pub async fn general_tests(tools: &BenchTools, runtime: u32, scheduled: bool) -> BenchResult {
    let (cpu, mem, io, net) = tokio::join!(
        sysbench::cpu_prime(tools, runtime),
        sysbench::mem_speed(tools, runtime),
        fio::readwrite(tools, runtime),
        speedtest::measure(tools, runtime),
    );

    let mut result = BenchResult {
        test: GENERAL_TESTS.to_string(),
        scheduled,
        runtime,
        ..BenchResult::default()
    };

    match cpu {
        Ok(events_sec) => {
            result.cpu = CpuBench {
                software: Some(sysbench::cpu_software()),
                events_sec,
            };
        }
        Err(e) => warn!("{} cpu failed: {}", GENERAL_TESTS, e),
    }
    match mem {
        Ok(speed_mib) => {
            result.mem = MemBench {
                software: Some(sysbench::mem_software()),
                speed_mib,
            };
        }
        Err(e) => warn!("{} mem failed: {}", GENERAL_TESTS, e),
    }
    match io {
        Ok(report) => {
            result.io = IoBench {
                software: Some(fio::software()),
                fio: Some(report),
            };
        }
        Err(e) => warn!("{} io failed: {}", GENERAL_TESTS, e),
    }
    match net {
        Ok(report) => {
            result.net = NetBench {
                software: Some(speedtest::software()),
                speedtest: Some(report),
            };
        }
        Err(e) => warn!("{} net failed: {}", GENERAL_TESTS, e),
    }

    result
}

/// Clears the busy flag when the run ends, however it ends
struct BusyGuard(Arc<AtomicBool>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Starts suites in the background and reports them on a channel
#[derive(Debug, Clone)]
pub struct BenchRunner {
    tools: Arc<BenchTools>,
    busy: Arc<AtomicBool>,
    deadline: Duration,
    tx: mpsc::Sender<BenchResult>,
}

impl BenchRunner {
    #[must_use]
    pub fn new(tools: BenchTools, tx: mpsc::Sender<BenchResult>) -> Self {
        Self {
            tools: Arc::new(tools),
            busy: Arc::new(AtomicBool::new(false)),
            deadline: BENCH_DEADLINE,
            tx,
        }
    }

    #[must_use]
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Launch a suite. A run that overruns the deadline is discarded.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Busy`] while another suite is running.
    pub fn start(&self, runtime: u32, scheduled: bool) -> Result<JoinHandle<()>> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(Error::Busy);
        }
        let guard = BusyGuard(self.busy.clone());

        let tools = self.tools.clone();
        let tx = self.tx.clone();
        let deadline = self.deadline;
        info!("Starting {} (runtime {}s)", GENERAL_TESTS, runtime);

        Ok(tokio::spawn(async move {
            let _guard = guard;
            match tokio::time::timeout(deadline, general_tests(&tools, runtime, scheduled)).await {
                Ok(result) => {
                    info!("{} finished", GENERAL_TESTS);
                    if tx.send(result).await.is_err() {
                        debug!("Benchmark receiver dropped");
                    }
                }
                Err(_) => warn!("{} interrupted after {:?}", GENERAL_TESTS, deadline),
            }
        }))
    }
}

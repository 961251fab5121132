//! Disk health sweep (`disks-info`): SMART, md arrays and ZFS pools.

mod mdraid;
mod smart;
mod zfs;

use std::time::Duration;

use chrono::Utc;
use netip_types::{DisksInfo, SmartDisk};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::paths::HostPaths;
use crate::shell;

pub const DISKS_PERIOD: Duration = Duration::from_secs(15 * 60);
const COMMAND_TIMEOUT: Duration = Duration::from_secs(120);

/// Launchers for the external disk tools
#[derive(Debug, Clone)]
pub struct DiskTools {
    pub lsblk: Vec<String>,
    pub smartctl: Vec<String>,
    pub mdadm: Vec<String>,
    pub zpool: Vec<String>,
}

impl Default for DiskTools {
    fn default() -> Self {
        Self {
            lsblk: vec!["lsblk".to_string()],
            smartctl: vec!["smartctl".to_string()],
            mdadm: vec!["mdadm".to_string()],
            zpool: vec!["zpool".to_string()],
        }
    }
}

async fn tool(prefix: &[String], args: &[&str]) -> Result<String> {
    let (program, args) =
        shell::with_prefix(prefix, args).ok_or_else(|| Error::parse("empty tool command"))?;
    shell::run_with_timeout(&program, &args, COMMAND_TIMEOUT).await
}

/// Names of writable whole disks from `lsblk -d -n -o NAME,RO`
fn writable_disks(listing: &str) -> Vec<String> {
    listing
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let name = fields.next()?;
            (fields.next()? == "0").then(|| name.to_string())
        })
        .collect()
}

async fn smart_disk(tools: &DiskTools, disk: &str) -> SmartDisk {
    let device = format!("/dev/{disk}");
    match tool(&tools.smartctl, &["--all", &device]).await {
        Ok(output) => smart::parse_smart(&output),
        Err(e) => {
            let error = match e {
                Error::Command { detail, .. } => format!("err: {detail}"),
                other => format!("err: {other}"),
            };
            SmartDisk {
                error,
                ..SmartDisk::default()
            }
        }
    }
}

/// One full sweep. Tools that are missing leave their section empty.
pub async fn sweep(tools: &DiskTools, paths: &HostPaths) -> DisksInfo {
    let mut info = DisksInfo::new(Utc::now());

    match tool(&tools.lsblk, &["-d", "-n", "-o", "NAME,RO"]).await {
        Ok(listing) => {
            for disk in writable_disks(&listing) {
                let smart = smart_disk(tools, &disk).await;
                info.smarts.insert(disk, smart);
            }
        }
        Err(e) => debug!("Disk listing unavailable: {}", e),
    }

    if let Ok(mdstat) = tokio::fs::read_to_string(paths.proc_file("mdstat")).await {
        info.raids = mdraid::parse_mdstat(&mdstat);
    }
    for (name, array) in &mut info.raids {
        let device = format!("/dev/{name}");
        match tool(&tools.mdadm, &["-D", &device]).await {
            Ok(detail) => {
                array.adm = mdraid::parse_mdadm(&detail);
                array.adm_out = detail;
            }
            Err(e) => warn!("mdadm detail for {} failed: {}", name, e),
        }
    }

    match tool(&tools.zpool, &["list", "-vPpj"]).await {
        Ok(json) => match zfs::parse_zpool(&json) {
            Ok(pools) => info.zfs = pools,
            Err(e) => warn!("Failed to parse zpool output: {}", e),
        },
        Err(e) => debug!("zpool unavailable: {}", e),
    }

    info
}

/// Send a sweep every `period`, first one after a full period
pub async fn run(
    tools: DiskTools,
    paths: HostPaths,
    period: Duration,
    tx: mpsc::Sender<DisksInfo>,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                let info = tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    info = sweep(&tools, &paths) => info,
                };
                info!(
                    "Disk sweep: {} smart, {} md, {} zfs",
                    info.smarts.len(),
                    info.raids.len(),
                    info.zfs.len()
                );
                if tx.send(info).await.is_err() {
                    break;
                }
            }
        }
    }
    debug!("Disk sweeper stopped");
}

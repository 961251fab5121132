//! Static host snapshot sent with the handshake.

use std::collections::HashSet;
use std::sync::LazyLock;

use chrono::Utc;
use netip_types::{BoardInfo, CpuInfo, HostData, HostInfo, KernelInfo, MemInfo};
use regex::Regex;

use crate::paths::{HostPaths, read_trimmed};

static TWO_COLUMNS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\t+: ?").expect("valid regex"));
static EXTRA_SPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r" +").expect("valid regex"));
static CACHE_SIZE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+) KB$").expect("valid regex"));

const KIB_PER_GIB: f64 = 1024.0 * 1024.0;

/// Collect the snapshot. Missing sources leave their fields empty.
#[must_use]
pub fn snapshot(paths: &HostPaths) -> HostInfo {
    let mut cpu = std::fs::read_to_string(paths.proc_file("cpuinfo"))
        .map(|text| parse_cpuinfo(&text))
        .unwrap_or_default();
    cpu.threads = std::thread::available_parallelism()
        .ok()
        .and_then(|n| u32::try_from(n.get()).ok())
        .unwrap_or(cpu.threads);

    let boot = std::fs::read_to_string(paths.proc_file("uptime"))
        .ok()
        .and_then(|text| parse_uptime(&text))
        .map_or(0, |up| Utc::now().timestamp() - up);

    let mem = std::fs::read_to_string(paths.proc_file("meminfo"))
        .map(|text| parse_mem_totals(&text))
        .unwrap_or_default();

    HostInfo {
        uptime: boot,
        data: HostData {
            cpu,
            board: board_info(paths),
            kernel: kernel_info(paths),
            mem,
        },
    }
}

/// Seconds since boot, truncated
fn parse_uptime(text: &str) -> Option<i64> {
    let secs: f64 = text.split_whitespace().next()?.parse().ok()?;
    #[allow(clippy::cast_possible_truncation)] // uptime in seconds fits in i64
    Some(secs as i64)
}

fn parse_cpuinfo(text: &str) -> CpuInfo {
    let mut info = CpuInfo::default();
    let mut sockets = HashSet::new();
    let mut cores = HashSet::new();
    let mut processors = 0u32;
    let mut socket = String::new();

    for line in text.lines() {
        let mut columns = TWO_COLUMNS.splitn(line, 2);
        let (Some(key), Some(value)) = (columns.next(), columns.next()) else {
            continue;
        };

        match key {
            "processor" => processors += 1,
            "physical id" => {
                socket = value.to_string();
                sockets.insert(socket.clone());
            }
            "core id" => {
                cores.insert(format!("{socket}/{value}"));
            }
            "vendor_id" if info.vendor.is_empty() => info.vendor = value.to_string(),
            "model name" if info.model.is_empty() => {
                let model = EXTRA_SPACE.replace_all(value, " ");
                info.model = model.replacen("- ", "-", 1);
            }
            "cpu MHz" if info.speed == 0 => {
                if let Ok(mhz) = value.parse::<f64>() {
                    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                    {
                        info.speed = mhz.round() as u32;
                    }
                }
            }
            "cache size" if info.cache == 0 => {
                if let Some(kb) = CACHE_SIZE
                    .captures(value)
                    .and_then(|c| c[1].parse::<u32>().ok())
                {
                    info.cache = kb;
                }
            }
            _ => {}
        }
    }

    info.cpus = u32::try_from(sockets.len()).unwrap_or(u32::MAX);
    info.cores = u32::try_from(cores.len()).unwrap_or(u32::MAX);
    info.threads = processors;
    info
}

fn parse_mem_totals(text: &str) -> MemInfo {
    let mut mem = MemInfo::default();
    for line in text.lines() {
        let mut fields = line.split_whitespace();
        let (Some(key), Some(value)) = (fields.next(), fields.next()) else {
            continue;
        };
        let Ok(kib) = value.parse::<u64>() else {
            continue;
        };
        #[allow(clippy::cast_precision_loss)] // memory sizes are far below 2^52 KiB
        match key {
            "MemTotal:" => mem.ram = kib as f64 / KIB_PER_GIB,
            "SwapTotal:" => mem.swap = kib as f64 / KIB_PER_GIB,
            _ => {}
        }
    }
    mem
}

fn board_info(paths: &HostPaths) -> BoardInfo {
    let mut bios_version = read_trimmed(&paths.dmi("bios_version")).unwrap_or_default();
    if !bios_version.is_empty()
        && let Some(date) = read_trimmed(&paths.dmi("bios_date"))
    {
        bios_version = format!("{bios_version} {date}");
    }

    BoardInfo {
        name: read_trimmed(&paths.dmi("board_name")).unwrap_or_default(),
        vendor: read_trimmed(&paths.dmi("board_vendor")).unwrap_or_default(),
        bios_version,
    }
}

fn kernel_info(paths: &HostPaths) -> KernelInfo {
    KernelInfo {
        architecture: std::env::consts::ARCH.to_string(),
        os_type: std::env::consts::OS.to_string(),
        os_release: read_trimmed(&paths.proc_file("sys/kernel/osrelease")).unwrap_or_default(),
        os_version: read_trimmed(&paths.proc_file("sys/kernel/version")).unwrap_or_default(),
    }
}

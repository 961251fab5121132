//! Process table snapshot (`processes`).

use std::path::Path;
use std::time::Duration;

use netip_types::Proc;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::paths::HostPaths;

pub const PROCESSES_PERIOD: Duration = Duration::from_secs(30);

/// Fill name, state, ppid and thread count from a `/proc/<pid>/stat` line.
///
/// The command name is parenthesised and may itself contain spaces or
/// parentheses, so fields are counted from the last `)`.
fn parse_stat(stat: &str, proc: &mut Proc) -> bool {
    let (Some(open), Some(close)) = (stat.find('('), stat.rfind(')')) else {
        return false;
    };
    if close < open {
        return false;
    }
    // Fields after the name start at field 3 (state)
    let rest: Vec<&str> = stat[close + 1..].split_whitespace().collect();
    if rest.len() < 18 {
        return false;
    }

    proc.name = stat[open + 1..close].to_string();
    proc.state = rest[0].to_string();
    proc.ppid = rest[1].parse().unwrap_or(0);
    proc.threads = rest[17].parse().unwrap_or(0);
    true
}

fn fd_count(dir: &Path) -> usize {
    std::fs::read_dir(dir).map_or(0, Iterator::count)
}

/// Enumerate numeric entries of `/proc`. Processes that exit mid-scan keep
/// whatever could be read.
pub fn scan(paths: &HostPaths) -> Vec<Proc> {
    let entries = match std::fs::read_dir(&paths.proc) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Failed to read {}: {}", paths.proc.display(), e);
            return Vec::new();
        }
    };

    let mut procs: Vec<Proc> = entries
        .filter_map(std::result::Result::ok)
        .filter_map(|entry| {
            let pid: i32 = entry.file_name().to_str()?.parse().ok()?;
            let dir = entry.path();
            let mut proc = Proc {
                pid,
                fds: fd_count(&dir.join("fd")),
                ..Proc::default()
            };
            if let Ok(stat) = std::fs::read_to_string(dir.join("stat")) {
                parse_stat(&stat, &mut proc);
            }
            Some(proc)
        })
        .collect();
    procs.sort_by_key(|p| p.pid);
    procs
}

/// Send a process snapshot every `period`, first one after a full period
pub async fn run(
    paths: HostPaths,
    period: Duration,
    tx: mpsc::Sender<Vec<Proc>>,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                let procs = scan(&paths);
                debug!("Scanned {} processes", procs.len());
                if tx.send(procs).await.is_err() {
                    break;
                }
            }
        }
    }
    debug!("Process scanner stopped");
}

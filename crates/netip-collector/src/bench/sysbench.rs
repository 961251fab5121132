use std::sync::LazyLock;

use netip_types::TestSoftware;
use regex::Regex;

use super::{BenchTools, tool};
use crate::error::{Error, Result};

static EVENTS_PER_SEC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"events per second:\s*([0-9.]+)").expect("valid regex"));
static MIB_PER_SEC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"transferred \(([0-9.]+) MiB/sec\)").expect("valid regex"));

const SOFTWARE: &str = "sysbench";
const VERSION: &str = "1.0.20";

pub(crate) fn cpu_software() -> TestSoftware {
    TestSoftware {
        test: "cpu-prime".to_string(),
        software: SOFTWARE.to_string(),
        version: VERSION.to_string(),
    }
}

pub(crate) fn mem_software() -> TestSoftware {
    TestSoftware {
        test: "mem-speed".to_string(),
        software: SOFTWARE.to_string(),
        version: VERSION.to_string(),
    }
}

fn capture_number(re: &Regex, output: &str) -> Result<f64> {
    let captures = re
        .captures(output)
        .ok_or_else(|| Error::parse(format!("no match for `{}`", re.as_str())))?;
    captures[1]
        .parse()
        .map_err(|e| Error::parse(format!("{}: {e}", &captures[1])))
}

/// Prime computation throughput, events per second
pub(crate) async fn cpu_prime(tools: &BenchTools, runtime: u32) -> Result<f64> {
    let time = format!("--time={runtime}");
    let output = tool(
        &tools.sysbench,
        &["cpu", "--cpu-max-prime=10000", &time, "--threads=1", "run"],
    )
    .await?;
    capture_number(&EVENTS_PER_SEC, &output)
}

/// Memory write throughput, MiB per second
pub(crate) async fn mem_speed(tools: &BenchTools, runtime: u32) -> Result<f64> {
    let time = format!("--time={runtime}");
    let output = tool(
        &tools.sysbench,
        &["memory", "--memory-total-size=8G", "--threads=1", &time, "run"],
    )
    .await?;
    capture_number(&MIB_PER_SEC, &output)
}

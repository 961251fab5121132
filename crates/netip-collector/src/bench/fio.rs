use netip_types::{FioResult, TestSoftware};
use serde::Deserialize;

use super::{BenchTools, json_body, tool};
use crate::error::{Error, Result};

pub(crate) fn software() -> TestSoftware {
    TestSoftware {
        test: "io".to_string(),
        software: "fio".to_string(),
        version: "3.34".to_string(),
    }
}

#[derive(Debug, Deserialize)]
struct Report {
    #[serde(default)]
    jobs: Vec<Job>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Job {
    error: i64,
    read: Direction,
    write: Direction,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Direction {
    bw_bytes: u64,
    iops: f64,
    lat_ns: Latency,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Latency {
    mean: f64,
}

fn parse_report(output: &str) -> Result<FioResult> {
    let report: Report = serde_json::from_str(json_body(output))?;
    let job = report
        .jobs
        .first()
        .ok_or_else(|| Error::parse("fio report has no jobs"))?;
    if job.error > 0 {
        return Err(Error::parse(format!("fio job error {}", job.error)));
    }

    Ok(FioResult {
        read_bw: job.read.bw_bytes,
        read_iops: job.read.iops,
        read_lat_ns: job.read.lat_ns.mean,
        write_bw: job.write.bw_bytes,
        write_iops: job.write.iops,
        write_lat_ns: job.write.lat_ns.mean,
    })
}

/// Mixed 4k read/write against a scratch file in the work directory
pub(crate) async fn readwrite(tools: &BenchTools, runtime: u32) -> Result<FioResult> {
    let runtime = format!("--runtime={runtime}");
    let directory = format!("--directory={}", tools.work_dir.display());
    let output = tool(
        &tools.fio,
        &[
            "--output-format=json",
            "--name=io_test",
            "--rw=readwrite",
            "--bs=4k",
            "--size=1G",
            "--numjobs=1",
            &runtime,
            "--time_based",
            "--group_reporting",
            &directory,
            "--unlink=1",
        ],
    )
    .await?;
    parse_report(&output)
}

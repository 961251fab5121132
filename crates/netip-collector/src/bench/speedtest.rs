use netip_types::{SpeedTest, TestSoftware};

use super::{BenchTools, json_body, tool};
use crate::error::Result;

pub(crate) fn software() -> TestSoftware {
    TestSoftware {
        test: "net-speed".to_string(),
        software: "speedtest-cli".to_string(),
        version: "2.1.3".to_string(),
    }
}

pub(crate) async fn measure(tools: &BenchTools, runtime: u32) -> Result<SpeedTest> {
    let timeout = runtime.to_string();
    let output = tool(&tools.speedtest, &["--timeout", &timeout, "--json"]).await?;
    Ok(serde_json::from_str(json_body(&output))?)
}

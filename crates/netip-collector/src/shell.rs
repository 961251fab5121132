//! External command execution for producers that shell out.

use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

use crate::error::{Error, Result};

fn describe(program: &str, args: &[String]) -> String {
    if args.is_empty() {
        program.to_string()
    } else {
        format!("{program} {}", args.join(" "))
    }
}

/// Run a command to completion and return stdout followed by stderr, trimmed.
///
/// The child is killed if the returned future is dropped, so callers can
/// bound it with `tokio::time::timeout` or cancel it with the surrounding task.
pub(crate) async fn run(program: &str, args: &[String]) -> Result<String> {
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| Error::Command {
            command: describe(program, args),
            detail: e.to_string(),
        })?;

    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));
    let combined = combined.trim().to_string();

    if !output.status.success() {
        return Err(Error::Command {
            command: describe(program, args),
            detail: format!("{} | out: {}", output.status, combined),
        });
    }

    Ok(combined)
}

/// [`run`] bounded by `limit`
pub(crate) async fn run_with_timeout(
    program: &str,
    args: &[String],
    limit: Duration,
) -> Result<String> {
    tokio::time::timeout(limit, run(program, args))
        .await
        .map_err(|_| Error::Timeout {
            command: describe(program, args),
            after: limit,
        })?
}

/// Split a launcher prefix like `["sh", "fake-tool.sh"]` into program and leading args
pub(crate) fn with_prefix(prefix: &[String], args: &[&str]) -> Option<(String, Vec<String>)> {
    let (program, leading) = prefix.split_first()?;
    let mut all: Vec<String> = leading.to_vec();
    all.extend(args.iter().map(|a| (*a).to_string()));
    Some((program.clone(), all))
}

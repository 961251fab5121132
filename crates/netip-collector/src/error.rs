use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Command `{command}` failed: {detail}")]
    Command { command: String, detail: String },

    #[error("Command `{command}` timed out after {after:?}")]
    Timeout { command: String, after: Duration },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Benchmark already running")]
    Busy,
}

impl Error {
    pub(crate) fn parse(message: impl Into<String>) -> Self {
        Self::Parse(message.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

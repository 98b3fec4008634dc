use thiserror::Error;

use super::executor::GraphError;
use super::stage::{LoadError, MergeError};

#[derive(Error, Debug)]
pub enum CliError {
    #[error("failed to load stages: {0}")]
    Load(#[from] LoadError),
    #[error("failed to merge stages: {0}")]
    Merge(#[from] MergeError),
    #[error("failed to parse benchmark stage graph: {0}")]
    Graph(#[from] GraphError),
    #[error("recorder setup failed: {0}")]
    Recorder(#[from] RecorderError),
    #[error("invalid arguments: {0}")]
    Args(String),
    #[error("config error: {0}")]
    Config(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

#[derive(Error, Debug)]
pub enum RecorderError {
    #[error("recorder config error: {0}")]
    Config(String),
    #[error("recorder io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("recorder backend error: {0}")]
    Backend(String),
    #[error("provisioning failed: {0}")]
    Provision(String),
    #[error("recorder {event} call timed out after {after_ms}ms")]
    Timeout { event: &'static str, after_ms: u64 },
    #[error("recorder '{recorder}' setup failed: {source}")]
    Setup {
        recorder: String,
        #[source]
        source: Box<RecorderError>,
    },
}

impl RecorderError {
    pub fn backend(err: impl std::fmt::Display) -> Self {
        Self::Backend(err.to_string())
    }
}

//! Run recorders: pluggable sinks observing run and stage lifecycle events.
//!
//! Every registered recorder receives every event through its own queue. A
//! failing or hung recorder is logged and skipped; it never blocks the run or
//! the other recorders. The
//! only exception is [`RunRecorder::setup`] on recorders whose setup is a run
//! precondition (`setup_is_fatal`), which aborts the run before any stage is
//! dispatched.

mod fanout;

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::error::RecorderError;
use crate::executor::types::{RunSummary, StageOutcome};

pub use fanout::{RecorderFailure, RecorderFanout, Recorders, DEFAULT_RECORDER_TIMEOUT};

/// Run identity handed to every recorder call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunInfo {
    pub run_id: String,
    pub run_name: String,
    pub comment: String,
    pub server_fqdn: String,
    pub rand_seed: i64,
    pub rand_skip: u64,
    pub start_time: DateTime<Local>,
    pub output_dir: PathBuf,
    pub stage_ids: Vec<String>,
}

#[async_trait]
pub trait RunRecorder: Send + Sync {
    fn name(&self) -> &str;

    /// Whether a `setup` failure must abort the run.
    fn setup_is_fatal(&self) -> bool {
        false
    }

    /// Per-call deadline overriding the run-wide recorder timeout.
    fn call_timeout(&self) -> Option<Duration> {
        None
    }

    /// Prepare the backend (connect, create tables, provision infrastructure).
    async fn setup(&self, _run: &RunInfo) -> Result<(), RecorderError> {
        Ok(())
    }

    async fn record_run_start(&self, run: &RunInfo) -> Result<(), RecorderError>;

    async fn record_stage(
        &self,
        run: &RunInfo,
        outcome: &StageOutcome,
    ) -> Result<(), RecorderError>;

    async fn record_run_end(&self, run: &RunInfo, summary: &RunSummary)
        -> Result<(), RecorderError>;

    /// Release backend resources. Called once, after `record_run_end`.
    async fn teardown(&self, _run: &RunInfo) -> Result<(), RecorderError> {
        Ok(())
    }
}

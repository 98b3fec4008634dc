use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use super::status::{FailureReason, StageStatus};

/// What a stage runner reports back on success.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageReport {
    pub queries: usize,
    pub failed_queries: usize,
    pub rows: u64,
}

/// Terminal outcome of one stage, as seen by recorders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageOutcome {
    pub stage_id: String,
    pub status: StageStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<FailureReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Local>>,
    pub finished_at: DateTime<Local>,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rand_skip: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<StageReport>,
    pub output_dir: PathBuf,
}

impl StageOutcome {
    pub fn succeeded(&self) -> bool {
        self.status == StageStatus::Succeeded
    }
}

/// Aggregate counts for the end-of-run event.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub duration_ms: u64,
    pub exit_code: i32,
}

/// Result of executing a stage graph.
#[derive(Debug, Clone)]
pub struct RunResult {
    pub outcomes: BTreeMap<String, StageOutcome>,
    /// Stage ids in the order they reached a terminal state.
    pub completion_order: Vec<String>,
    pub summary: RunSummary,
}

impl RunResult {
    pub fn exit_code(&self) -> i32 {
        self.summary.exit_code
    }

    pub fn status_of(&self, stage_id: &str) -> Option<StageStatus> {
        self.outcomes.get(stage_id).map(|o| o.status)
    }

    pub fn reason_of(&self, stage_id: &str) -> Option<&FailureReason> {
        self.outcomes.get(stage_id).and_then(|o| o.reason.as_ref())
    }

    pub fn all_succeeded(&self) -> bool {
        self.outcomes.values().all(StageOutcome::succeeded)
    }
}

impl RunSummary {
    pub fn from_outcomes<'a>(
        outcomes: impl IntoIterator<Item = &'a StageOutcome>,
        duration_ms: u64,
    ) -> Self {
        let mut summary = RunSummary {
            duration_ms,
            ..RunSummary::default()
        };
        for outcome in outcomes {
            summary.total += 1;
            match outcome.status {
                StageStatus::Succeeded => summary.succeeded += 1,
                StageStatus::Cancelled => summary.cancelled += 1,
                _ => summary.failed += 1,
            }
        }
        summary.exit_code = if summary.succeeded == summary.total { 0 } else { 1 };
        summary
    }
}

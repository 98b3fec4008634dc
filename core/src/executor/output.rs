use super::graph::StageGraph;
use super::types::{RunSummary, StageOutcome, StageStatus};

/// Log the execution plan, one line per ready set.
pub fn emit_execution_plan(run_name: &str, graph: &StageGraph) {
    tracing::info!(
        run_name = %run_name,
        stages = graph.len(),
        levels = graph.ready_sets().len(),
        "execution plan"
    );
    for (level, set) in graph.ready_sets().iter().enumerate() {
        tracing::debug!(level = level, stages = %set.join(", "), "ready set");
    }
}

pub fn emit_stage_start(stage_id: &str, rand_skip: u64) {
    tracing::info!(stage_id = %stage_id, rand_skip = rand_skip, "stage started");
}

pub fn emit_stage_end(outcome: &StageOutcome) {
    match (outcome.status, &outcome.reason) {
        (StageStatus::Succeeded, _) => tracing::info!(
            stage_id = %outcome.stage_id,
            duration_ms = outcome.duration_ms,
            "stage succeeded"
        ),
        (StageStatus::Cancelled, _) => tracing::warn!(
            stage_id = %outcome.stage_id,
            "stage cancelled"
        ),
        (_, Some(reason)) => tracing::error!(
            stage_id = %outcome.stage_id,
            reason = %reason,
            duration_ms = outcome.duration_ms,
            "stage failed"
        ),
        (status, None) => tracing::error!(
            stage_id = %outcome.stage_id,
            status = %status,
            "stage ended"
        ),
    }
}

pub fn emit_run_end(run_name: &str, summary: &RunSummary) {
    if summary.exit_code == 0 {
        tracing::info!(
            run_name = %run_name,
            stages = summary.total,
            duration_ms = summary.duration_ms,
            "run finished"
        );
    } else {
        tracing::error!(
            run_name = %run_name,
            succeeded = summary.succeeded,
            failed = summary.failed,
            cancelled = summary.cancelled,
            duration_ms = summary.duration_ms,
            "run finished with failures"
        );
    }
}

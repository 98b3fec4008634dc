use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use futures::FutureExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::StageError;
use crate::recorder::RecorderFanout;
use crate::state::{SharedStageStates, StageContext};

use super::graph::StageGraph;
use super::output::{emit_stage_end, emit_stage_start};
use super::progress::ProgressMonitor;
use super::traits::StageRunner;
use super::types::{
    FailureReason, RunResult, RunSummary, StageOutcome, StageReport, StageStatus,
};

/// Message a worker task sends back when its stage returns.
struct Completion {
    stage_id: String,
    started_at: DateTime<Local>,
    elapsed: Duration,
    rand_skip: u64,
    result: Result<StageReport, StageError>,
}

/// Owns every stage state transition of one run.
///
/// Only the coordinator mutates stage state. Stage workloads run as spawned
/// tasks that report back through an mpsc channel; the coordinator waits on
/// that channel (or on cancellation) and never on stage work directly.
pub(crate) struct Coordinator<'a> {
    graph: &'a StageGraph,
    states: Arc<SharedStageStates>,
    runner: Arc<dyn StageRunner>,
    limit: usize,
    status: HashMap<String, StageStatus>,
    remaining_deps: HashMap<String, usize>,
    ready: BTreeSet<String>,
    running: usize,
    outcomes: BTreeMap<String, StageOutcome>,
    completion_order: Vec<String>,
    progress: ProgressMonitor,
}

impl<'a> Coordinator<'a> {
    pub(crate) fn new(
        graph: &'a StageGraph,
        states: Arc<SharedStageStates>,
        runner: Arc<dyn StageRunner>,
        limit: usize,
        progress: bool,
    ) -> Self {
        let mut status = HashMap::new();
        let mut remaining_deps = HashMap::new();
        for id in graph.nodes.keys() {
            status.insert(id.clone(), StageStatus::Pending);
            remaining_deps.insert(id.clone(), graph.dependencies(id).len());
        }

        Self {
            graph,
            states,
            runner,
            limit: limit.max(1),
            status,
            remaining_deps,
            ready: BTreeSet::new(),
            running: 0,
            outcomes: BTreeMap::new(),
            completion_order: Vec::new(),
            progress: ProgressMonitor::new(graph, progress),
        }
    }

    pub(crate) async fn run(mut self, cancel: &CancellationToken, fanout: &RecorderFanout) -> RunResult {
        let start = Instant::now();
        let (tx, mut rx) = mpsc::unbounded_channel::<Completion>();

        let initial: Vec<String> = self
            .remaining_deps
            .iter()
            .filter(|(_, &n)| n == 0)
            .map(|(id, _)| id.clone())
            .collect();
        for id in initial {
            self.mark_ready(&id);
        }

        loop {
            if !cancel.is_cancelled() {
                while self.running < self.limit {
                    let Some(id) = self.ready.pop_first() else {
                        break;
                    };
                    self.dispatch(&id, cancel, &tx);
                }
            }

            if self.running == 0 {
                break;
            }

            tokio::select! {
                biased;
                Some(done) = rx.recv() => self.complete(done, fanout),
                _ = cancel.cancelled(), if !cancel.is_cancelled() => {
                    tracing::warn!(running = self.running, "cancellation requested, waiting for running stages");
                    self.progress.cancelling(self.running);
                }
            }
        }

        // Whatever never got dispatched ends cancelled.
        let leftover: Vec<String> = self
            .graph
            .order()
            .iter()
            .filter(|id| !self.status_of(id).is_terminal())
            .cloned()
            .collect();
        for id in leftover {
            self.finish_undispatched(&id, StageStatus::Cancelled, FailureReason::Cancelled, fanout);
        }

        let summary = RunSummary::from_outcomes(
            self.outcomes.values(),
            start.elapsed().as_millis() as u64,
        );
        self.progress.finish();

        RunResult {
            outcomes: self.outcomes,
            completion_order: self.completion_order,
            summary,
        }
    }

    fn status_of(&self, id: &str) -> StageStatus {
        self.status.get(id).copied().unwrap_or(StageStatus::Pending)
    }

    fn set_status(&mut self, id: &str, to: StageStatus) -> bool {
        let from = self.status_of(id);
        match from.transition(to) {
            Ok(next) => {
                self.status.insert(id.to_string(), next);
                true
            }
            Err(err) => {
                tracing::error!(stage_id = %id, error = %err, "rejected stage transition");
                false
            }
        }
    }

    fn mark_ready(&mut self, id: &str) {
        if self.set_status(id, StageStatus::Ready) {
            self.ready.insert(id.to_string());
        }
    }

    fn dispatch(&mut self, id: &str, cancel: &CancellationToken, tx: &mpsc::UnboundedSender<Completion>) {
        let Some(stage) = self.graph.stage(id).cloned() else {
            return;
        };
        if !self.set_status(id, StageStatus::Running) {
            return;
        }
        self.running += 1;

        let rand_skip = self.states.allocate_rand_skip();
        emit_stage_start(id, rand_skip);
        self.progress.stage_started(id);

        let ctx = StageContext::new(self.states.clone(), id, rand_skip, cancel.child_token());
        let runner = self.runner.clone();
        let tx = tx.clone();
        let timeout = stage.payload.timeout_ms.map(Duration::from_millis);

        tokio::spawn(async move {
            let started_at = Local::now();
            let started = Instant::now();

            let work = AssertUnwindSafe(runner.run_stage(&stage, &ctx)).catch_unwind();
            let result = match timeout {
                Some(limit) => match tokio::time::timeout(limit, work).await {
                    Ok(res) => res,
                    Err(_) => {
                        ctx.cancel.cancel();
                        Ok(Err(StageError::Execution(format!(
                            "timed out after {}ms",
                            limit.as_millis()
                        ))))
                    }
                },
                None => work.await,
            };
            let result = result.unwrap_or_else(|_| {
                Err(StageError::Execution("stage runner panicked".to_string()))
            });

            let _ = tx.send(Completion {
                stage_id: stage.id.clone(),
                started_at,
                elapsed: started.elapsed(),
                rand_skip,
                result,
            });
        });
    }

    fn complete(&mut self, done: Completion, fanout: &RecorderFanout) {
        self.running = self.running.saturating_sub(1);
        let id = done.stage_id.clone();

        let (status, reason, report) = match done.result {
            Ok(report) => (StageStatus::Succeeded, None, Some(report)),
            Err(StageError::Cancelled) => (StageStatus::Cancelled, Some(FailureReason::Cancelled), None),
            Err(err) => (
                StageStatus::Failed,
                Some(FailureReason::ExecutionFailed(err.to_string())),
                None,
            ),
        };
        if !self.set_status(&id, status) {
            return;
        }

        let outcome = StageOutcome {
            stage_id: id.clone(),
            status,
            reason,
            started_at: Some(done.started_at),
            finished_at: Local::now(),
            duration_ms: done.elapsed.as_millis() as u64,
            rand_skip: Some(done.rand_skip),
            report,
            output_dir: self.states.stage_output_dir(&id),
        };
        self.record(outcome, fanout);

        match status {
            StageStatus::Succeeded => {
                let dependents = self.graph.dependents(&id).to_vec();
                for dependent in dependents {
                    let Some(n) = self.remaining_deps.get_mut(&dependent) else {
                        continue;
                    };
                    *n = n.saturating_sub(1);
                    if *n == 0 && self.status_of(&dependent) == StageStatus::Pending {
                        self.mark_ready(&dependent);
                    }
                }
            }
            StageStatus::Failed => {
                self.cascade(&id, StageStatus::Failed, FailureReason::DependencyFailed(id.clone()), fanout)
            }
            _ => self.cascade(&id, StageStatus::Cancelled, FailureReason::Cancelled, fanout),
        }
    }

    /// Terminate every transitive dependent of `id` without running it.
    fn cascade(&mut self, id: &str, status: StageStatus, reason: FailureReason, fanout: &RecorderFanout) {
        for dependent in self.graph.transitive_dependents(id) {
            if self.status_of(&dependent).is_terminal() {
                continue;
            }
            self.ready.remove(&dependent);
            self.finish_undispatched(&dependent, status, reason.clone(), fanout);
        }
    }

    fn finish_undispatched(
        &mut self,
        id: &str,
        status: StageStatus,
        reason: FailureReason,
        fanout: &RecorderFanout,
    ) {
        if !self.set_status(id, status) {
            return;
        }
        let outcome = StageOutcome {
            stage_id: id.to_string(),
            status,
            reason: Some(reason),
            started_at: None,
            finished_at: Local::now(),
            duration_ms: 0,
            rand_skip: None,
            report: None,
            output_dir: self.states.stage_output_dir(id),
        };
        self.record(outcome, fanout);
    }

    fn record(&mut self, outcome: StageOutcome, fanout: &RecorderFanout) {
        emit_stage_end(&outcome);
        self.progress.stage_finished(&outcome);
        self.completion_order.push(outcome.stage_id.clone());
        fanout.record_stage(outcome.clone());
        self.outcomes.insert(outcome.stage_id.clone(), outcome);
    }
}

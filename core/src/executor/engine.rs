use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::error::{LoadError, RecorderError};
use crate::recorder::RunInfo;
use crate::stage::{Stage, StageLoader};
use crate::state::SharedStageStates;

use super::graph::StageGraph;
use super::output::{emit_execution_plan, emit_run_end};
use super::scheduler::Coordinator;
use super::traits::StageRunner;
use super::types::{ExecutorConfig, RunResult};

/// Load every path in argument order and merge them into one root stage.
///
/// The returned root keeps argument order (and directory traversal order
/// inside each argument), which is what the default run name is built from.
pub fn load_stage_tree(loader: &StageLoader, paths: &[PathBuf]) -> Result<Stage, LoadError> {
    let mut root = Stage::composite(None);
    for path in paths {
        let stage = loader.load_path(path)?;
        if let Err(err) = root.merge_with(stage) {
            tracing::error!(path = %path.display(), error = %err, "failed to merge stage definitions");
            return Err(err.into());
        }
    }
    Ok(root)
}

/// Runs a validated stage graph against the shared run state.
pub struct RunExecutor {
    states: Arc<SharedStageStates>,
    graph: Arc<StageGraph>,
    runner: Arc<dyn StageRunner>,
    config: ExecutorConfig,
}

impl RunExecutor {
    pub fn new(
        states: Arc<SharedStageStates>,
        graph: Arc<StageGraph>,
        runner: Arc<dyn StageRunner>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            states,
            graph,
            runner,
            config,
        }
    }

    pub fn states(&self) -> &Arc<SharedStageStates> {
        &self.states
    }

    /// Execute the whole run.
    ///
    /// Only a fatal recorder setup failure returns `Err`, and it does so
    /// before any stage is dispatched. Stage failures are reported through
    /// the returned [`RunResult`].
    pub async fn run(&self, cancel: CancellationToken) -> Result<RunResult, RecorderError> {
        let recorders = self.states.recorders();
        let run: Arc<RunInfo> = Arc::new(self.states.run_info(self.graph.order().to_vec()));

        tracing::info!(
            run_id = %run.run_id,
            run_name = %run.run_name,
            recorders = recorders.len(),
            max_parallel = ?self.config.max_parallel,
            "starting run"
        );

        recorders.setup_all(&run).await?;
        let fanout = recorders.start(run.clone());
        fanout.record_run_start();
        emit_execution_plan(&run.run_name, &self.graph);

        let coordinator = Coordinator::new(
            &self.graph,
            self.states.clone(),
            self.runner.clone(),
            self.config.parallel_limit(),
            self.config.progress,
        );
        let result = coordinator.run(&cancel, &fanout).await;

        fanout.record_run_end(result.summary.clone());
        let undelivered = fanout.finish().await;
        if undelivered > 0 {
            tracing::warn!(events = undelivered, "some run events were not recorded");
        }
        recorders.teardown_all(&run).await;
        emit_run_end(&run.run_name, &result.summary);

        Ok(result)
    }
}

use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::SharedStageStates;

/// Per-stage execution context derived from the shared run state.
#[derive(Debug, Clone)]
pub struct StageContext {
    pub stage_id: String,
    /// `<output_path>/<run_name>/<stage_id>`
    pub output_dir: PathBuf,
    pub rand_seed: i64,
    /// Offset drawn for this stage from the run's random-skip counter.
    pub rand_skip: u64,
    pub cancel: CancellationToken,
    pub states: Arc<SharedStageStates>,
}

impl StageContext {
    pub fn new(
        states: Arc<SharedStageStates>,
        stage_id: &str,
        rand_skip: u64,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            stage_id: stage_id.to_string(),
            output_dir: states.stage_output_dir(stage_id),
            rand_seed: states.rand_seed,
            rand_skip,
            cancel,
            states,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

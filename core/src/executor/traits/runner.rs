use async_trait::async_trait;

use crate::error::StageError;
use crate::executor::types::StageReport;
use crate::stage::Stage;
use crate::state::StageContext;

/// Executes the workload of a single stage.
///
/// Implementations must observe `ctx.cancel` at their I/O suspension points
/// and return `StageError::Cancelled` promptly once it fires.
#[async_trait]
pub trait StageRunner: Send + Sync {
    fn name(&self) -> &str;

    async fn run_stage(&self, stage: &Stage, ctx: &StageContext) -> Result<StageReport, StageError>;
}

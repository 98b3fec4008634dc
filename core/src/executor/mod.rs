//! Stage graph construction and execution.
//!
//! ```text
//! Stage (merged root)
//!   ↓
//! parse_stage_graph() → StageGraph { nodes, edges, reverse_edges }
//!   ↓                    validate(): unresolved deps, cycles
//!   ↓                    topological_sort(): ready sets
//! RunExecutor::run() → RunResult
//! ```
//!
//! The coordinator is the single owner of stage state. Stage work runs on
//! spawned tasks that report completion over a channel.

mod engine;
mod graph;
mod output;
mod progress;
mod scheduler;
pub mod traits;
pub mod types;

pub use engine::{load_stage_tree, RunExecutor};
pub use graph::{parse_stage_graph, StageGraph};
pub use progress::ProgressMonitor;
pub use traits::StageRunner;
pub use types::{
    ExecutorConfig, FailureReason, RunResult, RunSummary, StageOutcome, StageReport, StageStatus,
    TransitionError,
};

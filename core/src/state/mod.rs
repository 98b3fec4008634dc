//! Run-scoped state shared (read-only) by every stage execution.

mod context;
mod shared;

pub use context::StageContext;
pub use shared::SharedStageStates;

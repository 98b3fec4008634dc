//! Stable re-exports for consumers (`cli`, `plugins`, and external crates).
//!
//! Prefer importing from `pbench_core::api` instead of reaching into internal modules.

pub use crate::client::{ClientError, ClientFactory, QueryClient, QueryRequest, QueryResult};
pub use crate::config::{
    load_default, load_from_path, AppConfig, ClientConfig, LoggingConfig, RecordersConfig,
    RunConfig,
};
pub use crate::error::{
    CliError, GraphError, LoadError, MergeError, RecorderError, StageError,
};
pub use crate::executor::{
    load_stage_tree, parse_stage_graph, ExecutorConfig, FailureReason, RunExecutor, RunResult,
    RunSummary, StageGraph, StageOutcome, StageReport, StageRunner, StageStatus,
};
pub use crate::recorder::{RecorderFailure, Recorders, RunInfo, RunRecorder};
pub use crate::stage::{Stage, StageLoader, StagePayload, DEFAULT_STAGE_FILE_EXT};
pub use crate::state::{SharedStageStates, StageContext};
pub use crate::util::time::{format_directory_time, DIRECTORY_NAME_TIME_FORMAT};

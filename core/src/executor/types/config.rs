use serde::{Deserialize, Serialize};

use crate::stage::DEFAULT_STAGE_FILE_EXT;

/// Executor knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Maximum stages running at once. `None` (or 0) means no limit.
    #[serde(default)]
    pub max_parallel: Option<usize>,

    /// Extension of stage definition files.
    #[serde(default = "default_stage_file_ext")]
    pub stage_file_ext: String,

    /// Show progress bars on stderr.
    #[serde(default = "default_progress")]
    pub progress: bool,
}

fn default_stage_file_ext() -> String {
    DEFAULT_STAGE_FILE_EXT.to_string()
}

fn default_progress() -> bool {
    true
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_parallel: None,
            stage_file_ext: default_stage_file_ext(),
            progress: default_progress(),
        }
    }
}

impl ExecutorConfig {
    pub fn parallel_limit(&self) -> usize {
        match self.max_parallel {
            Some(n) if n > 0 => n,
            _ => usize::MAX,
        }
    }
}

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::executor::ExecutorConfig;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub executor: ExecutorConfig,

    #[serde(default)]
    pub recorders: RecordersConfig,

    #[serde(default)]
    pub client: ClientConfig,

    /// Default output directory; `~` is expanded.
    #[serde(default = "default_output_path")]
    pub output_path: String,
}

fn default_output_path() -> String {
    "./pbench-results".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_enabled")]
    pub enabled: bool,

    /// If true, log to stderr.
    #[serde(default = "default_logging_console")]
    pub console: bool,

    /// If true, log to a file under `directory` (or OS temp dir if unset).
    #[serde(default = "default_logging_file")]
    pub file: bool,

    /// EnvFilter string, e.g. "info" or "pbench_core=debug".
    #[serde(default = "default_logging_level")]
    pub level: String,

    /// Optional directory for log files. If empty or unset, uses OS temp dir.
    #[serde(default)]
    pub directory: Option<String>,
}

fn default_logging_enabled() -> bool {
    true
}

fn default_logging_console() -> bool {
    true
}

fn default_logging_file() -> bool {
    false
}

fn default_logging_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: default_logging_enabled(),
            console: default_logging_console(),
            file: default_logging_file(),
            level: default_logging_level(),
            directory: None,
        }
    }
}

/// Which recorders a run registers. An empty path leaves that recorder out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordersConfig {
    /// Write run.json / stages.jsonl / summary.json under the run output dir.
    #[serde(default = "default_file_recorder")]
    pub file: bool,

    #[serde(default)]
    pub influx_config: String,

    #[serde(default)]
    pub mysql_config: String,

    /// When set, MySQL is provisioned through Pulumi and recorded through
    /// the provisioned database instead of `mysql_config`'s url.
    #[serde(default)]
    pub pulumi_config: String,

    /// Deadline for one recorder call; a recorder that misses it gets no
    /// further events for the run.
    #[serde(default = "default_recorder_timeout_ms")]
    pub call_timeout_ms: u64,
}

fn default_file_recorder() -> bool {
    true
}

fn default_recorder_timeout_ms() -> u64 {
    30_000
}

impl Default for RecordersConfig {
    fn default() -> Self {
        Self {
            file: default_file_recorder(),
            influx_config: String::new(),
            mysql_config: String::new(),
            pulumi_config: String::new(),
            call_timeout_ms: default_recorder_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_server_url")]
    pub server_url: String,

    #[serde(default = "default_user")]
    pub user: String,

    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_server_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

fn default_user() -> String {
    "pbench".to_string()
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            user: default_user(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

/// Everything one `run` invocation needs, after CLI flags were applied on
/// top of the file config. Built once and only read afterwards.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub stage_paths: Vec<PathBuf>,
    pub run_name: Option<String>,
    pub comment: String,
    pub rand_seed: i64,
    pub rand_skip: u64,
    pub output_path: PathBuf,
    pub client: ClientConfig,
    pub executor: ExecutorConfig,
    pub recorders: RecordersConfig,
}

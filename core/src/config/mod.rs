mod load;
mod types;

pub use load::{
    apply_env_overrides, get_pbench_data_dir, load_default, load_from_path, LOG_LEVEL_ENV,
    MAX_PARALLEL_ENV, PBENCH_HOME_ENV,
};
pub use types::{AppConfig, ClientConfig, LoggingConfig, RecordersConfig, RunConfig};

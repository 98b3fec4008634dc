use chrono::{DateTime, Local};

/// chrono format used for run names and output directory names.
pub const DIRECTORY_NAME_TIME_FORMAT: &str = "%y%m%d-%H%M%S";

/// Placeholder in an explicit run name replaced by the run start time.
pub const RUN_START_TIME_PLACEHOLDER: &str = "%t";

pub fn format_directory_time(t: &DateTime<Local>) -> String {
    t.format(DIRECTORY_NAME_TIME_FORMAT).to_string()
}

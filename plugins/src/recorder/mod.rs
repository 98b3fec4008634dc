//! Concrete run recorders.

pub mod config;
mod file;
mod influx;
mod mysql;
mod pulumi;

pub use config::{load_backend_config, InfluxConfig, MySqlConfig, PulumiConfig};
pub use file::{FileRunRecorder, RUN_FILE, STAGES_FILE, SUMMARY_FILE};
pub use influx::InfluxRunRecorder;
pub use mysql::MySqlRunRecorder;
pub use pulumi::PulumiMySqlRunRecorder;

#[cfg(test)]
pub(crate) mod test_support {
    use std::path::PathBuf;

    use chrono::{Local, TimeZone};
    use pbench_core::api::{
        FailureReason, RunInfo, RunSummary, StageOutcome, StageReport, StageStatus,
    };

    pub fn sample_run(output_dir: PathBuf) -> RunInfo {
        RunInfo {
            run_id: "00000000-0000-4000-8000-000000000001".into(),
            run_name: "bench_240101-000000".into(),
            comment: "nightly".into(),
            server_fqdn: "presto.local:8080".into(),
            rand_seed: 42,
            rand_skip: 0,
            start_time: Local.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            output_dir,
            stage_ids: vec!["a".into(), "b".into()],
        }
    }

    pub fn sample_outcome(id: &str, status: StageStatus) -> StageOutcome {
        let failed = status == StageStatus::Failed;
        StageOutcome {
            stage_id: id.to_string(),
            status,
            reason: failed.then(|| FailureReason::ExecutionFailed("boom".into())),
            started_at: Some(Local.with_ymd_and_hms(2024, 1, 1, 0, 0, 1).unwrap()),
            finished_at: Local.with_ymd_and_hms(2024, 1, 1, 0, 0, 3).unwrap(),
            duration_ms: 1500,
            rand_skip: Some(3),
            report: Some(StageReport {
                queries: 2,
                failed_queries: usize::from(failed),
                rows: 10,
            }),
            output_dir: PathBuf::from("/tmp/out").join(id),
        }
    }

    pub fn sample_summary() -> RunSummary {
        RunSummary {
            total: 2,
            succeeded: 1,
            failed: 1,
            cancelled: 0,
            duration_ms: 3000,
            exit_code: 1,
        }
    }
}

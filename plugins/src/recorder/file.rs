use std::path::PathBuf;

use async_trait::async_trait;
use pbench_core::api::{RecorderError, RunInfo, RunRecorder, RunSummary, StageOutcome};
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

pub const RUN_FILE: &str = "run.json";
pub const STAGES_FILE: &str = "stages.jsonl";
pub const SUMMARY_FILE: &str = "summary.json";

/// Writes run metadata and stage outcomes under the run output directory.
#[derive(Default)]
pub struct FileRunRecorder {
    append_lock: Mutex<()>,
}

#[derive(Serialize)]
struct SummaryDocument<'a> {
    run: &'a RunInfo,
    summary: &'a RunSummary,
}

impl FileRunRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    async fn write_json<T: Serialize>(path: PathBuf, value: &T) -> Result<(), RecorderError> {
        let body = serde_json::to_vec_pretty(value).map_err(RecorderError::backend)?;
        tokio::fs::write(&path, body).await?;
        Ok(())
    }
}

#[async_trait]
impl RunRecorder for FileRunRecorder {
    fn name(&self) -> &str {
        "file"
    }

    async fn setup(&self, run: &RunInfo) -> Result<(), RecorderError> {
        tokio::fs::create_dir_all(&run.output_dir).await?;
        Ok(())
    }

    async fn record_run_start(&self, run: &RunInfo) -> Result<(), RecorderError> {
        Self::write_json(run.output_dir.join(RUN_FILE), run).await
    }

    async fn record_stage(&self, run: &RunInfo, outcome: &StageOutcome) -> Result<(), RecorderError> {
        let mut line = serde_json::to_vec(outcome).map_err(RecorderError::backend)?;
        line.push(b'\n');

        let _guard = self.append_lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(run.output_dir.join(STAGES_FILE))
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }

    async fn record_run_end(&self, run: &RunInfo, summary: &RunSummary) -> Result<(), RecorderError> {
        Self::write_json(
            run.output_dir.join(SUMMARY_FILE),
            &SummaryDocument { run, summary },
        )
        .await
    }
}

use std::sync::Mutex;

use async_trait::async_trait;
use pbench_core::api::{RecorderError, RunInfo, RunRecorder, RunSummary, StageOutcome};
use sqlx::mysql::{MySqlPool, MySqlPoolOptions};
use tokio::sync::OnceCell;

use super::config::MySqlConfig;

const CREATE_RUNS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS pbench_runs (
    run_id        VARCHAR(36)  NOT NULL PRIMARY KEY,
    run_name      VARCHAR(255) NOT NULL,
    comment       TEXT,
    server_fqdn   VARCHAR(255),
    rand_seed     BIGINT,
    rand_skip     BIGINT UNSIGNED,
    start_time    DATETIME(3)  NOT NULL,
    end_time      DATETIME(3),
    total         INT,
    succeeded     INT,
    failed        INT,
    cancelled     INT,
    exit_code     INT
)"#;

const CREATE_STAGES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS pbench_stages (
    run_id         VARCHAR(36)  NOT NULL,
    stage_id       VARCHAR(255) NOT NULL,
    status         VARCHAR(16)  NOT NULL,
    reason         TEXT,
    started_at     DATETIME(3),
    finished_at    DATETIME(3)  NOT NULL,
    duration_ms    BIGINT UNSIGNED NOT NULL,
    rand_skip      BIGINT UNSIGNED,
    queries        INT,
    failed_queries INT,
    output_dir     TEXT,
    PRIMARY KEY (run_id, stage_id)
)"#;

/// Records runs and stage outcomes into `pbench_runs` / `pbench_stages`.
pub struct MySqlRunRecorder {
    cfg: MySqlConfig,
    url_override: Mutex<Option<String>>,
    pool: OnceCell<MySqlPool>,
}

impl MySqlRunRecorder {
    pub fn new(cfg: MySqlConfig) -> Self {
        Self {
            cfg,
            url_override: Mutex::new(None),
            pool: OnceCell::new(),
        }
    }

    /// Connect to `url` instead of the configured one. Must be called before `setup`.
    pub fn set_url(&self, url: impl Into<String>) {
        if let Ok(mut slot) = self.url_override.lock() {
            *slot = Some(url.into());
        }
    }

    pub fn connection_url(&self) -> String {
        self.url_override
            .lock()
            .ok()
            .and_then(|slot| slot.clone())
            .unwrap_or_else(|| self.cfg.connection_url())
    }

    fn pool(&self) -> Result<&MySqlPool, RecorderError> {
        self.pool
            .get()
            .ok_or_else(|| RecorderError::Backend("mysql recorder is not set up".to_string()))
    }
}

#[async_trait]
impl RunRecorder for MySqlRunRecorder {
    fn name(&self) -> &str {
        "mysql"
    }

    async fn setup(&self, _run: &RunInfo) -> Result<(), RecorderError> {
        let url = self.connection_url();
        let pool = self
            .pool
            .get_or_try_init(|| async {
                MySqlPoolOptions::new()
                    .max_connections(self.cfg.max_connections.max(1))
                    .connect(&url)
                    .await
                    .map_err(RecorderError::backend)
            })
            .await?;

        for ddl in [CREATE_RUNS_TABLE, CREATE_STAGES_TABLE] {
            sqlx::query(ddl)
                .execute(pool)
                .await
                .map_err(RecorderError::backend)?;
        }
        tracing::debug!(recorder = "mysql", "tables ready");
        Ok(())
    }

    async fn record_run_start(&self, run: &RunInfo) -> Result<(), RecorderError> {
        sqlx::query(
            "INSERT INTO pbench_runs (run_id, run_name, comment, server_fqdn, rand_seed, rand_skip, start_time) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&run.run_id)
        .bind(&run.run_name)
        .bind(&run.comment)
        .bind(&run.server_fqdn)
        .bind(run.rand_seed)
        .bind(run.rand_skip)
        .bind(run.start_time.naive_utc())
        .execute(self.pool()?)
        .await
        .map_err(RecorderError::backend)?;
        Ok(())
    }

    async fn record_stage(&self, run: &RunInfo, outcome: &StageOutcome) -> Result<(), RecorderError> {
        let report = outcome.report.as_ref();
        sqlx::query(
            "INSERT INTO pbench_stages (run_id, stage_id, status, reason, started_at, finished_at, \
             duration_ms, rand_skip, queries, failed_queries, output_dir) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&run.run_id)
        .bind(&outcome.stage_id)
        .bind(outcome.status.as_str())
        .bind(outcome.reason.as_ref().map(|r| r.to_string()))
        .bind(outcome.started_at.map(|t| t.naive_utc()))
        .bind(outcome.finished_at.naive_utc())
        .bind(outcome.duration_ms)
        .bind(outcome.rand_skip)
        .bind(report.map(|r| r.queries as i64))
        .bind(report.map(|r| r.failed_queries as i64))
        .bind(outcome.output_dir.display().to_string())
        .execute(self.pool()?)
        .await
        .map_err(RecorderError::backend)?;
        Ok(())
    }

    async fn record_run_end(&self, run: &RunInfo, summary: &RunSummary) -> Result<(), RecorderError> {
        sqlx::query(
            "UPDATE pbench_runs SET end_time = ?, total = ?, succeeded = ?, failed = ?, cancelled = ?, exit_code = ? \
             WHERE run_id = ?",
        )
        .bind(chrono::Utc::now().naive_utc())
        .bind(summary.total as i64)
        .bind(summary.succeeded as i64)
        .bind(summary.failed as i64)
        .bind(summary.cancelled as i64)
        .bind(summary.exit_code)
        .bind(&run.run_id)
        .execute(self.pool()?)
        .await
        .map_err(RecorderError::backend)?;
        Ok(())
    }

    async fn teardown(&self, _run: &RunInfo) -> Result<(), RecorderError> {
        if let Some(pool) = self.pool.get() {
            pool.close().await;
        }
        Ok(())
    }
}

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pbench_core::api::{RecorderError, RunInfo, RunRecorder, RunSummary, StageOutcome};
use tokio::process::Command;

use super::config::PulumiConfig;
use super::mysql::MySqlRunRecorder;

/// Provisions a MySQL database through a Pulumi stack, then records into it.
///
/// Setup failure is fatal: the run must not start when the database it is
/// supposed to record into could not be provisioned.
pub struct PulumiMySqlRunRecorder {
    cfg: PulumiConfig,
    project_dir: PathBuf,
    mysql: Arc<MySqlRunRecorder>,
}

impl PulumiMySqlRunRecorder {
    pub fn new(cfg: PulumiConfig, mysql: Arc<MySqlRunRecorder>) -> Self {
        let project_dir = pbench_core::util::paths::expand_home(&cfg.project_dir);
        Self {
            cfg,
            project_dir,
            mysql,
        }
    }

    async fn pulumi(&self, args: &[&str]) -> Result<String, RecorderError> {
        let mut full: Vec<&str> = args.to_vec();
        full.extend(["--stack", self.cfg.stack.as_str(), "--non-interactive"]);
        tracing::info!(
            recorder = "pulumi_mysql",
            bin = %self.cfg.pulumi_bin,
            args = %full.join(" "),
            "running pulumi"
        );

        let output = Command::new(&self.cfg.pulumi_bin)
            .args(&full)
            .current_dir(&self.project_dir)
            .envs(&self.cfg.env)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| {
                RecorderError::Provision(format!("failed to start {}: {e}", self.cfg.pulumi_bin))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RecorderError::Provision(format!(
                "pulumi {} exited with {}: {}",
                args.first().copied().unwrap_or_default(),
                output.status,
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn provisioned_url(&self) -> Result<String, RecorderError> {
        let raw = self.pulumi(&["stack", "output", "--json", "--show-secrets"]).await?;
        parse_stack_output(&raw, &self.cfg.mysql_url_output)
    }

    async fn connect(&self, run: &RunInfo) -> Result<(), RecorderError> {
        let url = self.provisioned_url().await?;
        self.mysql.set_url(url);
        self.mysql.setup(run).await
    }

    async fn destroy(&self) -> Result<(), RecorderError> {
        self.pulumi(&["destroy", "--yes", "--skip-preview"]).await.map(|_| ())
    }
}

pub(crate) fn parse_stack_output(raw: &str, key: &str) -> Result<String, RecorderError> {
    let outputs: serde_json::Value = serde_json::from_str(raw)
        .map_err(|e| RecorderError::Provision(format!("invalid stack output json: {e}")))?;
    outputs
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|v| !v.trim().is_empty())
        .map(str::to_string)
        .ok_or_else(|| RecorderError::Provision(format!("stack output '{key}' is missing")))
}

#[async_trait]
impl RunRecorder for PulumiMySqlRunRecorder {
    fn name(&self) -> &str {
        "pulumi_mysql"
    }

    fn setup_is_fatal(&self) -> bool {
        true
    }

    fn call_timeout(&self) -> Option<Duration> {
        Some(Duration::from_secs(self.cfg.timeout_secs))
    }

    /// Teardown never runs for a recorder whose setup failed, so a stack
    /// brought up here is destroyed here when anything after `up` fails.
    async fn setup(&self, run: &RunInfo) -> Result<(), RecorderError> {
        self.pulumi(&["up", "--yes", "--skip-preview"]).await?;
        let Err(err) = self.connect(run).await else {
            return Ok(());
        };
        if self.cfg.destroy_on_finish {
            tracing::warn!(
                recorder = "pulumi_mysql",
                error = %err,
                "setup failed after stack up, destroying stack"
            );
            if let Err(e) = self.destroy().await {
                tracing::error!(recorder = "pulumi_mysql", error = %e, "failed to destroy stack");
            }
        }
        Err(err)
    }

    async fn record_run_start(&self, run: &RunInfo) -> Result<(), RecorderError> {
        self.mysql.record_run_start(run).await
    }

    async fn record_stage(&self, run: &RunInfo, outcome: &StageOutcome) -> Result<(), RecorderError> {
        self.mysql.record_stage(run, outcome).await
    }

    async fn record_run_end(&self, run: &RunInfo, summary: &RunSummary) -> Result<(), RecorderError> {
        self.mysql.record_run_end(run, summary).await
    }

    async fn teardown(&self, run: &RunInfo) -> Result<(), RecorderError> {
        let closed = self.mysql.teardown(run).await;
        if self.cfg.destroy_on_finish {
            self.destroy().await?;
        }
        closed
    }
}

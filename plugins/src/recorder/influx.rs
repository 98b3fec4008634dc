use std::time::Duration;

use async_trait::async_trait;
use pbench_core::api::{RecorderError, RunInfo, RunRecorder, RunSummary, StageOutcome};

use super::config::InfluxConfig;

/// Pushes run and stage points to InfluxDB v2 using line protocol.
pub struct InfluxRunRecorder {
    cfg: InfluxConfig,
    http: reqwest::Client,
    url_write: String,
}

impl InfluxRunRecorder {
    pub fn new(cfg: InfluxConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .build()?;
        let url_write = format!("{}/api/v2/write", cfg.url.trim_end_matches('/'));
        Ok(Self {
            cfg,
            http,
            url_write,
        })
    }

    async fn write(&self, body: String) -> Result<(), RecorderError> {
        let mut req = self
            .http
            .post(&self.url_write)
            .query(&[
                ("org", self.cfg.org.as_str()),
                ("bucket", self.cfg.bucket.as_str()),
                ("precision", "ms"),
            ])
            .header("Content-Type", "text/plain; charset=utf-8")
            .body(body);
        if !self.cfg.token.trim().is_empty() {
            req = req.header("Authorization", format!("Token {}", self.cfg.token));
        }
        let resp = req.send().await.map_err(RecorderError::backend)?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(RecorderError::Backend(format!(
                "influx write returned {status}: {}",
                body.trim()
            )));
        }
        Ok(())
    }

    pub(crate) fn run_start_line(&self, run: &RunInfo) -> String {
        LineBuilder::new(&self.cfg.measurement)
            .tag("event", "run_start")
            .tag("run_name", &run.run_name)
            .tag("server", &run.server_fqdn)
            .field_str("run_id", &run.run_id)
            .field_str("comment", &run.comment)
            .field_int("rand_seed", run.rand_seed)
            .field_int("stages", run.stage_ids.len() as i64)
            .finish(run.start_time.timestamp_millis())
    }

    pub(crate) fn stage_line(&self, run: &RunInfo, outcome: &StageOutcome) -> String {
        let mut line = LineBuilder::new(&self.cfg.measurement)
            .tag("event", "stage")
            .tag("run_name", &run.run_name)
            .tag("server", &run.server_fqdn)
            .tag("stage_id", &outcome.stage_id)
            .tag("status", outcome.status.as_str())
            .field_str("run_id", &run.run_id)
            .field_int("duration_ms", outcome.duration_ms as i64);
        if let Some(skip) = outcome.rand_skip {
            line = line.field_int("rand_skip", skip as i64);
        }
        if let Some(report) = &outcome.report {
            line = line
                .field_int("queries", report.queries as i64)
                .field_int("failed_queries", report.failed_queries as i64)
                .field_int("rows", report.rows as i64);
        }
        if let Some(reason) = &outcome.reason {
            line = line.field_str("reason", &reason.to_string());
        }
        line.finish(outcome.finished_at.timestamp_millis())
    }

    pub(crate) fn run_end_line(&self, run: &RunInfo, summary: &RunSummary) -> String {
        LineBuilder::new(&self.cfg.measurement)
            .tag("event", "run_end")
            .tag("run_name", &run.run_name)
            .tag("server", &run.server_fqdn)
            .field_str("run_id", &run.run_id)
            .field_int("total", summary.total as i64)
            .field_int("succeeded", summary.succeeded as i64)
            .field_int("failed", summary.failed as i64)
            .field_int("cancelled", summary.cancelled as i64)
            .field_int("duration_ms", summary.duration_ms as i64)
            .field_int("exit_code", summary.exit_code as i64)
            .finish(chrono::Local::now().timestamp_millis())
    }
}

#[async_trait]
impl RunRecorder for InfluxRunRecorder {
    fn name(&self) -> &str {
        "influx"
    }

    async fn record_run_start(&self, run: &RunInfo) -> Result<(), RecorderError> {
        self.write(self.run_start_line(run)).await
    }

    async fn record_stage(&self, run: &RunInfo, outcome: &StageOutcome) -> Result<(), RecorderError> {
        self.write(self.stage_line(run, outcome)).await
    }

    async fn record_run_end(&self, run: &RunInfo, summary: &RunSummary) -> Result<(), RecorderError> {
        self.write(self.run_end_line(run, summary)).await
    }
}

/// Minimal line protocol builder: `measurement,tags fields timestamp`.
struct LineBuilder {
    head: String,
    fields: Vec<String>,
}

impl LineBuilder {
    fn new(measurement: &str) -> Self {
        Self {
            head: escape(measurement, &[',', ' ']),
            fields: Vec::new(),
        }
    }

    fn tag(mut self, key: &str, value: &str) -> Self {
        // empty tag values are invalid line protocol
        if !value.is_empty() {
            self.head.push(',');
            self.head.push_str(&escape(key, &[',', '=', ' ']));
            self.head.push('=');
            self.head.push_str(&escape(value, &[',', '=', ' ']));
        }
        self
    }

    fn field_str(mut self, key: &str, value: &str) -> Self {
        self.fields.push(format!(
            "{}=\"{}\"",
            escape(key, &[',', '=', ' ']),
            escape(value, &['"'])
        ));
        self
    }

    fn field_int(mut self, key: &str, value: i64) -> Self {
        self.fields
            .push(format!("{}={}i", escape(key, &[',', '=', ' ']), value));
        self
    }

    fn finish(self, timestamp_ms: i64) -> String {
        format!("{} {} {}", self.head, self.fields.join(","), timestamp_ms)
    }
}

fn escape(value: &str, special: &[char]) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        if ch == '\\' || special.contains(&ch) {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::test_support::{sample_outcome, sample_run, sample_summary};
    use pbench_core::api::StageStatus;
    use pretty_assertions::assert_eq;

    fn recorder(url: &str) -> InfluxRunRecorder {
        InfluxRunRecorder::new(InfluxConfig {
            url: url.to_string(),
            org: "perf".into(),
            bucket: "bench".into(),
            token: "t0k".into(),
            measurement: "pbench".into(),
            timeout_ms: 2_000,
        })
        .unwrap()
    }

    #[test]
    fn test_escape() {
        assert_eq!(escape("a b,c=d", &[',', '=', ' ']), "a\\ b\\,c\\=d");
        assert_eq!(escape("say \"hi\"", &['"']), "say \\\"hi\\\"");
    }

    #[test]
    fn test_stage_line_shape() {
        let run = sample_run("/tmp/out/r1".into());
        let outcome = sample_outcome("load data", StageStatus::Succeeded);
        let line = recorder("http://influx:8086").stage_line(&run, &outcome);

        assert!(line.starts_with(
            "pbench,event=stage,run_name=bench_240101-000000,server=presto.local:8080,stage_id=load\\ data,status=succeeded "
        ));
        assert!(line.contains("duration_ms=1500i"));
        assert!(line.contains("rand_skip=3i"));
        assert!(line.contains("queries=2i"));
        assert!(line.ends_with(&outcome.finished_at.timestamp_millis().to_string()));
    }

    #[tokio::test]
    async fn test_writes_to_v2_endpoint() {
        let mut server = mockito::Server::new_async().await;
        let m = server
            .mock("POST", "/api/v2/write")
            .match_query(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("org".into(), "perf".into()),
                mockito::Matcher::UrlEncoded("bucket".into(), "bench".into()),
                mockito::Matcher::UrlEncoded("precision".into(), "ms".into()),
            ]))
            .match_header("authorization", "Token t0k")
            .match_body(mockito::Matcher::Regex("^pbench,event=run_end".into()))
            .with_status(204)
            .create_async()
            .await;

        let run = sample_run("/tmp/out/r1".into());
        recorder(&server.url())
            .record_run_end(&run, &sample_summary())
            .await
            .unwrap();
        m.assert_async().await;
    }

    #[tokio::test]
    async fn test_http_failure_is_backend_error() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/api/v2/write")
            .match_query(mockito::Matcher::Any)
            .with_status(401)
            .with_body("unauthorized")
            .create_async()
            .await;

        let run = sample_run("/tmp/out/r1".into());
        let err = recorder(&server.url())
            .record_run_start(&run)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("401"));
    }
}

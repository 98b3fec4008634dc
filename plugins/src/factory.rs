use std::sync::Arc;

use anyhow::Result;
use pbench_core::api::{
    ClientConfig, ClientFactory, QueryClient, RecordersConfig, RunRecorder, StageRunner,
};
use pbench_core::util::paths::expand_optional;

use crate::presto::PrestoClient;
use crate::recorder::{
    load_backend_config, FileRunRecorder, InfluxConfig, InfluxRunRecorder, MySqlConfig,
    MySqlRunRecorder, PulumiConfig, PulumiMySqlRunRecorder,
};
use crate::workload::QueryStageRunner;

/// Recorders in registration order: file, influx, then mysql (plain or
/// provisioned through Pulumi, never both).
pub fn build_recorders(cfg: &RecordersConfig) -> Result<Vec<Arc<dyn RunRecorder>>> {
    let mut out: Vec<Arc<dyn RunRecorder>> = Vec::new();

    if cfg.file {
        out.push(Arc::new(FileRunRecorder::new()));
    }

    if let Some(path) = expand_optional(Some(cfg.influx_config.as_str())) {
        let influx: InfluxConfig = load_backend_config(&path)?;
        out.push(Arc::new(InfluxRunRecorder::new(influx)?));
    }

    let mysql = match expand_optional(Some(cfg.mysql_config.as_str())) {
        Some(path) => {
            let mysql: MySqlConfig = load_backend_config(&path)?;
            Some(Arc::new(MySqlRunRecorder::new(mysql)))
        }
        None => None,
    };

    match expand_optional(Some(cfg.pulumi_config.as_str())) {
        Some(path) => {
            let pulumi: PulumiConfig = load_backend_config(&path)?;
            let mysql =
                mysql.unwrap_or_else(|| Arc::new(MySqlRunRecorder::new(MySqlConfig::default())));
            out.push(Arc::new(PulumiMySqlRunRecorder::new(pulumi, mysql)));
        }
        None => {
            if let Some(mysql) = mysql {
                out.push(mysql);
            }
        }
    }

    tracing::debug!(
        recorders = %out.iter().map(|r| r.name()).collect::<Vec<_>>().join(","),
        "recorders built"
    );
    Ok(out)
}

/// Factory handing out Presto clients for `cfg.server_url`.
pub fn build_client_factory(cfg: &ClientConfig) -> ClientFactory {
    let cfg = cfg.clone();
    Arc::new(move || {
        let client = PrestoClient::new(&cfg.server_url, &cfg.user, cfg.request_timeout_ms)?;
        Ok(Arc::new(client) as Arc<dyn QueryClient>)
    })
}

pub fn build_stage_runner() -> Arc<dyn StageRunner> {
    Arc::new(QueryStageRunner::new())
}

/// Host (and port) part of a server url, used as the run's server FQDN.
pub fn server_fqdn(server_url: &str) -> Result<String> {
    let url = reqwest::Url::parse(server_url)
        .map_err(|e| anyhow::anyhow!("failed to parse server URL {server_url:?}: {e}"))?;
    let host = url
        .host_str()
        .ok_or_else(|| anyhow::anyhow!("server URL {server_url:?} has no host"))?;
    Ok(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

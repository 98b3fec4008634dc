use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use pbench_core::api::{format_directory_time, CliError, QueryClient, QueryRequest};
use pbench_core::util::paths::expand_home;
use pbench_plugins::presto::{BasicQueryInfo, PrestoClient};
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use super::rewrite::QueryRewriter;

pub const FORWARD_LOG_FILE: &str = "forwarded.jsonl";

#[derive(Debug, Clone)]
pub struct ForwardOptions {
    pub servers: Vec<String>,
    pub user: String,
    pub trino: bool,
    pub dry_run: bool,
    pub output_path: PathBuf,
    pub run_name: String,
    pub poll_interval: Duration,
    pub exclude: Vec<String>,
    pub replace: Vec<String>,
    pub schema_mapping: Vec<String>,
    pub request_timeout_ms: u64,
}

pub fn default_run_name() -> String {
    format!("forward_{}", format_directory_time(&Local::now()))
}

/// At least two clusters, no target sharing the source host, no Trino.
pub fn validate(opts: &ForwardOptions) -> Result<(), CliError> {
    if opts.servers.len() < 2 {
        return Err(CliError::Args(
            "information for at least two clusters is required to do workload forwarding".into(),
        ));
    }
    let mut source_host = String::new();
    for (i, server) in opts.servers.iter().enumerate() {
        let url = reqwest::Url::parse(server).map_err(|e| {
            CliError::Args(format!("failed to parse server URL at position {i}: {e}"))
        })?;
        let host = match url.port() {
            Some(port) => format!("{}:{port}", url.host_str().unwrap_or_default()),
            None => url.host_str().unwrap_or_default().to_string(),
        };
        if i == 0 {
            source_host = host;
        } else if host == source_host {
            return Err(CliError::Args(format!(
                "the forward target server host at position {i} is identical to the source server host {source_host}"
            )));
        }
    }
    if opts.trino {
        return Err(CliError::Args("forward command does not support Trino yet".into()));
    }
    Ok(())
}

#[derive(Serialize)]
struct ForwardRecord<'a> {
    source_query_id: &'a str,
    target: &'a str,
    catalog: Option<&'a str>,
    schema: Option<&'a str>,
    sql: &'a str,
    dry_run: bool,
    at: String,
}

struct Forwarder {
    opts: ForwardOptions,
    rewriter: QueryRewriter,
    source: PrestoClient,
    targets: Vec<Arc<PrestoClient>>,
    seen: HashSet<String>,
    log_path: PathBuf,
}

impl Forwarder {
    fn request_for(&self, info: &BasicQueryInfo) -> Option<QueryRequest> {
        if !self.rewriter.should_forward(&info.query) {
            tracing::debug!(query_id = %info.query_id, "query excluded");
            return None;
        }
        let session = info.session.clone().unwrap_or_default();
        Some(QueryRequest {
            sql: self.rewriter.rewrite(&info.query),
            catalog: session.catalog,
            schema: self.rewriter.map_schema(session.schema.as_deref()),
            session: session.system_properties,
        })
    }

    async fn log(&self, info: &BasicQueryInfo, target: &str, req: &QueryRequest) {
        let record = ForwardRecord {
            source_query_id: &info.query_id,
            target,
            catalog: req.catalog.as_deref(),
            schema: req.schema.as_deref(),
            sql: &req.sql,
            dry_run: self.opts.dry_run,
            at: Local::now().to_rfc3339(),
        };
        let Ok(mut line) = serde_json::to_vec(&record) else {
            return;
        };
        line.push(b'\n');
        let result = async {
            let mut file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.log_path)
                .await?;
            file.write_all(&line).await
        }
        .await;
        if let Err(err) = result {
            tracing::warn!(path = %self.log_path.display(), error = %err, "failed to write forward log");
        }
    }

    /// Poll once. The first poll only marks what is already there as seen.
    async fn poll(&mut self, forward: bool, cancel: &CancellationToken) -> anyhow::Result<usize> {
        let queries = self.source.list_queries().await?;
        let mut forwarded = 0;
        for info in queries {
            if !info.is_active() || !self.seen.insert(info.query_id.clone()) {
                continue;
            }
            if !forward {
                continue;
            }
            let Some(req) = self.request_for(&info) else {
                continue;
            };
            forwarded += 1;
            for target in &self.targets {
                tracing::info!(
                    source_query_id = %info.query_id,
                    target = %target.base_url(),
                    dry_run = self.opts.dry_run,
                    sql = %req.sql,
                    "forwarding query"
                );
                self.log(&info, target.base_url(), &req).await;
                if self.opts.dry_run {
                    continue;
                }
                let target = target.clone();
                let req = req.clone();
                let cancel = cancel.child_token();
                let source_id = info.query_id.clone();
                tokio::spawn(async move {
                    match target.execute(&req, &cancel).await {
                        Ok(res) => tracing::info!(
                            source_query_id = %source_id,
                            target = %target.base_url(),
                            query_id = ?res.query_id,
                            elapsed_ms = res.elapsed_ms,
                            "forwarded query finished"
                        ),
                        Err(err) => tracing::warn!(
                            source_query_id = %source_id,
                            target = %target.base_url(),
                            error = %err,
                            "forwarded query failed"
                        ),
                    }
                });
            }
        }
        Ok(forwarded)
    }
}

pub async fn run_forward(opts: ForwardOptions, cancel: CancellationToken) -> Result<i32, CliError> {
    validate(&opts)?;
    let rewriter = QueryRewriter::new(&opts.exclude, &opts.replace, &opts.schema_mapping)?;

    let source = PrestoClient::new(&opts.servers[0], &opts.user, opts.request_timeout_ms)?;
    let targets = opts.servers[1..]
        .iter()
        .map(|s| PrestoClient::new(s, &opts.user, opts.request_timeout_ms).map(Arc::new))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let run_dir = expand_home(&opts.output_path.to_string_lossy()).join(&opts.run_name);
    tokio::fs::create_dir_all(&run_dir).await?;

    tracing::info!(
        run_name = %opts.run_name,
        source = %source.base_url(),
        targets = targets.len(),
        dry_run = opts.dry_run,
        "workload forwarding started"
    );

    let mut forwarder = Forwarder {
        log_path: run_dir.join(FORWARD_LOG_FILE),
        opts,
        rewriter,
        source,
        targets,
        seen: HashSet::new(),
    };

    let mut first = true;
    let mut total = 0usize;
    let period = forwarder.opts.poll_interval.max(Duration::from_millis(100));
    let mut ticker = tokio::time::interval(period);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                match forwarder.poll(!first, &cancel).await {
                    Ok(n) => total += n,
                    Err(err) => tracing::warn!(error = %err, "failed to poll source cluster"),
                }
                first = false;
            }
        }
    }

    tracing::info!(forwarded = total, "workload forwarding stopped");
    Ok(0)
}

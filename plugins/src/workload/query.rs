use std::path::{Path, PathBuf};

use async_trait::async_trait;
use pbench_core::api::{
    ClientError, QueryClient, QueryRequest, QueryResult, Stage, StageContext, StageError,
    StagePayload, StageReport, StageRunner,
};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde_json::Value;

const DEFAULT_WARM_RUNS: u32 = 1;

/// One statement to execute, remembering where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySpec {
    pub label: String,
    pub sql: String,
}

/// Runs a stage's SQL statements through the run's query client.
///
/// Statements are executed `cold_runs + warm_runs` times each. With
/// `random_execution` the order is shuffled from `rand_seed + rand_skip`, so
/// a rerun with the same seed and skip replays the same order.
#[derive(Debug, Default)]
pub struct QueryStageRunner;

impl QueryStageRunner {
    pub fn new() -> Self {
        Self
    }
}

/// Inline queries first, then each query file split on `;`.
pub async fn collect_queries(payload: &StagePayload) -> Result<Vec<QuerySpec>, StageError> {
    let mut out: Vec<QuerySpec> = payload
        .queries
        .iter()
        .enumerate()
        .filter(|(_, q)| !q.trim().is_empty())
        .map(|(i, q)| QuerySpec {
            label: format!("query_{i}"),
            sql: q.trim().to_string(),
        })
        .collect();

    for path in &payload.query_files {
        let text = tokio::fs::read_to_string(path).await.map_err(|e| {
            StageError::Execution(format!("read query file {}: {e}", path.display()))
        })?;
        let stem = file_label(path);
        for (i, sql) in split_statements(&text).into_iter().enumerate() {
            out.push(QuerySpec {
                label: format!("{stem}_{i}"),
                sql,
            });
        }
    }
    Ok(out)
}

fn file_label(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_string())
}

/// Cold passes followed by warm passes; huge stage-file counts saturate.
fn total_passes(cold: u32, warm: u32) -> u32 {
    cold.saturating_add(warm)
}

fn split_statements(text: &str) -> Vec<String> {
    text.split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Execution order for one pass over the stage's queries.
pub fn execution_order(len: usize, payload: &StagePayload, seed: i64, skip: u64) -> Vec<usize> {
    let mut order: Vec<usize> = (0..len).collect();
    if payload.random_execution {
        let mut rng = StdRng::seed_from_u64((seed as u64).wrapping_add(skip));
        order.shuffle(&mut rng);
        if let Some(limit) = payload.random_limit.filter(|l| *l > 0) {
            order.truncate(limit);
        }
    }
    order
}

fn session_value(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn request_for(payload: &StagePayload, sql: &str) -> QueryRequest {
    QueryRequest {
        sql: sql.to_string(),
        catalog: payload.catalog.clone(),
        schema: payload.schema.clone(),
        session: payload
            .session_params
            .iter()
            .map(|(k, v)| (k.clone(), session_value(v)))
            .collect(),
    }
}

async fn save_result(dir: &Path, name: &str, result: &QueryResult) -> Result<PathBuf, StageError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| StageError::Execution(format!("create {}: {e}", dir.display())))?;
    let path = dir.join(format!("{name}.json"));
    let body = serde_json::to_vec_pretty(result)
        .map_err(|e| StageError::Execution(format!("encode result: {e}")))?;
    tokio::fs::write(&path, body)
        .await
        .map_err(|e| StageError::Execution(format!("write {}: {e}", path.display())))?;
    Ok(path)
}

#[async_trait]
impl StageRunner for QueryStageRunner {
    fn name(&self) -> &str {
        "query"
    }

    async fn run_stage(&self, stage: &Stage, ctx: &StageContext) -> Result<StageReport, StageError> {
        let payload = &stage.payload;
        let queries = collect_queries(payload).await?;
        if queries.is_empty() {
            tracing::debug!(stage_id = %ctx.stage_id, "stage has no queries");
            return Ok(StageReport::default());
        }

        let client: std::sync::Arc<dyn QueryClient> = ctx
            .states
            .new_client()
            .map_err(|e| StageError::Client(e.to_string()))?;

        let cold = payload.cold_runs.unwrap_or(0);
        let warm = payload.warm_runs.unwrap_or(DEFAULT_WARM_RUNS);
        let order = execution_order(queries.len(), payload, ctx.rand_seed, ctx.rand_skip);
        let mut report = StageReport::default();

        for pass in 0..total_passes(cold, warm) {
            let phase = if pass < cold { "cold" } else { "warm" };
            for &idx in &order {
                if ctx.is_cancelled() {
                    return Err(StageError::Cancelled);
                }
                let query = &queries[idx];
                let request = request_for(payload, &query.sql);
                report.queries += 1;

                match client.execute(&request, &ctx.cancel).await {
                    Ok(result) => {
                        report.rows += result.rows.len() as u64;
                        tracing::debug!(
                            stage_id = %ctx.stage_id,
                            query = %query.label,
                            phase = phase,
                            pass = pass,
                            elapsed_ms = result.elapsed_ms,
                            rows = result.rows.len(),
                            "query finished"
                        );
                        if payload.save_output {
                            let name = format!("{}_{phase}_{pass}", query.label);
                            save_result(&ctx.output_dir, &name, &result).await?;
                        }
                    }
                    Err(ClientError::Cancelled) => return Err(StageError::Cancelled),
                    Err(err) => {
                        report.failed_queries += 1;
                        tracing::warn!(
                            stage_id = %ctx.stage_id,
                            query = %query.label,
                            error = %err,
                            "query failed"
                        );
                        if payload.abort_on_error {
                            return Err(StageError::Execution(format!("{}: {err}", query.label)));
                        }
                    }
                }
            }
        }

        Ok(report)
    }
}

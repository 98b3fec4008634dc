use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use pbench_core::api::{
    load_stage_tree, parse_stage_graph, AppConfig, CliError, RunConfig, RunExecutor,
    SharedStageStates, StageLoader,
};
use pbench_core::util::paths::expand_home;
use pbench_plugins::factory::{
    build_client_factory, build_recorders, build_stage_runner, server_fqdn,
};
use tokio_util::sync::CancellationToken;

use crate::commands::cli::RunArgs;

/// CLI flags on top of the file config.
pub fn build_run_config(app: &AppConfig, args: &RunArgs, progress_allowed: bool) -> RunConfig {
    let mut client = app.client.clone();
    if let Some(server) = &args.server {
        client.server_url = server.clone();
    }
    if let Some(user) = &args.user {
        client.user = user.clone();
    }

    let mut executor = app.executor.clone();
    if let Some(n) = args.max_parallel {
        executor.max_parallel = (n > 0).then_some(n);
    }
    executor.progress = executor.progress && progress_allowed && !args.no_progress;

    let mut recorders = app.recorders.clone();
    if let Some(p) = &args.influx_config {
        recorders.influx_config = p.clone();
    }
    if let Some(p) = &args.mysql_config {
        recorders.mysql_config = p.clone();
    }
    if let Some(p) = &args.pulumi_config {
        recorders.pulumi_config = p.clone();
    }
    if args.no_file_recorder {
        recorders.file = false;
    }

    let output_path = args.output_path.as_deref().unwrap_or(&app.output_path);

    RunConfig {
        stage_paths: args.paths.clone(),
        run_name: args.name.clone(),
        comment: args.comment.clone(),
        rand_seed: args
            .seed
            .unwrap_or_else(|| Local::now().timestamp_nanos_opt().unwrap_or_default()),
        rand_skip: args.rand_skip,
        output_path: expand_home(output_path),
        client,
        executor,
        recorders,
    }
}

/// Load, validate and execute one benchmark run. Returns the process exit code.
pub async fn run_benchmark(cfg: &RunConfig, cancel: CancellationToken) -> Result<i32, CliError> {
    let start = Local::now();
    let fqdn = server_fqdn(&cfg.client.server_url).map_err(|e| {
        tracing::error!(server_url = %cfg.client.server_url, error = %e, "failed to parse server URL");
        CliError::Args(e.to_string())
    })?;

    let loader = StageLoader::new(cfg.executor.stage_file_ext.clone());
    let root = load_stage_tree(&loader, &cfg.stage_paths)?;

    let parts: Vec<String> = root.leaf_ids().into_iter().map(str::to_string).collect();
    let run_name = SharedStageStates::resolve_run_name(cfg.run_name.as_deref(), &parts, &start);
    tracing::info!(run_name = %run_name, "resolved run name");

    let mut states = SharedStageStates::new(run_name, start)
        .with_comment(cfg.comment.clone())
        .with_randomness(cfg.rand_seed, cfg.rand_skip)
        .with_server_fqdn(fqdn)
        .with_output_path(cfg.output_path.clone())
        .with_client_factory(build_client_factory(&cfg.client))
        .with_recorder_timeout(Duration::from_millis(cfg.recorders.call_timeout_ms));

    let graph = parse_stage_graph(&root).map_err(|e| {
        tracing::error!(error = %e, "failed to parse benchmark stage graph");
        e
    })?;

    let recorders = build_recorders(&cfg.recorders).map_err(|e| {
        tracing::error!(error = %e, "failed to build recorders");
        CliError::Config(e.to_string())
    })?;
    for recorder in recorders {
        states.register_recorder(recorder);
    }

    let executor = RunExecutor::new(
        Arc::new(states),
        Arc::new(graph),
        build_stage_runner(),
        cfg.executor.clone(),
    );
    let result = executor.run(cancel).await?;
    Ok(result.exit_code())
}

use std::time::Duration;

use clap::Parser;
use pbench_cli::commands::cli;
use pbench_cli::flow::{forward, run};
use pbench_core::api::{AppConfig, CliError, RecorderError};
use pbench_core::util::paths::expand_home;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

static LOG_GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
    std::sync::OnceLock::new();

#[tokio::main]
async fn main() {
    let exit = match real_main().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{e}");
            exit_code_for_error(&e)
        }
    };

    std::process::exit(exit);
}

async fn real_main() -> Result<i32, CliError> {
    let args = cli::Args::parse();
    let cfg = load_config(&args)?;
    init_tracing(&cfg.logging).map_err(CliError::Config)?;

    let cancel = CancellationToken::new();
    spawn_ctrl_c(cancel.clone());

    dispatch(args.command, cfg, cancel).await
}

fn load_config(args: &cli::Args) -> Result<AppConfig, CliError> {
    let loaded = match &args.config {
        Some(path) => pbench_core::config::load_from_path(path).and_then(|mut cfg| {
            pbench_core::config::apply_env_overrides(&mut cfg, |k| std::env::var(k).ok())?;
            Ok(cfg)
        }),
        None => pbench_core::config::load_default(),
    };
    loaded.map_err(|e| CliError::Config(e.to_string()))
}

fn spawn_ctrl_c(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling");
            cancel.cancel();
        }
    });
}

fn exit_code_for_error(e: &CliError) -> i32 {
    // 0: success
    // 1: a stage failed or was cancelled (returned as a normal exit code)
    // 2: stage load / merge error
    // 3: stage graph error
    // 4: fatal recorder setup failure
    // 11: config / argument error
    // 50: internal/uncategorized
    match e {
        CliError::Load(_) | CliError::Merge(_) => 2,
        CliError::Graph(_) => 3,
        CliError::Recorder(RecorderError::Setup { .. }) => 4,
        CliError::Recorder(_) => 50,
        CliError::Config(_) | CliError::Args(_) => 11,
        CliError::Io(_) | CliError::Anyhow(_) => 50,
    }
}

async fn dispatch(
    cmd: cli::Commands,
    cfg: AppConfig,
    cancel: CancellationToken,
) -> Result<i32, CliError> {
    match cmd {
        cli::Commands::Run(run_args) => {
            let progress_allowed = atty::is(atty::Stream::Stderr);
            let run_cfg = run::build_run_config(&cfg, &run_args, progress_allowed);
            run::run_benchmark(&run_cfg, cancel).await
        }
        cli::Commands::Forward(fwd) => {
            let opts = forward::ForwardOptions {
                servers: fwd.servers,
                user: fwd.user.unwrap_or_else(|| cfg.client.user.clone()),
                trino: fwd.trino,
                dry_run: fwd.dry_run,
                output_path: match fwd.output_path {
                    Some(p) => expand_home(&p),
                    None => std::env::current_dir()?,
                },
                run_name: fwd.name.unwrap_or_else(forward::default_run_name),
                poll_interval: Duration::from_secs(fwd.poll_interval),
                exclude: fwd.exclude,
                replace: fwd.replace,
                schema_mapping: fwd.schema_mapping,
                request_timeout_ms: cfg.client.request_timeout_ms,
            };
            forward::run_forward(opts, cancel).await
        }
    }
}

fn init_tracing(logging: &pbench_core::config::LoggingConfig) -> Result<(), String> {
    if !logging.enabled {
        return Ok(());
    }

    let filter = match std::env::var("RUST_LOG") {
        Ok(v) if !v.trim().is_empty() => EnvFilter::from_default_env(),
        _ => EnvFilter::try_new(logging.level.clone()).map_err(|e| e.to_string())?,
    };

    let mut maybe_writer = None;

    if logging.file {
        let dir = match logging
            .directory
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            Some(d) => expand_home(d),
            None => std::env::temp_dir().join("pbench"),
        };

        std::fs::create_dir_all(&dir).map_err(|e| format!("create log dir failed: {e}"))?;
        let file_name = format!("pbench.{}.log", std::process::id());
        let appender = tracing_appender::rolling::never(dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);
        let _ = LOG_GUARD.set(guard);
        maybe_writer = Some(non_blocking);
    }

    if !logging.console && maybe_writer.is_none() {
        return Err("logging disabled for both console and file".to_string());
    }

    let console_layer = logging.console.then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(atty::is(atty::Stream::Stderr))
    });

    let file_layer = maybe_writer.map(|w| {
        tracing_subscriber::fmt::layer()
            .with_writer(w)
            .with_ansi(false)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    Ok(())
}

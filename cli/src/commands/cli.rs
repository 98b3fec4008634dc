use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "pbench", version, about = "Benchmark runner for Presto-family clusters")]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file; defaults to $PBENCH_HOME/config.toml, ~/.pbench/config.toml or ./pbench.toml.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run benchmark stages from .pbstage files or directories.
    Run(RunArgs),
    /// Watch incoming queries on the first cluster and forward them to the others.
    Forward(ForwardArgs),
}

#[derive(ClapArgs, Debug, Clone)]
pub struct RunArgs {
    /// Stage files or directories, merged in argument order.
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Run name; `%t` is replaced by the start time. Defaults to the stage ids joined with the start time.
    #[arg(short = 'n', long)]
    pub name: Option<String>,

    #[arg(short = 'c', long, default_value = "")]
    pub comment: String,

    /// Presto server url.
    #[arg(short = 's', long)]
    pub server: Option<String>,

    #[arg(short = 'u', long)]
    pub user: Option<String>,

    #[arg(short = 'o', long)]
    pub output_path: Option<String>,

    /// Seed for randomized query order; defaults to the current time.
    #[arg(long)]
    pub seed: Option<i64>,

    /// First random-skip offset handed out to stages.
    #[arg(long, default_value_t = 0)]
    pub rand_skip: u64,

    #[arg(long)]
    pub influx_config: Option<String>,

    #[arg(long)]
    pub mysql_config: Option<String>,

    #[arg(long)]
    pub pulumi_config: Option<String>,

    /// Do not write run.json / stages.jsonl / summary.json.
    #[arg(long)]
    pub no_file_recorder: bool,

    /// Maximum stages running at once (0 = unlimited).
    #[arg(short = 'p', long)]
    pub max_parallel: Option<usize>,

    #[arg(long)]
    pub no_progress: bool,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct ForwardArgs {
    /// Cluster urls; the first is the source, the rest are forward targets.
    #[arg(short = 's', long = "server", required = true)]
    pub servers: Vec<String>,

    #[arg(short = 'u', long)]
    pub user: Option<String>,

    #[arg(long, hide = true)]
    pub trino: bool,

    /// Only show the queries, do not send them to the targets.
    #[arg(long)]
    pub dry_run: bool,

    #[arg(short = 'o', long)]
    pub output_path: Option<String>,

    /// Defaults to forward_<current time>.
    #[arg(short = 'n', long)]
    pub name: Option<String>,

    /// Seconds between polls of the source cluster.
    #[arg(short = 'i', long, default_value_t = 5)]
    pub poll_interval: u64,

    /// Regular expressions; matching queries are not forwarded.
    #[arg(short = 'x', long = "exclude")]
    pub exclude: Vec<String>,

    /// Pattern and replacement pairs, applied after filters. `$1` references capture groups.
    #[arg(short = 'r', long = "replace")]
    pub replace: Vec<String>,

    /// Schema mapping pairs, e.g. `-m schema1,schema2`.
    #[arg(short = 'm', long = "schema-mapping", value_delimiter = ',')]
    pub schema_mapping: Vec<String>,
}

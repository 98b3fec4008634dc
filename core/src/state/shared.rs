use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local};
use uuid::Uuid;

use crate::client::{ClientFactory, QueryClient};
use crate::recorder::{Recorders, RunInfo, RunRecorder};
use crate::util::time::{format_directory_time, RUN_START_TIME_PLACEHOLDER};

/// Single run-scoped context.
///
/// Built and mutated (recorder registration, client factory injection) before
/// the run starts, then wrapped in an `Arc` and only read during execution.
/// The one exception is the random-skip counter, which is atomic and drawn by
/// the coordinator once per dispatched stage.
pub struct SharedStageStates {
    pub run_id: Uuid,
    pub run_name: String,
    pub comment: String,
    pub rand_seed: i64,
    pub rand_skip: u64,
    /// Host (and port) of the target query engine.
    pub server_fqdn: String,
    pub run_start_time: DateTime<Local>,
    pub output_path: PathBuf,
    new_client: Option<ClientFactory>,
    recorders: Recorders,
    next_rand_skip: AtomicU64,
}

impl SharedStageStates {
    pub fn new(run_name: impl Into<String>, run_start_time: DateTime<Local>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            run_name: run_name.into(),
            comment: String::new(),
            rand_seed: 0,
            rand_skip: 0,
            server_fqdn: String::new(),
            run_start_time,
            output_path: PathBuf::from("."),
            new_client: None,
            recorders: Recorders::default(),
            next_rand_skip: AtomicU64::new(0),
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }

    pub fn with_randomness(mut self, seed: i64, skip: u64) -> Self {
        self.rand_seed = seed;
        self.rand_skip = skip;
        self.next_rand_skip = AtomicU64::new(skip);
        self
    }

    pub fn with_server_fqdn(mut self, fqdn: impl Into<String>) -> Self {
        self.server_fqdn = fqdn.into();
        self
    }

    pub fn with_output_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_path = path.into();
        self
    }

    pub fn with_client_factory(mut self, factory: ClientFactory) -> Self {
        self.new_client = Some(factory);
        self
    }

    /// Deadline applied to every recorder call that does not set its own.
    pub fn with_recorder_timeout(mut self, timeout: Duration) -> Self {
        self.recorders.set_call_timeout(timeout);
        self
    }

    /// Append a recorder. Registration order is also the setup order;
    /// teardown runs in reverse.
    pub fn register_recorder(&mut self, recorder: Arc<dyn RunRecorder>) {
        tracing::debug!(recorder = recorder.name(), "registered run recorder");
        self.recorders.push(recorder);
    }

    pub fn recorders(&self) -> &Recorders {
        &self.recorders
    }

    /// Build a run name: an explicit name has `%t` replaced by the start
    /// time, otherwise the non-empty `parts` are joined with `_` and suffixed
    /// with the start time.
    pub fn resolve_run_name(
        explicit: Option<&str>,
        parts: &[String],
        start: &DateTime<Local>,
    ) -> String {
        let time = format_directory_time(start);
        match explicit.map(str::trim).filter(|n| !n.is_empty()) {
            Some(name) => name.replace(RUN_START_TIME_PLACEHOLDER, &time),
            None => {
                let mut name = parts
                    .iter()
                    .filter(|p| !p.is_empty())
                    .cloned()
                    .collect::<Vec<_>>()
                    .join("_");
                if !name.is_empty() {
                    name.push('_');
                }
                name.push_str(&time);
                name
            }
        }
    }

    /// `<output_path>/<run_name>`
    pub fn run_output_dir(&self) -> PathBuf {
        self.output_path.join(&self.run_name)
    }

    pub fn stage_output_dir(&self, stage_id: &str) -> PathBuf {
        self.run_output_dir().join(stage_id)
    }

    /// New query-engine client from the injected factory.
    pub fn new_client(&self) -> anyhow::Result<Arc<dyn QueryClient>> {
        match &self.new_client {
            Some(factory) => factory(),
            None => Err(anyhow::anyhow!("no query client factory configured")),
        }
    }

    /// Next random-skip offset. Each call returns a distinct value starting at
    /// `rand_skip`.
    pub fn allocate_rand_skip(&self) -> u64 {
        self.next_rand_skip.fetch_add(1, Ordering::Relaxed)
    }

    pub fn run_info(&self, stage_ids: Vec<String>) -> RunInfo {
        RunInfo {
            run_id: self.run_id.to_string(),
            run_name: self.run_name.clone(),
            comment: self.comment.clone(),
            server_fqdn: self.server_fqdn.clone(),
            rand_seed: self.rand_seed,
            rand_skip: self.rand_skip,
            start_time: self.run_start_time,
            output_dir: self.run_output_dir(),
            stage_ids,
        }
    }
}

impl fmt::Debug for SharedStageStates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedStageStates")
            .field("run_id", &self.run_id)
            .field("run_name", &self.run_name)
            .field("comment", &self.comment)
            .field("rand_seed", &self.rand_seed)
            .field("rand_skip", &self.rand_skip)
            .field("server_fqdn", &self.server_fqdn)
            .field("run_start_time", &self.run_start_time)
            .field("output_path", &self.output_path)
            .field("has_client_factory", &self.new_client.is_some())
            .field("recorders", &self.recorders.names())
            .finish()
    }
}

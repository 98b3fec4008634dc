#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Local;
use pbench_core::api::{
    ExecutorConfig, RecorderError, RunExecutor, RunInfo, RunRecorder, RunResult, RunSummary,
    SharedStageStates, Stage, StageContext, StageError, StageGraph, StageOutcome, StageReport,
    StageRunner,
};
use tokio::sync::Barrier;
use tokio_util::sync::CancellationToken;

pub fn write_stage(dir: &Path, rel: &str, json: &str) -> PathBuf {
    let path = dir.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, json).unwrap();
    path
}

/// What a scripted stage does when run.
#[derive(Clone)]
pub enum Behavior {
    Succeed,
    Sleep(Duration),
    Fail(&'static str),
    WaitForCancel,
    Panic,
    Rendezvous(Arc<Barrier>),
}

/// Stage runner driven by a per-stage script. Unscripted stages succeed.
#[derive(Default)]
pub struct ScriptedRunner {
    script: HashMap<String, Behavior>,
    default: Option<Behavior>,
    pub log: Mutex<Vec<String>>,
    pub skips: Mutex<Vec<(String, u64)>>,
    running: AtomicUsize,
    pub max_running: AtomicUsize,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, id: &str, behavior: Behavior) -> Self {
        self.script.insert(id.to_string(), behavior);
        self
    }

    pub fn with_default(mut self, behavior: Behavior) -> Self {
        self.default = Some(behavior);
        self
    }

    pub fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn position(&self, entry: &str) -> Option<usize> {
        self.log().iter().position(|e| e == entry)
    }

    pub fn started(&self, id: &str) -> bool {
        self.position(&format!("start:{id}")).is_some()
    }
}

#[async_trait]
impl StageRunner for ScriptedRunner {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn run_stage(&self, stage: &Stage, ctx: &StageContext) -> Result<StageReport, StageError> {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(now, Ordering::SeqCst);
        self.log.lock().unwrap().push(format!("start:{}", stage.id));
        self.skips
            .lock()
            .unwrap()
            .push((stage.id.clone(), ctx.rand_skip));

        let behavior = self
            .script
            .get(&stage.id)
            .or(self.default.as_ref())
            .cloned()
            .unwrap_or(Behavior::Succeed);

        let result = match behavior {
            Behavior::Succeed => Ok(StageReport::default()),
            Behavior::Sleep(d) => {
                tokio::time::sleep(d).await;
                Ok(StageReport::default())
            }
            Behavior::Fail(msg) => Err(StageError::Execution(msg.to_string())),
            Behavior::WaitForCancel => {
                ctx.cancel.cancelled().await;
                Err(StageError::Cancelled)
            }
            Behavior::Panic => panic!("scripted panic in {}", stage.id),
            Behavior::Rendezvous(barrier) => {
                barrier.wait().await;
                Ok(StageReport::default())
            }
        };

        self.running.fetch_sub(1, Ordering::SeqCst);
        self.log.lock().unwrap().push(format!("end:{}", stage.id));
        result
    }
}

/// Recorder appending `<name>:<event>` entries to a shared journal.
pub struct JournalRecorder {
    name: String,
    journal: Arc<Mutex<Vec<String>>>,
}

impl JournalRecorder {
    pub fn new(name: &str, journal: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            name: name.to_string(),
            journal,
        }
    }

    fn push(&self, event: String) {
        self.journal.lock().unwrap().push(format!("{}:{event}", self.name));
    }
}

#[async_trait]
impl RunRecorder for JournalRecorder {
    fn name(&self) -> &str {
        &self.name
    }

    async fn setup(&self, _run: &RunInfo) -> Result<(), RecorderError> {
        self.push("setup".into());
        Ok(())
    }

    async fn record_run_start(&self, _run: &RunInfo) -> Result<(), RecorderError> {
        self.push("run_start".into());
        Ok(())
    }

    async fn record_stage(&self, _run: &RunInfo, outcome: &StageOutcome) -> Result<(), RecorderError> {
        self.push(format!("stage:{}:{}", outcome.stage_id, outcome.status));
        Ok(())
    }

    async fn record_run_end(&self, _run: &RunInfo, summary: &RunSummary) -> Result<(), RecorderError> {
        self.push(format!("run_end:{}", summary.exit_code));
        Ok(())
    }

    async fn teardown(&self, _run: &RunInfo) -> Result<(), RecorderError> {
        self.push("teardown".into());
        Ok(())
    }
}

/// Recorder whose every call fails; optionally its setup is fatal.
pub struct BrokenRecorder {
    pub fatal_setup: bool,
}

#[async_trait]
impl RunRecorder for BrokenRecorder {
    fn name(&self) -> &str {
        "broken"
    }

    fn setup_is_fatal(&self) -> bool {
        self.fatal_setup
    }

    async fn setup(&self, _run: &RunInfo) -> Result<(), RecorderError> {
        if self.fatal_setup {
            Err(RecorderError::Provision("no infrastructure".into()))
        } else {
            Ok(())
        }
    }

    async fn record_run_start(&self, _run: &RunInfo) -> Result<(), RecorderError> {
        Err(RecorderError::Backend("down".into()))
    }

    async fn record_stage(&self, _run: &RunInfo, _outcome: &StageOutcome) -> Result<(), RecorderError> {
        Err(RecorderError::Backend("down".into()))
    }

    async fn record_run_end(&self, _run: &RunInfo, _summary: &RunSummary) -> Result<(), RecorderError> {
        Err(RecorderError::Backend("down".into()))
    }
}

/// Recorder whose stage calls never return, as with a blackholed backend.
pub struct HungRecorder {
    journal: Arc<Mutex<Vec<String>>>,
}

impl HungRecorder {
    pub fn new(journal: Arc<Mutex<Vec<String>>>) -> Self {
        Self { journal }
    }

    fn push(&self, event: &str) {
        self.journal.lock().unwrap().push(format!("hung:{event}"));
    }
}

#[async_trait]
impl RunRecorder for HungRecorder {
    fn name(&self) -> &str {
        "hung"
    }

    async fn record_run_start(&self, _run: &RunInfo) -> Result<(), RecorderError> {
        self.push("run_start");
        Ok(())
    }

    async fn record_stage(&self, _run: &RunInfo, _outcome: &StageOutcome) -> Result<(), RecorderError> {
        std::future::pending().await
    }

    async fn record_run_end(&self, _run: &RunInfo, _summary: &RunSummary) -> Result<(), RecorderError> {
        self.push("run_end");
        Ok(())
    }

    async fn teardown(&self, _run: &RunInfo) -> Result<(), RecorderError> {
        self.push("teardown");
        Ok(())
    }
}

pub fn leaf(id: &str, deps: &[&str]) -> Stage {
    Stage::new(id, deps.iter().map(|d| d.to_string()).collect())
}

pub fn root_of(stages: Vec<Stage>) -> Stage {
    let mut root = Stage::composite(None);
    for stage in stages {
        root.merge_with(stage).unwrap();
    }
    root
}

pub fn quiet_config(max_parallel: Option<usize>) -> ExecutorConfig {
    ExecutorConfig {
        max_parallel,
        progress: false,
        ..ExecutorConfig::default()
    }
}

pub fn states_with(output: &Path, recorders: Vec<Arc<dyn RunRecorder>>) -> SharedStageStates {
    let mut states = SharedStageStates::new("test_run", Local::now())
        .with_randomness(1, 100)
        .with_output_path(output);
    for recorder in recorders {
        states.register_recorder(recorder);
    }
    states
}

pub async fn execute(
    states: SharedStageStates,
    graph: StageGraph,
    runner: Arc<ScriptedRunner>,
    config: ExecutorConfig,
    cancel: CancellationToken,
) -> Result<RunResult, RecorderError> {
    let executor = RunExecutor::new(Arc::new(states), Arc::new(graph), runner, config);
    tokio::time::timeout(Duration::from_secs(10), executor.run(cancel))
        .await
        .expect("run did not finish in time")
}

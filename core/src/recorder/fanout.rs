use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::RecorderError;
use crate::executor::types::{RunSummary, StageOutcome};

use super::{RunInfo, RunRecorder};

/// Deadline for a single recorder call unless the recorder or the config
/// says otherwise.
pub const DEFAULT_RECORDER_TIMEOUT: Duration = Duration::from_secs(30);

struct Entry {
    recorder: Arc<dyn RunRecorder>,
    /// Cleared when a non-fatal setup fails; the recorder then gets no events.
    enabled: AtomicBool,
    failures: AtomicU64,
}

impl Entry {
    fn name(&self) -> &str {
        self.recorder.name()
    }

    fn note_failure(&self, event: &'static str, err: &RecorderError) -> RecorderFailure {
        self.failures.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(
            recorder = self.name(),
            event = event,
            error = %err,
            "recorder failed, continuing"
        );
        RecorderFailure {
            recorder: self.name().to_string(),
            event,
            error: err.to_string(),
        }
    }
}

/// One recorder call that failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecorderFailure {
    pub recorder: String,
    pub event: &'static str,
    pub error: String,
}

/// Ordered set of registered recorders.
///
/// Setup and teardown run sequentially in registration order (teardown in
/// reverse). Run and stage events go through [`Recorders::start`], which
/// gives every recorder its own queue so a slow backend only delays itself.
#[derive(Clone)]
pub struct Recorders {
    entries: Vec<Arc<Entry>>,
    call_timeout: Duration,
}

impl Default for Recorders {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            call_timeout: DEFAULT_RECORDER_TIMEOUT,
        }
    }
}

impl Recorders {
    pub(crate) fn push(&mut self, recorder: Arc<dyn RunRecorder>) {
        self.entries.push(Arc::new(Entry {
            recorder,
            enabled: AtomicBool::new(true),
            failures: AtomicU64::new(0),
        }));
    }

    pub(crate) fn set_call_timeout(&mut self, timeout: Duration) {
        self.call_timeout = timeout;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name()).collect()
    }

    /// Number of failed calls per recorder, in registration order.
    pub fn failure_counts(&self) -> Vec<(String, u64)> {
        self.entries
            .iter()
            .map(|e| (e.name().to_string(), e.failures.load(Ordering::Relaxed)))
            .collect()
    }

    fn deadline(&self, entry: &Entry) -> Duration {
        entry.recorder.call_timeout().unwrap_or(self.call_timeout)
    }

    /// Run `setup` on every recorder in registration order.
    ///
    /// A failing recorder with a fatal setup tears down the recorders already
    /// set up (in reverse order) and aborts. Any other setup failure, a
    /// timeout included, disables that recorder for the rest of the run.
    pub async fn setup_all(&self, run: &RunInfo) -> Result<(), RecorderError> {
        for (idx, entry) in self.entries.iter().enumerate() {
            let name = entry.name();
            let deadline = self.deadline(entry);
            match bounded("setup", deadline, entry.recorder.setup(run)).await {
                Ok(()) => tracing::debug!(recorder = name, "recorder ready"),
                Err(err) if entry.recorder.setup_is_fatal() => {
                    tracing::error!(recorder = name, error = %err, "fatal recorder setup failure");
                    for prev in self.entries[..idx].iter().rev() {
                        let deadline = self.deadline(prev);
                        if let Err(e) = bounded("teardown", deadline, prev.recorder.teardown(run)).await {
                            prev.note_failure("teardown", &e);
                        }
                    }
                    return Err(RecorderError::Setup {
                        recorder: name.to_string(),
                        source: Box::new(err),
                    });
                }
                Err(err) => {
                    entry.failures.fetch_add(1, Ordering::Relaxed);
                    entry.enabled.store(false, Ordering::Relaxed);
                    tracing::warn!(
                        recorder = name,
                        error = %err,
                        "recorder setup failed, recorder disabled for this run"
                    );
                }
            }
        }
        Ok(())
    }

    /// Tear down every recorder, in reverse registration order.
    pub async fn teardown_all(&self, run: &RunInfo) -> Vec<RecorderFailure> {
        let mut failures = Vec::new();
        for entry in self.entries.iter().rev() {
            let deadline = self.deadline(entry);
            if let Err(err) = bounded("teardown", deadline, entry.recorder.teardown(run)).await {
                failures.push(entry.note_failure("teardown", &err));
            }
        }
        failures
    }

    /// Spawn one delivery task per enabled recorder.
    ///
    /// Each task delivers its recorder's events in send order. A call that
    /// exceeds its deadline is logged as a failure and the recorder receives
    /// no further events this run.
    pub fn start(&self, run: Arc<RunInfo>) -> RecorderFanout {
        let mut queues = Vec::new();
        let mut handles = Vec::new();
        for entry in self.entries.iter().filter(|e| e.enabled.load(Ordering::Relaxed)) {
            let (tx, rx) = mpsc::unbounded_channel();
            let deadline = self.deadline(entry);
            handles.push(tokio::spawn(deliver(entry.clone(), run.clone(), deadline, rx)));
            queues.push(tx);
        }
        RecorderFanout { queues, handles }
    }
}

async fn bounded<Fut>(event: &'static str, deadline: Duration, call: Fut) -> Result<(), RecorderError>
where
    Fut: Future<Output = Result<(), RecorderError>>,
{
    match tokio::time::timeout(deadline, call).await {
        Ok(res) => res,
        Err(_) => Err(RecorderError::Timeout {
            event,
            after_ms: deadline.as_millis() as u64,
        }),
    }
}

#[derive(Clone)]
enum RecorderEvent {
    RunStart,
    Stage(Arc<StageOutcome>),
    RunEnd(Arc<RunSummary>),
}

impl RecorderEvent {
    fn label(&self) -> &'static str {
        match self {
            Self::RunStart => "run_start",
            Self::Stage(_) => "stage",
            Self::RunEnd(_) => "run_end",
        }
    }
}

async fn deliver(
    entry: Arc<Entry>,
    run: Arc<RunInfo>,
    deadline: Duration,
    mut rx: mpsc::UnboundedReceiver<RecorderEvent>,
) -> usize {
    let mut failures = 0usize;
    let mut stalled = false;
    let mut skipped = 0usize;

    while let Some(event) = rx.recv().await {
        if stalled {
            skipped += 1;
            continue;
        }
        let recorder = &entry.recorder;
        let label = event.label();
        let res = match &event {
            RecorderEvent::RunStart => bounded(label, deadline, recorder.record_run_start(&run)).await,
            RecorderEvent::Stage(outcome) => {
                bounded(label, deadline, recorder.record_stage(&run, outcome)).await
            }
            RecorderEvent::RunEnd(summary) => {
                bounded(label, deadline, recorder.record_run_end(&run, summary)).await
            }
        };
        if let Err(err) = res {
            stalled = matches!(err, RecorderError::Timeout { .. });
            entry.note_failure(label, &err);
            failures += 1;
        }
    }

    if skipped > 0 {
        entry.failures.fetch_add(skipped as u64, Ordering::Relaxed);
        tracing::warn!(
            recorder = entry.name(),
            skipped = skipped,
            "recorder timed out earlier, remaining events were not delivered"
        );
    }
    failures + skipped
}

/// Per-recorder event queues for one run.
pub struct RecorderFanout {
    queues: Vec<mpsc::UnboundedSender<RecorderEvent>>,
    handles: Vec<JoinHandle<usize>>,
}

impl RecorderFanout {
    fn publish(&self, event: RecorderEvent) {
        for queue in &self.queues {
            if queue.send(event.clone()).is_err() {
                tracing::warn!(event = event.label(), "recorder queue closed, event dropped");
            }
        }
    }

    pub fn record_run_start(&self) {
        self.publish(RecorderEvent::RunStart);
    }

    pub fn record_stage(&self, outcome: StageOutcome) {
        self.publish(RecorderEvent::Stage(Arc::new(outcome)));
    }

    pub fn record_run_end(&self, summary: RunSummary) {
        self.publish(RecorderEvent::RunEnd(Arc::new(summary)));
    }

    /// Close the queues and wait for every recorder to drain; returns the
    /// number of events that failed or were not delivered.
    pub async fn finish(self) -> usize {
        drop(self.queues);
        join_all(self.handles)
            .await
            .into_iter()
            .map(|res| match res {
                Ok(n) => n,
                Err(err) => {
                    tracing::error!(error = %err, "recorder delivery task failed");
                    0
                }
            })
            .sum()
    }
}

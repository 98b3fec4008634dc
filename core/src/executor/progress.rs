use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use super::graph::StageGraph;
use super::types::{FailureReason, StageOutcome, StageStatus};

/// Terminal outcomes seen so far, split the way a run summary reads.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Tally {
    succeeded: usize,
    failed: usize,
    /// Failed because a dependency failed; never dispatched.
    skipped: usize,
    cancelled: usize,
}

impl Tally {
    fn add(&mut self, outcome: &StageOutcome) {
        match (outcome.status, &outcome.reason) {
            (StageStatus::Succeeded, _) => self.succeeded += 1,
            (StageStatus::Failed, Some(FailureReason::DependencyFailed(_))) => self.skipped += 1,
            (StageStatus::Cancelled, _) => self.cancelled += 1,
            _ => self.failed += 1,
        }
    }

    fn clean(&self) -> bool {
        self.failed == 0 && self.skipped == 0 && self.cancelled == 0
    }
}

impl fmt::Display for Tally {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ok {}", self.succeeded)?;
        for (label, n) in [
            ("failed", self.failed),
            ("skipped", self.skipped),
            ("cancelled", self.cancelled),
        ] {
            if n > 0 {
                write!(f, " {label} {n}")?;
            }
        }
        Ok(())
    }
}

/// Which dependency level each stage sits on and how many stages of each
/// level are still open.
struct Levels {
    level_of: HashMap<String, usize>,
    open: Vec<usize>,
}

impl Levels {
    fn new(graph: &StageGraph) -> Self {
        let sets = graph.ready_sets();
        let mut level_of = HashMap::new();
        for (level, ids) in sets.iter().enumerate() {
            for id in ids {
                level_of.insert(id.clone(), level);
            }
        }
        Self {
            level_of,
            open: sets.iter().map(Vec::len).collect(),
        }
    }

    fn close(&mut self, id: &str) {
        if let Some(n) = self.level_of.get(id).and_then(|&l| self.open.get_mut(l)) {
            *n = n.saturating_sub(1);
        }
    }

    /// Lowest level that still has open stages.
    fn current(&self) -> Option<usize> {
        self.open.iter().position(|&n| n > 0)
    }

    fn total(&self) -> usize {
        self.open.len()
    }
}

struct Bars {
    multi: MultiProgress,
    overall: ProgressBar,
    running: HashMap<String, ProgressBar>,
}

/// Terminal progress for one run: an overall bar labelled with the current
/// dependency level and outcome tally, plus a spinner per running stage.
pub struct ProgressMonitor {
    bars: Option<Bars>,
    levels: Levels,
    tally: Tally,
}

impl ProgressMonitor {
    /// `enabled = false` draws nothing; the tally is still kept.
    pub fn new(graph: &StageGraph, enabled: bool) -> Self {
        let bars = enabled.then(|| {
            let multi = MultiProgress::new();
            let overall = multi.add(ProgressBar::new(graph.len() as u64));
            if let Ok(style) = ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} stages {msg}")
            {
                overall.set_style(style.progress_chars("=> "));
            }
            Bars {
                multi,
                overall,
                running: HashMap::new(),
            }
        });
        let monitor = Self {
            bars,
            levels: Levels::new(graph),
            tally: Tally::default(),
        };
        monitor.refresh();
        monitor
    }

    fn refresh(&self) {
        let Some(bars) = &self.bars else {
            return;
        };
        let msg = match self.levels.current() {
            Some(level) => format!("level {}/{} | {}", level + 1, self.levels.total(), self.tally),
            None => self.tally.to_string(),
        };
        bars.overall.set_message(msg);
    }

    pub fn stage_started(&mut self, stage_id: &str) {
        let Some(bars) = &mut self.bars else {
            return;
        };
        let spinner = bars.multi.add(ProgressBar::new_spinner());
        if let Ok(style) = ProgressStyle::default_spinner().template("  {spinner} {msg} {elapsed}") {
            spinner.set_style(style);
        }
        spinner.set_message(stage_id.to_string());
        spinner.enable_steady_tick(Duration::from_millis(120));
        bars.running.insert(stage_id.to_string(), spinner);
    }

    /// Count a terminal outcome; stages that never ran have no spinner and
    /// only advance the overall bar.
    pub fn stage_finished(&mut self, outcome: &StageOutcome) {
        self.tally.add(outcome);
        self.levels.close(&outcome.stage_id);
        if let Some(bars) = &mut self.bars {
            if let Some(spinner) = bars.running.remove(&outcome.stage_id) {
                spinner.finish_with_message(format!(
                    "{} {} ({}ms)",
                    outcome.stage_id, outcome.status, outcome.duration_ms
                ));
            }
            bars.overall.inc(1);
        }
        self.refresh();
    }

    pub fn cancelling(&self, running: usize) {
        if let Some(bars) = &self.bars {
            bars.overall
                .set_message(format!("cancelling, waiting for {running} running | {}", self.tally));
        }
    }

    pub fn finish(&self) {
        if let Some(bars) = &self.bars {
            let verdict = if self.tally.clean() { "done" } else { "run failed" };
            bars.overall
                .finish_with_message(format!("{verdict} | {}", self.tally));
        }
    }
}

impl Drop for ProgressMonitor {
    fn drop(&mut self) {
        if let Some(bars) = &mut self.bars {
            for (_, spinner) in bars.running.drain() {
                spinner.finish_and_clear();
            }
        }
    }
}

//! Acquisition pipeline
//!
//! Tracks the state of every module's current acquisition cycle and turns a
//! module's completion report into a merge into the output document.
//!
//! Each cycle gets a process-unique [`CycleId`]. Modules report through the
//! [`Completion`] handle they receive when the cycle starts; the report
//! travels over a channel to the scheduler's event loop, which hands it to
//! [`AcquisitionPipeline::finish_acquire_data`]. Reports whose id no longer
//! matches the running cycle (late, duplicate, or after a timeout) are
//! counted and ignored.

use crate::aggregator::{Fragment, OutputAggregator};
use crate::error::{CycleError, ModuleError};
use log::{debug, warn};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Process-unique identifier of an acquisition cycle
pub type CycleId = u64;

/// State of a module's most recent acquisition cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CycleState {
    /// The module has not fired yet
    #[default]
    Idle,
    Running,
    Completed,
    Failed,
    TimedOut,
}

impl fmt::Display for CycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CycleState::Idle => "idle",
            CycleState::Running => "running",
            CycleState::Completed => "completed",
            CycleState::Failed => "failed",
            CycleState::TimedOut => "timed out",
        };
        f.write_str(name)
    }
}

/// Per-module cycle counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleStats {
    pub started: u64,
    pub completed: u64,
    pub failed: u64,
    pub timed_out: u64,
    /// Firings dropped because the previous cycle was still running
    pub skipped: u64,
    /// Reports that arrived for a cycle that was no longer running
    pub late_reports: u64,
    pub last_error: Option<String>,
}

/// Result of one cycle as reported by a module
#[derive(Debug)]
pub struct CycleReport {
    pub module: Arc<str>,
    pub cycle: CycleId,
    pub result: Result<Fragment, ModuleError>,
}

/// Handle a module uses to signal the end of its acquisition cycle
///
/// Cloneable and `Send`, so it can be moved into a task, a thread or an I/O
/// completion callback. Only the first report for the running cycle counts.
#[derive(Debug, Clone)]
pub struct Completion {
    module: Arc<str>,
    cycle: CycleId,
    started_at: Instant,
    reports: mpsc::UnboundedSender<CycleReport>,
    document: Arc<OutputAggregator>,
}

impl Completion {
    /// Report the cycle's fragment or error
    ///
    /// A successful result must be a JSON object; anything else fails the
    /// cycle as malformed.
    pub fn finish(&self, result: Result<Fragment, ModuleError>) {
        let report = CycleReport {
            module: Arc::clone(&self.module),
            cycle: self.cycle,
            result,
        };
        if self.reports.send(report).is_err() {
            debug!(
                "Agent is shutting down, dropping report for '{}' cycle {}",
                self.module, self.cycle
            );
        }
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn cycle(&self) -> CycleId {
        self.cycle
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Last good fragment published by another module
    pub fn peer_fragment(&self, module: &str) -> Option<Fragment> {
        self.document.fragment(module)
    }
}

#[derive(Debug, Clone, Copy)]
struct RunningCycle {
    id: CycleId,
    started_at: Instant,
}

#[derive(Debug, Default)]
struct ModuleSlot {
    state: CycleState,
    running: Option<RunningCycle>,
    stats: CycleStats,
}

impl ModuleSlot {
    /// Close the running cycle with a failure, keeping the previous fragment
    fn fail(&mut self, module: &str, error: CycleError) {
        self.running = None;
        match error {
            CycleError::TimedOut(_) => {
                self.state = CycleState::TimedOut;
                self.stats.timed_out += 1;
            }
            _ => {
                self.state = CycleState::Failed;
                self.stats.failed += 1;
            }
        }
        warn!("Module '{}' {}; keeping previous data", module, error);
        self.stats.last_error = Some(error.to_string());
    }
}

/// Per-cycle state tracking for every module
pub struct AcquisitionPipeline {
    slots: Mutex<HashMap<String, ModuleSlot>>,
    next_cycle: AtomicU64,
    aggregator: Arc<OutputAggregator>,
    reports: mpsc::UnboundedSender<CycleReport>,
}

impl AcquisitionPipeline {
    /// Create a pipeline merging into `aggregator`
    ///
    /// # Returns
    ///
    /// The pipeline and the receiving end of the completion channel, which
    /// the event loop drains into [`AcquisitionPipeline::finish_acquire_data`].
    pub fn new(
        aggregator: Arc<OutputAggregator>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<CycleReport>) {
        let (reports, receiver) = mpsc::unbounded_channel();
        let pipeline = Arc::new(Self {
            slots: Mutex::new(HashMap::new()),
            next_cycle: AtomicU64::new(0),
            aggregator,
            reports,
        });
        (pipeline, receiver)
    }

    /// Start a new cycle for `module`
    ///
    /// # Returns
    ///
    /// The completion handle for the new cycle, or `None` if the previous
    /// cycle is still running. A skipped firing is dropped, never queued.
    pub fn begin(&self, module: &str) -> Option<Completion> {
        let mut slots = self.lock();
        let slot = slots.entry(module.to_string()).or_default();

        if let Some(running) = slot.running {
            slot.stats.skipped += 1;
            warn!(
                "Module '{}' still running cycle {} after {:?}, skipping this firing",
                module,
                running.id,
                running.started_at.elapsed()
            );
            return None;
        }

        let id = self.next_cycle.fetch_add(1, Ordering::Relaxed) + 1;
        let started_at = Instant::now();
        slot.running = Some(RunningCycle { id, started_at });
        slot.state = CycleState::Running;
        slot.stats.started += 1;
        debug!("Starting cycle {} for module '{}'", id, module);

        Some(Completion {
            module: Arc::from(module),
            cycle: id,
            started_at,
            reports: self.reports.clone(),
            document: Arc::clone(&self.aggregator),
        })
    }

    /// Apply a module's completion report
    ///
    /// A JSON object fragment completes the cycle and is merged into the
    /// document. An error, or a fragment that is not an object, fails the
    /// cycle and leaves the previous fragment untouched.
    ///
    /// # Returns
    ///
    /// The state the cycle ended in, or `None` if the report did not belong
    /// to a running cycle and was ignored.
    pub fn finish_acquire_data(&self, report: CycleReport) -> Option<CycleState> {
        let CycleReport {
            module,
            cycle,
            result,
        } = report;

        let mut slots = self.lock();
        let Some(slot) = slots.get_mut(&*module) else {
            warn!("Ignoring report from unknown module '{}'", module);
            return None;
        };

        let running = match slot.running {
            Some(running) if running.id == cycle => running,
            _ => {
                slot.stats.late_reports += 1;
                warn!(
                    "Ignoring report for module '{}' cycle {}: cycle is no longer running",
                    module, cycle
                );
                return None;
            }
        };

        match into_fragment(result) {
            Ok(fragment) => {
                slot.running = None;
                slot.state = CycleState::Completed;
                slot.stats.completed += 1;
                debug!(
                    "Module '{}' completed cycle {} in {:?}",
                    module,
                    cycle,
                    running.started_at.elapsed()
                );
                // Merge under the slot lock so a newer cycle can never be
                // overtaken by this one.
                self.aggregator.merge(&module, fragment);
                Some(CycleState::Completed)
            }
            Err(e) => {
                slot.fail(&module, CycleError::AcquisitionFailed(e));
                Some(CycleState::Failed)
            }
        }
    }

    /// Fail a cycle whose start hook could not be dispatched
    pub fn start_failed(&self, module: &str, cycle: CycleId, error: ModuleError) {
        let mut slots = self.lock();
        if let Some(slot) = slots.get_mut(module) {
            if slot.running.is_some_and(|r| r.id == cycle) {
                slot.fail(module, CycleError::StartFailed(error));
            }
        }
    }

    /// Abandon a cycle that outlived its watchdog
    ///
    /// # Returns
    ///
    /// `true` if the cycle was still running and is now timed out.
    pub fn expire(&self, module: &str, cycle: CycleId, after: Duration) -> bool {
        let mut slots = self.lock();
        match slots.get_mut(module) {
            Some(slot) if slot.running.is_some_and(|r| r.id == cycle) => {
                slot.fail(module, CycleError::TimedOut(after));
                true
            }
            _ => false,
        }
    }

    pub fn state(&self, module: &str) -> CycleState {
        self.lock()
            .get(module)
            .map(|slot| slot.state)
            .unwrap_or_default()
    }

    pub fn is_running(&self, module: &str) -> bool {
        self.state(module) == CycleState::Running
    }

    pub fn stats(&self, module: &str) -> CycleStats {
        self.lock()
            .get(module)
            .map(|slot| slot.stats.clone())
            .unwrap_or_default()
    }

    pub fn aggregator(&self) -> &Arc<OutputAggregator> {
        &self.aggregator
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, ModuleSlot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for AcquisitionPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AcquisitionPipeline")
            .field("modules", &self.lock().len())
            .finish_non_exhaustive()
    }
}

fn into_fragment(result: Result<Fragment, ModuleError>) -> Result<Fragment, ModuleError> {
    match result? {
        fragment @ Fragment::Object(_) => Ok(fragment),
        other => Err(ModuleError::Malformed(format!(
            "expected a JSON object, got {}",
            other
        ))),
    }
}

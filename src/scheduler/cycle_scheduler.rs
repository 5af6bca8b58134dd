//! Cycle scheduler
//!
//! Drives every module's acquisition cycles from a single cooperative event
//! loop. The loop waits on three sources: the shutdown signal, completion
//! reports from modules, and the earliest deadline in its timer queue.

use crate::config::{AgentConfig, ConfigStore};
use crate::connection::Connection;
use crate::error::{ConfigurationError, ModuleError};
use crate::module::{Descriptor, Module};
use crate::pipeline::{AcquisitionPipeline, CycleId, CycleReport};
use crate::registry::ModuleRegistry;
use crate::scheduler::jitter::Jitter;
use crate::scheduler::timer::{TimerKind, TimerQueue};
use log::{debug, error, info, warn};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

/// Loop-wide scheduling settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerSettings {
    /// How long a cycle may run before it is abandoned
    pub watchdog: Duration,
    /// Upper bound of each module's first-firing stagger
    pub max_jitter: Duration,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self::from(&AgentConfig::default())
    }
}

impl From<&AgentConfig> for SchedulerSettings {
    fn from(config: &AgentConfig) -> Self {
        Self {
            watchdog: config.watchdog(),
            max_jitter: config.max_jitter(),
        }
    }
}

struct ScheduledModule {
    module: Arc<dyn Module>,
    interval: Duration,
}

/// Timer-driven engine firing each module on its own cadence
pub struct Scheduler {
    modules: Vec<ScheduledModule>,
    pipeline: Arc<AcquisitionPipeline>,
    reports: mpsc::UnboundedReceiver<CycleReport>,
    connection: Connection,
    config: Arc<dyn ConfigStore>,
    settings: SchedulerSettings,
    jitter: Jitter,
    timers: TimerQueue,
}

impl Scheduler {
    /// Build a scheduler for every module of an initialized registry
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError::InvalidInterval` for a module whose
    /// effective interval is not a positive duration,
    /// `ConfigurationError::Entropy` if jitter cannot be seeded, and
    /// `ConfigurationError::ValidationError` if the registry has not been
    /// initialized.
    pub fn new(
        registry: &ModuleRegistry,
        pipeline: Arc<AcquisitionPipeline>,
        reports: mpsc::UnboundedReceiver<CycleReport>,
        connection: Connection,
        config: Arc<dyn ConfigStore>,
        settings: SchedulerSettings,
    ) -> Result<Self, ConfigurationError> {
        if !registry.is_initialized() {
            return Err(ConfigurationError::ValidationError(
                "modules must be initialized before scheduling".to_string(),
            ));
        }
        for (setting, value) in [
            ("watchdog", settings.watchdog),
            ("jitter", settings.max_jitter),
        ] {
            if Instant::now().checked_add(value).is_none() {
                return Err(ConfigurationError::ValidationError(format!(
                    "{} of {:?} is out of range",
                    setting, value
                )));
            }
        }

        let modules = registry
            .iter()
            .map(|module| {
                let interval = effective_interval(module.descriptor(), config.as_ref())?;
                debug!(
                    "Module '{}' refreshes every {:?}",
                    module.name(),
                    interval
                );
                Ok(ScheduledModule {
                    module: Arc::clone(module),
                    interval,
                })
            })
            .collect::<Result<Vec<_>, ConfigurationError>>()?;

        let jitter = Jitter::from_entropy(settings.max_jitter)?;

        Ok(Self {
            modules,
            pipeline,
            reports,
            connection,
            config,
            settings,
            jitter,
            timers: TimerQueue::new(),
        })
    }

    /// Replace the jitter source
    pub fn with_jitter(mut self, jitter: Jitter) -> Self {
        self.jitter = jitter;
        self
    }

    /// Effective refresh interval of a scheduled module
    pub fn interval_of(&self, name: &str) -> Option<Duration> {
        self.modules
            .iter()
            .find(|scheduled| scheduled.module.name() == name)
            .map(|scheduled| scheduled.interval)
    }

    pub fn pipeline(&self) -> &Arc<AcquisitionPipeline> {
        &self.pipeline
    }

    /// Run the event loop until `shutdown` turns true or its sender is gone
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let start = Instant::now();
        for index in 0..self.modules.len() {
            let offset = self.jitter.sample();
            debug!(
                "First cycle of '{}' in {:?}",
                self.modules[index].module.name(),
                offset
            );
            let first = start.checked_add(offset).unwrap_or(start);
            self.timers.push(first, TimerKind::Fire { module: index });
        }
        info!("Scheduler started with {} modules", self.modules.len());

        while !*shutdown.borrow() {
            let next = self.timers.next_deadline();
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                Some(report) = self.reports.recv() => {
                    self.pipeline.finish_acquire_data(report);
                }
                _ = sleep_until(next) => {
                    self.dispatch_due(Instant::now());
                }
            }
        }

        info!("Scheduler stopping");
        self.log_statistics();
    }

    fn dispatch_due(&mut self, now: Instant) {
        while let Some(entry) = self.timers.pop_due(now) {
            match entry.kind {
                TimerKind::Fire { module } => self.fire(module, entry.deadline, now),
                TimerKind::Watchdog { module, cycle } => self.expire(module, cycle),
            }
        }
    }

    fn fire(&mut self, index: usize, deadline: Instant, now: Instant) {
        let module = Arc::clone(&self.modules[index].module);
        let interval = self.modules[index].interval;

        match next_firing(module.name(), deadline, interval, now) {
            Some(next) => self.timers.push(next, TimerKind::Fire { module: index }),
            None => error!(
                "Refresh interval {:?} of '{}' runs past the clock's range, module will not fire again",
                interval,
                module.name()
            ),
        }

        let Some(completion) = self.pipeline.begin(module.name()) else {
            return;
        };
        let cycle = completion.cycle();
        match now.checked_add(self.settings.watchdog) {
            Some(at) => self.timers.push(
                at,
                TimerKind::Watchdog {
                    module: index,
                    cycle,
                },
            ),
            None => warn!(
                "Watchdog {:?} is out of range, cycle {} of '{}' runs unguarded",
                self.settings.watchdog,
                cycle,
                module.name()
            ),
        }

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            module.start_acquire_data(&self.connection, self.config.as_ref(), completion)
        }));
        let error = match outcome {
            Ok(Ok(())) => return,
            Ok(Err(e)) => e,
            Err(payload) => ModuleError::Panicked(panic_message(payload.as_ref())),
        };
        self.pipeline.start_failed(module.name(), cycle, error);
    }

    fn expire(&mut self, index: usize, cycle: CycleId) {
        let name = self.modules[index].module.name();
        if self.pipeline.expire(name, cycle, self.settings.watchdog) {
            debug!("Watchdog reclaimed cycle {} of '{}'", cycle, name);
        }
    }

    fn log_statistics(&self) {
        for scheduled in &self.modules {
            let name = scheduled.module.name();
            let stats = self.pipeline.stats(name);
            info!(
                "Module '{}': {} started, {} completed, {} failed, {} timed out, {} skipped, {} late reports",
                name,
                stats.started,
                stats.completed,
                stats.failed,
                stats.timed_out,
                stats.skipped,
                stats.late_reports
            );
        }
    }
}

/// Resolve a module's refresh interval, honouring the config override
///
/// The override lives at `modules.<name>.refresh_interval` and is a number of
/// seconds, integer or float.
///
/// # Errors
///
/// Returns `ConfigurationError::InvalidInterval` if the resulting interval is
/// zero, negative, not finite or not a number.
pub fn effective_interval(
    descriptor: &Descriptor,
    config: &dyn ConfigStore,
) -> Result<Duration, ConfigurationError> {
    let invalid = |reason: String| ConfigurationError::InvalidInterval {
        module: descriptor.name.clone(),
        reason,
    };

    let path = format!("modules.{}.refresh_interval", descriptor.name);
    let interval = match config.get(&path) {
        None => descriptor.schedule.refresh_interval,
        Some(toml::Value::Integer(secs)) if secs > 0 => Duration::from_secs(secs.unsigned_abs()),
        Some(toml::Value::Float(secs)) if secs.is_finite() && secs > 0.0 => {
            Duration::try_from_secs_f64(secs)
                .map_err(|e| invalid(format!("{} seconds is out of range: {}", secs, e)))?
        }
        Some(other) => {
            return Err(invalid(format!(
                "expected a positive number of seconds, got {}",
                other
            )))
        }
    };

    if interval.is_zero() {
        return Err(invalid("interval must be greater than zero".to_string()));
    }
    if Instant::now().checked_add(interval).is_none() {
        return Err(invalid(format!("{:?} is out of range", interval)));
    }
    Ok(interval)
}

/// Deadline of the firing after the one due at `deadline`
///
/// Stays on the nominal grid unless the loop fell behind, in which case the
/// missed firings are skipped. `None` if the deadline cannot be represented.
fn next_firing(name: &str, deadline: Instant, interval: Duration, now: Instant) -> Option<Instant> {
    match deadline.checked_add(interval) {
        Some(next) if next > now => Some(next),
        Some(_) => {
            warn!(
                "Scheduler fell behind for '{}' by {:?}, skipping missed firings",
                name,
                now - deadline
            );
            now.checked_add(interval)
        }
        None => None,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

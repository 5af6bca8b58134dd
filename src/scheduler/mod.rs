/// Event loop firing module cycles
pub mod cycle_scheduler;

/// Randomized first-firing stagger
pub mod jitter;

/// Deadline-ordered timer queue
pub mod timer;

pub use cycle_scheduler::{effective_interval, Scheduler, SchedulerSettings};
pub use jitter::Jitter;
pub use timer::{TimerEntry, TimerKind, TimerQueue};

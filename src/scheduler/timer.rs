use crate::pipeline::CycleId;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use tokio::time::Instant;

/// What happens when a timer expires
///
/// Variant order matters: at equal deadlines a module's firing is handled
/// before any watchdog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TimerKind {
    /// Start the next cycle of the module at this index
    Fire { module: usize },
    /// Abandon the given cycle if it is still running
    Watchdog { module: usize, cycle: CycleId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TimerEntry {
    pub deadline: Instant,
    pub kind: TimerKind,
    seq: u64,
}

/// Deadline-ordered timer queue owned by the event loop
#[derive(Debug, Default)]
pub struct TimerQueue {
    heap: BinaryHeap<Reverse<TimerEntry>>,
    seq: u64,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, deadline: Instant, kind: TimerKind) {
        self.seq += 1;
        self.heap.push(Reverse(TimerEntry {
            deadline,
            kind,
            seq: self.seq,
        }));
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.heap.peek().map(|Reverse(entry)| entry.deadline)
    }

    /// Remove the earliest timer if it is due at `now`
    pub fn pop_due(&mut self, now: Instant) -> Option<TimerEntry> {
        match self.heap.peek() {
            Some(Reverse(entry)) if entry.deadline <= now => self.heap.pop().map(|Reverse(e)| e),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_pops_in_deadline_order() {
        let start = Instant::now();
        let mut timers = TimerQueue::new();
        timers.push(start + Duration::from_secs(3), TimerKind::Fire { module: 0 });
        timers.push(start + Duration::from_secs(1), TimerKind::Fire { module: 1 });
        timers.push(start + Duration::from_secs(2), TimerKind::Fire { module: 2 });

        assert_eq!(timers.next_deadline(), Some(start + Duration::from_secs(1)));

        let now = start + Duration::from_secs(10);
        let order: Vec<_> = std::iter::from_fn(|| timers.pop_due(now))
            .map(|entry| entry.kind)
            .collect();
        assert_eq!(
            order,
            vec![
                TimerKind::Fire { module: 1 },
                TimerKind::Fire { module: 2 },
                TimerKind::Fire { module: 0 },
            ]
        );
        assert!(timers.is_empty());
    }

    #[test]
    fn test_nothing_due_before_deadline() {
        let start = Instant::now();
        let mut timers = TimerQueue::new();
        timers.push(start + Duration::from_secs(1), TimerKind::Fire { module: 0 });

        assert!(timers.pop_due(start).is_none());
        assert_eq!(timers.len(), 1);
        assert!(timers.pop_due(start + Duration::from_secs(1)).is_some());
    }

    #[test]
    fn test_fire_precedes_watchdog_at_same_deadline() {
        let deadline = Instant::now();
        let mut timers = TimerQueue::new();
        timers.push(deadline, TimerKind::Watchdog { module: 0, cycle: 1 });
        timers.push(deadline, TimerKind::Fire { module: 0 });

        assert_eq!(
            timers.pop_due(deadline).map(|e| e.kind),
            Some(TimerKind::Fire { module: 0 })
        );
        assert_eq!(
            timers.pop_due(deadline).map(|e| e.kind),
            Some(TimerKind::Watchdog { module: 0, cycle: 1 })
        );
    }
}

//! Switch timers
//!
//! The switch never reads a clock on its own. Periodic work is requested
//! from a `TimerService`, which the caller drives: the daemon maps it onto
//! tokio deadlines, tests use the virtual-time `TimerQueue`.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::time::Duration;

/// Delay before the first hello after start
pub const FIRST_HELLO_DELAY: Duration = Duration::from_micros(1);

/// Periodic switch maintenance
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SwitchTimer {
    /// Send hellos and purge lapsed neighbor entries
    Hello,
    ArpSweep,
    TcpSweep,
}

/// One-shot timer scheduling
pub trait TimerService {
    /// Current time, measured from the service's epoch
    fn now(&self) -> Duration;

    /// Fire `timer` once after `delay`
    fn schedule_once(&mut self, delay: Duration, timer: SwitchTimer);
}

/// Virtual-time timer queue
///
/// Timers due at the same instant fire in scheduling order.
#[derive(Debug, Default)]
pub struct TimerQueue {
    now: Duration,
    seq: u64,
    heap: BinaryHeap<Reverse<(Duration, u64, SwitchTimer)>>,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deadline of the earliest pending timer
    pub fn next_deadline(&self) -> Option<Duration> {
        self.heap.peek().map(|Reverse((deadline, _, _))| *deadline)
    }

    /// Pop the earliest timer due at or before `until`, advancing the clock
    /// to its deadline
    pub fn pop_due(&mut self, until: Duration) -> Option<SwitchTimer> {
        let deadline = self.next_deadline()?;
        if deadline > until {
            return None;
        }
        let Reverse((_, _, timer)) = self.heap.pop()?;
        self.now = self.now.max(deadline);
        Some(timer)
    }

    /// Move the clock forward without firing anything
    pub fn advance_to(&mut self, t: Duration) {
        self.now = self.now.max(t);
    }

    pub fn pending(&self) -> usize {
        self.heap.len()
    }

    /// Number of pending instances of `timer`
    pub fn pending_of(&self, timer: SwitchTimer) -> usize {
        self.heap
            .iter()
            .filter(|Reverse((_, _, t))| *t == timer)
            .count()
    }
}

impl TimerService for TimerQueue {
    fn now(&self) -> Duration {
        self.now
    }

    fn schedule_once(&mut self, delay: Duration, timer: SwitchTimer) {
        let seq = self.seq;
        self.seq += 1;
        self.heap.push(Reverse((self.now + delay, seq, timer)));
    }
}

//! [`TimerSet`] – cancellable one-shot deadlines owned by a state machine.
//!
//! Timers are plain deadlines polled by the runtime loop, not spawned
//! tasks. Cancelling a timer removes its deadline, so a cancelled timer can
//! never fire. Every arm bumps a generation counter; an expiry is honoured
//! only while its generation is still the armed one, which keeps a batch of
//! simultaneous expiries consistent when handling one cancels another.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use kiosk_runtime::timers::{TimerKind, TimerSet};
//!
//! let mut timers = TimerSet::new();
//! timers.arm(TimerKind::ConfirmationWait, Duration::from_secs(20));
//! assert!(timers.is_armed(TimerKind::ConfirmationWait));
//! timers.cancel_all();
//! assert_eq!(timers.len(), 0);
//! ```

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Bounds the wait for hardware confirmation, then for proceed.
    ConfirmationWait,
    /// Optional cap on the looping limit-switch cue.
    LimitSwitchCue,
    /// Pause between relay activation and the dispense countdown.
    GraceDelay,
    /// Item dispense countdown.
    Dispense,
    /// Inactivity on the category screen.
    CategoryIdle,
    /// Clears the limit-switch status flag.
    LimitSwitchIndicator,
}

/// An expiry reported by [`TimerSet::expired`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerFired {
    pub kind: TimerKind,
    pub generation: u64,
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    deadline: Instant,
    generation: u64,
}

#[derive(Debug, Default)]
pub struct TimerSet {
    entries: HashMap<TimerKind, Entry>,
    next_generation: u64,
}

impl TimerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm `kind` to fire `after` from now, replacing any armed instance.
    /// Returns the new generation.
    pub fn arm(&mut self, kind: TimerKind, after: Duration) -> u64 {
        self.next_generation += 1;
        let generation = self.next_generation;
        self.entries.insert(
            kind,
            Entry {
                deadline: Instant::now() + after,
                generation,
            },
        );
        trace!(?kind, generation, after_ms = after.as_millis() as u64, "timer armed");
        generation
    }

    /// Returns `true` when an armed timer was removed.
    pub fn cancel(&mut self, kind: TimerKind) -> bool {
        let removed = self.entries.remove(&kind).is_some();
        if removed {
            trace!(?kind, "timer cancelled");
        }
        removed
    }

    pub fn cancel_all(&mut self) {
        if !self.entries.is_empty() {
            trace!(count = self.entries.len(), "all timers cancelled");
        }
        self.entries.clear();
    }

    pub fn is_armed(&self, kind: TimerKind) -> bool {
        self.entries.contains_key(&kind)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Armed kinds, soonest first.
    pub fn armed(&self) -> Vec<TimerKind> {
        let mut armed: Vec<_> = self.entries.iter().map(|(k, e)| (e.deadline, *k)).collect();
        armed.sort_by_key(|(deadline, _)| *deadline);
        armed.into_iter().map(|(_, k)| k).collect()
    }

    /// Time left on `kind`, if armed.
    pub fn remaining(&self, kind: TimerKind) -> Option<Duration> {
        self.entries
            .get(&kind)
            .map(|e| e.deadline.saturating_duration_since(Instant::now()))
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.entries.values().map(|e| e.deadline).min()
    }

    /// Timers whose deadline is at or before `now`, soonest first. They stay
    /// armed until [`TimerSet::accept`] consumes them.
    pub fn expired(&self, now: Instant) -> Vec<TimerFired> {
        let mut due: Vec<_> = self
            .entries
            .iter()
            .filter(|(_, e)| e.deadline <= now)
            .map(|(kind, e)| {
                (
                    e.deadline,
                    TimerFired {
                        kind: *kind,
                        generation: e.generation,
                    },
                )
            })
            .collect();
        due.sort_by_key(|(deadline, fired)| (*deadline, fired.generation));
        due.into_iter().map(|(_, fired)| fired).collect()
    }

    /// Consume an expiry. `false` means it is stale: cancelled or re-armed
    /// since it was reported.
    pub fn accept(&mut self, fired: TimerFired) -> bool {
        match self.entries.get(&fired.kind) {
            Some(entry) if entry.generation == fired.generation => {
                self.entries.remove(&fired.kind);
                true
            }
            _ => {
                trace!(kind = ?fired.kind, generation = fired.generation, "stale expiry ignored");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn expiry_follows_the_clock() {
        let mut timers = TimerSet::new();
        timers.arm(TimerKind::Dispense, Duration::from_secs(5));
        timers.arm(TimerKind::GraceDelay, Duration::from_secs(2));
        assert_eq!(timers.armed(), vec![TimerKind::GraceDelay, TimerKind::Dispense]);

        tokio::time::advance(Duration::from_secs(2)).await;
        let due = timers.expired(Instant::now());
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].kind, TimerKind::GraceDelay);
        assert!(timers.accept(due[0]));
        assert!(!timers.is_armed(TimerKind::GraceDelay));
        assert_eq!(timers.remaining(TimerKind::Dispense), Some(Duration::from_secs(3)));
    }

    #[tokio::test(start_paused = true)]
    async fn rearm_makes_old_expiry_stale() {
        let mut timers = TimerSet::new();
        timers.arm(TimerKind::ConfirmationWait, Duration::from_secs(1));
        tokio::time::advance(Duration::from_secs(1)).await;
        let stale = timers.expired(Instant::now())[0];

        timers.arm(TimerKind::ConfirmationWait, Duration::from_secs(20));
        assert!(!timers.accept(stale));
        assert!(timers.is_armed(TimerKind::ConfirmationWait));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_timer_never_fires() {
        let mut timers = TimerSet::new();
        timers.arm(TimerKind::CategoryIdle, Duration::from_secs(15));
        assert!(timers.cancel(TimerKind::CategoryIdle));
        assert!(!timers.cancel(TimerKind::CategoryIdle));

        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(timers.expired(Instant::now()).is_empty());
        assert_eq!(timers.next_deadline(), None);
        assert!(timers.is_empty());
    }
}

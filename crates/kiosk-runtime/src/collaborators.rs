//! Seams to the parts of the kiosk that live outside the protocol core:
//! audio cues and the screen-wake service.
//!
//! The runtime only ever asks for a named cue to start or stop and for the
//! screen to stay awake. [`CueBoard`] and [`ScreenLog`] are the stock
//! implementations: they log through `tracing` and keep the active cues and
//! a few counters so an operator console (or a test) can inspect them.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::{debug, info};

/// Named audio cues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Cue {
    CustomerDetected,
    /// Loops while the kiosk waits for the customer to proceed.
    LimitSwitchActive,
    ProcessingActive,
}

impl Cue {
    pub fn name(&self) -> &'static str {
        match self {
            Cue::CustomerDetected => "customer-detected",
            Cue::LimitSwitchActive => "limit-switch-active",
            Cue::ProcessingActive => "processing-active",
        }
    }

    pub fn loops(&self) -> bool {
        matches!(self, Cue::LimitSwitchActive)
    }

    /// Plays once and ends by itself; never needs a stop.
    pub fn is_one_shot(&self) -> bool {
        matches!(self, Cue::CustomerDetected)
    }
}

impl fmt::Display for Cue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Audio playback. Calls must return promptly; playback happens elsewhere.
pub trait CuePlayer: Send + Sync {
    fn play(&self, cue: Cue);
    fn stop(&self, cue: Cue);
    fn stop_all(&self);
}

/// Platform screen-wake service.
pub trait ScreenControl: Send + Sync {
    /// Turn the display on and keep it on for at least `keep_on`.
    fn wake(&self, keep_on: Duration);
}

#[derive(Debug, Default)]
struct CueState {
    active: BTreeSet<Cue>,
    plays: BTreeMap<Cue, u64>,
}

/// Logging [`CuePlayer`] that tracks which cues are sounding and how often
/// each was started. Its memory stays fixed however long the kiosk runs.
#[derive(Debug, Clone, Default)]
pub struct CueBoard {
    state: Arc<Mutex<CueState>>,
}

impl CueBoard {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, CueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn active(&self) -> Vec<Cue> {
        self.state().active.iter().copied().collect()
    }

    pub fn is_playing(&self, cue: Cue) -> bool {
        self.state().active.contains(&cue)
    }

    /// How many times `cue` was started.
    pub fn plays(&self, cue: Cue) -> u64 {
        self.state().plays.get(&cue).copied().unwrap_or(0)
    }
}

impl CuePlayer for CueBoard {
    fn play(&self, cue: Cue) {
        info!(cue = %cue, looping = cue.loops(), "cue start");
        let mut state = self.state();
        *state.plays.entry(cue).or_default() += 1;
        if !cue.is_one_shot() {
            state.active.insert(cue);
        }
    }

    fn stop(&self, cue: Cue) {
        if self.state().active.remove(&cue) {
            debug!(cue = %cue, "cue stop");
        }
    }

    fn stop_all(&self) {
        debug!("all cues stopped");
        self.state().active.clear();
    }
}

#[derive(Debug, Default)]
struct WakeState {
    count: u64,
    last_keep_on: Option<Duration>,
}

/// Logging [`ScreenControl`] that counts wake requests.
#[derive(Debug, Clone, Default)]
pub struct ScreenLog {
    state: Arc<Mutex<WakeState>>,
}

impl ScreenLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, WakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn wake_count(&self) -> u64 {
        self.state().count
    }

    /// Keep-on period of the most recent wake.
    pub fn last_keep_on(&self) -> Option<Duration> {
        self.state().last_keep_on
    }
}

impl ScreenControl for ScreenLog {
    fn wake(&self, keep_on: Duration) {
        info!(keep_on_secs = keep_on.as_secs(), "screen wake");
        let mut state = self.state();
        state.count += 1;
        state.last_keep_on = Some(keep_on);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_shot_cues_are_not_tracked() {
        let board = CueBoard::new();
        board.play(Cue::CustomerDetected);
        board.play(Cue::LimitSwitchActive);
        assert_eq!(board.active(), vec![Cue::LimitSwitchActive]);

        board.stop(Cue::LimitSwitchActive);
        assert!(board.active().is_empty());
        assert_eq!(board.plays(Cue::CustomerDetected), 1);
    }

    #[test]
    fn cue_names_are_stable() {
        assert_eq!(Cue::CustomerDetected.to_string(), "customer-detected");
        assert_eq!(Cue::LimitSwitchActive.name(), "limit-switch-active");
        assert_eq!(Cue::ProcessingActive.name(), "processing-active");
    }

    #[test]
    fn screen_log_counts_wakes() {
        let screen = ScreenLog::new();
        assert_eq!(screen.last_keep_on(), None);
        screen.wake(Duration::from_secs(60));
        screen.wake(Duration::from_secs(300));
        assert_eq!(screen.wake_count(), 2);
        assert_eq!(screen.last_keep_on(), Some(Duration::from_secs(300)));
    }

    #[test]
    fn long_running_kiosk_keeps_fixed_state() {
        let board = CueBoard::new();
        let screen = ScreenLog::new();
        for _ in 0..100_000 {
            board.play(Cue::CustomerDetected);
            screen.wake(Duration::from_secs(300));
        }
        board.play(Cue::ProcessingActive);
        board.stop_all();

        assert_eq!(board.plays(Cue::CustomerDetected), 100_000);
        assert_eq!(board.plays(Cue::ProcessingActive), 1);
        assert!(board.active().is_empty());
        assert_eq!(board.state().plays.len(), 2);
        assert_eq!(screen.wake_count(), 100_000);
    }
}

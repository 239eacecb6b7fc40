//! Diagnostic map of relay echoes.
//!
//! The controller owns the physical relay state; this map only mirrors what
//! it last reported so the operator can see it.

use std::collections::BTreeMap;

use kiosk_types::NotificationEvent;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelayStatusMap {
    relays: BTreeMap<u32, bool>,
}

impl RelayStatusMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a relay echo. Other events are ignored. Returns `true` when the
    /// stored state changed.
    pub fn apply(&mut self, event: &NotificationEvent) -> bool {
        match *event {
            NotificationEvent::RelayStatusChanged { relay, active } => {
                self.relays.insert(relay, active) != Some(active)
            }
            _ => false,
        }
    }

    /// `None` until the controller has reported on the relay.
    pub fn get(&self, relay: u32) -> Option<bool> {
        self.relays.get(&relay).copied()
    }

    pub fn active_relays(&self) -> impl Iterator<Item = u32> + '_ {
        self.relays
            .iter()
            .filter_map(|(relay, active)| active.then_some(*relay))
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, bool)> + '_ {
        self.relays.iter().map(|(r, a)| (*r, *a))
    }

    pub fn is_empty(&self) -> bool {
        self.relays.is_empty()
    }

    pub fn clear(&mut self) {
        self.relays.clear();
    }
}

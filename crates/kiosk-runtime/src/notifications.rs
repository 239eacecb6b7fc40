//! Side effects of decoded controller notifications.
//!
//! [`NotificationHandler`] keeps the diagnostic status the operator sees
//! (relay map, limit-switch indicator, readiness) and drives the cues that
//! do not belong to an order: the proximity sensor wakes the screen and
//! plays `customer-detected`. Each rule is applied independently, so a frame
//! that decodes to several events applies all of them.
//!
//! The limit-switch *order* effect (unlocking proceed) lives in
//! [`crate::order::OrderStateMachine::on_limit_switch`]; the runtime calls
//! both.

use std::sync::Arc;
use std::time::Duration;

use kiosk_middleware::EventBus;
use kiosk_protocol::RelayStatusMap;
use kiosk_types::{EventPayload, NotificationEvent};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::collaborators::{Cue, CuePlayer, ScreenControl};
use crate::timers::{TimerKind, TimerSet};

const SOURCE: &str = "kiosk-runtime::notifications";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationSettings {
    /// How long the limit-switch indicator stays lit.
    pub limit_switch_indicator: Duration,
    /// Keep-on period requested from the screen on a wake.
    pub wake_keep_on: Duration,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            limit_switch_indicator: Duration::from_millis(1000),
            wake_keep_on: Duration::from_secs(300),
        }
    }
}

pub struct NotificationHandler {
    relays: RelayStatusMap,
    limit_switch_pressed: bool,
    system_ready: bool,
    settings: NotificationSettings,
    timers: TimerSet,
    cues: Arc<dyn CuePlayer>,
    screen: Arc<dyn ScreenControl>,
    bus: EventBus,
}

impl NotificationHandler {
    pub fn new(
        settings: NotificationSettings,
        cues: Arc<dyn CuePlayer>,
        screen: Arc<dyn ScreenControl>,
        bus: EventBus,
    ) -> Self {
        Self {
            relays: RelayStatusMap::new(),
            limit_switch_pressed: false,
            system_ready: false,
            settings,
            timers: TimerSet::new(),
            cues,
            screen,
            bus,
        }
    }

    pub fn relays(&self) -> &RelayStatusMap {
        &self.relays
    }

    pub fn limit_switch_pressed(&self) -> bool {
        self.limit_switch_pressed
    }

    pub fn system_ready(&self) -> bool {
        self.system_ready
    }

    pub fn timers(&self) -> &TimerSet {
        &self.timers
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    /// Apply one decoded event from the live session and publish it on
    /// the `Controller` topic.
    pub fn handle(&mut self, event: NotificationEvent) {
        match event {
            NotificationEvent::WakeScreen => {
                info!("customer detected");
                self.cues.play(Cue::CustomerDetected);
                self.screen.wake(self.settings.wake_keep_on);
            }
            NotificationEvent::LimitSwitchPressed => {
                self.limit_switch_pressed = true;
                self.timers.arm(
                    TimerKind::LimitSwitchIndicator,
                    self.settings.limit_switch_indicator,
                );
            }
            NotificationEvent::RelayStatusChanged { relay, active } => {
                if self.relays.apply(&event) {
                    info!(relay, active, "relay status changed");
                }
            }
            NotificationEvent::SystemReady => {
                if !self.system_ready {
                    info!("controller ready");
                }
                self.system_ready = true;
            }
            NotificationEvent::Unrecognized => {
                debug!("unrecognized notification ignored");
            }
        }
        self.bus.emit(SOURCE, EventPayload::Controller(event));
    }

    /// Clear indicators whose time is up.
    pub fn expire(&mut self, now: Instant) -> usize {
        let mut handled = 0;
        for fired in self.timers.expired(now) {
            if !self.timers.accept(fired) {
                continue;
            }
            if fired.kind == TimerKind::LimitSwitchIndicator {
                self.limit_switch_pressed = false;
            }
            handled += 1;
        }
        handled
    }

    /// The link is gone: silence every cue and forget controller state.
    pub fn on_disconnect(&mut self) {
        self.cues.stop_all();
        self.timers.cancel_all();
        self.relays.clear();
        self.limit_switch_pressed = false;
        self.system_ready = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{CueBoard, ScreenLog};
    use kiosk_middleware::Topic;

    fn handler() -> (NotificationHandler, CueBoard, ScreenLog, EventBus) {
        let bus = EventBus::default();
        let cues = CueBoard::new();
        let screen = ScreenLog::new();
        let handler = NotificationHandler::new(
            NotificationSettings::default(),
            Arc::new(cues.clone()),
            Arc::new(screen.clone()),
            bus.clone(),
        );
        (handler, cues, screen, bus)
    }

    #[test]
    fn wake_plays_cue_and_wakes_screen() {
        let (mut handler, cues, screen, _bus) = handler();
        handler.handle(NotificationEvent::WakeScreen);
        assert_eq!(cues.plays(Cue::CustomerDetected), 1);
        assert_eq!(screen.wake_count(), 1);
        assert_eq!(screen.last_keep_on(), Some(Duration::from_secs(300)));
    }

    #[test]
    fn relay_echoes_update_the_map_idempotently() {
        let (mut handler, ..) = handler();
        let on = NotificationEvent::RelayStatusChanged {
            relay: 3,
            active: true,
        };
        handler.handle(on);
        handler.handle(on);
        assert_eq!(handler.relays().get(3), Some(true));
        assert_eq!(handler.relays().active_relays().collect::<Vec<_>>(), vec![3]);
    }

    #[test]
    fn every_event_is_published() {
        let (mut handler, _cues, _screen, bus) = handler();
        let mut rx = bus.subscribe_to(Topic::Controller);
        handler.handle(NotificationEvent::SystemReady);
        handler.handle(NotificationEvent::Unrecognized);
        assert!(handler.system_ready());
        let seen: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|e| e.payload)
            .collect();
        assert_eq!(seen.len(), 2);
        assert!(matches!(
            seen[1],
            EventPayload::Controller(NotificationEvent::Unrecognized)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn limit_switch_indicator_clears_itself() {
        let (mut handler, ..) = handler();
        handler.handle(NotificationEvent::LimitSwitchPressed);
        assert!(handler.limit_switch_pressed());

        tokio::time::advance(Duration::from_millis(999)).await;
        assert_eq!(handler.expire(Instant::now()), 0);
        assert!(handler.limit_switch_pressed());

        tokio::time::advance(Duration::from_millis(1)).await;
        assert_eq!(handler.expire(Instant::now()), 1);
        assert!(!handler.limit_switch_pressed());
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_forgets_controller_state() {
        let (mut handler, cues, ..) = handler();
        handler.handle(NotificationEvent::RelayStatusChanged {
            relay: 1,
            active: true,
        });
        handler.handle(NotificationEvent::LimitSwitchPressed);
        cues.play(Cue::LimitSwitchActive);

        handler.on_disconnect();
        assert!(handler.relays().is_empty());
        assert!(!handler.limit_switch_pressed());
        assert!(handler.timers().is_empty());
        assert!(cues.active().is_empty());
    }
}

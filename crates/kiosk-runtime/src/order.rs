//! [`OrderStateMachine`] – one in-flight order, from category to dispense.
//!
//! ```text
//! Idle ──select category──▶ CategorySelected ──select item──▶ AwaitingConfirmation
//!  ▲                              │ idle timeout                 │ limit switch: proceed unlocked
//!  │                              ▼                              │ proceed: RELAY<N>_ON
//!  └──── cancel / timeout / disconnect / dispense done ◀── Processing
//! ```
//!
//! The machine owns its timers ([`TimerSet`]) and the order-scoped audio
//! cues. Every exit to `Idle` cancels all timers and stops those cues in one
//! step, so nothing scheduled for an abandoned order can fire later.
//!
//! | Timer | Armed on | Expiry |
//! |---|---|---|
//! | `CategoryIdle` | category selected, `touch` | back to `Idle`, silently |
//! | `ConfirmationWait` | item selected, limit switch (re-armed) | cancel order, one "timed out" notice |
//! | `LimitSwitchCue` | limit switch, when a cap is configured | stop the looping cue |
//! | `GraceDelay` | relay activated | start the dispense countdown |
//! | `Dispense` | grace delay over | order complete, back to `Idle` |

use std::sync::Arc;
use std::time::Duration;

use kiosk_middleware::{ConnectionManager, EventBus};
use kiosk_types::{
    Catalog, ConnectionStatus, EventPayload, KioskError, Notice, OrderPhase, RelayCommand,
};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::collaborators::{Cue, CuePlayer};
use crate::timers::{TimerFired, TimerKind, TimerSet};

const SOURCE: &str = "kiosk-runtime::order";

pub const DEFAULT_CONFIRMATION_WAIT_SECS: u64 = 20;
pub const MIN_CONFIRMATION_WAIT_SECS: u64 = 5;
pub const MAX_CONFIRMATION_WAIT_SECS: u64 = 60;

pub fn clamp_confirmation_wait(secs: u64) -> u64 {
    secs.clamp(MIN_CONFIRMATION_WAIT_SECS, MAX_CONFIRMATION_WAIT_SECS)
}

// ─────────────────────────────────────────────────────────────────────────────
// Settings
// ─────────────────────────────────────────────────────────────────────────────

/// Operator-tunable timings of the order flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderSettings {
    confirmation_wait_secs: u64,
    /// Inactivity allowed on the category screen.
    pub category_idle: Duration,
    /// Pause between relay activation and the dispense countdown.
    pub grace_delay: Duration,
    /// Stop the looping limit-switch cue after this long. `None` keeps it
    /// going until the proceed window closes.
    pub limit_switch_cue_cap: Option<Duration>,
}

impl Default for OrderSettings {
    fn default() -> Self {
        Self {
            confirmation_wait_secs: DEFAULT_CONFIRMATION_WAIT_SECS,
            category_idle: Duration::from_secs(15),
            grace_delay: Duration::from_millis(2000),
            limit_switch_cue_cap: None,
        }
    }
}

impl OrderSettings {
    pub fn confirmation_wait(&self) -> Duration {
        Duration::from_secs(self.confirmation_wait_secs)
    }

    pub fn confirmation_wait_secs(&self) -> u64 {
        self.confirmation_wait_secs
    }

    /// Store a new confirmation-wait duration, clamped into 5–60 s.
    /// Returns the value actually stored.
    pub fn set_confirmation_wait(&mut self, secs: u64) -> u64 {
        self.confirmation_wait_secs = clamp_confirmation_wait(secs);
        self.confirmation_wait_secs
    }

    pub fn with_confirmation_wait(mut self, secs: u64) -> Self {
        self.set_confirmation_wait(secs);
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// State
// ─────────────────────────────────────────────────────────────────────────────

/// The single in-flight customer transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub category_id: String,
    pub item_id: String,
    pub relay: u32,
    pub dispense_secs: u32,
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum OrderState {
    #[default]
    Idle,
    CategorySelected {
        category_id: String,
    },
    AwaitingConfirmation {
        order: Order,
        /// The limit switch reported payment; proceed is unlocked.
        confirmed: bool,
    },
    Processing {
        order: Order,
        /// `false` during the grace delay, `true` once the countdown runs.
        dispensing: bool,
    },
}

impl OrderState {
    pub fn phase(&self) -> OrderPhase {
        match self {
            OrderState::Idle => OrderPhase::Idle,
            OrderState::CategorySelected { .. } => OrderPhase::CategorySelected,
            OrderState::AwaitingConfirmation { .. } => OrderPhase::AwaitingConfirmation,
            OrderState::Processing { .. } => OrderPhase::Processing,
        }
    }

    pub fn order(&self) -> Option<&Order> {
        match self {
            OrderState::AwaitingConfirmation { order, .. }
            | OrderState::Processing { order, .. } => Some(order),
            _ => None,
        }
    }

    pub fn proceed_enabled(&self) -> bool {
        matches!(
            self,
            OrderState::AwaitingConfirmation {
                confirmed: true,
                ..
            }
        )
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// OrderStateMachine
// ─────────────────────────────────────────────────────────────────────────────

pub struct OrderStateMachine {
    state: OrderState,
    settings: OrderSettings,
    timers: TimerSet,
    cues: Arc<dyn CuePlayer>,
    bus: EventBus,
}

impl OrderStateMachine {
    pub fn new(settings: OrderSettings, cues: Arc<dyn CuePlayer>, bus: EventBus) -> Self {
        Self {
            state: OrderState::Idle,
            settings,
            timers: TimerSet::new(),
            cues,
            bus,
        }
    }

    pub fn state(&self) -> &OrderState {
        &self.state
    }

    pub fn phase(&self) -> OrderPhase {
        self.state.phase()
    }

    pub fn settings(&self) -> &OrderSettings {
        &self.settings
    }

    /// Clamped; applies from the next armed confirmation window.
    pub fn set_confirmation_wait(&mut self, secs: u64) -> u64 {
        let stored = self.settings.set_confirmation_wait(secs);
        info!(confirmation_wait_secs = stored, "confirmation wait updated");
        stored
    }

    pub fn timers(&self) -> &TimerSet {
        &self.timers
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    /// `Idle`/`CategorySelected` → `CategorySelected`.
    ///
    /// # Errors
    ///
    /// - [`KioskError::NotConnected`] unless `status` is `connected`.
    /// - [`KioskError::InvalidTransition`] while an order is in flight.
    /// - [`KioskError::SelectionUnavailable`] for an unknown or disabled
    ///   category.
    ///
    /// No state changes on error.
    pub fn select_category(
        &mut self,
        catalog: &Catalog,
        category_id: &str,
        status: ConnectionStatus,
    ) -> Result<(), KioskError> {
        if status != ConnectionStatus::Connected {
            return Err(KioskError::NotConnected);
        }
        if !matches!(
            self.state,
            OrderState::Idle | OrderState::CategorySelected { .. }
        ) {
            return Err(self.invalid("select a category"));
        }
        let category = catalog
            .category(category_id)
            .filter(|c| c.enabled)
            .ok_or_else(|| KioskError::SelectionUnavailable(format!("Category '{category_id}'")))?;

        info!(category = %category.id, "category selected");
        self.state = OrderState::CategorySelected {
            category_id: category.id.clone(),
        };
        self.timers
            .arm(TimerKind::CategoryIdle, self.settings.category_idle);
        self.publish();
        Ok(())
    }

    /// Customer activity on the category screen. Returns `true` when the
    /// idle timer was re-armed.
    pub fn touch(&mut self) -> bool {
        if let OrderState::CategorySelected { .. } = self.state {
            self.timers
                .arm(TimerKind::CategoryIdle, self.settings.category_idle);
            true
        } else {
            false
        }
    }

    /// `CategorySelected` → `AwaitingConfirmation`; starts the
    /// confirmation-wait timer.
    ///
    /// # Errors
    ///
    /// [`KioskError::InvalidTransition`] outside `CategorySelected`,
    /// [`KioskError::SelectionUnavailable`] for an unknown or disabled item.
    pub fn select_item(&mut self, catalog: &Catalog, item_id: &str) -> Result<(), KioskError> {
        let OrderState::CategorySelected { category_id } = &self.state else {
            return Err(self.invalid("select an item"));
        };
        let (category, item) = catalog
            .find_item(category_id, item_id)
            .filter(|(c, i)| c.enabled && i.enabled)
            .ok_or_else(|| KioskError::SelectionUnavailable(format!("Item '{item_id}'")))?;

        let order = Order {
            category_id: category.id.clone(),
            item_id: item.id.clone(),
            relay: item.relay,
            dispense_secs: item.dispense_secs(),
            display_name: item.display_name().to_string(),
        };
        info!(item = %order.item_id, relay = order.relay, "item selected, awaiting confirmation");

        self.timers.cancel(TimerKind::CategoryIdle);
        self.timers
            .arm(TimerKind::ConfirmationWait, self.settings.confirmation_wait());
        self.state = OrderState::AwaitingConfirmation {
            order,
            confirmed: false,
        };
        self.publish();
        self.countdown("confirmation", self.settings.confirmation_wait_secs());
        Ok(())
    }

    /// Hardware confirmation. Unlocks proceed and restarts the window at the
    /// full configured duration. Ignored outside `AwaitingConfirmation`.
    pub fn on_limit_switch(&mut self) -> bool {
        let first = match &mut self.state {
            OrderState::AwaitingConfirmation { confirmed, .. } => {
                let first = !*confirmed;
                *confirmed = true;
                first
            }
            other => {
                debug!(phase = %other.phase(), "limit switch ignored");
                return false;
            }
        };

        self.timers
            .arm(TimerKind::ConfirmationWait, self.settings.confirmation_wait());
        if first {
            info!("payment confirmed by limit switch");
            self.cues.play(Cue::LimitSwitchActive);
            if let Some(cap) = self.settings.limit_switch_cue_cap {
                self.timers.arm(TimerKind::LimitSwitchCue, cap);
            }
        }
        self.publish();
        self.countdown("proceed", self.settings.confirmation_wait_secs());
        true
    }

    /// `AwaitingConfirmation` (confirmed) → `Processing`: sends
    /// `RELAY<N>_ON` without waiting for the controller's echo.
    ///
    /// # Errors
    ///
    /// - [`KioskError::InvalidTransition`] outside `AwaitingConfirmation`.
    /// - [`KioskError::ConfirmationNotReceived`] before the limit switch;
    ///   nothing changes.
    /// - The connection manager's error when the write fails. The manager
    ///   has already reported it; the order is dropped back to `Idle`.
    pub async fn proceed(&mut self, connection: &mut ConnectionManager) -> Result<(), KioskError> {
        let OrderState::AwaitingConfirmation { order, confirmed } = &self.state else {
            return Err(self.invalid("proceed"));
        };
        if !*confirmed {
            return Err(KioskError::ConfirmationNotReceived);
        }
        let order = order.clone();

        self.timers.cancel(TimerKind::ConfirmationWait);
        self.timers.cancel(TimerKind::LimitSwitchCue);
        self.cues.stop(Cue::LimitSwitchActive);

        if let Err(err) = connection
            .send_command(RelayCommand::activate(order.relay))
            .await
        {
            warn!(relay = order.relay, error = %err, "activation failed, order dropped");
            self.reset();
            return Err(err);
        }

        info!(relay = order.relay, item = %order.item_id, "relay activated");
        self.state = OrderState::Processing {
            order,
            dispensing: false,
        };
        self.timers
            .arm(TimerKind::GraceDelay, self.settings.grace_delay);
        self.publish();
        Ok(())
    }

    /// Explicit back/cancel from any state.
    pub fn cancel(&mut self) {
        if self.is_at_rest() {
            return;
        }
        info!(phase = %self.state.phase(), "order cancelled");
        self.reset();
    }

    /// The link is gone: drop everything in flight.
    pub fn on_disconnect(&mut self) {
        if self.is_at_rest() {
            return;
        }
        warn!(phase = %self.state.phase(), "link lost, order reset");
        self.reset();
    }

    /// Handle every timer due at `now`. Expiries made stale by an earlier
    /// one in the same batch are skipped. Returns how many were handled.
    pub fn expire(&mut self, now: Instant) -> usize {
        let mut handled = 0;
        for fired in self.timers.expired(now) {
            if self.on_timer(fired) {
                handled += 1;
            }
        }
        handled
    }

    /// Apply one expiry. Returns `false` when it is stale.
    pub fn on_timer(&mut self, fired: TimerFired) -> bool {
        if !self.timers.accept(fired) {
            return false;
        }
        match fired.kind {
            TimerKind::CategoryIdle => {
                debug!("category screen idle, back to start");
                self.reset();
            }
            TimerKind::ConfirmationWait => {
                let confirmed = self.state.proceed_enabled();
                info!(confirmed, "confirmation window expired");
                self.reset();
                let message = if confirmed {
                    "The order was not confirmed in time and has been cancelled."
                } else {
                    "No payment confirmation was received. The order has been cancelled."
                };
                self.notice(Notice::error("Timed Out", message));
            }
            TimerKind::LimitSwitchCue => {
                self.cues.stop(Cue::LimitSwitchActive);
            }
            TimerKind::GraceDelay => self.start_dispense(),
            TimerKind::Dispense => {
                let name = self
                    .state
                    .order()
                    .map(|o| o.display_name.clone())
                    .unwrap_or_default();
                info!(item = %name, "dispense complete");
                self.reset();
                self.notice(Notice::info(
                    "Order Complete",
                    format!("{name} is ready. Thank you!"),
                ));
            }
            TimerKind::LimitSwitchIndicator => {}
        }
        true
    }

    fn start_dispense(&mut self) {
        let OrderState::Processing { order, dispensing } = &mut self.state else {
            return;
        };
        *dispensing = true;
        let secs = u64::from(order.dispense_secs);
        self.timers
            .arm(TimerKind::Dispense, Duration::from_secs(secs));
        self.cues.play(Cue::ProcessingActive);
        self.publish();
        self.countdown("dispense", secs);
    }

    fn is_at_rest(&self) -> bool {
        self.state == OrderState::Idle && self.timers.is_empty()
    }

    /// Single exit path to `Idle`.
    fn reset(&mut self) {
        self.timers.cancel_all();
        self.cues.stop(Cue::LimitSwitchActive);
        self.cues.stop(Cue::ProcessingActive);
        self.state = OrderState::Idle;
        self.publish();
    }

    fn invalid(&self, action: &str) -> KioskError {
        KioskError::InvalidTransition {
            action: action.to_string(),
            phase: self.state.phase(),
        }
    }

    fn publish(&self) {
        let order = self.state.order();
        self.bus.emit(
            SOURCE,
            EventPayload::OrderChanged {
                phase: self.state.phase(),
                item_id: order.map(|o| o.item_id.clone()),
                relay: order.map(|o| o.relay),
                proceed_enabled: self.state.proceed_enabled(),
            },
        );
    }

    fn countdown(&self, label: &str, seconds: u64) {
        self.bus.emit(
            SOURCE,
            EventPayload::Countdown {
                label: label.to_string(),
                seconds,
            },
        );
    }

    fn notice(&self, notice: Notice) {
        self.bus.emit(SOURCE, EventPayload::Notice(notice));
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::CueBoard;
    use kiosk_middleware::{SimController, SimTransport, Topic, TopicReceiver};
    use kiosk_types::Event;
    use tokio::sync::mpsc;

    struct Harness {
        machine: OrderStateMachine,
        connection: ConnectionManager,
        controller: SimController,
        cues: CueBoard,
        notices: TopicReceiver,
        catalog: Catalog,
    }

    async fn harness() -> Result<Harness, KioskError> {
        let bus = EventBus::default();
        let notices = bus.subscribe_to(Topic::Notices);
        let (transport, controller) = SimTransport::new();
        let (link_tx, _link_rx) = mpsc::unbounded_channel();
        let mut connection = ConnectionManager::new(Box::new(transport), bus.clone(), link_tx);
        connection.connect().await?;
        let cues = CueBoard::new();
        let machine = OrderStateMachine::new(
            OrderSettings::default(),
            Arc::new(cues.clone()),
            bus,
        );
        let mut h = Harness {
            machine,
            connection,
            controller,
            cues,
            notices,
            catalog: Catalog::default(),
        };
        drain(&mut h.notices);
        Ok(h)
    }

    fn drain(rx: &mut TopicReceiver) -> Vec<Event> {
        std::iter::from_fn(|| rx.try_recv().ok()).collect()
    }

    async fn advance(h: &mut Harness, secs: u64) {
        tokio::time::advance(Duration::from_secs(secs)).await;
        h.machine.expire(Instant::now());
    }

    fn await_item(h: &mut Harness) -> Result<(), KioskError> {
        h.machine
            .select_category(&h.catalog, "aneka-kopi", ConnectionStatus::Connected)?;
        h.machine.select_item(&h.catalog, "gula-aren")
    }

    #[test]
    fn confirmation_wait_is_clamped() {
        let mut settings = OrderSettings::default();
        assert_eq!(settings.confirmation_wait_secs(), 20);
        assert_eq!(settings.set_confirmation_wait(2), 5);
        assert_eq!(settings.set_confirmation_wait(600), 60);
        assert_eq!(settings.set_confirmation_wait(30), 30);
        assert_eq!(settings.confirmation_wait(), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn category_selection_requires_a_connection() -> Result<(), KioskError> {
        let mut h = harness().await?;
        let err = h
            .machine
            .select_category(&h.catalog, "aneka-kopi", ConnectionStatus::Connecting)
            .unwrap_err();
        assert_eq!(err, KioskError::NotConnected);
        assert_eq!(h.machine.phase(), OrderPhase::Idle);
        assert!(h.machine.timers().is_empty());
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_selections_are_rejected() -> Result<(), KioskError> {
        let mut h = harness().await?;
        h.catalog.set_category_enabled("rokok-ketengah", false);
        h.catalog.set_item_enabled("gula-aren", false);

        let err = h
            .machine
            .select_category(&h.catalog, "rokok-ketengah", ConnectionStatus::Connected)
            .unwrap_err();
        assert!(matches!(err, KioskError::SelectionUnavailable(_)));
        assert_eq!(h.machine.phase(), OrderPhase::Idle);

        h.machine
            .select_category(&h.catalog, "aneka-kopi", ConnectionStatus::Connected)?;
        let err = h.machine.select_item(&h.catalog, "gula-aren").unwrap_err();
        assert!(matches!(err, KioskError::SelectionUnavailable(_)));
        assert_eq!(h.machine.phase(), OrderPhase::CategorySelected);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn idle_category_screen_returns_home() -> Result<(), KioskError> {
        let mut h = harness().await?;
        h.machine
            .select_category(&h.catalog, "aneka-kopi", ConnectionStatus::Connected)?;

        advance(&mut h, 10).await;
        assert!(h.machine.touch());
        advance(&mut h, 10).await;
        assert_eq!(h.machine.phase(), OrderPhase::CategorySelected);

        advance(&mut h, 5).await;
        assert_eq!(h.machine.phase(), OrderPhase::Idle);
        assert!(h.machine.timers().is_empty());
        assert!(drain(&mut h.notices).is_empty());
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn proceed_needs_hardware_confirmation() -> Result<(), KioskError> {
        let mut h = harness().await?;
        await_item(&mut h)?;

        let err = h.machine.proceed(&mut h.connection).await.unwrap_err();
        assert_eq!(err, KioskError::ConfirmationNotReceived);
        assert_eq!(h.machine.phase(), OrderPhase::AwaitingConfirmation);
        assert!(h.machine.timers().is_armed(TimerKind::ConfirmationWait));
        assert!(h.controller.relay_writes().is_empty());
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn unconfirmed_order_times_out_once() -> Result<(), KioskError> {
        let mut h = harness().await?;
        await_item(&mut h)?;

        advance(&mut h, 19).await;
        assert_eq!(h.machine.phase(), OrderPhase::AwaitingConfirmation);
        advance(&mut h, 1).await;
        assert_eq!(h.machine.phase(), OrderPhase::Idle);
        assert!(h.machine.timers().is_empty());

        let notices = drain(&mut h.notices);
        assert_eq!(notices.len(), 1);
        assert!(matches!(
            &notices[0].payload,
            EventPayload::Notice(n) if n.title == "Timed Out"
        ));
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn proceed_wins_over_timeout() -> Result<(), KioskError> {
        let mut h = harness().await?;
        await_item(&mut h)?;

        advance(&mut h, 3).await;
        assert!(h.machine.on_limit_switch());
        assert!(h.cues.is_playing(Cue::LimitSwitchActive));
        assert_eq!(
            h.machine.timers().remaining(TimerKind::ConfirmationWait),
            Some(Duration::from_secs(20))
        );

        advance(&mut h, 1).await;
        h.machine.proceed(&mut h.connection).await?;
        assert_eq!(h.controller.relay_writes(), vec!["RELAY2_ON"]);
        assert!(!h.machine.timers().is_armed(TimerKind::ConfirmationWait));
        assert_eq!(h.machine.timers().armed(), vec![TimerKind::GraceDelay]);
        assert!(!h.cues.is_playing(Cue::LimitSwitchActive));

        advance(&mut h, 1).await;
        assert_eq!(h.machine.phase(), OrderPhase::Processing);
        advance(&mut h, 1).await;
        assert!(h.machine.timers().is_armed(TimerKind::Dispense));
        assert!(h.cues.is_playing(Cue::ProcessingActive));

        advance(&mut h, 3).await;
        assert_eq!(h.machine.phase(), OrderPhase::Idle);
        assert!(!h.cues.is_playing(Cue::ProcessingActive));
        let notices = drain(&mut h.notices);
        assert_eq!(notices.len(), 1);
        assert!(matches!(
            &notices[0].payload,
            EventPayload::Notice(n) if n.title == "Order Complete"
        ));
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn limit_switch_cue_cap_stops_the_loop() -> Result<(), KioskError> {
        let mut h = harness().await?;
        h.machine.settings.limit_switch_cue_cap = Some(Duration::from_secs(5));
        await_item(&mut h)?;
        h.machine.on_limit_switch();

        advance(&mut h, 5).await;
        assert!(!h.cues.is_playing(Cue::LimitSwitchActive));
        assert!(h.machine.state().proceed_enabled());
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_clears_timers_and_cues() -> Result<(), KioskError> {
        let mut h = harness().await?;
        await_item(&mut h)?;
        h.machine.on_limit_switch();

        h.machine.cancel();
        assert_eq!(h.machine.phase(), OrderPhase::Idle);
        assert!(h.machine.timers().is_empty());
        assert!(h.cues.active().is_empty());

        advance(&mut h, 60).await;
        assert!(drain(&mut h.notices).is_empty());
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn failed_activation_drops_the_order() -> Result<(), KioskError> {
        let mut h = harness().await?;
        await_item(&mut h)?;
        h.machine.on_limit_switch();
        h.controller.set_fail_writes(true);

        let err = h.machine.proceed(&mut h.connection).await.unwrap_err();
        assert!(matches!(err, KioskError::LinkError(_)));
        assert_eq!(h.machine.phase(), OrderPhase::Idle);
        assert!(h.machine.timers().is_empty());
        // Reported once, by the connection manager.
        assert_eq!(drain(&mut h.notices).len(), 1);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn second_order_needs_idle() -> Result<(), KioskError> {
        let mut h = harness().await?;
        await_item(&mut h)?;
        let err = h
            .machine
            .select_category(&h.catalog, "minuman-dingin", ConnectionStatus::Connected)
            .unwrap_err();
        assert!(matches!(err, KioskError::InvalidTransition { .. }));
        assert_eq!(
            h.machine.state().order().map(|o| o.relay),
            Some(2)
        );
        Ok(())
    }
}

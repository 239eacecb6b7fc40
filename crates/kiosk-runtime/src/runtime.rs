//! [`KioskRuntime`] – the single task that owns all mutable kiosk state.
//!
//! The connection manager, the order machine, the notification handler and
//! the catalog live on one task and are only ever touched from it. Three
//! inputs feed the loop, polled in this priority:
//!
//! 1. link signals (frames and drops, tagged with their session),
//! 2. the earliest timer deadline of the order machine and the handler,
//! 3. [`Command`]s from screens and the operator console via [`KioskHandle`].
//!
//! A link drop is therefore applied before any command or timer still
//! waiting behind it. Observers read state through the [`EventBus`] or a
//! [`Snapshot`]; they never mutate it.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use kiosk_middleware::SimTransport;
//! use kiosk_runtime::collaborators::{CueBoard, ScreenLog};
//! use kiosk_runtime::runtime::{Command, KioskRuntime, RuntimeConfig};
//!
//! # async fn demo() -> Result<(), kiosk_types::KioskError> {
//! let (transport, _controller) = SimTransport::new();
//! let (runtime, handle) = KioskRuntime::new(
//!     Box::new(transport),
//!     RuntimeConfig::default(),
//!     Arc::new(CueBoard::new()),
//!     Arc::new(ScreenLog::new()),
//! );
//! tokio::spawn(runtime.run());
//! handle.send(Command::Connect).await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use kiosk_middleware::{ConnectionManager, EventBus, LinkEvent, LinkSignal, Transport};
use kiosk_protocol::decode;
use kiosk_types::{
    Catalog, ConnectionStatus, EventPayload, KioskError, Notice, NotificationEvent, OrderPhase,
    RelayCommand, TransportKind,
};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info};

use crate::collaborators::{CuePlayer, ScreenControl};
use crate::notifications::{NotificationHandler, NotificationSettings};
use crate::order::{Order, OrderSettings, OrderStateMachine};
use crate::timers::TimerKind;

const SOURCE: &str = "kiosk-runtime::runtime";

/// Buffered commands before `KioskHandle::send` waits.
const COMMAND_CAPACITY: usize = 64;

// ─────────────────────────────────────────────────────────────────────────────
// Commands & snapshots
// ─────────────────────────────────────────────────────────────────────────────

/// Input from a screen or the operator console. Failures are reported as
/// notices on the bus, never returned.
#[derive(Debug)]
pub enum Command {
    Connect,
    Disconnect,
    /// Send `PING` on demand.
    Ping,
    SelectCategory(String),
    SelectItem(String),
    /// Customer activity; keeps the category screen alive.
    Touch,
    Proceed,
    Cancel,
    /// Manual `RELAY<N>_OFF` from the admin console.
    RelayOff(u32),
    SetConfirmationWait(u64),
    SetCategoryEnabled { id: String, enabled: bool },
    SetItemEnabled { id: String, enabled: bool },
    SetDispenseSecs { id: String, secs: u32 },
    SetDisplayName { id: String, name: Option<String> },
    SetBarcodeImage { id: String, image: Option<String> },
    Snapshot(oneshot::Sender<Snapshot>),
    Shutdown,
}

/// Point-in-time copy of the runtime state.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub status: ConnectionStatus,
    pub transport: TransportKind,
    pub phase: OrderPhase,
    pub order: Option<Order>,
    pub proceed_enabled: bool,
    /// `(relay, active)` as last echoed by the controller.
    pub relays: Vec<(u32, bool)>,
    pub limit_switch_pressed: bool,
    pub system_ready: bool,
    /// Armed timers, order machine first.
    pub pending_timers: Vec<TimerKind>,
    pub confirmation_wait_secs: u64,
    pub catalog: Catalog,
}

#[derive(Debug, Clone, Default)]
pub struct RuntimeConfig {
    pub catalog: Catalog,
    pub order: OrderSettings,
    pub notifications: NotificationSettings,
}

// ─────────────────────────────────────────────────────────────────────────────
// KioskHandle
// ─────────────────────────────────────────────────────────────────────────────

/// Cloneable front door to a running [`KioskRuntime`].
#[derive(Clone)]
pub struct KioskHandle {
    commands: mpsc::Sender<Command>,
    bus: EventBus,
    status: watch::Receiver<ConnectionStatus>,
}

impl KioskHandle {
    /// # Errors
    ///
    /// [`KioskError::Channel`] once the runtime has stopped.
    pub async fn send(&self, command: Command) -> Result<(), KioskError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| KioskError::Channel("kiosk runtime stopped".into()))
    }

    /// Non-blocking send for contexts that cannot await, such as signal
    /// handlers.
    ///
    /// # Errors
    ///
    /// [`KioskError::Channel`] when the queue is full or the runtime stopped.
    pub fn try_send(&self, command: Command) -> Result<(), KioskError> {
        self.commands
            .try_send(command)
            .map_err(|e| KioskError::Channel(e.to_string()))
    }

    /// Ask the runtime for its current state. Every command sent before
    /// this one has been fully handled when the snapshot is taken.
    ///
    /// # Errors
    ///
    /// [`KioskError::Channel`] once the runtime has stopped.
    pub async fn snapshot(&self) -> Result<Snapshot, KioskError> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Snapshot(tx)).await?;
        rx.await
            .map_err(|_| KioskError::Channel("snapshot reply dropped".into()))
    }

    pub async fn shutdown(&self) -> Result<(), KioskError> {
        self.send(Command::Shutdown).await
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.clone()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// KioskRuntime
// ─────────────────────────────────────────────────────────────────────────────

pub struct KioskRuntime {
    connection: ConnectionManager,
    order: OrderStateMachine,
    notifications: NotificationHandler,
    catalog: Catalog,
    bus: EventBus,
    commands: mpsc::Receiver<Command>,
    link_rx: mpsc::UnboundedReceiver<LinkSignal>,
}

impl KioskRuntime {
    pub fn new(
        transport: Box<dyn Transport>,
        config: RuntimeConfig,
        cues: Arc<dyn CuePlayer>,
        screen: Arc<dyn ScreenControl>,
    ) -> (Self, KioskHandle) {
        let bus = EventBus::default();
        let (link_tx, link_rx) = mpsc::unbounded_channel();
        let (command_tx, commands) = mpsc::channel(COMMAND_CAPACITY);

        let connection = ConnectionManager::new(transport, bus.clone(), link_tx);
        let handle = KioskHandle {
            commands: command_tx,
            bus: bus.clone(),
            status: connection.watch_status(),
        };
        let runtime = Self {
            connection,
            order: OrderStateMachine::new(config.order, Arc::clone(&cues), bus.clone()),
            notifications: NotificationHandler::new(config.notifications, cues, screen, bus.clone()),
            catalog: config.catalog,
            bus,
            commands,
            link_rx,
        };
        (runtime, handle)
    }

    /// Run until [`Command::Shutdown`] or every handle is dropped.
    pub async fn run(mut self) {
        info!(transport = %self.connection.kind(), "kiosk runtime started");
        loop {
            let deadline = self.next_deadline();
            tokio::select! {
                biased;
                Some(signal) = self.link_rx.recv() => self.on_link(signal),
                _ = wait_for(deadline) => self.on_deadline(Instant::now()),
                command = self.commands.recv() => match command {
                    None | Some(Command::Shutdown) => break,
                    Some(command) => self.on_command(command).await,
                },
            }
        }
        self.order.cancel();
        self.connection.disconnect().await;
        self.notifications.on_disconnect();
        info!("kiosk runtime stopped");
    }

    fn next_deadline(&self) -> Option<Instant> {
        match (self.order.next_deadline(), self.notifications.next_deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    fn on_deadline(&mut self, now: Instant) {
        self.order.expire(now);
        self.notifications.expire(now);
    }

    fn on_link(&mut self, signal: LinkSignal) {
        match self.connection.accept_signal(signal) {
            None => {}
            Some(LinkEvent::Frame(text)) => {
                debug!(frame = %text, "frame received");
                for event in decode(&text) {
                    self.notifications.handle(event);
                    if event == NotificationEvent::LimitSwitchPressed {
                        self.order.on_limit_switch();
                    }
                }
            }
            Some(LinkEvent::Dropped) => self.reset_after_disconnect(),
        }
    }

    async fn on_command(&mut self, command: Command) {
        let was_connected = self.connection.is_connected();
        match command {
            Command::Connect => {
                if let Err(e) = self.connection.connect().await {
                    debug!(error = %e, "connect did not complete");
                }
            }
            Command::Disconnect => self.connection.disconnect().await,
            Command::Ping => {
                let result = self.connection.probe().await;
                self.report(result);
            }
            Command::SelectCategory(id) => {
                let result =
                    self.order
                        .select_category(&self.catalog, &id, self.connection.status());
                self.report(result);
            }
            Command::SelectItem(id) => {
                let result = self.order.select_item(&self.catalog, &id);
                self.report(result);
            }
            Command::Touch => {
                self.order.touch();
            }
            Command::Proceed => {
                let result = self.order.proceed(&mut self.connection).await;
                self.report(result);
            }
            Command::Cancel => self.order.cancel(),
            Command::RelayOff(relay) => {
                let result = self
                    .connection
                    .send_command(RelayCommand::deactivate(relay))
                    .await;
                self.report(result);
            }
            Command::SetConfirmationWait(secs) => {
                let stored = self.order.set_confirmation_wait(secs);
                self.settings_saved(format!("Confirmation wait set to {stored} s."));
            }
            Command::SetCategoryEnabled { id, enabled } => {
                let found = self.catalog.set_category_enabled(&id, enabled);
                self.catalog_update(found, &id, availability(enabled));
            }
            Command::SetItemEnabled { id, enabled } => {
                let found = self.catalog.set_item_enabled(&id, enabled);
                self.catalog_update(found, &id, availability(enabled));
            }
            Command::SetDispenseSecs { id, secs } => match self.catalog.set_dispense_secs(&id, secs) {
                Some(stored) => self.catalog_update(true, &id, &format!("dispenses for {stored} s")),
                None => self.catalog_update(false, &id, ""),
            },
            Command::SetDisplayName { id, name } => {
                let found = self.catalog.set_display_name(&id, name.as_deref());
                self.catalog_update(found, &id, "renamed");
            }
            Command::SetBarcodeImage { id, image } => {
                let what = if image.is_some() { "barcode set" } else { "barcode cleared" };
                let found = self.catalog.set_barcode_image(&id, image.as_deref());
                self.catalog_update(found, &id, what);
            }
            Command::Snapshot(reply) => {
                if reply.send(self.snapshot()).is_err() {
                    debug!("snapshot requester went away");
                }
            }
            Command::Shutdown => {}
        }
        if was_connected && !self.connection.is_connected() {
            self.reset_after_disconnect();
        }
    }

    /// Disconnect wins over everything pending: order first, then the
    /// controller-side indicators and cues.
    fn reset_after_disconnect(&mut self) {
        self.order.on_disconnect();
        self.notifications.on_disconnect();
    }

    /// One notice per failure. Link failures were already reported by the
    /// connection manager.
    fn report(&self, result: Result<(), KioskError>) {
        let Err(err) = result else { return };
        match err {
            KioskError::LinkError(_)
            | KioskError::DeviceNotFound(_)
            | KioskError::TransportUnavailable(_) => {}
            _ => {
                info!(error = %err, "request rejected");
                self.bus.emit(SOURCE, EventPayload::Notice(Notice::from(&err)));
            }
        }
    }

    fn catalog_update(&self, found: bool, id: &str, what: &str) {
        if found {
            self.settings_saved(format!("'{id}' {what}."));
        } else {
            self.bus.emit(
                SOURCE,
                EventPayload::Notice(Notice::error("Not Found", format!("No category or item '{id}'."))),
            );
        }
    }

    fn settings_saved(&self, message: String) {
        info!(%message, "settings changed");
        self.bus
            .emit(SOURCE, EventPayload::Notice(Notice::info("Saved", message)));
    }

    fn snapshot(&self) -> Snapshot {
        let state = self.order.state();
        let mut pending_timers = self.order.timers().armed();
        pending_timers.extend(self.notifications.timers().armed());
        Snapshot {
            status: self.connection.status(),
            transport: self.connection.kind(),
            phase: state.phase(),
            order: state.order().cloned(),
            proceed_enabled: state.proceed_enabled(),
            relays: self.notifications.relays().iter().collect(),
            limit_switch_pressed: self.notifications.limit_switch_pressed(),
            system_ready: self.notifications.system_ready(),
            pending_timers,
            confirmation_wait_secs: self.order.settings().confirmation_wait_secs(),
            catalog: self.catalog.clone(),
        }
    }
}

fn availability(enabled: bool) -> &'static str {
    if enabled { "enabled" } else { "disabled" }
}

async fn wait_for(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

//! Connection manager: sole owner of the active [`Transport`].
//!
//! The manager is the boundary where transport failures stop. Every error
//! from the link is turned into a [`ConnectionStatus`] change plus exactly
//! one notice on the bus; callers get the typed error back for their own
//! control flow but never have to report it again.
//!
//! Status is observable two ways: a [`tokio::sync::watch`] channel for the
//! current value and `ConnectionChanged` events on [`Topic::Connection`].
//!
//! [`Topic::Connection`]: crate::bus::Topic::Connection

use kiosk_protocol::codec::{self, PING};
use kiosk_types::{
    ConnectionStatus, EventPayload, KioskError, Notice, RelayCommand, TransportKind,
};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::bus::EventBus;
use crate::transport::{LinkEvent, LinkSignal, SessionId, SessionSink, Transport};

const SOURCE: &str = "kiosk-middleware::connection";

pub struct ConnectionManager {
    transport: Box<dyn Transport>,
    kind: TransportKind,
    bus: EventBus,
    status: watch::Sender<ConnectionStatus>,
    link_tx: mpsc::UnboundedSender<LinkSignal>,
    session: Option<SessionSink>,
    last_session: SessionId,
    /// Set once the transport reported a missing capability.
    unavailable: Option<KioskError>,
}

impl ConnectionManager {
    /// Wrap the process's one transport. Link signals of every session are
    /// forwarded to `link_tx`; feed them back through
    /// [`ConnectionManager::accept_signal`].
    pub fn new(
        transport: Box<dyn Transport>,
        bus: EventBus,
        link_tx: mpsc::UnboundedSender<LinkSignal>,
    ) -> Self {
        let kind = transport.kind();
        let (status, _) = watch::channel(ConnectionStatus::Disconnected);
        Self {
            transport,
            kind,
            bus,
            status,
            link_tx,
            session: None,
            last_session: 0,
            unavailable: None,
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.status() == ConnectionStatus::Connected
    }

    pub fn kind(&self) -> TransportKind {
        self.kind
    }

    /// Id of the live session, if any.
    pub fn session(&self) -> Option<SessionId> {
        self.session.as_ref().map(SessionSink::session)
    }

    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }

    /// Open the link: `connecting`, then `connected`, `disconnected` or
    /// `unavailable`.
    ///
    /// # Errors
    ///
    /// Returns the transport's error after it has been reported. Once the
    /// transport was found unavailable every later call fails the same way
    /// without touching the platform.
    pub async fn connect(&mut self) -> Result<(), KioskError> {
        if let Some(err) = &self.unavailable {
            return Err(err.clone());
        }
        if self.is_connected() {
            return Ok(());
        }

        self.set_status(ConnectionStatus::Connecting);
        self.last_session += 1;
        let sink = SessionSink::new(self.last_session, self.link_tx.clone());
        info!(transport = %self.kind, session = self.last_session, "connecting");

        match self.transport.connect(sink.clone()).await {
            Ok(()) => {
                self.session = Some(sink);
                self.set_status(ConnectionStatus::Connected);
                self.notice(Notice::info("Connected", "Controller connected."));
                match self.transport.send(PING).await {
                    Ok(()) => debug!("PING sent"),
                    Err(e) => warn!(error = %e, "first PING not written"),
                }
                Ok(())
            }
            Err(err) => {
                sink.close();
                error!(transport = %self.kind, error = %err, "connect failed");
                if matches!(err, KioskError::TransportUnavailable(_)) {
                    self.unavailable = Some(err.clone());
                    self.set_status(ConnectionStatus::Unavailable);
                } else {
                    self.set_status(ConnectionStatus::Disconnected);
                }
                self.notice((&err).into());
                Err(err)
            }
        }
    }

    /// Write `PING`. No reply is expected; only the write has to succeed.
    ///
    /// # Errors
    ///
    /// [`KioskError::NotConnected`] unless the status is `connected`. A
    /// failed write ends the session like any other write failure and
    /// returns [`KioskError::LinkError`].
    pub async fn probe(&mut self) -> Result<(), KioskError> {
        if !self.is_connected() {
            return Err(KioskError::NotConnected);
        }
        match self.transport.send(PING).await {
            Ok(()) => {
                debug!("PING sent");
                Ok(())
            }
            Err(err) => Err(self.write_failed(err, "PING failed").await),
        }
    }

    /// Encode and write one relay command.
    ///
    /// # Errors
    ///
    /// [`KioskError::NotConnected`] unless the status is `connected`; no I/O
    /// happens in that case. A write failure ends the session and returns
    /// [`KioskError::LinkError`]; the caller must treat it as a disconnect.
    pub async fn send_command(&mut self, command: RelayCommand) -> Result<(), KioskError> {
        if !self.is_connected() {
            debug!(relay = command.relay, status = %self.status(), "command refused");
            return Err(KioskError::NotConnected);
        }
        let frame = codec::encode(&command);
        match self.transport.send(&frame).await {
            Ok(()) => {
                info!(relay = command.relay, frame = %frame, "command sent");
                self.bus.emit(SOURCE, EventPayload::CommandSent(command));
                Ok(())
            }
            Err(err) => {
                debug!(relay = command.relay, "relay command not written");
                Err(self.write_failed(err, "write failed").await)
            }
        }
    }

    /// Close the link on the kiosk's initiative. No drop is reported.
    pub async fn disconnect(&mut self) {
        let Some(sink) = self.session.take() else {
            if self.status() == ConnectionStatus::Connecting {
                self.set_status(ConnectionStatus::Disconnected);
            }
            return;
        };
        sink.close();
        if let Err(e) = self.transport.disconnect().await {
            warn!(error = %e, "transport disconnect failed");
        }
        info!(session = sink.session(), "disconnected");
        self.set_status(ConnectionStatus::Disconnected);
        self.notice(Notice::info("Disconnected", "Controller disconnected."));
    }

    /// Filter a link signal against the live session.
    ///
    /// Signals from any other session are stale and yield `None`. A drop of
    /// the live session moves the status to `disconnected`, reports it, and
    /// is returned so the caller can reset its own state.
    pub fn accept_signal(&mut self, signal: LinkSignal) -> Option<LinkEvent> {
        if self.session() != Some(signal.session) {
            debug!(session = signal.session, live = ?self.session(), "stale link signal dropped");
            return None;
        }
        if signal.event == LinkEvent::Dropped {
            if let Some(sink) = self.session.take() {
                sink.close();
            }
            warn!(session = signal.session, "controller link lost");
            self.set_status(ConnectionStatus::Disconnected);
            self.notice(Notice::from(&KioskError::LinkError("link dropped".into())));
        }
        Some(signal.event)
    }

    /// A mid-session write failed: it counts as a disconnect.
    async fn write_failed(&mut self, err: KioskError, what: &str) -> KioskError {
        let err = match err {
            KioskError::LinkError(_) => err,
            other => KioskError::LinkError(other.to_string()),
        };
        error!(error = %err, "{}", what);
        self.end_session(Notice::from(&err)).await;
        err
    }

    async fn end_session(&mut self, notice: Notice) {
        if let Some(sink) = self.session.take() {
            sink.close();
        }
        if let Err(e) = self.transport.disconnect().await {
            debug!(error = %e, "cleanup disconnect failed");
        }
        self.set_status(ConnectionStatus::Disconnected);
        self.notice(notice);
    }

    fn set_status(&mut self, status: ConnectionStatus) {
        let changed = self.status.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
        if changed {
            self.bus.emit(
                SOURCE,
                EventPayload::ConnectionChanged {
                    status,
                    transport: self.kind,
                },
            );
        }
    }

    fn notice(&self, notice: Notice) {
        self.bus.emit(SOURCE, EventPayload::Notice(notice));
    }
}

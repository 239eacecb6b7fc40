//! In-process simulated relay controller.
//!
//! [`SimTransport`] behaves like the ESP32 firmware: every `RELAY<N>_ON`
//! write is echoed as `RELAY<N>_ACTIVATED` and every `RELAY<N>_OFF` as
//! `RELAY<N>_DEACTIVATED`. The paired [`SimController`] plays the hardware
//! side: it sees every write, injects sensor frames and pulls the plug.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use kiosk_protocol::codec::{encode_status, parse_command};
use kiosk_types::{KioskError, RelayAction, TransportKind};
use tracing::debug;

use crate::transport::{SessionSink, Transport};

#[derive(Debug)]
struct SimState {
    sink: Option<SessionSink>,
    /// Sink of the last session that ended, for late-frame injection.
    retired: Option<SessionSink>,
    writes: Vec<String>,
    echo: bool,
    fail_next_connect: Option<KioskError>,
    fail_writes: bool,
}

fn lock(state: &Mutex<SimState>) -> MutexGuard<'_, SimState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug)]
pub struct SimTransport {
    state: Arc<Mutex<SimState>>,
}

/// Hardware-side handle of a [`SimTransport`]. Clone freely.
#[derive(Debug, Clone)]
pub struct SimController {
    state: Arc<Mutex<SimState>>,
}

impl SimTransport {
    pub fn new() -> (Self, SimController) {
        let state = Arc::new(Mutex::new(SimState {
            sink: None,
            retired: None,
            writes: Vec::new(),
            echo: true,
            fail_next_connect: None,
            fail_writes: false,
        }));
        (
            Self {
                state: Arc::clone(&state),
            },
            SimController { state },
        )
    }
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl Transport for SimTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Sim
    }

    async fn connect(&mut self, sink: SessionSink) -> Result<(), KioskError> {
        let mut state = lock(&self.state);
        if let Some(err) = state.fail_next_connect.take() {
            return Err(err);
        }
        if let Some(old) = state.sink.take() {
            old.close();
            state.retired = Some(old);
        }
        debug!(session = sink.session(), "sim controller connected");
        state.sink = Some(sink);
        Ok(())
    }

    async fn send(&mut self, frame: &str) -> Result<(), KioskError> {
        let mut state = lock(&self.state);
        let Some(sink) = state.sink.clone() else {
            return Err(KioskError::NotConnected);
        };
        if state.fail_writes {
            return Err(KioskError::LinkError("simulated write failure".into()));
        }
        state.writes.push(frame.to_string());
        if state.echo
            && let Some(command) = parse_command(frame)
        {
            sink.frame(encode_status(command.relay, command.action == RelayAction::On));
        }
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), KioskError> {
        let mut state = lock(&self.state);
        if let Some(sink) = state.sink.take() {
            sink.close();
            state.retired = Some(sink);
        }
        Ok(())
    }
}

impl SimController {
    /// Every frame the kiosk wrote, oldest first.
    pub fn writes(&self) -> Vec<String> {
        lock(&self.state).writes.clone()
    }

    /// Relay command frames only, without `PING`s.
    pub fn relay_writes(&self) -> Vec<String> {
        lock(&self.state)
            .writes
            .iter()
            .filter(|w| parse_command(w).is_some())
            .cloned()
            .collect()
    }

    pub fn clear_writes(&self) {
        lock(&self.state).writes.clear();
    }

    pub fn is_connected(&self) -> bool {
        lock(&self.state).sink.is_some()
    }

    /// Emit a frame on the live session. Returns `false` when no session is
    /// open.
    pub fn inject(&self, frame: &str) -> bool {
        match &lock(&self.state).sink {
            Some(sink) => {
                sink.frame(frame);
                true
            }
            None => false,
        }
    }

    /// Emit a frame tagged with the last ended session.
    pub fn inject_stale(&self, frame: &str) -> bool {
        match &lock(&self.state).retired {
            Some(sink) => {
                sink.frame_unchecked(frame);
                true
            }
            None => false,
        }
    }

    /// Simulate the controller vanishing (power loss, out of range).
    pub fn drop_link(&self) {
        let mut state = lock(&self.state);
        if let Some(sink) = state.sink.take() {
            sink.dropped();
            state.retired = Some(sink);
        }
    }

    pub fn set_echo(&self, echo: bool) {
        lock(&self.state).echo = echo;
    }

    pub fn fail_next_connect(&self, err: KioskError) {
        lock(&self.state).fail_next_connect = Some(err);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        lock(&self.state).fail_writes = fail;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{LinkEvent, LinkSignal};
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn send_before_connect_is_rejected() {
        let (mut transport, controller) = SimTransport::new();
        let err = transport.send("RELAY1_ON").await.unwrap_err();
        assert_eq!(err, KioskError::NotConnected);
        assert!(controller.writes().is_empty());
    }

    #[tokio::test]
    async fn relay_commands_are_echoed() -> Result<(), KioskError> {
        let (mut transport, controller) = SimTransport::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        transport.connect(SessionSink::new(1, tx)).await?;

        transport.send("RELAY3_ON").await?;
        transport.send("PING").await?;
        transport.send("RELAY3_OFF").await?;

        assert_eq!(controller.writes(), vec!["RELAY3_ON", "PING", "RELAY3_OFF"]);
        assert_eq!(controller.relay_writes(), vec!["RELAY3_ON", "RELAY3_OFF"]);
        let frames: Vec<LinkEvent> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|s| s.event)
            .collect();
        assert_eq!(
            frames,
            vec![
                LinkEvent::Frame("RELAY3_ACTIVATED".into()),
                LinkEvent::Frame("RELAY3_DEACTIVATED".into()),
            ]
        );
        Ok(())
    }

    #[tokio::test]
    async fn explicit_disconnect_does_not_report_drop() -> Result<(), KioskError> {
        let (mut transport, controller) = SimTransport::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        transport.connect(SessionSink::new(1, tx)).await?;
        transport.disconnect().await?;
        controller.drop_link();
        assert!(!controller.inject("LIMIT_SWITCH_PRESSED"));
        assert!(rx.try_recv().is_err());
        Ok(())
    }

    #[tokio::test]
    async fn link_drop_and_stale_frames_keep_their_session() -> Result<(), KioskError> {
        let (mut transport, controller) = SimTransport::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        transport.connect(SessionSink::new(4, tx)).await?;

        controller.drop_link();
        assert!(controller.inject_stale("LIMIT_SWITCH_PRESSED"));

        assert_eq!(
            rx.try_recv().ok(),
            Some(LinkSignal {
                session: 4,
                event: LinkEvent::Dropped
            })
        );
        assert_eq!(rx.try_recv().ok().map(|s| s.session), Some(4));
        assert!(!controller.is_connected());
        Ok(())
    }
}

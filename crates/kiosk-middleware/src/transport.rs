//! The transport capability: one point-to-point link to one controller.
//!
//! # Overview
//!
//! - [`Transport`] – the trait every link variant implements.
//! - [`SessionSink`] – handed to [`Transport::connect`]; the transport pushes
//!   received frames and link drops into it.
//! - [`LinkSignal`] – what comes out the other end, tagged with the session
//!   it belongs to so stale signals can be discarded.
//!
//! Variants: [`NativeBleTransport`][crate::native_ble::NativeBleTransport],
//! [`WebBleTransport`][crate::web_ble::WebBleTransport],
//! [`SerialTransport`][crate::serial::SerialTransport] and
//! [`SimTransport`][crate::sim::SimTransport].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use kiosk_types::{KioskError, TransportKind};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

/// Identifier of one connect/disconnect cycle. `0` never names a live
/// session.
pub type SessionId = u64;

/// Something the link reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// One text frame from the controller.
    Frame(String),
    /// The link dropped without the kiosk asking for it.
    Dropped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkSignal {
    pub session: SessionId,
    pub event: LinkEvent,
}

/// Per-session delivery handle.
///
/// Clones share state, so a reader task and the transport itself can both
/// hold one. [`SessionSink::dropped`] reaches the receiver at most once per
/// session, and never after [`SessionSink::close`].
#[derive(Debug, Clone)]
pub struct SessionSink {
    session: SessionId,
    tx: mpsc::UnboundedSender<LinkSignal>,
    closed: Arc<AtomicBool>,
}

impl SessionSink {
    pub fn new(session: SessionId, tx: mpsc::UnboundedSender<LinkSignal>) -> Self {
        Self {
            session,
            tx,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    /// Deliver a received frame. Ignored once the session is over.
    pub fn frame(&self, text: impl Into<String>) {
        if self.is_closed() {
            return;
        }
        let _ = self.tx.send(LinkSignal {
            session: self.session,
            event: LinkEvent::Frame(text.into()),
        });
    }

    /// Report an unsolicited link drop and end the session.
    pub fn dropped(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!(session = self.session, "link dropped");
        let _ = self.tx.send(LinkSignal {
            session: self.session,
            event: LinkEvent::Dropped,
        });
    }

    /// Deliver a frame even after the session ended. Lets the simulator
    /// reproduce late notifications from a dead link.
    pub(crate) fn frame_unchecked(&self, text: impl Into<String>) {
        let _ = self.tx.send(LinkSignal {
            session: self.session,
            event: LinkEvent::Frame(text.into()),
        });
    }

    /// End the session silently; used for kiosk-initiated disconnects.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Every controller link must implement this trait.
///
/// # Contract
///
/// * `connect` – discovers and opens the link, then delivers frames and an
///   unsolicited drop through `sink` until the session ends.
/// * `send` – writes one frame. Before a successful `connect` it fails with
///   [`KioskError::NotConnected`]; I/O failures are [`KioskError::LinkError`].
/// * `disconnect` – closes the link without reporting a drop.
///
/// Capability gaps surface as [`KioskError::TransportUnavailable`] and empty
/// scans as [`KioskError::DeviceNotFound`].
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
pub trait Transport: MaybeSend {
    fn kind(&self) -> TransportKind;

    async fn connect(&mut self, sink: SessionSink) -> Result<(), KioskError>;

    async fn send(&mut self, frame: &str) -> Result<(), KioskError>;

    async fn disconnect(&mut self) -> Result<(), KioskError>;
}

/// `Send` everywhere except the browser, where JS handles are thread-bound.
#[cfg(not(target_arch = "wasm32"))]
pub trait MaybeSend: Send {}
#[cfg(not(target_arch = "wasm32"))]
impl<T: Send> MaybeSend for T {}

#[cfg(target_arch = "wasm32")]
pub trait MaybeSend {}
#[cfg(target_arch = "wasm32")]
impl<T> MaybeSend for T {}

// ────────────────────────────────────────────────────────────────────────────
// Link settings
// ────────────────────────────────────────────────────────────────────────────

pub const DEFAULT_SERVICE_UUID: Uuid = Uuid::from_u128(0x12345678_1234_1234_1234_123456789abc);
pub const DEFAULT_WRITE_UUID: Uuid = Uuid::from_u128(0x87654321_4321_4321_4321_cba987654321);
pub const DEFAULT_NOTIFY_UUID: Uuid = Uuid::from_u128(0x87654321_4321_4321_4321_cba987654322);

/// GATT layout and discovery parameters of the controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BleSettings {
    #[serde(default = "default_service_uuid")]
    pub service_uuid: Uuid,
    /// Characteristic the kiosk writes commands to.
    #[serde(default = "default_write_uuid")]
    pub write_characteristic_uuid: Uuid,
    /// Characteristic the controller notifies on.
    #[serde(default = "default_notify_uuid")]
    pub notify_characteristic_uuid: Uuid,
    #[serde(default = "default_device_name")]
    pub device_name: String,
    #[serde(default = "default_name_prefix")]
    pub name_prefix: String,
    #[serde(default = "default_scan_window_secs")]
    pub scan_window_secs: u64,
}

fn default_service_uuid() -> Uuid {
    DEFAULT_SERVICE_UUID
}
fn default_write_uuid() -> Uuid {
    DEFAULT_WRITE_UUID
}
fn default_notify_uuid() -> Uuid {
    DEFAULT_NOTIFY_UUID
}
fn default_device_name() -> String {
    "ESP32_Relay_Controller".to_string()
}
fn default_name_prefix() -> String {
    "ESP32".to_string()
}
fn default_scan_window_secs() -> u64 {
    10
}

impl Default for BleSettings {
    fn default() -> Self {
        Self {
            service_uuid: default_service_uuid(),
            write_characteristic_uuid: default_write_uuid(),
            notify_characteristic_uuid: default_notify_uuid(),
            device_name: default_device_name(),
            name_prefix: default_name_prefix(),
            scan_window_secs: default_scan_window_secs(),
        }
    }
}

impl BleSettings {
    pub fn scan_window(&self) -> Duration {
        Duration::from_secs(self.scan_window_secs.max(1))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialSettings {
    #[serde(default = "default_serial_port")]
    pub port: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
}

fn default_serial_port() -> String {
    "/dev/ttyUSB0".to_string()
}
fn default_baud_rate() -> u32 {
    115_200
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            port: default_serial_port(),
            baud_rate: default_baud_rate(),
        }
    }
}

/// Build the one transport this process will use.
pub fn build_transport(
    kind: TransportKind,
    ble: &BleSettings,
    serial: &SerialSettings,
) -> Box<dyn Transport> {
    match kind {
        TransportKind::NativeBle => Box::new(crate::native_ble::NativeBleTransport::new(ble.clone())),
        TransportKind::WebBle => Box::new(crate::web_ble::WebBleTransport::new(ble.clone())),
        TransportKind::Serial => Box::new(crate::serial::SerialTransport::new(serial.clone())),
        TransportKind::Sim => Box::new(crate::sim::SimTransport::new().0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dropped_fires_once_per_session() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = SessionSink::new(7, tx);
        let clone = sink.clone();

        sink.frame("ESP32_READY");
        clone.dropped();
        sink.dropped();
        sink.frame("LIMIT_SWITCH_PRESSED");

        assert_eq!(
            rx.try_recv().ok(),
            Some(LinkSignal {
                session: 7,
                event: LinkEvent::Frame("ESP32_READY".into())
            })
        );
        assert_eq!(rx.try_recv().ok().map(|s| s.event), Some(LinkEvent::Dropped));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn close_suppresses_drop() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = SessionSink::new(1, tx);
        sink.close();
        sink.dropped();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn default_uuids_match_controller_firmware() {
        let ble = BleSettings::default();
        assert_eq!(
            ble.service_uuid.to_string(),
            "12345678-1234-1234-1234-123456789abc"
        );
        assert_eq!(
            ble.notify_characteristic_uuid.to_string(),
            "87654321-4321-4321-4321-cba987654322"
        );
        assert_eq!(ble.scan_window(), Duration::from_secs(10));
    }
}

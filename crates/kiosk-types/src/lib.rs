//! `kiosk-types` – shared vocabulary for the vending kiosk stack.
//!
//! Every other crate in the workspace speaks in these types: the wire-level
//! [`RelayCommand`] and [`NotificationEvent`], the single
//! [`ConnectionStatus`] exposed by the connection manager, the bus
//! [`Event`] envelope and the [`KioskError`] taxonomy.

pub mod catalog;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub use catalog::{Catalog, Category, Item};

/// Link state of the one controller the kiosk talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    /// The runtime lacks the capability the selected transport needs.
    /// Terminal for the session; never retried automatically.
    Unavailable,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionStatus::Disconnected => write!(f, "disconnected"),
            ConnectionStatus::Connecting => write!(f, "connecting"),
            ConnectionStatus::Connected => write!(f, "connected"),
            ConnectionStatus::Unavailable => write!(f, "unavailable"),
        }
    }
}

/// Which transport strategy the process runs with.
///
/// Chosen once at startup and fixed for the process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransportKind {
    /// Platform Bluetooth LE stack (BlueZ, CoreBluetooth, WinRT).
    NativeBle,
    /// Browser Web Bluetooth API (wasm32 builds only).
    WebBle,
    /// USB / UART serial line.
    Serial,
    /// In-process simulated controller.
    Sim,
}

impl TransportKind {
    /// The transport a host environment gets when nothing is configured.
    pub fn detect() -> Self {
        if cfg!(target_arch = "wasm32") {
            TransportKind::WebBle
        } else {
            TransportKind::NativeBle
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::NativeBle => write!(f, "native-ble"),
            TransportKind::WebBle => write!(f, "web-ble"),
            TransportKind::Serial => write!(f, "serial"),
            TransportKind::Sim => write!(f, "sim"),
        }
    }
}

impl FromStr for TransportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "native-ble" | "ble" | "native" => Ok(TransportKind::NativeBle),
            "web-ble" | "web" => Ok(TransportKind::WebBle),
            "serial" => Ok(TransportKind::Serial),
            "sim" => Ok(TransportKind::Sim),
            other => Err(format!("unknown transport '{other}'")),
        }
    }
}

/// Whether a relay should be energised or released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RelayAction {
    On,
    Off,
}

/// A single relay instruction for the controller. Built per dispatch and
/// never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RelayCommand {
    pub relay: u32,
    pub action: RelayAction,
}

impl RelayCommand {
    pub fn activate(relay: u32) -> Self {
        Self {
            relay,
            action: RelayAction::On,
        }
    }

    pub fn deactivate(relay: u32) -> Self {
        Self {
            relay,
            action: RelayAction::Off,
        }
    }
}

/// One classified controller frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum NotificationEvent {
    /// Proximity sensor saw a customer.
    WakeScreen,
    /// Payment / confirmation limit switch was pressed.
    LimitSwitchPressed,
    /// Echo of the physical relay state.
    RelayStatusChanged { relay: u32, active: bool },
    /// Controller announced it is up.
    SystemReady,
    /// Nothing recognisable in the frame.
    Unrecognized,
}

/// Coarse order phase published to observers. The full state (with the
/// order payload) lives in the runtime's state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderPhase {
    #[default]
    Idle,
    CategorySelected,
    AwaitingConfirmation,
    Processing,
}

impl fmt::Display for OrderPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderPhase::Idle => write!(f, "idle"),
            OrderPhase::CategorySelected => write!(f, "category selected"),
            OrderPhase::AwaitingConfirmation => write!(f, "awaiting confirmation"),
            OrderPhase::Processing => write!(f, "processing"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Error,
}

/// Transient, toast-style message for whoever is watching the screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub title: String,
    pub message: String,
}

impl Notice {
    pub fn info(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            title: title.into(),
            message: message.into(),
        }
    }

    pub fn error(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            title: title.into(),
            message: message.into(),
        }
    }
}

impl From<&KioskError> for Notice {
    fn from(err: &KioskError) -> Self {
        Notice::error(err.title(), err.user_message())
    }
}

/// Unified event wrapper for the kiosk event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// e.g. `"kiosk-middleware::connection"`
    pub source: String,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(source: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        }
    }
}

/// Variants of data routed over the kiosk event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    /// The connection manager changed status.
    ConnectionChanged {
        status: ConnectionStatus,
        transport: TransportKind,
    },
    /// A decoded controller notification from the live session.
    Controller(NotificationEvent),
    /// A relay command frame was handed to the transport.
    CommandSent(RelayCommand),
    /// The order machine moved to a new phase.
    OrderChanged {
        phase: OrderPhase,
        item_id: Option<String>,
        relay: Option<u32>,
        proceed_enabled: bool,
    },
    /// A countdown the screen should render (confirmation or dispense).
    Countdown { label: String, seconds: u64 },
    /// Exactly one of these per user-visible success or failure.
    Notice(Notice),
}

/// Error taxonomy shared by transports, the connection manager and the
/// order machine.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum KioskError {
    #[error("Transport unavailable: {0}")]
    TransportUnavailable(String),

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Link error: {0}")]
    LinkError(String),

    #[error("Not connected to the controller")]
    NotConnected,

    #[error("Hardware confirmation not received")]
    ConfirmationNotReceived,

    #[error("Cannot {action} while {phase}")]
    InvalidTransition { action: String, phase: OrderPhase },

    #[error("Selection unavailable: {0}")]
    SelectionUnavailable(String),

    #[error("Channel Error: {0}")]
    Channel(String),
}

impl KioskError {
    /// Short heading for the notice raised from this error.
    pub fn title(&self) -> &'static str {
        match self {
            KioskError::TransportUnavailable(_) => "Connection Unavailable",
            KioskError::DeviceNotFound(_) => "Device Not Found",
            KioskError::LinkError(_) => "Connection Lost",
            KioskError::NotConnected => "Not Connected",
            KioskError::ConfirmationNotReceived => "Payment Pending",
            KioskError::InvalidTransition { .. } => "Action Not Allowed",
            KioskError::SelectionUnavailable(_) => "Unavailable",
            KioskError::Channel(_) => "Internal Error",
        }
    }

    /// Operator-facing description of the condition.
    pub fn user_message(&self) -> String {
        match self {
            KioskError::TransportUnavailable(detail) => format!(
                "This device cannot reach the controller ({detail}). Use a supported platform or transport."
            ),
            KioskError::DeviceNotFound(_) => {
                "No controller found. Check that the ESP32 is powered on and retry.".to_string()
            }
            KioskError::LinkError(_) => {
                "The link to the controller dropped. Reconnect to continue.".to_string()
            }
            KioskError::NotConnected => {
                "The controller is not connected. Connect before taking orders.".to_string()
            }
            KioskError::ConfirmationNotReceived => {
                "Payment has not been confirmed yet. Please complete payment first.".to_string()
            }
            KioskError::InvalidTransition { action, phase } => {
                format!("Cannot {action} while the order is {phase}.")
            }
            KioskError::SelectionUnavailable(what) => format!("{what} is not available right now."),
            KioskError::Channel(detail) => format!("Internal messaging failed: {detail}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_kind_parse_and_display_agree() {
        for kind in [
            TransportKind::NativeBle,
            TransportKind::WebBle,
            TransportKind::Serial,
            TransportKind::Sim,
        ] {
            let parsed: TransportKind = kind.to_string().parse().unwrap();
            assert_eq!(parsed, kind);
        }
        assert!("carrier-pigeon".parse::<TransportKind>().is_err());
    }

    #[test]
    fn transport_kind_detects_native_on_host() {
        assert_eq!(TransportKind::detect(), TransportKind::NativeBle);
    }

    #[test]
    fn relay_command_constructors() {
        assert_eq!(RelayCommand::activate(4).action, RelayAction::On);
        assert_eq!(RelayCommand::deactivate(4).action, RelayAction::Off);
        assert_eq!(RelayCommand::deactivate(4).relay, 4);
    }

    #[test]
    fn every_error_has_a_user_message() {
        let errors = [
            KioskError::TransportUnavailable("no adapter".into()),
            KioskError::DeviceNotFound("scan timed out".into()),
            KioskError::LinkError("write failed".into()),
            KioskError::NotConnected,
            KioskError::ConfirmationNotReceived,
            KioskError::InvalidTransition {
                action: "proceed".into(),
                phase: OrderPhase::Idle,
            },
            KioskError::SelectionUnavailable("Kopi Hitam".into()),
            KioskError::Channel("closed".into()),
        ];
        for err in errors {
            let notice = Notice::from(&err);
            assert_eq!(notice.level, NoticeLevel::Error);
            assert!(!notice.message.is_empty());
        }
    }

    #[test]
    fn notification_event_json_shape() {
        let ev = NotificationEvent::RelayStatusChanged {
            relay: 2,
            active: true,
        };
        let json = serde_json::to_string(&ev).unwrap();
        assert!(json.contains("RelayStatusChanged"));
        let back: NotificationEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ev);
    }

    #[test]
    fn event_new_stamps_source() {
        let event = Event::new(
            "kiosk-middleware::connection",
            EventPayload::ConnectionChanged {
                status: ConnectionStatus::Connected,
                transport: TransportKind::Sim,
            },
        );
        assert_eq!(event.source, "kiosk-middleware::connection");
    }
}

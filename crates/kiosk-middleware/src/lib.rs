//! `kiosk-middleware` – links to the relay controller and the plumbing
//! around them.
//!
//! # Modules
//!
//! - [`bus`] – typed, topic-based publish/subscribe event bus built on Tokio
//!   broadcast channels.
//! - [`transport`] – the [`Transport`] capability and its per-session sink.
//! - [`discovery`] – three-tier BLE discovery policy.
//! - [`native_ble`], [`web_ble`], [`serial`], [`sim`] – the link variants.
//! - [`connection`] – [`ConnectionManager`], sole owner of the active link.

pub mod bus;
pub mod connection;
pub mod discovery;
pub mod native_ble;
pub mod serial;
pub mod sim;
pub mod transport;
pub mod web_ble;

pub use bus::{EventBus, Topic, TopicReceiver};
pub use connection::ConnectionManager;
pub use sim::{SimController, SimTransport};
pub use transport::{
    BleSettings, LinkEvent, LinkSignal, SerialSettings, SessionId, SessionSink, Transport,
    build_transport,
};

//! `kiosk-protocol` – the text protocol spoken with the relay controller.
//!
//! | Direction | Frame | Module |
//! |---|---|---|
//! | kiosk → controller | `RELAY<N>_ON`, `RELAY<N>_OFF`, `PING` | [`codec`] |
//! | controller → kiosk | `LIMIT_SWITCH_PRESSED`, `RELAY<N>_ACTIVATED`, … | [`decoder`] |
//!
//! [`relay_status::RelayStatusMap`] keeps the diagnostic view of relay
//! echoes and [`framing::LineFramer`] cuts a serial byte stream into frames.

pub mod codec;
pub mod decoder;
pub mod framing;
pub mod relay_status;

pub use codec::{PING, encode, encode_activate, encode_deactivate};
pub use decoder::decode;
pub use framing::LineFramer;
pub use relay_status::RelayStatusMap;

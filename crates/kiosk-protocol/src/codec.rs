//! Relay command codec.
//!
//! Encoding is total over every `u32`: the codec does not know which relays
//! exist, the catalog does.
//!
//! # Example
//!
//! ```
//! use kiosk_protocol::codec::{encode_activate, parse_command};
//! use kiosk_types::RelayCommand;
//!
//! assert_eq!(encode_activate(3), "RELAY3_ON");
//! assert_eq!(parse_command("RELAY3_ON\n"), Some(RelayCommand::activate(3)));
//! ```

use kiosk_types::{RelayAction, RelayCommand};

/// Liveness probe. The controller is not required to answer.
pub const PING: &str = "PING";

const RELAY_PREFIX: &str = "RELAY";

pub fn encode_activate(relay: u32) -> String {
    format!("{RELAY_PREFIX}{relay}_ON")
}

pub fn encode_deactivate(relay: u32) -> String {
    format!("{RELAY_PREFIX}{relay}_OFF")
}

pub fn encode(command: &RelayCommand) -> String {
    match command.action {
        RelayAction::On => encode_activate(command.relay),
        RelayAction::Off => encode_deactivate(command.relay),
    }
}

/// The status echo a controller sends after switching a relay.
pub fn encode_status(relay: u32, active: bool) -> String {
    if active {
        format!("{RELAY_PREFIX}{relay}_ACTIVATED")
    } else {
        format!("{RELAY_PREFIX}{relay}_DEACTIVATED")
    }
}

/// Parse a kiosk → controller command frame. Surrounding whitespace (the
/// serial newline included) is ignored; anything else must match exactly.
pub fn parse_command(frame: &str) -> Option<RelayCommand> {
    let rest = frame.trim().strip_prefix(RELAY_PREFIX)?;
    let digits_end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    if digits_end == 0 {
        return None;
    }
    let relay: u32 = rest[..digits_end].parse().ok()?;
    match &rest[digits_end..] {
        "_ON" => Some(RelayCommand::activate(relay)),
        "_OFF" => Some(RelayCommand::deactivate(relay)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_exact_frames() {
        assert_eq!(encode_activate(0), "RELAY0_ON");
        assert_eq!(encode_activate(1), "RELAY1_ON");
        assert_eq!(encode_deactivate(15), "RELAY15_OFF");
        assert_eq!(encode(&RelayCommand::deactivate(7)), "RELAY7_OFF");
        assert_eq!(encode_activate(u32::MAX), format!("RELAY{}_ON", u32::MAX));
    }

    #[test]
    fn status_echo_frames() {
        assert_eq!(encode_status(2, true), "RELAY2_ACTIVATED");
        assert_eq!(encode_status(2, false), "RELAY2_DEACTIVATED");
    }

    #[test]
    fn parses_commands_and_rejects_noise() {
        assert_eq!(parse_command("RELAY12_OFF\r\n"), Some(RelayCommand::deactivate(12)));
        assert_eq!(parse_command("  RELAY0_ON "), Some(RelayCommand::activate(0)));
        assert_eq!(parse_command("RELAY_ON"), None);
        assert_eq!(parse_command("RELAY1_ONX"), None);
        assert_eq!(parse_command("relay1_on"), None);
        assert_eq!(parse_command(PING), None);
        assert_eq!(parse_command("RELAY99999999999_ON"), None);
    }
}

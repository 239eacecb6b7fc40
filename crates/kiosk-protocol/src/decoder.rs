//! Controller notification decoder.
//!
//! Matching is case-sensitive substring matching. The controller may wrap a
//! marker in diagnostic text, so `"GARBAGE_RELAY2_ACTIVATED_TAIL"` still
//! decodes as a relay echo.
//!
//! Every rule is checked on every frame. The result lists the matches in
//! rule precedence order:
//!
//! | Rule | Markers | Event |
//! |---|---|---|
//! | 1 | `WAKE_SCREEN`, `CUSTOMER_DETECTED` | [`NotificationEvent::WakeScreen`] |
//! | 2 | `LIMIT_SWITCH_PRESSED` | [`NotificationEvent::LimitSwitchPressed`] |
//! | 3 | `RELAY<digits>_ACTIVATED` / `_DEACTIVATED` | [`NotificationEvent::RelayStatusChanged`] |
//! | 4 | `ESP32_CONNECTED`, `ESP32_READY` | [`NotificationEvent::SystemReady`] |
//!
//! [`NotificationEvent::Unrecognized`] is returned alone, and only when no
//! rule matched.

use kiosk_types::NotificationEvent;
use tracing::debug;

const WAKE_MARKERS: [&str; 2] = ["WAKE_SCREEN", "CUSTOMER_DETECTED"];
const LIMIT_SWITCH_MARKER: &str = "LIMIT_SWITCH_PRESSED";
const READY_MARKERS: [&str; 2] = ["ESP32_CONNECTED", "ESP32_READY"];

/// Classify one raw frame. Never empty.
pub fn decode(frame: &str) -> Vec<NotificationEvent> {
    let mut events = Vec::with_capacity(1);

    if WAKE_MARKERS.iter().any(|m| frame.contains(m)) {
        events.push(NotificationEvent::WakeScreen);
    }
    if frame.contains(LIMIT_SWITCH_MARKER) {
        events.push(NotificationEvent::LimitSwitchPressed);
    }
    if let Some((relay, active)) = find_relay_status(frame) {
        events.push(NotificationEvent::RelayStatusChanged { relay, active });
    }
    if READY_MARKERS.iter().any(|m| frame.contains(m)) {
        events.push(NotificationEvent::SystemReady);
    }

    if events.is_empty() {
        debug!(frame = %frame, "unrecognized controller frame");
        events.push(NotificationEvent::Unrecognized);
    }
    events
}

/// First `RELAY<digits>_ACTIVATED` or `RELAY<digits>_DEACTIVATED` in the
/// frame, scanning left to right. Relay numbers that overflow `u32` are
/// skipped.
fn find_relay_status(frame: &str) -> Option<(u32, bool)> {
    let mut search_from = 0;
    while let Some(offset) = frame[search_from..].find("RELAY") {
        let start = search_from + offset + "RELAY".len();
        search_from = start;

        let rest = &frame[start..];
        let digits_end = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        if digits_end == 0 {
            continue;
        }
        let tail = &rest[digits_end..];
        let active = if tail.starts_with("_ACTIVATED") {
            true
        } else if tail.starts_with("_DEACTIVATED") {
            false
        } else {
            continue;
        };
        if let Ok(relay) = rest[..digits_end].parse::<u32>() {
            return Some((relay, active));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::encode_status;

    fn single(frame: &str) -> NotificationEvent {
        let events = decode(frame);
        assert_eq!(events.len(), 1, "expected one event for {frame:?}: {events:?}");
        events[0]
    }

    #[test]
    fn relay_echo_round_trip() {
        for relay in [0, 1, 3, 15, 255, 4096, u32::MAX] {
            assert_eq!(
                single(&encode_status(relay, true)),
                NotificationEvent::RelayStatusChanged { relay, active: true }
            );
            assert_eq!(
                single(&encode_status(relay, false)),
                NotificationEvent::RelayStatusChanged { relay, active: false }
            );
        }
    }

    #[test]
    fn substring_tolerance_without_unrecognized() {
        let events = decode("GARBAGE_NOISE_RELAY2_ACTIVATED_TAIL");
        assert_eq!(
            events,
            vec![NotificationEvent::RelayStatusChanged { relay: 2, active: true }]
        );
    }

    #[test]
    fn markers_map_to_events() {
        assert_eq!(single("WAKE_SCREEN"), NotificationEvent::WakeScreen);
        assert_eq!(single("CUSTOMER_DETECTED at 12cm"), NotificationEvent::WakeScreen);
        assert_eq!(single("LIMIT_SWITCH_PRESSED"), NotificationEvent::LimitSwitchPressed);
        assert_eq!(single("ESP32_CONNECTED"), NotificationEvent::SystemReady);
        assert_eq!(single("ESP32_READY\r"), NotificationEvent::SystemReady);
    }

    #[test]
    fn matching_is_case_sensitive() {
        assert_eq!(single("limit_switch_pressed"), NotificationEvent::Unrecognized);
        assert_eq!(single("relay2_activated"), NotificationEvent::Unrecognized);
        assert_eq!(single(""), NotificationEvent::Unrecognized);
        assert_eq!(single("PONG"), NotificationEvent::Unrecognized);
    }

    #[test]
    fn all_rules_checked_independently() {
        let events = decode("WAKE_SCREEN|LIMIT_SWITCH_PRESSED|RELAY4_DEACTIVATED|ESP32_READY");
        assert_eq!(
            events,
            vec![
                NotificationEvent::WakeScreen,
                NotificationEvent::LimitSwitchPressed,
                NotificationEvent::RelayStatusChanged { relay: 4, active: false },
                NotificationEvent::SystemReady,
            ]
        );
    }

    #[test]
    fn relay_scan_skips_malformed_candidates() {
        assert_eq!(
            single("RELAY_X RELAY9_ON RELAY7_DEACTIVATED"),
            NotificationEvent::RelayStatusChanged { relay: 7, active: false }
        );
        assert_eq!(
            single("RELAY99999999999_ACTIVATED RELAY1_ACTIVATED"),
            NotificationEvent::RelayStatusChanged { relay: 1, active: true }
        );
        assert_eq!(single("RELAY5_ACTIVATE"), NotificationEvent::Unrecognized);
    }

    #[test]
    fn first_relay_echo_wins() {
        assert_eq!(
            single("RELAY1_ACTIVATED RELAY2_DEACTIVATED"),
            NotificationEvent::RelayStatusChanged { relay: 1, active: true }
        );
    }
}

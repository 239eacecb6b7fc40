//! Newline framing for byte-stream transports (serial).
//!
//! BLE notifications arrive one frame per notification and skip this layer.

use tracing::warn;

/// Longest line kept while waiting for a newline.
pub const MAX_LINE_LEN: usize = 1024;

/// Terminate an outgoing frame for a line-oriented link.
pub fn frame_line(frame: &str) -> String {
    format!("{frame}\n")
}

/// Buffers input and emits a frame whenever `\n` arrives. A `\r` before the
/// newline is stripped and blank lines are dropped. A line longer than
/// [`MAX_LINE_LEN`] is thrown away whole, up to and including its newline.
#[derive(Debug, Default)]
pub struct LineFramer {
    buffer: Vec<u8>,
    discarding: bool,
}

impl LineFramer {
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(128),
            discarding: false,
        }
    }

    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        let mut frames = Vec::new();
        for &b in bytes {
            if b == b'\n' {
                if self.discarding {
                    self.discarding = false;
                    continue;
                }
                if self.buffer.last() == Some(&b'\r') {
                    self.buffer.pop();
                }
                if !self.buffer.is_empty() {
                    frames.push(String::from_utf8_lossy(&self.buffer).into_owned());
                }
                self.buffer.clear();
            } else if self.discarding {
                continue;
            } else if self.buffer.len() >= MAX_LINE_LEN {
                warn!(len = self.buffer.len(), "line exceeds limit, discarding");
                self.buffer.clear();
                self.discarding = true;
            } else {
                self.buffer.push(b);
            }
        }
        frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_lines_across_chunks() {
        let mut framer = LineFramer::new();
        assert!(framer.push(b"LIMIT_SWI").is_empty());
        assert_eq!(framer.push(b"TCH_PRESSED\r\nRELAY1_"), vec!["LIMIT_SWITCH_PRESSED"]);
        assert_eq!(framer.push(b"ACTIVATED\n\n"), vec!["RELAY1_ACTIVATED"]);
    }

    #[test]
    fn oversized_line_is_dropped() {
        let mut framer = LineFramer::new();
        let noise = vec![b'x'; MAX_LINE_LEN + 10];
        assert!(framer.push(&noise).is_empty());
        let frames = framer.push(b"\nESP32_READY\n");
        assert_eq!(frames.last().map(String::as_str), Some("ESP32_READY"));
    }

    #[test]
    fn tail_of_oversized_line_never_becomes_a_frame() {
        let mut framer = LineFramer::new();
        let mut line = vec![b'x'; MAX_LINE_LEN];
        line.extend_from_slice(b"LIMIT_SWITCH_PRESSED");
        assert!(framer.push(&line).is_empty());
        assert!(framer.push(b"\n").is_empty());
        assert_eq!(framer.push(b"RELAY2_ACTIVATED\n"), vec!["RELAY2_ACTIVATED"]);
    }

    #[test]
    fn outgoing_frames_are_newline_terminated() {
        assert_eq!(frame_line("RELAY3_ON"), "RELAY3_ON\n");
    }
}

//! Switch header: forwarding metadata of the link-layer switch fabric.

use std::fmt;

use super::{FormatError, Message};

/// Size of the switch header on the wire.
pub const SWITCH_HEADER_SIZE: usize = 12;

/// Switch header version written by this node.
pub const SWITCH_HEADER_VERSION: u8 = 1;

/// Leading bytes of a switch control frame (ping, pong, error report).
/// Channel frames never start with them.
pub const SWITCH_CONTROL_MARKER: [u8; 4] = [0xff; 4];

/// Whether the bytes after a switch header form a switch control frame.
pub fn is_switch_control(payload: &[u8]) -> bool {
    payload.starts_with(&SWITCH_CONTROL_MARKER)
}

/// Source-routed path label through the switch fabric.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SwitchLabel(u64);

impl SwitchLabel {
    /// The label that addresses this node's own switch.
    pub const SELF: SwitchLabel = SwitchLabel(1);

    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SwitchLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let v = self.0;
        write!(
            f,
            "{:04x}.{:04x}.{:04x}.{:04x}",
            (v >> 48) & 0xffff,
            (v >> 32) & 0xffff,
            (v >> 16) & 0xffff,
            v & 0xffff
        )
    }
}

/// Parsed switch header.
///
/// Wire format (12 bytes, big-endian):
/// ```text
/// [label:8][congestion:7|suppress_errors:1][version:2|label_shift:6][penalty:2]
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SwitchHeader {
    pub label: SwitchLabel,
    /// Congestion signal (7 bits).
    pub congestion: u8,
    /// Ask switches not to generate error frames for this packet.
    pub suppress_errors: bool,
    /// Header version (2 bits).
    pub version: u8,
    /// Bits the label has been shifted by so far (6 bits).
    pub label_shift: u8,
    pub penalty: u16,
}

impl SwitchHeader {
    /// A fresh header for `label`.
    pub fn new(label: SwitchLabel) -> Self {
        Self {
            label,
            congestion: 0,
            suppress_errors: false,
            version: SWITCH_HEADER_VERSION,
            label_shift: 0,
            penalty: 0,
        }
    }

    /// Parse a header from the first 12 bytes of `data`.
    pub fn parse(data: &[u8]) -> Result<Self, FormatError> {
        if data.len() < SWITCH_HEADER_SIZE {
            return Err(FormatError::Truncated {
                layer: "switch header",
                expected: SWITCH_HEADER_SIZE,
                got: data.len(),
            });
        }
        let label = u64::from_be_bytes([
            data[0], data[1], data[2], data[3], data[4], data[5], data[6], data[7],
        ]);
        Ok(Self {
            label: SwitchLabel(label),
            congestion: data[8] >> 1,
            suppress_errors: data[8] & 0x01 != 0,
            version: data[9] >> 6,
            label_shift: data[9] & 0x3f,
            penalty: u16::from_be_bytes([data[10], data[11]]),
        })
    }

    /// Pop the header off the front of a message.
    pub fn pop_from(msg: &mut Message) -> Result<Self, FormatError> {
        let bytes = msg.pop(SWITCH_HEADER_SIZE, "switch header")?;
        Self::parse(bytes)
    }

    /// Serialize to wire format.
    pub fn encode(&self) -> [u8; SWITCH_HEADER_SIZE] {
        let mut out = [0u8; SWITCH_HEADER_SIZE];
        out[0..8].copy_from_slice(&self.label.0.to_be_bytes());
        out[8] = (self.congestion << 1) | u8::from(self.suppress_errors);
        out[9] = (self.version << 6) | (self.label_shift & 0x3f);
        out[10..12].copy_from_slice(&self.penalty.to_be_bytes());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_layout() {
        let header = SwitchHeader {
            label: SwitchLabel::new(0x0011_2233_4455_6677),
            congestion: 0x05,
            suppress_errors: true,
            version: 1,
            label_shift: 0x13,
            penalty: 0xabcd,
        };
        let bytes = header.encode();

        assert_eq!(&bytes[0..8], &[0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77]);
        assert_eq!(bytes[8], 0x0b);
        assert_eq!(bytes[9], 0x53);
        assert_eq!(&bytes[10..12], &[0xab, 0xcd]);
        assert_eq!(SwitchHeader::parse(&bytes).unwrap(), header);
    }

    #[test]
    fn test_parse_truncated() {
        assert!(matches!(
            SwitchHeader::parse(&[0u8; 11]),
            Err(FormatError::Truncated { expected: 12, got: 11, .. })
        ));
    }

    #[test]
    fn test_switch_control_marker() {
        assert!(is_switch_control(&[0xff, 0xff, 0xff, 0xff, 0x01]));
        assert!(!is_switch_control(&[0xff, 0xff, 0xff]));
        assert!(!is_switch_control(&[0x01, 0xff, 0xff, 0xff, 0xff]));
    }

    #[test]
    fn test_label_display() {
        assert_eq!(SwitchLabel::new(0x13).to_string(), "0000.0000.0000.0013");
    }
}

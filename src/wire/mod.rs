//! Wire Format
//!
//! Fixed-layout headers and the layered message buffer used by the
//! dispatcher. A cleartext packet travels as a header stack:
//!
//! ```text
//! [SwitchHeader:12][Ip6Header:40][payload...]
//! ```
//!
//! The dispatcher pushes and pops these layers on a [`Message`] without
//! copying the payload. The internal meaning of the switch header fields
//! belongs to the switch fabric; this module only guarantees their size,
//! order and byte layout.

mod ip6;
mod message;
mod switch_header;

use std::net::Ipv6Addr;
use thiserror::Error;

pub use ip6::{Ip6Header, CONTROL_NEXT_HEADER, DEFAULT_HOP_LIMIT, IP6_HEADER_SIZE};
pub use message::{Message, DEFAULT_HEADROOM};
pub use switch_header::{
    is_switch_control, SwitchHeader, SwitchLabel, SWITCH_CONTROL_MARKER, SWITCH_HEADER_SIZE,
    SWITCH_HEADER_VERSION,
};

/// Size of the cleartext header stack of an incoming-for-me packet.
pub const INCOMING_FOR_ME_SIZE: usize = SWITCH_HEADER_SIZE + IP6_HEADER_SIZE;

/// Malformed or unexpected header layout.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FormatError {
    #[error("truncated {layer}: need {expected} bytes, have {got}")]
    Truncated {
        layer: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("unsupported IP version {0}")]
    BadIpVersion(u8),

    #[error("IPv6 payload length {declared} does not match {actual} bytes on the wire")]
    PayloadLengthMismatch { declared: usize, actual: usize },

    #[error("payload of {0} bytes does not fit an IPv6 header")]
    PayloadTooLarge(usize),

    #[error("source {source_ip} does not belong to peer {peer_ip}")]
    SourceMismatch { source_ip: Ipv6Addr, peer_ip: Ipv6Addr },

    #[error("destination {0} is not this node")]
    NotForMe(Ipv6Addr),

    #[error("packet does not carry a secure channel frame")]
    NotChannelFramed,

    #[error("packet is not a switch control frame")]
    NotSwitchControl,

    #[error("message has no peer identity attached")]
    MissingPeer,
}

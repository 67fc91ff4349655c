//! Secure Channel
//!
//! Per-peer authenticated encryption. The dispatcher only sees the
//! [`SecureChannel`] capability; channels are opened through a
//! [`ChannelFactory`] chosen at composition time.
//!
//! ## Frame Format
//!
//! Hello frames are sent until the peer has shown it holds our session
//! nonce; after that, data frames:
//!
//! ```text
//! Hello: [0x01][sender_handle:4 LE][sender_key:32][sender_nonce:16][echo_nonce:16]
//!        [counter:8 LE][ciphertext+tag]
//! Data:  [0x02][receiver_handle:4 LE][sender_handle:4 LE][counter:8 LE][ciphertext+tag]
//! ```
//!
//! Each side draws a random session nonce per channel and keys its sending
//! direction from it, so no two channels share a key. `echo_nonce` repeats
//! the peer's nonce once known (zero before). The frame header is the AEAD
//! associated data.

mod cipher;
mod nonces;
mod replay;
mod sealed;

use thiserror::Error;

use crate::identity::{Address, PUBLIC_KEY_SIZE};
use crate::session::SessionHandle;

pub use cipher::CipherState;
pub use nonces::{NonceLog, NONCE_LOG_PEERS, NONCE_LOG_PER_PEER};
pub use replay::{ReplayWindow, REPLAY_WINDOW_SIZE};
pub use sealed::{SealedChannel, SealedChannelFactory};

/// Hello frame type byte.
pub const FRAME_HELLO: u8 = 0x01;

/// Data frame type byte.
pub const FRAME_DATA: u8 = 0x02;

/// Size of a per-channel session nonce.
pub const SESSION_NONCE_SIZE: usize = 16;

/// Random value keying one direction of one channel.
pub type SessionNonce = [u8; SESSION_NONCE_SIZE];

/// Hello header: type + sender handle + sender key + sender nonce + echoed
/// nonce + counter.
pub const HELLO_HEADER_SIZE: usize = 1 + 4 + PUBLIC_KEY_SIZE + 2 * SESSION_NONCE_SIZE + 8;

/// Data header: type + receiver handle + sender handle + counter.
pub const DATA_HEADER_SIZE: usize = 1 + 4 + 4 + 8;

/// Size of the AEAD tag.
pub const TAG_SIZE: usize = 16;

/// Largest frame a channel will produce or accept.
pub const MAX_MESSAGE_SIZE: usize = 65535;

/// Handshake progress of a channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandshakeStatus {
    /// Nothing sent or received yet.
    New,
    /// Hello frames sent, nothing authenticated from the peer yet.
    Sent,
    /// A frame from the peer has been authenticated.
    Established,
}

/// Errors from channel operations.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("not a channel frame")]
    NotFramed,

    #[error("frame too short: expected at least {expected}, got {got}")]
    Truncated { expected: usize, got: usize },

    #[error("hello frame from unexpected key")]
    WrongPeer,

    #[error("frame for handle {got}, expected {expected}")]
    WrongHandle {
        expected: SessionHandle,
        got: SessionHandle,
    },

    #[error("replayed or stale counter {0}")]
    Replay(u64),

    #[error("data frame before any hello from the peer")]
    NoPeerKey,

    #[error("authentication failed")]
    AuthenticationFailed,

    #[error("encryption failed")]
    EncryptionFailed,

    #[error("message too large: {size} bytes, max {max}")]
    MessageTooLarge { size: usize, max: usize },

    #[error("nonce overflow")]
    NonceOverflow,

    #[error("key agreement failed: {0}")]
    KeyAgreement(String),
}

/// Authenticated encryption with a single remote peer.
pub trait SecureChannel: Send {
    /// Seal a cleartext payload into a complete frame.
    fn encrypt(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, ChannelError>;

    /// Open a complete frame, returning its cleartext payload.
    fn decrypt(&mut self, frame: &[u8]) -> Result<Vec<u8>, ChannelError>;

    /// Current handshake progress.
    fn status(&self) -> HandshakeStatus;
}

/// Opens channels to peers on behalf of the session table.
pub trait ChannelFactory: Send {
    /// Open a channel to `peer` that receives data frames on `local_handle`.
    fn open(
        &self,
        peer: &Address,
        local_handle: SessionHandle,
    ) -> Result<Box<dyn SecureChannel>, ChannelError>;
}

/// Routing-relevant header fields of a frame, readable without keys.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameKind {
    Hello {
        sender_handle: SessionHandle,
        sender_key: [u8; PUBLIC_KEY_SIZE],
        sender_nonce: SessionNonce,
        echo_nonce: SessionNonce,
    },
    Data {
        receiver_handle: SessionHandle,
        sender_handle: SessionHandle,
    },
}

/// Classify a frame by its header, or `None` if it is not channel-framed.
pub fn peek_frame(frame: &[u8]) -> Option<FrameKind> {
    match frame.first()? {
        &FRAME_HELLO if frame.len() >= HELLO_HEADER_SIZE + TAG_SIZE => {
            let mut sender_key = [0u8; PUBLIC_KEY_SIZE];
            sender_key.copy_from_slice(&frame[5..5 + PUBLIC_KEY_SIZE]);
            let nonces = &frame[5 + PUBLIC_KEY_SIZE..HELLO_HEADER_SIZE - 8];
            let mut sender_nonce = [0u8; SESSION_NONCE_SIZE];
            let mut echo_nonce = [0u8; SESSION_NONCE_SIZE];
            sender_nonce.copy_from_slice(&nonces[..SESSION_NONCE_SIZE]);
            echo_nonce.copy_from_slice(&nonces[SESSION_NONCE_SIZE..]);
            Some(FrameKind::Hello {
                sender_handle: read_handle(&frame[1..5]),
                sender_key,
                sender_nonce,
                echo_nonce,
            })
        }
        &FRAME_DATA if frame.len() >= DATA_HEADER_SIZE + TAG_SIZE => Some(FrameKind::Data {
            receiver_handle: read_handle(&frame[1..5]),
            sender_handle: read_handle(&frame[5..9]),
        }),
        _ => None,
    }
}

fn read_handle(bytes: &[u8]) -> SessionHandle {
    SessionHandle::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn read_counter(bytes: &[u8]) -> u64 {
    let mut counter = [0u8; 8];
    counter.copy_from_slice(&bytes[..8]);
    u64::from_le_bytes(counter)
}

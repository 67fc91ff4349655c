//! Layered message buffer.

use std::fmt;

use super::FormatError;
use crate::identity::Address;

/// Headroom reserved in front of a fresh message for header pushes.
pub const DEFAULT_HEADROOM: usize = 64;

/// An owned byte buffer with a movable start offset.
///
/// Bytes before `start` are headroom. Pushing a header writes into the
/// headroom and moves `start` back; popping a header moves `start` forward.
/// The payload bytes are never moved by either operation unless a push
/// needs more headroom than is left.
///
/// A message may carry the identity of the peer it is known to come from
/// (inbound) or be addressed to (control-plane outbound).
#[derive(Clone)]
pub struct Message {
    buf: Vec<u8>,
    start: usize,
    peer: Option<Address>,
}

impl Message {
    /// Create a message holding `bytes` with the default headroom.
    pub fn new(bytes: &[u8]) -> Self {
        Self::with_headroom(bytes, DEFAULT_HEADROOM)
    }

    /// Create a message holding `bytes` with `headroom` free bytes in front.
    pub fn with_headroom(bytes: &[u8], headroom: usize) -> Self {
        let mut buf = Vec::with_capacity(headroom + bytes.len());
        buf.resize(headroom, 0);
        buf.extend_from_slice(bytes);
        Self {
            buf,
            start: headroom,
            peer: None,
        }
    }

    /// Take ownership of `bytes` without headroom.
    pub fn from_vec(bytes: Vec<u8>) -> Self {
        Self {
            buf: bytes,
            start: 0,
            peer: None,
        }
    }

    /// Attach a peer identity.
    pub fn with_peer(mut self, peer: Address) -> Self {
        self.peer = Some(peer);
        self
    }

    /// Peer identity attached to this message, if any.
    pub fn peer(&self) -> Option<&Address> {
        self.peer.as_ref()
    }

    /// Replace the attached peer identity.
    pub fn set_peer(&mut self, peer: Address) {
        self.peer = Some(peer);
    }

    /// Number of live bytes (headers still on the stack plus payload).
    pub fn len(&self) -> usize {
        self.buf.len() - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Free bytes available in front of the live window.
    pub fn headroom(&self) -> usize {
        self.start
    }

    /// The live window.
    pub fn bytes(&self) -> &[u8] {
        &self.buf[self.start..]
    }

    /// The live window, mutably.
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.buf[self.start..]
    }

    /// Prepend a header layer.
    pub fn push(&mut self, header: &[u8]) {
        if header.len() > self.start {
            let grow = (header.len() - self.start).max(DEFAULT_HEADROOM);
            let mut buf = Vec::with_capacity(grow + self.buf.len());
            buf.resize(grow, 0);
            buf.extend_from_slice(&self.buf);
            self.buf = buf;
            self.start += grow;
        }
        self.start -= header.len();
        self.buf[self.start..self.start + header.len()].copy_from_slice(header);
    }

    /// Remove the first `len` bytes of the live window and return them.
    pub fn pop(&mut self, len: usize, layer: &'static str) -> Result<&[u8], FormatError> {
        self.peek(len, layer)?;
        let from = self.start;
        self.start += len;
        Ok(&self.buf[from..self.start])
    }

    /// Borrow the first `len` bytes of the live window.
    pub fn peek(&self, len: usize, layer: &'static str) -> Result<&[u8], FormatError> {
        if self.len() < len {
            return Err(FormatError::Truncated {
                layer,
                expected: len,
                got: self.len(),
            });
        }
        Ok(&self.buf[self.start..self.start + len])
    }

    /// Consume the message, returning the live window.
    pub fn into_vec(mut self) -> Vec<u8> {
        self.buf.drain(..self.start);
        self.buf
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("len", &self.len())
            .field("headroom", &self.start)
            .field("peer", &self.peer.as_ref().map(|p| p.short()))
            .finish()
    }
}

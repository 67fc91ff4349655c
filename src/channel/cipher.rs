//! ChaCha20-Poly1305 cipher state with explicit counters.

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    ChaCha20Poly1305, Nonce,
};
use std::fmt;

use super::{ChannelError, MAX_MESSAGE_SIZE, TAG_SIZE};

/// One direction of a channel: key plus send counter.
///
/// The counter travels in the clear in each frame header, so decryption
/// takes it explicitly and never touches the local counter.
#[derive(Clone)]
pub struct CipherState {
    key: [u8; 32],
    counter: u64,
}

impl CipherState {
    pub fn new(key: [u8; 32]) -> Self {
        Self { key, counter: 0 }
    }

    /// Reserve the next send counter.
    pub fn next_counter(&mut self) -> Result<u64, ChannelError> {
        if self.counter == u64::MAX {
            return Err(ChannelError::NonceOverflow);
        }
        let n = self.counter;
        self.counter += 1;
        Ok(n)
    }

    /// Encrypt with an explicit counter, binding `aad` to the tag.
    pub fn encrypt_with_counter_and_aad(
        &self,
        plaintext: &[u8],
        counter: u64,
        aad: &[u8],
    ) -> Result<Vec<u8>, ChannelError> {
        let max = MAX_MESSAGE_SIZE - TAG_SIZE - aad.len();
        if plaintext.len() > max {
            return Err(ChannelError::MessageTooLarge {
                size: plaintext.len(),
                max,
            });
        }

        let cipher = ChaCha20Poly1305::new_from_slice(&self.key)
            .map_err(|_| ChannelError::EncryptionFailed)?;

        let nonce = Self::counter_to_nonce(counter);
        cipher
            .encrypt(&nonce, Payload { msg: plaintext, aad })
            .map_err(|_| ChannelError::EncryptionFailed)
    }

    /// Decrypt with an explicit counter and AAD.
    ///
    /// The counter must be checked against a replay window first.
    pub fn decrypt_with_counter_and_aad(
        &self,
        ciphertext: &[u8],
        counter: u64,
        aad: &[u8],
    ) -> Result<Vec<u8>, ChannelError> {
        if ciphertext.len() < TAG_SIZE {
            return Err(ChannelError::Truncated {
                expected: TAG_SIZE,
                got: ciphertext.len(),
            });
        }

        let cipher = ChaCha20Poly1305::new_from_slice(&self.key)
            .map_err(|_| ChannelError::AuthenticationFailed)?;

        let nonce = Self::counter_to_nonce(counter);
        cipher
            .decrypt(&nonce, Payload { msg: ciphertext, aad })
            .map_err(|_| ChannelError::AuthenticationFailed)
    }

    /// 4 zero bytes followed by the little-endian counter.
    fn counter_to_nonce(counter: u64) -> Nonce {
        let mut nonce_bytes = [0u8; 12];
        nonce_bytes[4..12].copy_from_slice(&counter.to_le_bytes());
        *Nonce::from_slice(&nonce_bytes)
    }

    /// Counter the next frame will carry.
    pub fn counter(&self) -> u64 {
        self.counter
    }
}

impl fmt::Debug for CipherState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CipherState")
            .field("counter", &self.counter)
            .field("key", &"[redacted]")
            .finish()
    }
}

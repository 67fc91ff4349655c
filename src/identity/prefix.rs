//! 16-byte routing prefix derived from SHA-256(pubkey).

use secp256k1::XOnlyPublicKey;
use std::fmt;

use super::{hex_encode, sha256, IdentityError};

/// Routing prefix: the first 16 bytes of SHA-256(pubkey).
///
/// A pure function of the public key, so two parties that agree on a key
/// always agree on its prefix and on the mesh address derived from it.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RoutingPrefix([u8; 16]);

impl RoutingPrefix {
    /// Create a prefix from a 16-byte array.
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Create a prefix from a slice.
    pub fn from_slice(slice: &[u8]) -> Result<Self, IdentityError> {
        if slice.len() != 16 {
            return Err(IdentityError::InvalidPrefixLength(slice.len()));
        }
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(slice);
        Ok(Self(bytes))
    }

    /// Derive the prefix of an x-only public key.
    pub fn from_pubkey(pubkey: &XOnlyPublicKey) -> Self {
        let hash = sha256(&pubkey.serialize());
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&hash[..16]);
        Self(bytes)
    }

    /// Return the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Debug for RoutingPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RoutingPrefix({})", hex_encode(&self.0[..8]))
    }
}

impl fmt::Display for RoutingPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex_encode(&self.0))
    }
}

impl AsRef<[u8]> for RoutingPrefix {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

//! Remote peer identity: public key plus derived routing data.

use secp256k1::{Parity, PublicKey, XOnlyPublicKey};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::net::Ipv6Addr;

use super::encoding::{decode_npub, encode_npub};
use super::{hex_encode, IdentityError, MeshIp, RoutingPrefix, PUBLIC_KEY_SIZE};

/// A peer's cryptographic identity (public key only, no signing capability).
///
/// The routing prefix and mesh IP are derived once at construction. Equality,
/// ordering and hashing consider the public key alone; the derived fields
/// follow from it.
#[derive(Clone, Copy)]
pub struct Address {
    pubkey: XOnlyPublicKey,
    prefix: RoutingPrefix,
    ip: MeshIp,
}

impl Address {
    /// Create an Address from an x-only public key.
    pub fn from_pubkey(pubkey: XOnlyPublicKey) -> Self {
        let prefix = RoutingPrefix::from_pubkey(&pubkey);
        let ip = MeshIp::from_prefix(&prefix);
        Self { pubkey, prefix, ip }
    }

    /// Create an Address from 32 serialized key bytes.
    ///
    /// Fails if the bytes are not the x coordinate of a curve point.
    pub fn from_bytes(bytes: &[u8; PUBLIC_KEY_SIZE]) -> Result<Self, IdentityError> {
        let pubkey = XOnlyPublicKey::from_slice(bytes)?;
        Ok(Self::from_pubkey(pubkey))
    }

    /// Create an Address from a slice of serialized key bytes.
    pub fn from_slice(slice: &[u8]) -> Result<Self, IdentityError> {
        if slice.len() != PUBLIC_KEY_SIZE {
            return Err(IdentityError::InvalidPublicKeyLength(slice.len()));
        }
        let pubkey = XOnlyPublicKey::from_slice(slice)?;
        Ok(Self::from_pubkey(pubkey))
    }

    /// Create an Address from a bech32-encoded npub string.
    pub fn from_npub(npub: &str) -> Result<Self, IdentityError> {
        let pubkey = decode_npub(npub)?;
        Ok(Self::from_pubkey(pubkey))
    }

    /// Return the x-only public key.
    pub fn pubkey(&self) -> &XOnlyPublicKey {
        &self.pubkey
    }

    /// Return the serialized public key.
    pub fn key_bytes(&self) -> [u8; PUBLIC_KEY_SIZE] {
        self.pubkey.serialize()
    }

    /// Return the full public key for ECDH, assuming even parity.
    ///
    /// ECDH only consumes the x coordinate of the shared point, which is
    /// the same for either parity.
    pub fn pubkey_full(&self) -> PublicKey {
        self.pubkey.public_key(Parity::Even)
    }

    /// Return the routing prefix.
    pub fn prefix(&self) -> &RoutingPrefix {
        &self.prefix
    }

    /// Return the mesh address.
    pub fn ip(&self) -> &MeshIp {
        &self.ip
    }

    /// Return the mesh address as an Ipv6Addr.
    pub fn ipv6(&self) -> Ipv6Addr {
        self.ip.to_ipv6()
    }

    /// Return the public key as a bech32-encoded npub string.
    pub fn npub(&self) -> String {
        encode_npub(&self.pubkey)
    }

    /// Short form for log lines: first 8 bytes of the key in hex.
    pub fn short(&self) -> String {
        hex_encode(&self.key_bytes()[..8])
    }
}

impl PartialEq for Address {
    fn eq(&self, other: &Self) -> bool {
        self.key_bytes() == other.key_bytes()
    }
}

impl Eq for Address {}

impl Hash for Address {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key_bytes().hash(state);
    }
}

impl PartialOrd for Address {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Address {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key_bytes().cmp(&other.key_bytes())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Address")
            .field("key", &self.short())
            .field("ip", &self.ip)
            .finish()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.npub())
    }
}

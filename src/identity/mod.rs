//! Node Identity
//!
//! Peer identities are secp256k1 x-only public keys (32 bytes). The routing
//! prefix is the first 16 bytes of SHA-256(pubkey), and the mesh IPv6
//! address is the prefix behind a 0xfd byte, so every identity owns one
//! stable address inside `fd00::/8`.

mod address;
mod encoding;
mod ip;
mod local;
mod prefix;

use sha2::{Digest, Sha256};
use thiserror::Error;

pub use address::Address;
pub use encoding::{decode_npub, decode_nsec, decode_secret, encode_npub, encode_nsec};
pub use ip::MeshIp;
pub use local::Identity;
pub use prefix::RoutingPrefix;

/// Mesh address prefix (IPv6 ULA range).
pub const MESH_ADDRESS_PREFIX: u8 = 0xfd;

/// Size of a serialized x-only public key.
pub const PUBLIC_KEY_SIZE: usize = 32;

/// Errors that can occur in identity operations.
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("invalid key: {0}")]
    InvalidKey(#[from] secp256k1::Error),

    #[error("invalid public key length: expected 32, got {0}")]
    InvalidPublicKeyLength(usize),

    #[error("invalid routing prefix length: expected 16, got {0}")]
    InvalidPrefixLength(usize),

    #[error("invalid address length: expected 16, got {0}")]
    InvalidAddressLength(usize),

    #[error("invalid address prefix: expected 0xfd, got 0x{0:02x}")]
    InvalidAddressPrefix(u8),

    #[error("bech32 decoding error: {0}")]
    Bech32Decode(#[from] bech32::DecodeError),

    #[error("invalid npub: expected 'npub' prefix, got '{0}'")]
    InvalidNpubPrefix(String),

    #[error("invalid npub: expected 32 bytes, got {0}")]
    InvalidNpubLength(usize),

    #[error("invalid nsec: expected 'nsec' prefix, got '{0}'")]
    InvalidNsecPrefix(String),

    #[error("invalid nsec: expected 32 bytes, got {0}")]
    InvalidNsecLength(usize),

    #[error("invalid hex encoding: {0}")]
    InvalidHex(#[from] hex::FromHexError),
}

/// Compute SHA-256 hash of data.
fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let result = hasher.finalize();
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&result);
    hash
}

/// Encode bytes as lowercase hex string.
fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests;

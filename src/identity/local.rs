//! Local node identity with the secret half of the keypair.

use rand::RngCore;
use secp256k1::{Keypair, Secp256k1, SecretKey, XOnlyPublicKey};
use std::fmt;

use super::encoding::{decode_secret, encode_npub};
use super::{Address, IdentityError};

/// This node's identity: keypair plus the public [`Address`] derived from it.
pub struct Identity {
    keypair: Keypair,
    address: Address,
}

impl Identity {
    /// Create a new random identity.
    pub fn generate() -> Self {
        let mut rng = rand::rng();
        let mut secret_bytes = [0u8; 32];
        loop {
            rng.fill_bytes(&mut secret_bytes);
            // Out-of-range scalars are astronomically rare; draw again.
            if let Ok(secret_key) = SecretKey::from_slice(&secret_bytes) {
                return Self::from_secret_key(secret_key);
            }
        }
    }

    /// Create an identity from an existing keypair.
    pub fn from_keypair(keypair: Keypair) -> Self {
        let (pubkey, _parity) = keypair.x_only_public_key();
        Self {
            keypair,
            address: Address::from_pubkey(pubkey),
        }
    }

    /// Create an identity from a secret key.
    pub fn from_secret_key(secret_key: SecretKey) -> Self {
        let secp = Secp256k1::new();
        let keypair = Keypair::from_secret_key(&secp, &secret_key);
        Self::from_keypair(keypair)
    }

    /// Create an identity from secret key bytes.
    pub fn from_secret_bytes(bytes: &[u8; 32]) -> Result<Self, IdentityError> {
        let secret_key = SecretKey::from_slice(bytes)?;
        Ok(Self::from_secret_key(secret_key))
    }

    /// Create an identity from an nsec string (bech32) or hex-encoded secret.
    pub fn from_secret_str(s: &str) -> Result<Self, IdentityError> {
        let secret_key = decode_secret(s)?;
        Ok(Self::from_secret_key(secret_key))
    }

    /// Return the underlying keypair.
    pub fn keypair(&self) -> Keypair {
        self.keypair
    }

    /// Return the secret key (needed for channel key agreement).
    pub fn secret_key(&self) -> SecretKey {
        self.keypair.secret_key()
    }

    /// Return the x-only public key.
    pub fn pubkey(&self) -> XOnlyPublicKey {
        self.keypair.x_only_public_key().0
    }

    /// Return the public key as a bech32-encoded npub string.
    pub fn npub(&self) -> String {
        encode_npub(&self.pubkey())
    }

    /// Return this node's public address.
    pub fn address(&self) -> &Address {
        &self.address
    }
}

impl Clone for Identity {
    fn clone(&self) -> Self {
        Self::from_keypair(self.keypair)
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

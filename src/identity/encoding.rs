//! `npub` / `nsec` key strings and hex secrets.

use bech32::{Bech32, Hrp};
use secp256k1::{SecretKey, XOnlyPublicKey};

use super::{IdentityError, PUBLIC_KEY_SIZE};

const NPUB: Hrp = Hrp::parse_unchecked("npub");
const NSEC: Hrp = Hrp::parse_unchecked("nsec");

fn encode(hrp: Hrp, key: &[u8; 32]) -> String {
    bech32::encode::<Bech32>(hrp, key).expect("32-byte key encodes")
}

fn secret_from_bytes(bytes: &[u8]) -> Result<SecretKey, IdentityError> {
    if bytes.len() != 32 {
        return Err(IdentityError::InvalidNsecLength(bytes.len()));
    }
    Ok(SecretKey::from_slice(bytes)?)
}

pub fn encode_npub(pubkey: &XOnlyPublicKey) -> String {
    encode(NPUB, &pubkey.serialize())
}

pub fn decode_npub(npub: &str) -> Result<XOnlyPublicKey, IdentityError> {
    match bech32::decode(npub)? {
        (hrp, _) if hrp != NPUB => Err(IdentityError::InvalidNpubPrefix(hrp.to_string())),
        (_, data) if data.len() != PUBLIC_KEY_SIZE => {
            Err(IdentityError::InvalidNpubLength(data.len()))
        }
        (_, data) => Ok(XOnlyPublicKey::from_slice(&data)?),
    }
}

pub fn encode_nsec(secret_key: &SecretKey) -> String {
    encode(NSEC, &secret_key.secret_bytes())
}

pub fn decode_nsec(nsec: &str) -> Result<SecretKey, IdentityError> {
    match bech32::decode(nsec)? {
        (hrp, _) if hrp != NSEC => Err(IdentityError::InvalidNsecPrefix(hrp.to_string())),
        (_, data) => secret_from_bytes(&data),
    }
}

/// Secret key from config: `nsec1...` or 64 hex characters.
pub fn decode_secret(s: &str) -> Result<SecretKey, IdentityError> {
    if s.starts_with("nsec1") {
        decode_nsec(s)
    } else {
        secret_from_bytes(&hex::decode(s)?)
    }
}

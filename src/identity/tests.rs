use std::collections::HashSet;

use secp256k1::SecretKey;

use super::*;

const TEST_SECRET_HEX: &str = "0102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f20";

#[test]
fn test_identity_generation() {
    let identity = Identity::generate();
    let address = identity.address();

    assert_eq!(address.prefix().as_bytes().len(), 16);
    assert_eq!(address.ip().as_bytes()[0], MESH_ADDRESS_PREFIX);
    assert_eq!(
        &address.ip().as_bytes()[1..16],
        &address.prefix().as_bytes()[0..15]
    );
}

#[test]
fn test_prefix_is_deterministic() {
    let identity = Identity::generate();
    let pubkey = identity.pubkey();

    let first = RoutingPrefix::from_pubkey(&pubkey);
    let second = RoutingPrefix::from_pubkey(&pubkey);
    assert_eq!(first, second);

    // Rebuilding the address from raw key bytes derives the same prefix.
    let rebuilt = Address::from_bytes(&pubkey.serialize()).unwrap();
    assert_eq!(rebuilt.prefix(), identity.address().prefix());
    assert_eq!(rebuilt.ip(), identity.address().ip());
}

#[test]
fn test_address_equality_follows_key() {
    let a = Identity::generate();
    let b = Identity::generate();

    let a1 = Address::from_pubkey(a.pubkey());
    let a2 = Address::from_slice(&a.pubkey().serialize()).unwrap();
    let b1 = Address::from_pubkey(b.pubkey());

    assert_eq!(a1, a2);
    assert_ne!(a1, b1);

    let mut set = HashSet::new();
    set.insert(a1);
    set.insert(a2);
    set.insert(b1);
    assert_eq!(set.len(), 2);
}

#[test]
fn test_address_ordering_by_key() {
    let a = Address::from_pubkey(Identity::generate().pubkey());
    let b = Address::from_pubkey(Identity::generate().pubkey());

    assert_eq!(a.cmp(&b), a.key_bytes().cmp(&b.key_bytes()));
    assert_eq!(a.cmp(&a), std::cmp::Ordering::Equal);
}

#[test]
fn test_address_rejects_bad_key_bytes() {
    assert!(matches!(
        Address::from_slice(&[1u8; 31]),
        Err(IdentityError::InvalidPublicKeyLength(31))
    ));

    // x = p + 1 is outside the field, so no curve point has it.
    let bytes = [0xffu8; 32];
    assert!(matches!(
        Address::from_bytes(&bytes),
        Err(IdentityError::InvalidKey(_))
    ));
}

#[test]
fn test_mesh_ip_format() {
    let identity = Identity::generate();
    let ipv6 = identity.address().ipv6();

    assert!(ipv6.to_string().starts_with("fd"));
    assert_eq!(&ipv6.octets(), identity.address().ip().as_bytes());
}

#[test]
fn test_mesh_ip_rejects_wrong_prefix() {
    let mut bytes = [0u8; 16];
    bytes[0] = 0xfc;
    assert!(matches!(
        MeshIp::from_bytes(bytes),
        Err(IdentityError::InvalidAddressPrefix(0xfc))
    ));
    assert!(matches!(
        MeshIp::from_slice(&[0xfd; 4]),
        Err(IdentityError::InvalidAddressLength(4))
    ));
}

#[test]
fn test_npub_roundtrip() {
    let identity = Identity::generate();
    let npub = identity.npub();
    assert!(npub.starts_with("npub1"));

    let address = Address::from_npub(&npub).unwrap();
    assert_eq!(&address, identity.address());
}

#[test]
fn test_npub_rejects_nsec() {
    let secret = SecretKey::from_slice(&hex::decode(TEST_SECRET_HEX).unwrap()).unwrap();
    let nsec = encode_nsec(&secret);
    assert!(matches!(
        decode_npub(&nsec),
        Err(IdentityError::InvalidNpubPrefix(_))
    ));
}

#[test]
fn test_nsec_rejects_npub() {
    let npub = Identity::generate().npub();
    assert!(matches!(
        decode_nsec(&npub),
        Err(IdentityError::InvalidNsecPrefix(prefix)) if prefix == "npub"
    ));
}

#[test]
fn test_secret_from_hex_and_nsec_agree() {
    let from_hex = Identity::from_secret_str(TEST_SECRET_HEX).unwrap();
    let nsec = encode_nsec(&from_hex.secret_key());
    let from_nsec = Identity::from_secret_str(&nsec).unwrap();

    assert_eq!(from_hex.address(), from_nsec.address());
}

#[test]
fn test_secret_hex_wrong_length() {
    assert!(matches!(
        decode_secret("0102"),
        Err(IdentityError::InvalidNsecLength(2))
    ));
    assert!(matches!(
        decode_secret("zz"),
        Err(IdentityError::InvalidHex(_))
    ));
}

#[test]
fn test_identity_clone_keeps_address() {
    let identity = Identity::generate();
    let cloned = identity.clone();
    assert_eq!(identity.address(), cloned.address());
}

//! Mesh IPv6 address derived from a routing prefix.

use std::fmt;
use std::net::Ipv6Addr;

use super::{IdentityError, RoutingPrefix, MESH_ADDRESS_PREFIX};

/// 128-bit mesh address in the IPv6 ULA range `fd00::/8`.
///
/// Carries 120 bits of the routing prefix, which lets IP applications on
/// the tunnel adapter address peers directly.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct MeshIp([u8; 16]);

impl MeshIp {
    /// Create a MeshIp from a 16-byte array.
    pub fn from_bytes(bytes: [u8; 16]) -> Result<Self, IdentityError> {
        if bytes[0] != MESH_ADDRESS_PREFIX {
            return Err(IdentityError::InvalidAddressPrefix(bytes[0]));
        }
        Ok(Self(bytes))
    }

    /// Create a MeshIp from a slice.
    pub fn from_slice(slice: &[u8]) -> Result<Self, IdentityError> {
        if slice.len() != 16 {
            return Err(IdentityError::InvalidAddressLength(slice.len()));
        }
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(slice);
        Self::from_bytes(bytes)
    }

    /// Derive the address from a routing prefix.
    ///
    /// Takes the first 15 bytes of the prefix behind the 0xfd byte.
    pub fn from_prefix(prefix: &RoutingPrefix) -> Self {
        let mut bytes = [0u8; 16];
        bytes[0] = MESH_ADDRESS_PREFIX;
        bytes[1..16].copy_from_slice(&prefix.as_bytes()[0..15]);
        Self(bytes)
    }

    /// Return the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Convert to std::net::Ipv6Addr.
    pub fn to_ipv6(&self) -> Ipv6Addr {
        Ipv6Addr::from(self.0)
    }
}

impl From<MeshIp> for Ipv6Addr {
    fn from(addr: MeshIp) -> Self {
        Ipv6Addr::from(addr.0)
    }
}

impl fmt::Debug for MeshIp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MeshIp({})", self.to_ipv6())
    }
}

impl fmt::Display for MeshIp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_ipv6())
    }
}

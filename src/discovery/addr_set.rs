//! Ordered, deduplicated socket address set with cheap snapshots.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use super::SnodeError;

/// IP address family of a socket address.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressFamily {
    Inet,
    Inet6,
}

impl AddressFamily {
    pub fn of(addr: &SocketAddr) -> Self {
        match addr {
            SocketAddr::V4(_) => AddressFamily::Inet,
            SocketAddr::V6(_) => AddressFamily::Inet6,
        }
    }
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressFamily::Inet => write!(f, "inet"),
            AddressFamily::Inet6 => write!(f, "inet6"),
        }
    }
}

/// Insertion-ordered set of socket addresses.
///
/// The entries live behind an `Arc`; a mutation while a snapshot is alive
/// copies the list first, so snapshots never change under their readers.
#[derive(Clone, Debug, Default)]
pub struct AddrSet {
    addrs: Arc<Vec<SocketAddr>>,
}

impl AddrSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `addr`, returning its position.
    pub fn add(&mut self, addr: SocketAddr) -> Result<usize, SnodeError> {
        if self.addrs.contains(&addr) {
            return Err(SnodeError::AlreadyExists(addr));
        }
        let addrs = Arc::make_mut(&mut self.addrs);
        addrs.push(addr);
        Ok(addrs.len() - 1)
    }

    /// Remove `addr`, returning the position it held.
    pub fn remove(&mut self, addr: &SocketAddr) -> Result<usize, SnodeError> {
        let index = self
            .addrs
            .iter()
            .position(|a| a == addr)
            .ok_or(SnodeError::NotFound(*addr))?;
        Arc::make_mut(&mut self.addrs).remove(index);
        Ok(index)
    }

    pub fn contains(&self, addr: &SocketAddr) -> bool {
        self.addrs.contains(addr)
    }

    pub fn clear(&mut self) {
        if !self.addrs.is_empty() {
            self.addrs = Arc::new(Vec::new());
        }
    }

    pub fn len(&self) -> usize {
        self.addrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addrs.is_empty()
    }

    /// Consistent view of the current entries. O(1).
    pub fn snapshot(&self) -> AddrSnapshot {
        AddrSnapshot {
            addrs: Arc::clone(&self.addrs),
        }
    }
}

/// Immutable view of an [`AddrSet`] at one point in time.
///
/// Iterating is finite and may be restarted any number of times.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AddrSnapshot {
    addrs: Arc<Vec<SocketAddr>>,
}

impl AddrSnapshot {
    pub fn iter(&self) -> std::slice::Iter<'_, SocketAddr> {
        self.addrs.iter()
    }

    pub fn len(&self) -> usize {
        self.addrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addrs.is_empty()
    }

    pub fn contains(&self, addr: &SocketAddr) -> bool {
        self.addrs.contains(addr)
    }

    pub fn to_vec(&self) -> Vec<SocketAddr> {
        self.addrs.as_ref().clone()
    }
}

impl<'a> IntoIterator for &'a AddrSnapshot {
    type Item = &'a SocketAddr;
    type IntoIter = std::slice::Iter<'a, SocketAddr>;

    fn into_iter(self) -> Self::IntoIter {
        self.addrs.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> SocketAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_add_twice_fails_unchanged() {
        let mut set = AddrSet::new();
        assert_eq!(set.add(addr("192.0.2.1:4000")).unwrap(), 0);
        assert_eq!(set.add(addr("192.0.2.2:4000")).unwrap(), 1);

        assert_eq!(
            set.add(addr("192.0.2.1:4000")),
            Err(SnodeError::AlreadyExists(addr("192.0.2.1:4000")))
        );
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_remove_twice_fails() {
        let mut set = AddrSet::new();
        let a = addr("[2001:db8::1]:4000");
        set.add(a).unwrap();

        assert_eq!(set.remove(&a), Ok(0));
        assert_eq!(set.remove(&a), Err(SnodeError::NotFound(a)));
        assert!(set.is_empty());
    }

    #[test]
    fn test_insertion_order_kept() {
        let mut set = AddrSet::new();
        for port in [5, 3, 9, 1] {
            set.add(addr(&format!("192.0.2.1:{port}"))).unwrap();
        }
        set.remove(&addr("192.0.2.1:3")).unwrap();

        let ports: Vec<u16> = set.snapshot().iter().map(|a| a.port()).collect();
        assert_eq!(ports, vec![5, 9, 1]);
    }

    #[test]
    fn test_snapshot_isolated_from_mutation() {
        let mut set = AddrSet::new();
        set.add(addr("192.0.2.1:1")).unwrap();
        let before = set.snapshot();

        set.add(addr("192.0.2.1:2")).unwrap();
        set.remove(&addr("192.0.2.1:1")).unwrap();

        assert_eq!(before.to_vec(), vec![addr("192.0.2.1:1")]);
        assert_eq!(set.snapshot().to_vec(), vec![addr("192.0.2.1:2")]);

        // Restartable.
        assert_eq!(before.iter().count(), 1);
        assert_eq!((&before).into_iter().count(), 1);
    }

    #[test]
    fn test_family() {
        assert_eq!(AddressFamily::of(&addr("192.0.2.1:1")), AddressFamily::Inet);
        assert_eq!(AddressFamily::of(&addr("[::1]:1")), AddressFamily::Inet6);
        assert_eq!(AddressFamily::Inet6.to_string(), "inet6");
    }
}

//! Routing table boundary.
//!
//! The distributed routing table belongs to the control plane. The
//! dispatcher only asks it where an address lives and tells it which
//! switch label a peer was last heard on.

use std::collections::HashMap;
use std::net::Ipv6Addr;
use tracing::trace;

use crate::identity::Address;
use crate::wire::SwitchLabel;

/// Where to send traffic for a destination.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Route {
    pub peer: Address,
    pub label: SwitchLabel,
}

/// Routing table lookups used by the dispatcher.
pub trait Router: Send {
    /// Route for a mesh IPv6 destination.
    fn lookup_ip(&self, ip: &Ipv6Addr) -> Option<Route>;

    /// Switch label for a known peer.
    fn lookup_peer(&self, peer: &Address) -> Option<SwitchLabel>;

    /// Record that `peer` is reachable via `label`.
    fn learn(&mut self, peer: Address, label: SwitchLabel);

    /// Drop everything known about `peer`.
    fn forget(&mut self, peer: &Address);
}

/// In-memory routing table keyed by mesh address.
#[derive(Debug, Default)]
pub struct RouteTable {
    routes: HashMap<Ipv6Addr, Route>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl Router for RouteTable {
    fn lookup_ip(&self, ip: &Ipv6Addr) -> Option<Route> {
        self.routes.get(ip).copied()
    }

    fn lookup_peer(&self, peer: &Address) -> Option<SwitchLabel> {
        self.routes.get(&peer.ipv6()).map(|r| r.label)
    }

    fn learn(&mut self, peer: Address, label: SwitchLabel) {
        let previous = self.routes.insert(peer.ipv6(), Route { peer, label });
        if previous.map(|r| r.label) != Some(label) {
            trace!(peer = %peer.short(), label = %label, "Route learned");
        }
    }

    fn forget(&mut self, peer: &Address) {
        self.routes.remove(&peer.ipv6());
    }
}

//! Mesh Node
//!
//! Composition root. A [`Node`] owns the dispatcher, the supernode hunter
//! and the registry they were registered in, and serializes every event
//! that touches them through one loop. Collaborators reach the node
//! through the [`NodeEndpoints`] returned at construction.

mod rx_loop;
#[cfg(test)]
mod tests;

use std::fmt;
use std::net::SocketAddr;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use crate::channel::SealedChannelFactory;
use crate::discovery::{query_channel, AddrSnapshot, QueryRx, SupernodeHunter};
use crate::dispatch::{DispatchError, Dispatcher, Wiring};
use crate::identity::Address;
use crate::interface::{interface_channel, InterfaceKind, MessageRx};
use crate::registry::ModuleRegistry;
use crate::route::RouteTable;
use crate::wire::{Message, SwitchLabel};
use crate::{Config, ConfigError, Identity, IdentityError};

/// Errors related to node operations.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("node already running")]
    AlreadyRunning,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("identity error: {0}")]
    Identity(#[from] IdentityError),

    #[error("dispatch error: {0}")]
    Dispatch(#[from] DispatchError),
}

/// Node operational state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeState {
    /// Created, event loop not started.
    Created,
    /// Event loop running.
    Running,
    /// Event loop exited.
    Stopped,
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeState::Created => "created",
            NodeState::Running => "running",
            NodeState::Stopped => "stopped",
        };
        write!(f, "{}", s)
    }
}

/// Work for the node's event loop.
#[derive(Debug)]
pub enum NodeEvent {
    /// A message arriving from one of the dispatcher's interfaces.
    Inbound {
        message: Message,
        source: InterfaceKind,
    },
    /// An authenticated incoming-for-me message from `peer`.
    Inject { message: Message, peer: Address },
    /// A control-plane payload for `peer`.
    SendControl { peer: Address, payload: Vec<u8> },
    /// A switch ping down `label`, sent without a session.
    SwitchPing { label: SwitchLabel, payload: Vec<u8> },
    /// An encoded discovery message received from `from`.
    DiscoveryReply { from: SocketAddr, data: Vec<u8> },
    /// Routing table update from the control plane.
    AddRoute { peer: Address, label: SwitchLabel },
    AddPeer(SocketAddr),
    RemovePeer(SocketAddr),
    AddSnode(SocketAddr),
    RemoveSnode(SocketAddr),
    /// Leave the event loop.
    Shutdown,
}

pub type EventTx = mpsc::Sender<NodeEvent>;
pub type EventRx = mpsc::Receiver<NodeEvent>;

/// Channel ends the node's collaborators use.
pub struct NodeEndpoints {
    /// Feed events into the node.
    pub events: EventTx,
    /// Encrypted frames for the switch fabric, peer-tagged.
    pub switch: MessageRx,
    /// IPv6 packets for the local tunnel adapter.
    pub tunnel: MessageRx,
    /// Cleartext for the control plane, peer-tagged.
    pub control: MessageRx,
    /// Switch control frames (ping replies) for the switch pinger.
    pub pinger: MessageRx,
    /// Encoded discovery messages and their destinations.
    pub queries: QueryRx,
    /// Current supernode set.
    pub snodes: watch::Receiver<AddrSnapshot>,
}

/// A running mesh node.
pub struct Node {
    identity: Identity,
    config: Config,
    state: NodeState,
    registry: ModuleRegistry,
    dispatcher: Dispatcher,
    hunter: SupernodeHunter,
    events: Option<EventRx>,
}

impl Node {
    /// Assemble a node from configuration.
    pub fn new(config: Config) -> Result<(Self, NodeEndpoints), NodeError> {
        validate(&config)?;
        let identity = config.create_identity()?;
        let buffers = &config.node.buffers;

        let (switch, switch_rx) = interface_channel(InterfaceKind::Switch, buffers.interface_channel);
        let (tunnel, tunnel_rx) = interface_channel(InterfaceKind::Tunnel, buffers.interface_channel);
        let (control, control_rx) =
            interface_channel(InterfaceKind::ControlPlane, buffers.interface_channel);
        let (pinger, pinger_rx) =
            interface_channel(InterfaceKind::SwitchPinger, buffers.interface_channel);

        let wiring = Wiring {
            switch: Box::new(switch),
            tunnel: Box::new(tunnel),
            control: Box::new(control),
            pinger: Box::new(pinger),
            router: Box::new(RouteTable::new()),
            channels: Box::new(SealedChannelFactory::new(&identity)),
        };

        let mut registry = ModuleRegistry::new();
        let dispatcher = Dispatcher::register(&identity, &config.node.session, wiring, &mut registry)?;

        let (sender, queries_rx) = query_channel(buffers.query_channel);
        let hunter = SupernodeHunter::new(config.node.discovery.clone(), Box::new(sender));
        let snodes = hunter.snode_watch();

        let (events_tx, events_rx) = mpsc::channel(buffers.event_channel);

        info!(
            npub = %identity.npub(),
            address = %identity.address().ipv6(),
            discovery = config.node.discovery.enabled,
            "Node created"
        );

        let node = Self {
            identity,
            config,
            state: NodeState::Created,
            registry,
            dispatcher,
            hunter,
            events: Some(events_rx),
        };
        let endpoints = NodeEndpoints {
            events: events_tx,
            switch: switch_rx,
            tunnel: tunnel_rx,
            control: control_rx,
            pinger: pinger_rx,
            queries: queries_rx,
            snodes,
        };
        Ok((node, endpoints))
    }

    // === Accessors ===

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn address(&self) -> &Address {
        self.identity.address()
    }

    pub fn npub(&self) -> String {
        self.identity.npub()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn dispatcher_mut(&mut self) -> &mut Dispatcher {
        &mut self.dispatcher
    }

    pub fn hunter(&self) -> &SupernodeHunter {
        &self.hunter
    }

    pub fn hunter_mut(&mut self) -> &mut SupernodeHunter {
        &mut self.hunter
    }

    // === Event handling ===

    /// Apply one event. Returns false when the loop should stop.
    ///
    /// Per-packet failures are logged by the component that hit them and
    /// never stop the loop.
    pub fn handle_event(&mut self, event: NodeEvent, now_ms: u64) -> bool {
        match event {
            NodeEvent::Inbound { message, source } => {
                let _ = self.dispatcher.handle_inbound(message, source, now_ms);
            }
            NodeEvent::Inject { message, peer } => {
                let _ = self.dispatcher.inject_incoming_for_me(message, &peer);
            }
            NodeEvent::SendControl { peer, payload } => {
                let _ = self.dispatcher.send_control(&peer, &payload, now_ms);
            }
            NodeEvent::SwitchPing { label, payload } => {
                let _ = self.dispatcher.send_switch_ping(label, &payload);
            }
            NodeEvent::DiscoveryReply { from, data } => {
                if let Err(e) = self.hunter.handle_message(from, &data, now_ms) {
                    debug!(from = %from, error = %e, "Discovery message dropped");
                }
            }
            NodeEvent::AddRoute { peer, label } => {
                self.dispatcher.router_mut().learn(peer, label);
            }
            NodeEvent::AddPeer(addr) => {
                if let Err(e) = self.hunter.add_peer(addr) {
                    debug!(addr = %addr, error = %e, "Peer not added");
                }
            }
            NodeEvent::RemovePeer(addr) => {
                if let Err(e) = self.hunter.remove_peer(&addr) {
                    debug!(addr = %addr, error = %e, "Peer not removed");
                }
            }
            NodeEvent::AddSnode(addr) => {
                if let Err(e) = self.hunter.add_snode(addr) {
                    debug!(addr = %addr, code = e.code(), error = %e, "Supernode not added");
                }
            }
            NodeEvent::RemoveSnode(addr) => {
                if let Err(e) = self.hunter.remove_snode(&addr) {
                    debug!(addr = %addr, code = e.code(), error = %e, "Supernode not removed");
                }
            }
            NodeEvent::Shutdown => return false,
        }
        true
    }

    /// Periodic maintenance: idle sessions and discovery.
    pub fn tick(&mut self, now_ms: u64) {
        for peer in self.dispatcher.expire_sessions(now_ms) {
            debug!(peer = %peer.short(), "Idle session evicted");
        }
        if self.config.node.discovery.enabled {
            self.hunter.tick(now_ms);
        }
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("address", &self.identity.address().ipv6())
            .field("state", &self.state)
            .field("sessions", &self.dispatcher.sessions().len())
            .field("snodes", &self.hunter.list_snodes().len())
            .finish()
    }
}

fn validate(config: &Config) -> Result<(), NodeError> {
    let node = &config.node;
    if node.tick_interval_ms == 0 {
        return Err(NodeError::InvalidConfig("node.tick_interval_ms must be non-zero".into()));
    }
    for (name, size) in [
        ("interface_channel", node.buffers.interface_channel),
        ("query_channel", node.buffers.query_channel),
        ("event_channel", node.buffers.event_channel),
    ] {
        if size == 0 {
            return Err(NodeError::InvalidConfig(format!(
                "node.buffers.{name} must be non-zero"
            )));
        }
    }
    Ok(())
}

/// Wall-clock milliseconds since the Unix epoch.
pub(crate) fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

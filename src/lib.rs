//! meshcore: session dispatch and supernode discovery for an encrypted
//! mesh node.
//!
//! The dispatcher moves packets between the switch fabric, the local
//! tunnel adapter and the control plane, keeping one authenticated
//! session per peer. The supernode hunter probes the peer set in rounds
//! to find supernodes.

pub mod channel;
pub mod config;
pub mod discovery;
pub mod dispatch;
pub mod identity;
pub mod interface;
pub mod node;
pub mod registry;
pub mod route;
pub mod session;
pub mod wire;

// Re-export identity types
pub use identity::{
    decode_npub, decode_nsec, decode_secret, encode_npub, encode_nsec, Address, Identity,
    IdentityError, MeshIp, RoutingPrefix,
};

// Re-export config types
pub use config::{Config, ConfigError, IdentityConfig};

// Re-export channel and session types
pub use channel::{ChannelError, ChannelFactory, HandshakeStatus, SecureChannel};
pub use session::{Session, SessionError, SessionHandle, SessionTable};

// Re-export wire types
pub use wire::{FormatError, Ip6Header, Message, SwitchHeader, SwitchLabel};

// Re-export dispatch types
pub use dispatch::{Delivery, DispatchError, DispatchStats, Dispatcher, Wiring};
pub use interface::{Interface, InterfaceError, InterfaceKind};
pub use registry::{ModuleRegistry, RegistryError};
pub use route::{Route, RouteTable, Router};

// Re-export discovery types
pub use discovery::{
    result_code, AddrSet, AddrSnapshot, AddressFamily, DiscoveryError, SnodeError,
    SupernodeHunter,
};

// Re-export node types
pub use node::{Node, NodeEndpoints, NodeError, NodeEvent, NodeState};

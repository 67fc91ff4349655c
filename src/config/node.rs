//! Node configuration subsections.
//!
//! All the `node.*` configuration parameters: session management,
//! supernode discovery, internal buffers and the tick cadence.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

use super::IdentityConfig;
use crate::discovery::AddressFamily;
use crate::wire::DEFAULT_HOP_LIMIT;

/// Session management (`node.session.*`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Idle time before a session is evicted, in seconds (`node.session.idle_timeout_secs`).
    #[serde(default = "SessionConfig::default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    /// Max live sessions, 0 for unbounded (`node.session.max_sessions`).
    #[serde(default = "SessionConfig::default_max_sessions")]
    pub max_sessions: usize,
    /// Hop limit on IPv6 headers built for control traffic (`node.session.hop_limit`).
    #[serde(default = "SessionConfig::default_hop_limit")]
    pub hop_limit: u8,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 180,
            max_sessions: 1024,
            hop_limit: DEFAULT_HOP_LIMIT,
        }
    }
}

impl SessionConfig {
    fn default_idle_timeout_secs() -> u64 { 180 }
    fn default_max_sessions() -> usize { 1024 }
    fn default_hop_limit() -> u8 { DEFAULT_HOP_LIMIT }

    pub fn idle_timeout_ms(&self) -> u64 {
        self.idle_timeout_secs.saturating_mul(1000)
    }
}

/// Supernode discovery (`node.discovery.*`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Run the supernode hunter (`node.discovery.enabled`).
    #[serde(default = "DiscoveryConfig::default_enabled")]
    pub enabled: bool,
    /// Wait for a reply before moving a target on, in ms (`node.discovery.query_timeout_ms`).
    #[serde(default = "DiscoveryConfig::default_query_timeout_ms")]
    pub query_timeout_ms: u64,
    /// Max round duration in seconds, 0 to wait for every target
    /// (`node.discovery.round_timeout_secs`).
    #[serde(default = "DiscoveryConfig::default_round_timeout_secs")]
    pub round_timeout_secs: u64,
    /// Max queries sent per tick, 0 for unlimited (`node.discovery.probes_per_tick`).
    #[serde(default = "DiscoveryConfig::default_probes_per_tick")]
    pub probes_per_tick: usize,
    /// Address families accepted as supernodes (`node.discovery.families`).
    #[serde(default = "DiscoveryConfig::default_families")]
    pub families: Vec<AddressFamily>,
    /// Supernodes known at startup (`node.discovery.supernodes`).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub supernodes: Vec<SocketAddr>,
    /// Peers probed in the first round (`node.discovery.peers`).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub peers: Vec<SocketAddr>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            query_timeout_ms: 3000,
            round_timeout_secs: 60,
            probes_per_tick: 4,
            families: Self::default_families(),
            supernodes: Vec::new(),
            peers: Vec::new(),
        }
    }
}

impl DiscoveryConfig {
    fn default_enabled() -> bool { true }
    fn default_query_timeout_ms() -> u64 { 3000 }
    fn default_round_timeout_secs() -> u64 { 60 }
    fn default_probes_per_tick() -> usize { 4 }
    fn default_families() -> Vec<AddressFamily> {
        vec![AddressFamily::Inet, AddressFamily::Inet6]
    }

    pub fn round_timeout_ms(&self) -> u64 {
        self.round_timeout_secs.saturating_mul(1000)
    }

    /// Whether `family` is accepted for supernodes.
    pub fn allows(&self, family: AddressFamily) -> bool {
        self.families.contains(&family)
    }
}

/// Internal channel sizes (`node.buffers.*`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuffersConfig {
    /// Per-interface outbound queue (`node.buffers.interface_channel`).
    #[serde(default = "BuffersConfig::default_interface_channel")]
    pub interface_channel: usize,
    /// Discovery query queue (`node.buffers.query_channel`).
    #[serde(default = "BuffersConfig::default_query_channel")]
    pub query_channel: usize,
    /// Node event queue (`node.buffers.event_channel`).
    #[serde(default = "BuffersConfig::default_event_channel")]
    pub event_channel: usize,
}

impl Default for BuffersConfig {
    fn default() -> Self {
        Self {
            interface_channel: 1024,
            query_channel: 256,
            event_channel: 1024,
        }
    }
}

impl BuffersConfig {
    fn default_interface_channel() -> usize { 1024 }
    fn default_query_channel() -> usize { 256 }
    fn default_event_channel() -> usize { 1024 }
}

/// Node configuration (`node.*`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Identity configuration (`node.identity.*`).
    #[serde(default)]
    pub identity: IdentityConfig,

    /// Session management (`node.session.*`).
    #[serde(default)]
    pub session: SessionConfig,

    /// Supernode discovery (`node.discovery.*`).
    #[serde(default)]
    pub discovery: DiscoveryConfig,

    /// Internal buffers (`node.buffers.*`).
    #[serde(default)]
    pub buffers: BuffersConfig,

    /// Period of the maintenance tick in ms (`node.tick_interval_ms`).
    #[serde(default = "NodeConfig::default_tick_interval_ms")]
    pub tick_interval_ms: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            identity: IdentityConfig::default(),
            session: SessionConfig::default(),
            discovery: DiscoveryConfig::default(),
            buffers: BuffersConfig::default(),
            tick_interval_ms: 1000,
        }
    }
}

impl NodeConfig {
    fn default_tick_interval_ms() -> u64 { 1000 }
}

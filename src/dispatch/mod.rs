//! Packet Dispatch
//!
//! The dispatcher sits between the switch fabric, the tunnel adapter, the
//! control plane and the switch pinger. Every message entering through one
//! of them is classified and leaves through at most one other:
//!
//! ```text
//! switch  --control marker-->  pinger (SwitchHeader || control frame)
//! switch  --decrypt-->  SwitchHeader || Ip6Header || payload
//!                         |-- for us, not control -> tunnel (Ip6Header || payload)
//!                         `-- otherwise            -> control plane
//! tunnel  --route--encrypt-->  switch
//! control --wrap IPv6--encrypt-->  switch
//! pinger  --by label, no session-->  switch
//! ```
//!
//! Handlers are split across files by direction: `inbound` for traffic
//! arriving from the switch, `outbound` for traffic leaving through it,
//! `pinger` for unencrypted switch control frames.

mod inbound;
mod outbound;
mod pinger;

use std::fmt;
use std::net::Ipv6Addr;
use thiserror::Error;
use tracing::{debug, info};

use crate::channel::ChannelFactory;
use crate::config::SessionConfig;
use crate::identity::{Address, Identity};
use crate::interface::{Interface, InterfaceError, InterfaceKind};
use crate::registry::ModuleRegistry;
use crate::route::Router;
use crate::session::{SessionError, SessionTable};
use crate::wire::{FormatError, Message, SwitchLabel};

/// Name the dispatcher registers under.
pub const MODULE_NAME: &str = "dispatch";

/// Errors from dispatch operations.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("session error: {0}")]
    Session(#[from] SessionError),

    #[error("format error: {0}")]
    Format(#[from] FormatError),

    #[error("no route to {destination}")]
    NoRoute { destination: Ipv6Addr },

    #[error("interface error: {0}")]
    Interface(#[from] InterfaceError),
}

/// Where a handled message was sent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
    Tunnel,
    ControlPlane,
    Switch,
    SwitchPinger,
}

/// Per-outcome packet counters.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub to_tunnel: u64,
    pub to_control: u64,
    pub to_switch: u64,
    pub to_pinger: u64,
    pub dropped_session: u64,
    pub dropped_format: u64,
    pub dropped_no_route: u64,
    pub dropped_interface: u64,
}

impl DispatchStats {
    fn record(&mut self, result: &Result<Delivery, DispatchError>) {
        match result {
            Ok(Delivery::Tunnel) => self.to_tunnel += 1,
            Ok(Delivery::ControlPlane) => self.to_control += 1,
            Ok(Delivery::Switch) => self.to_switch += 1,
            Ok(Delivery::SwitchPinger) => self.to_pinger += 1,
            Err(DispatchError::Session(_)) => self.dropped_session += 1,
            Err(DispatchError::Format(_)) => self.dropped_format += 1,
            Err(DispatchError::NoRoute { .. }) => self.dropped_no_route += 1,
            Err(DispatchError::Interface(_)) => self.dropped_interface += 1,
            Err(DispatchError::Configuration(_)) => {}
        }
    }

    /// Total messages dropped for any reason.
    pub fn dropped(&self) -> u64 {
        self.dropped_session + self.dropped_format + self.dropped_no_route + self.dropped_interface
    }
}

/// Collaborators handed to the dispatcher at registration.
pub struct Wiring {
    pub switch: Box<dyn Interface>,
    pub tunnel: Box<dyn Interface>,
    pub control: Box<dyn Interface>,
    pub pinger: Box<dyn Interface>,
    pub router: Box<dyn Router>,
    pub channels: Box<dyn ChannelFactory>,
}

/// Session-dispatch core of a node.
pub struct Dispatcher {
    local: Address,
    my_ip: Ipv6Addr,
    sessions: SessionTable,
    router: Box<dyn Router>,
    switch: Box<dyn Interface>,
    tunnel: Box<dyn Interface>,
    control: Box<dyn Interface>,
    pinger: Box<dyn Interface>,
    hop_limit: u8,
    idle_timeout_ms: u64,
    stats: DispatchStats,
}

impl Dispatcher {
    /// Register a dispatcher for `identity`.
    ///
    /// Claims the control-plane module slot and the switch fabric's router
    /// interface in `registry`. Duplicate registration, or interfaces wired
    /// to the wrong slots, fail with [`DispatchError::Configuration`] and
    /// leave the registry as it was.
    pub fn register(
        identity: &Identity,
        config: &SessionConfig,
        wiring: Wiring,
        registry: &mut ModuleRegistry,
    ) -> Result<Self, DispatchError> {
        for (iface, expected) in [
            (&wiring.switch, InterfaceKind::Switch),
            (&wiring.tunnel, InterfaceKind::Tunnel),
            (&wiring.control, InterfaceKind::ControlPlane),
            (&wiring.pinger, InterfaceKind::SwitchPinger),
        ] {
            if iface.kind() != expected {
                return Err(DispatchError::Configuration(format!(
                    "{} interface wired as {}",
                    iface.kind(),
                    expected
                )));
            }
        }

        registry
            .register_module(MODULE_NAME)
            .map_err(|e| DispatchError::Configuration(e.to_string()))?;
        if let Err(e) = registry.bind_router_interface(MODULE_NAME) {
            registry.unregister_module(MODULE_NAME);
            return Err(DispatchError::Configuration(e.to_string()));
        }

        let local = *identity.address();
        info!(
            npub = %local.npub(),
            address = %local.ipv6(),
            "Dispatcher registered"
        );

        Ok(Self {
            local,
            my_ip: local.ipv6(),
            sessions: SessionTable::new(wiring.channels, config.max_sessions),
            router: wiring.router,
            switch: wiring.switch,
            tunnel: wiring.tunnel,
            control: wiring.control,
            pinger: wiring.pinger,
            hop_limit: config.hop_limit,
            idle_timeout_ms: config.idle_timeout_ms(),
            stats: DispatchStats::default(),
        })
    }

    /// Handle a message arriving from `source`.
    ///
    /// Per-packet failures are counted, logged and returned; the message is
    /// dropped and no other state changes.
    pub fn handle_inbound(
        &mut self,
        msg: Message,
        source: InterfaceKind,
        now_ms: u64,
    ) -> Result<Delivery, DispatchError> {
        let result = match source {
            InterfaceKind::Switch => self.handle_switch_inbound(msg, now_ms),
            InterfaceKind::Tunnel => self.handle_tunnel_outbound(msg, now_ms),
            InterfaceKind::ControlPlane => self.handle_control_outbound(msg, now_ms),
            InterfaceKind::SwitchPinger => self.handle_pinger_outbound(msg),
        };
        self.finish(source, result)
    }

    /// Deliver an already-authenticated `SwitchHeader || Ip6Header ||
    /// payload` message from `peer` as if it had just been decrypted.
    pub fn inject_incoming_for_me(
        &mut self,
        mut msg: Message,
        peer: &Address,
    ) -> Result<Delivery, DispatchError> {
        msg.set_peer(*peer);
        let result = self.incoming_for_me(msg);
        self.finish(InterfaceKind::Switch, result)
    }

    /// Send a control-plane payload to `peer`.
    pub fn send_control(
        &mut self,
        peer: &Address,
        payload: &[u8],
        now_ms: u64,
    ) -> Result<Delivery, DispatchError> {
        let msg = Message::new(payload).with_peer(*peer);
        self.handle_inbound(msg, InterfaceKind::ControlPlane, now_ms)
    }

    /// Send a switch ping `payload` down `label` without a session.
    ///
    /// The payload is wrapped as a switch control frame; replies come back
    /// through the pinger interface.
    pub fn send_switch_ping(
        &mut self,
        label: SwitchLabel,
        payload: &[u8],
    ) -> Result<Delivery, DispatchError> {
        let msg = pinger::switch_control_frame(label, payload);
        let result = self.handle_pinger_outbound(msg);
        self.finish(InterfaceKind::SwitchPinger, result)
    }

    /// Evict sessions idle longer than the configured timeout, along with
    /// the routes learned for their peers.
    pub fn expire_sessions(&mut self, now_ms: u64) -> Vec<Address> {
        let expired = self.sessions.expire_idle(now_ms, self.idle_timeout_ms);
        for peer in &expired {
            self.router.forget(peer);
        }
        if !expired.is_empty() {
            debug!(count = expired.len(), "Expired idle sessions");
        }
        expired
    }

    /// Tear down the session with `peer`, if any, and forget its route.
    pub fn evict_session(&mut self, peer: &Address) -> bool {
        self.router.forget(peer);
        self.sessions.evict(peer).is_some()
    }

    pub fn address(&self) -> &Address {
        &self.local
    }

    pub fn sessions(&self) -> &SessionTable {
        &self.sessions
    }

    pub fn router(&self) -> &dyn Router {
        self.router.as_ref()
    }

    pub fn router_mut(&mut self) -> &mut dyn Router {
        self.router.as_mut()
    }

    pub fn stats(&self) -> &DispatchStats {
        &self.stats
    }

    fn finish(
        &mut self,
        source: InterfaceKind,
        result: Result<Delivery, DispatchError>,
    ) -> Result<Delivery, DispatchError> {
        self.stats.record(&result);
        if let Err(e) = &result {
            debug!(source = %source, error = %e, "Message dropped");
        }
        result
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("address", &self.my_ip)
            .field("sessions", &self.sessions.len())
            .field("stats", &self.stats)
            .finish()
    }
}

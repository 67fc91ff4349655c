//! Traffic leaving through the switch fabric.

use tracing::trace;

use super::{Delivery, DispatchError, Dispatcher};
use crate::identity::Address;
use crate::interface::InterfaceKind;
use crate::session::SessionError;
use crate::wire::{
    FormatError, Ip6Header, Message, SwitchHeader, SwitchLabel, CONTROL_NEXT_HEADER,
};

impl Dispatcher {
    /// Route a packet written to the tunnel by the local host.
    pub(super) fn handle_tunnel_outbound(
        &mut self,
        mut msg: Message,
        now_ms: u64,
    ) -> Result<Delivery, DispatchError> {
        let ip6 = Ip6Header::parse_packet(msg.bytes())?;
        if ip6.source != self.my_ip {
            return Err(FormatError::SourceMismatch {
                source_ip: ip6.source,
                peer_ip: self.my_ip,
            }
            .into());
        }

        if ip6.destination == self.my_ip {
            msg.push(&SwitchHeader::new(SwitchLabel::SELF).encode());
            msg.set_peer(self.local);
            return self.incoming_for_me(msg);
        }

        let route = self
            .router
            .lookup_ip(&ip6.destination)
            .ok_or(DispatchError::NoRoute {
                destination: ip6.destination,
            })?;

        self.send_encrypted(route.peer, route.label, msg, InterfaceKind::Tunnel, now_ms)
    }

    /// Wrap a control-plane payload for the peer it is tagged with.
    pub(super) fn handle_control_outbound(
        &mut self,
        mut msg: Message,
        now_ms: u64,
    ) -> Result<Delivery, DispatchError> {
        let peer = *msg.peer().ok_or(FormatError::MissingPeer)?;

        let mut header = Ip6Header::new(self.my_ip, peer.ipv6(), CONTROL_NEXT_HEADER, msg.len())?;
        header.hop_limit = self.hop_limit;
        msg.push(&header.encode());

        if peer == self.local {
            msg.push(&SwitchHeader::new(SwitchLabel::SELF).encode());
            self.control.send(msg)?;
            return Ok(Delivery::ControlPlane);
        }

        let label = self
            .router
            .lookup_peer(&peer)
            .or_else(|| self.sessions.get(&peer).and_then(|s| s.label()))
            .ok_or(DispatchError::NoRoute {
                destination: peer.ipv6(),
            })?;

        self.send_encrypted(peer, label, msg, InterfaceKind::ControlPlane, now_ms)
    }

    /// Encrypt `msg` for `peer` and send it down `label`.
    fn send_encrypted(
        &mut self,
        peer: Address,
        label: SwitchLabel,
        msg: Message,
        origin: InterfaceKind,
        now_ms: u64,
    ) -> Result<Delivery, DispatchError> {
        let session = self.sessions.lookup_or_create(&peer, origin, now_ms)?;
        let frame = session.encrypt(msg.bytes()).map_err(SessionError::from)?;
        session.touch(now_ms);

        trace!(
            peer = %peer.short(),
            label = %label,
            len = frame.len(),
            status = ?session.status(),
            "Frame encrypted"
        );

        let mut out = Message::from_vec(frame).with_peer(peer);
        out.push(&SwitchHeader::new(label).encode());
        self.switch.send(out)?;
        Ok(Delivery::Switch)
    }
}

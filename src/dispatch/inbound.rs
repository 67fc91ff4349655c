//! Traffic arriving from the switch fabric.

use tracing::trace;

use super::{Delivery, DispatchError, Dispatcher};
use crate::channel::{peek_frame, FrameKind};
use crate::identity::Address;
use crate::interface::InterfaceKind;
use crate::session::SessionError;
use crate::wire::{
    is_switch_control, FormatError, Ip6Header, Message, SwitchHeader, INCOMING_FOR_ME_SIZE,
    SWITCH_HEADER_SIZE,
};

impl Dispatcher {
    /// Authenticate a switch frame and route its cleartext. Switch control
    /// frames go to the pinger instead.
    pub(super) fn handle_switch_inbound(
        &mut self,
        mut msg: Message,
        now_ms: u64,
    ) -> Result<Delivery, DispatchError> {
        let header = SwitchHeader::pop_from(&mut msg)?;
        if is_switch_control(msg.bytes()) {
            return self.handle_switch_control(header, msg);
        }
        let frame = peek_frame(msg.bytes()).ok_or(FormatError::NotChannelFramed)?;

        let peer = match frame {
            FrameKind::Hello { sender_key, .. } => {
                Address::from_bytes(&sender_key).map_err(SessionError::from)?
            }
            FrameKind::Data {
                receiver_handle, ..
            } => self.sessions.peer_for_handle(receiver_handle)?,
        };

        let created = !self.sessions.contains(&peer);
        let session = self
            .sessions
            .lookup_or_create(&peer, InterfaceKind::Switch, now_ms)?;

        let cleartext = match session.decrypt(msg.bytes()) {
            Ok(cleartext) => cleartext,
            Err(e) => {
                // Never keep state for a frame that failed to authenticate.
                if created {
                    self.sessions.evict(&peer);
                }
                return Err(SessionError::from(e).into());
            }
        };

        session.touch(now_ms);
        session.set_label(header.label);
        self.router.learn(peer, header.label);

        trace!(
            peer = %peer.short(),
            label = %header.label,
            len = cleartext.len(),
            "Frame decrypted"
        );

        let mut clear = Message::new(&cleartext).with_peer(peer);
        clear.push(&header.encode());
        self.route_cleartext(clear)
    }

    /// Route a peer-tagged `SwitchHeader || Ip6Header || payload` message.
    pub(super) fn route_cleartext(&mut self, msg: Message) -> Result<Delivery, DispatchError> {
        let headers = msg.peek(INCOMING_FOR_ME_SIZE, "IPv6 header")?;
        let ip6 = Ip6Header::parse(&headers[SWITCH_HEADER_SIZE..])?;

        if !ip6.is_control() && ip6.destination == self.my_ip {
            return self.incoming_for_me(msg);
        }

        self.control.send(msg)?;
        Ok(Delivery::ControlPlane)
    }

    /// Validate an incoming-for-me message and hand its IPv6 packet to the
    /// tunnel.
    ///
    /// Takes `SwitchHeader || Ip6Header || payload` tagged with the sending
    /// peer. Only the 12-byte switch header is stripped: the tunnel carries
    /// plaintext IP packets, so it receives `Ip6Header || payload`, still
    /// tagged with the peer.
    pub(super) fn incoming_for_me(&mut self, mut msg: Message) -> Result<Delivery, DispatchError> {
        let peer = *msg.peer().ok_or(FormatError::MissingPeer)?;
        msg.peek(INCOMING_FOR_ME_SIZE, "incoming-for-me headers")?;

        SwitchHeader::pop_from(&mut msg)?;
        let ip6 = Ip6Header::parse_packet(msg.bytes())?;

        if ip6.source != peer.ipv6() {
            return Err(FormatError::SourceMismatch {
                source_ip: ip6.source,
                peer_ip: peer.ipv6(),
            }
            .into());
        }
        if ip6.destination != self.my_ip {
            return Err(FormatError::NotForMe(ip6.destination).into());
        }

        self.tunnel.send(msg)?;
        Ok(Delivery::Tunnel)
    }
}

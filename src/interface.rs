//! Interfaces
//!
//! The dispatcher talks to four collaborators: the switch fabric, the
//! local tunnel adapter, the control plane and the switch pinger. Each is
//! an [`Interface`] with a single non-blocking `send`; the concrete
//! implementation is chosen when the node is assembled.

use std::fmt;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::wire::Message;

/// Which collaborator an interface connects to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum InterfaceKind {
    /// Peer-to-peer link layer; carries encrypted frames.
    Switch,
    /// Local virtual network adapter; carries user IPv6 packets.
    Tunnel,
    /// Routing and discovery messaging.
    ControlPlane,
    /// Label-addressed switch pings; carries unencrypted switch control
    /// frames.
    SwitchPinger,
}

impl fmt::Display for InterfaceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InterfaceKind::Switch => "switch",
            InterfaceKind::Tunnel => "tunnel",
            InterfaceKind::ControlPlane => "control",
            InterfaceKind::SwitchPinger => "pinger",
        };
        write!(f, "{}", s)
    }
}

/// Errors handing a message to an interface.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("{0} interface queue full")]
    QueueFull(InterfaceKind),

    #[error("{0} interface closed")]
    Closed(InterfaceKind),
}

/// Outbound side of a collaborator.
pub trait Interface: Send {
    fn kind(&self) -> InterfaceKind;

    /// Hand a message to the collaborator without waiting.
    fn send(&mut self, msg: Message) -> Result<(), InterfaceError>;
}

/// Sending half of a channel-backed interface.
pub type MessageTx = mpsc::Sender<Message>;

/// Receiving half of a channel-backed interface.
pub type MessageRx = mpsc::Receiver<Message>;

/// Interface backed by a bounded tokio channel.
#[derive(Debug)]
pub struct ChannelInterface {
    kind: InterfaceKind,
    tx: MessageTx,
}

impl ChannelInterface {
    pub fn new(kind: InterfaceKind, tx: MessageTx) -> Self {
        Self { kind, tx }
    }
}

impl Interface for ChannelInterface {
    fn kind(&self) -> InterfaceKind {
        self.kind
    }

    fn send(&mut self, msg: Message) -> Result<(), InterfaceError> {
        self.tx.try_send(msg).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => InterfaceError::QueueFull(self.kind),
            mpsc::error::TrySendError::Closed(_) => InterfaceError::Closed(self.kind),
        })
    }
}

/// Create a channel-backed interface and the receiver its collaborator
/// reads from.
pub fn interface_channel(kind: InterfaceKind, buffer: usize) -> (ChannelInterface, MessageRx) {
    let (tx, rx) = mpsc::channel(buffer);
    (ChannelInterface::new(kind, tx), rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_interface_delivers() {
        let (mut iface, mut rx) = interface_channel(InterfaceKind::Tunnel, 4);
        assert_eq!(iface.kind(), InterfaceKind::Tunnel);

        iface.send(Message::new(b"hello")).unwrap();
        let msg = rx.recv().await.unwrap();
        assert_eq!(msg.bytes(), b"hello");
    }

    #[test]
    fn test_channel_interface_full() {
        let (mut iface, _rx) = interface_channel(InterfaceKind::Switch, 1);
        iface.send(Message::new(b"a")).unwrap();
        assert_eq!(
            iface.send(Message::new(b"b")),
            Err(InterfaceError::QueueFull(InterfaceKind::Switch))
        );
    }

    #[test]
    fn test_channel_interface_closed() {
        let (mut iface, rx) = interface_channel(InterfaceKind::ControlPlane, 1);
        drop(rx);
        assert_eq!(
            iface.send(Message::new(b"a")),
            Err(InterfaceError::Closed(InterfaceKind::ControlPlane))
        );
    }
}

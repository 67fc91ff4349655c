//! Supernode Discovery
//!
//! The [`SupernodeHunter`] walks the peer set in rounds. Each target is
//! first asked for a supernode; if it knows none, it is asked for its
//! peers, which become targets of the following round. Supernodes found
//! along the way are kept in an [`AddrSet`] that other components read
//! through snapshots.

mod addr_set;
mod hunter;
mod wire;


pub use addr_set::{AddrSet, AddrSnapshot, AddressFamily};
pub use hunter::{DiscoveryState, ProbePhase, SupernodeHunter};
pub use wire::{
    DiscoveryMessage, ProtocolError, Query, QueryKind, Reply, ReplyBody, MAX_ADDRS_PER_MESSAGE,
    MSG_FIND_SUPERNODE, MSG_GET_PEERS, MSG_PEERS_REPLY, MSG_SUPERNODE_REPLY,
};

use std::net::SocketAddr;
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors from supernode set management.
///
/// Each variant maps to a fixed negative status code; see [`result_code`].
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum SnodeError {
    #[error("address family of {0} is not enabled")]
    InvalidFamily(SocketAddr),

    #[error("{0} already present")]
    AlreadyExists(SocketAddr),

    #[error("{0} not found")]
    NotFound(SocketAddr),
}

impl SnodeError {
    pub fn code(&self) -> i32 {
        match self {
            SnodeError::InvalidFamily(_) => -1,
            SnodeError::AlreadyExists(_) => -2,
            SnodeError::NotFound(_) => -3,
        }
    }
}

/// Status code for a supernode operation: the index on success, the
/// error's negative code otherwise.
pub fn result_code(result: &Result<usize, SnodeError>) -> i32 {
    match result {
        Ok(index) => i32::try_from(*index).unwrap_or(i32::MAX),
        Err(e) => e.code(),
    }
}

/// Errors from the discovery transport.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("query queue full")]
    QueueFull,

    #[error("query channel closed")]
    Closed,

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

/// Outbound side of the control-plane query transport.
pub trait QuerySender: Send {
    fn send_query(&mut self, to: SocketAddr, query: &Query) -> Result<(), DiscoveryError>;

    fn send_reply(&mut self, to: SocketAddr, reply: &Reply) -> Result<(), DiscoveryError>;
}

/// An encoded discovery message and its destination.
pub type QueryTx = mpsc::Sender<(SocketAddr, Vec<u8>)>;
pub type QueryRx = mpsc::Receiver<(SocketAddr, Vec<u8>)>;

/// [`QuerySender`] that hands encoded messages to a bounded channel.
#[derive(Debug)]
pub struct ChannelQuerySender {
    tx: QueryTx,
}

impl ChannelQuerySender {
    pub fn new(tx: QueryTx) -> Self {
        Self { tx }
    }

    fn send(&mut self, to: SocketAddr, msg: DiscoveryMessage) -> Result<(), DiscoveryError> {
        self.tx.try_send((to, msg.encode())).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DiscoveryError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => DiscoveryError::Closed,
        })
    }
}

impl QuerySender for ChannelQuerySender {
    fn send_query(&mut self, to: SocketAddr, query: &Query) -> Result<(), DiscoveryError> {
        self.send(to, DiscoveryMessage::Query(*query))
    }

    fn send_reply(&mut self, to: SocketAddr, reply: &Reply) -> Result<(), DiscoveryError> {
        self.send(to, DiscoveryMessage::Reply(reply.clone()))
    }
}

/// Create a channel-backed query sender and the receiver the transport
/// drains.
pub fn query_channel(buffer: usize) -> (ChannelQuerySender, QueryRx) {
    let (tx, rx) = mpsc::channel(buffer);
    (ChannelQuerySender::new(tx), rx)
}

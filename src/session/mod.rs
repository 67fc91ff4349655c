//! Session Table
//!
//! One encrypted session per remote peer, keyed by peer [`Address`] and
//! indexed by the local receive handle carried in data frames. The table
//! owns every session and its channel; dispatch code borrows them.

mod index;

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use tracing::debug;

use crate::channel::{ChannelError, ChannelFactory, HandshakeStatus, SecureChannel};
use crate::identity::{Address, IdentityError};
use crate::interface::InterfaceKind;
use crate::wire::SwitchLabel;

pub use index::{HandleAllocator, HandleError, SessionHandle};

/// Errors from session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("handle error: {0}")]
    Handle(#[from] HandleError),

    #[error("no session for handle {0}")]
    UnknownHandle(SessionHandle),

    #[error("session table full ({max} sessions)")]
    TableFull { max: usize },

    #[error("invalid peer key: {0}")]
    InvalidPeerKey(#[from] IdentityError),
}

/// An encrypted session with one remote peer.
pub struct Session {
    id: u64,
    peer: Address,
    handle: SessionHandle,
    channel: Box<dyn SecureChannel>,
    origin: InterfaceKind,
    created_at_ms: u64,
    /// Last successful encrypt or decrypt. Drives idle expiry.
    last_activity_ms: u64,
    /// Switch label of the most recent authenticated inbound frame.
    label: Option<SwitchLabel>,
}

impl Session {
    fn new(
        id: u64,
        peer: Address,
        handle: SessionHandle,
        channel: Box<dyn SecureChannel>,
        origin: InterfaceKind,
        now_ms: u64,
    ) -> Self {
        Self {
            id,
            peer,
            handle,
            channel,
            origin,
            created_at_ms: now_ms,
            last_activity_ms: now_ms,
            label: None,
        }
    }

    /// Table-unique identifier, increasing with creation order.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn peer(&self) -> &Address {
        &self.peer
    }

    pub fn handle(&self) -> SessionHandle {
        self.handle
    }

    /// Interface whose traffic caused this session to be created.
    pub fn origin(&self) -> InterfaceKind {
        self.origin
    }

    pub fn created_at_ms(&self) -> u64 {
        self.created_at_ms
    }

    pub fn last_activity_ms(&self) -> u64 {
        self.last_activity_ms
    }

    pub fn touch(&mut self, now_ms: u64) {
        self.last_activity_ms = now_ms;
    }

    /// Reply path learned from inbound traffic.
    pub fn label(&self) -> Option<SwitchLabel> {
        self.label
    }

    pub fn set_label(&mut self, label: SwitchLabel) {
        self.label = Some(label);
    }

    pub fn status(&self) -> HandshakeStatus {
        self.channel.status()
    }

    pub fn is_established(&self) -> bool {
        self.channel.status() == HandshakeStatus::Established
    }

    /// Seal a payload for the peer.
    pub fn encrypt(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, ChannelError> {
        self.channel.encrypt(plaintext)
    }

    /// Open a frame from the peer.
    pub fn decrypt(&mut self, frame: &[u8]) -> Result<Vec<u8>, ChannelError> {
        self.channel.decrypt(frame)
    }

    fn is_idle(&self, now_ms: u64, idle_timeout_ms: u64) -> bool {
        now_ms.saturating_sub(self.last_activity_ms) >= idle_timeout_ms
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("peer", &self.peer.short())
            .field("handle", &self.handle)
            .field("status", &self.channel.status())
            .field("origin", &self.origin)
            .field("label", &self.label)
            .finish()
    }
}

/// Peer address to session map with a receive-handle index.
pub struct SessionTable {
    sessions: HashMap<Address, Session>,
    by_handle: HashMap<SessionHandle, Address>,
    handles: HandleAllocator,
    factory: Box<dyn ChannelFactory>,
    next_id: u64,
    /// Maximum live sessions; 0 means unbounded.
    max_sessions: usize,
}

impl SessionTable {
    pub fn new(factory: Box<dyn ChannelFactory>, max_sessions: usize) -> Self {
        Self {
            sessions: HashMap::new(),
            by_handle: HashMap::new(),
            handles: HandleAllocator::new(),
            factory,
            next_id: 1,
            max_sessions,
        }
    }

    /// Return the session with `peer`, creating it if none exists.
    ///
    /// A new session gets a fresh handle and a channel in
    /// [`HandshakeStatus::New`]; the handshake proceeds with the first
    /// frames exchanged.
    pub fn lookup_or_create(
        &mut self,
        peer: &Address,
        origin: InterfaceKind,
        now_ms: u64,
    ) -> Result<&mut Session, SessionError> {
        let live = self.sessions.len();
        match self.sessions.entry(*peer) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                if self.max_sessions > 0 && live >= self.max_sessions {
                    return Err(SessionError::TableFull {
                        max: self.max_sessions,
                    });
                }

                let handle = self.handles.allocate()?;
                let channel = match self.factory.open(peer, handle) {
                    Ok(channel) => channel,
                    Err(e) => {
                        let _ = self.handles.free(handle);
                        return Err(e.into());
                    }
                };

                let id = self.next_id;
                self.next_id += 1;
                self.by_handle.insert(handle, *peer);

                debug!(
                    peer = %peer.short(),
                    id,
                    handle = %handle,
                    origin = ?origin,
                    "Session created"
                );
                Ok(entry.insert(Session::new(id, *peer, handle, channel, origin, now_ms)))
            }
        }
    }

    pub fn get(&self, peer: &Address) -> Option<&Session> {
        self.sessions.get(peer)
    }

    pub fn get_mut(&mut self, peer: &Address) -> Option<&mut Session> {
        self.sessions.get_mut(peer)
    }

    pub fn contains(&self, peer: &Address) -> bool {
        self.sessions.contains_key(peer)
    }

    /// Resolve a receive handle to the owning peer.
    pub fn peer_for_handle(&self, handle: SessionHandle) -> Result<Address, SessionError> {
        self.by_handle
            .get(&handle)
            .copied()
            .ok_or(SessionError::UnknownHandle(handle))
    }

    /// Remove the session with `peer`, releasing its handle.
    ///
    /// Other sessions are untouched. A later lookup creates a new session.
    pub fn evict(&mut self, peer: &Address) -> Option<Session> {
        let session = self.sessions.remove(peer)?;
        self.by_handle.remove(&session.handle);
        let _ = self.handles.free(session.handle);
        debug!(peer = %peer.short(), id = session.id, "Session evicted");
        Some(session)
    }

    /// Evict every session idle for at least `idle_timeout_ms`.
    pub fn expire_idle(&mut self, now_ms: u64, idle_timeout_ms: u64) -> Vec<Address> {
        let idle: Vec<Address> = self
            .sessions
            .values()
            .filter(|s| s.is_idle(now_ms, idle_timeout_ms))
            .map(|s| s.peer)
            .collect();

        for peer in &idle {
            self.evict(peer);
        }
        idle
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }
}

impl fmt::Debug for SessionTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionTable")
            .field("sessions", &self.sessions.len())
            .field("max_sessions", &self.max_sessions)
            .field("next_id", &self.next_id)
            .finish()
    }
}

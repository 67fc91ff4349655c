//! Peer session nonces that have already keyed a channel.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};

use super::SessionNonce;
use crate::identity::Address;

/// Peers remembered at most; the oldest is forgotten first.
pub const NONCE_LOG_PEERS: usize = 4096;

/// Session nonces remembered per peer.
pub const NONCE_LOG_PER_PEER: usize = 16;

#[derive(Debug, Default)]
struct Inner {
    peers: HashMap<Address, VecDeque<(SessionNonce, u64)>>,
    order: VecDeque<Address>,
}

/// Highest counter accepted under each peer session nonce.
///
/// Shared by every channel one factory opens. A channel retires its peer's
/// nonce here when the peer restarts or the channel is dropped, and checks
/// it before accepting a Hello under a nonce it does not hold, so frames
/// captured from a torn-down session cannot open a new one.
#[derive(Clone, Debug, Default)]
pub struct NonceLog {
    inner: Arc<Mutex<Inner>>,
}

impl NonceLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Highest counter recorded for `nonce` from `peer`.
    pub fn highest(&self, peer: &Address, nonce: &SessionNonce) -> Option<u64> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner
            .peers
            .get(peer)?
            .iter()
            .find(|(n, _)| n == nonce)
            .map(|&(_, highest)| highest)
    }

    /// Record that `peer` has used counters up to `highest` under `nonce`.
    pub fn record(&self, peer: &Address, nonce: SessionNonce, highest: u64) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let Inner { peers, order } = &mut *inner;

        if !peers.contains_key(peer) {
            order.push_back(*peer);
            if order.len() > NONCE_LOG_PEERS
                && let Some(oldest) = order.pop_front()
            {
                peers.remove(&oldest);
            }
        }

        let nonces = peers.entry(*peer).or_default();
        if let Some(entry) = nonces.iter_mut().find(|(n, _)| *n == nonce) {
            entry.1 = entry.1.max(highest);
            return;
        }
        nonces.push_back((nonce, highest));
        if nonces.len() > NONCE_LOG_PER_PEER {
            nonces.pop_front();
        }
    }

    /// Number of peers with recorded nonces.
    pub fn peer_count(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .peers
            .len()
    }
}

//! Two-phase supernode probe.

use rand::Rng;
use std::collections::HashMap;
use std::net::SocketAddr;
use tokio::sync::watch;
use tracing::{debug, info, trace};

use super::{
    AddrSet, AddrSnapshot, AddressFamily, DiscoveryError, DiscoveryMessage, Query, QueryKind,
    QuerySender, Reply, ReplyBody, SnodeError, MAX_ADDRS_PER_MESSAGE,
};
use crate::config::DiscoveryConfig;

/// How far a target has progressed in the current round.
///
/// Phases only move forward within a round.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum ProbePhase {
    Pending,
    FindNodeSent,
    GetPeersSent,
    Done,
}

/// Per-target probe bookkeeping for one round.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DiscoveryState {
    pub phase: ProbePhase,
    /// When the last query to this target went out.
    pub last_query_ms: Option<u64>,
    /// Failed to send or timed out; waits for the next round.
    pub stalled: bool,
}

impl DiscoveryState {
    fn new() -> Self {
        Self {
            phase: ProbePhase::Pending,
            last_query_ms: None,
            stalled: false,
        }
    }

    fn settled(&self) -> bool {
        self.phase == ProbePhase::Done || self.stalled
    }

    fn timed_out(&self, now_ms: u64, timeout_ms: u64) -> bool {
        self.last_query_ms
            .is_some_and(|sent| now_ms.saturating_sub(sent) >= timeout_ms)
    }
}

#[derive(Debug, Default)]
struct Round {
    number: u64,
    started_ms: u64,
    /// Frozen at round start.
    targets: Vec<SocketAddr>,
    states: HashMap<SocketAddr, DiscoveryState>,
    cursor: usize,
}

#[derive(Clone, Copy, Debug)]
struct PendingQuery {
    target: SocketAddr,
    kind: QueryKind,
    round: u64,
}

/// Drives supernode discovery over the peer set.
pub struct SupernodeHunter {
    config: DiscoveryConfig,
    snodes: AddrSet,
    peers: AddrSet,
    /// Addresses learned from GetPeers replies, probed next round.
    next_round: AddrSet,
    round: Round,
    pending: HashMap<u32, PendingQuery>,
    sender: Box<dyn QuerySender>,
    next_txid: u32,
    snode_tx: watch::Sender<AddrSnapshot>,
}

impl SupernodeHunter {
    /// Create a hunter seeded with the configured supernodes and peers.
    pub fn new(config: DiscoveryConfig, sender: Box<dyn QuerySender>) -> Self {
        let (snode_tx, _) = watch::channel(AddrSnapshot::default());
        let seeds = config.supernodes.clone();
        let peers = config.peers.clone();

        let mut hunter = Self {
            config,
            snodes: AddrSet::new(),
            peers: AddrSet::new(),
            next_round: AddrSet::new(),
            round: Round::default(),
            pending: HashMap::new(),
            sender,
            next_txid: rand::rng().random(),
            snode_tx,
        };

        for addr in seeds {
            if let Err(e) = hunter.add_snode(addr) {
                debug!(addr = %addr, error = %e, "Configured supernode skipped");
            }
        }
        for addr in peers {
            if let Err(e) = hunter.add_peer(addr) {
                debug!(addr = %addr, error = %e, "Configured peer skipped");
            }
        }
        hunter
    }

    // === Supernode set ===

    pub fn add_snode(&mut self, addr: SocketAddr) -> Result<usize, SnodeError> {
        self.check_family(addr)?;
        let index = self.snodes.add(addr)?;
        self.publish();
        info!(snode = %addr, index, "Supernode added");
        Ok(index)
    }

    pub fn remove_snode(&mut self, addr: &SocketAddr) -> Result<usize, SnodeError> {
        let index = self.snodes.remove(addr)?;
        self.publish();
        info!(snode = %addr, "Supernode removed");
        Ok(index)
    }

    pub fn list_snodes(&self) -> AddrSnapshot {
        self.snodes.snapshot()
    }

    /// Receiver that sees every new supernode snapshot.
    pub fn snode_watch(&self) -> watch::Receiver<AddrSnapshot> {
        self.snode_tx.subscribe()
    }

    // === Peer set ===

    /// Add a probe target. Takes effect at the next round.
    pub fn add_peer(&mut self, addr: SocketAddr) -> Result<usize, SnodeError> {
        self.check_family(addr)?;
        self.peers.add(addr)
    }

    pub fn remove_peer(&mut self, addr: &SocketAddr) -> Result<usize, SnodeError> {
        self.peers.remove(addr)
    }

    pub fn list_peers(&self) -> AddrSnapshot {
        self.peers.snapshot()
    }

    // === Round introspection ===

    pub fn round_number(&self) -> u64 {
        self.round.number
    }

    pub fn round_targets(&self) -> &[SocketAddr] {
        &self.round.targets
    }

    /// Addresses queued for the next round.
    pub fn queued(&self) -> AddrSnapshot {
        self.next_round.snapshot()
    }

    pub fn probe_state(&self, addr: &SocketAddr) -> Option<DiscoveryState> {
        self.round.states.get(addr).copied()
    }

    pub fn phase_of(&self, addr: &SocketAddr) -> Option<ProbePhase> {
        self.probe_state(addr).map(|s| s.phase)
    }

    pub fn pending_queries(&self) -> usize {
        self.pending.len()
    }

    /// True when every target is done or stalled, the round has outlived
    /// its timeout, or there is nothing to probe.
    pub fn round_complete(&self, now_ms: u64) -> bool {
        if self.round.targets.is_empty() {
            return true;
        }
        let limit = self.config.round_timeout_ms();
        if limit > 0 && now_ms.saturating_sub(self.round.started_ms) >= limit {
            return true;
        }
        self.round.states.values().all(DiscoveryState::settled)
    }

    // === Driving ===

    /// Advance discovery: roll the round over if it is complete, then send
    /// the queries that are due.
    pub fn tick(&mut self, now_ms: u64) {
        if self.round_complete(now_ms) {
            self.start_round(now_ms);
        }
        self.probe(now_ms);
    }

    /// Apply a reply. Returns false if it was ignored.
    pub fn handle_reply(&mut self, from: SocketAddr, reply: Reply, now_ms: u64) -> bool {
        let Some(pending) = self.pending.get(&reply.txid).copied() else {
            trace!(from = %from, txid = reply.txid, "Reply for unknown transaction");
            return false;
        };
        if pending.target != from || pending.round != self.round.number {
            debug!(
                from = %from,
                expected = %pending.target,
                txid = reply.txid,
                "Reply from wrong source or round ignored"
            );
            return false;
        }

        match (pending.kind, reply.body) {
            (QueryKind::FindSupernode, ReplyBody::Supernodes(found)) => {
                let usable: Vec<SocketAddr> = found
                    .into_iter()
                    .filter(|a| self.check_family(*a).is_ok())
                    .collect();
                if usable.is_empty() {
                    let waiting = self
                        .probe_state(&from)
                        .is_some_and(|s| s.phase == ProbePhase::FindNodeSent && !s.stalled);
                    if waiting {
                        self.send_query(from, QueryKind::GetPeers, now_ms);
                    }
                } else {
                    for addr in usable {
                        self.learn_snode(addr);
                    }
                    self.advance(&from, ProbePhase::Done);
                }
            }
            (QueryKind::GetPeers, ReplyBody::Peers(addrs)) => {
                for addr in addrs {
                    self.enqueue(from, addr);
                }
                self.advance(&from, ProbePhase::Done);
            }
            (kind, _) => {
                debug!(from = %from, ?kind, "Reply does not match query kind");
                return false;
            }
        }

        self.pending.remove(&reply.txid);
        true
    }

    /// Process an encoded discovery message: queries are answered, replies
    /// applied.
    pub fn handle_message(
        &mut self,
        from: SocketAddr,
        data: &[u8],
        now_ms: u64,
    ) -> Result<(), DiscoveryError> {
        match DiscoveryMessage::decode(data)? {
            DiscoveryMessage::Query(query) => {
                let reply = self.answer(&query);
                self.sender.send_reply(from, &reply)?;
            }
            DiscoveryMessage::Reply(reply) => {
                self.handle_reply(from, reply, now_ms);
            }
        }
        Ok(())
    }

    /// Build the reply this node gives to `query`.
    pub fn answer(&self, query: &Query) -> Reply {
        let body = match query.kind {
            QueryKind::FindSupernode => ReplyBody::Supernodes(first_addrs(&self.snodes)),
            QueryKind::GetPeers => ReplyBody::Peers(first_addrs(&self.peers)),
        };
        Reply {
            txid: query.txid,
            body,
        }
    }

    // === Internals ===

    fn check_family(&self, addr: SocketAddr) -> Result<(), SnodeError> {
        if self.config.allows(AddressFamily::of(&addr)) {
            Ok(())
        } else {
            Err(SnodeError::InvalidFamily(addr))
        }
    }

    fn publish(&self) {
        self.snode_tx.send_replace(self.snodes.snapshot());
    }

    fn start_round(&mut self, now_ms: u64) {
        let peers = self.peers.snapshot();
        let queued = self.next_round.snapshot();
        let mut targets: Vec<SocketAddr> = Vec::with_capacity(peers.len() + queued.len());
        for addr in peers.iter().chain(queued.iter()) {
            if !targets.contains(addr) {
                targets.push(*addr);
            }
        }
        if targets.is_empty() && self.round.targets.is_empty() {
            return;
        }

        self.next_round.clear();
        self.pending.clear();

        let number = self.round.number + 1;
        let states = targets.iter().map(|a| (*a, DiscoveryState::new())).collect();
        self.round = Round {
            number,
            started_ms: now_ms,
            targets,
            states,
            cursor: 0,
        };

        debug!(
            round = number,
            targets = self.round.targets.len(),
            snodes = self.snodes.len(),
            "Discovery round started"
        );
    }

    fn probe(&mut self, now_ms: u64) {
        let count = self.round.targets.len();
        if count == 0 {
            return;
        }
        let budget = match self.config.probes_per_tick {
            0 => usize::MAX,
            n => n,
        };
        let timeout = self.config.query_timeout_ms;

        let mut sent = 0;
        for _ in 0..count {
            if sent >= budget {
                break;
            }
            let addr = self.round.targets[self.round.cursor];
            self.round.cursor = (self.round.cursor + 1) % count;

            let Some(state) = self.round.states.get_mut(&addr) else {
                continue;
            };
            if state.stalled {
                continue;
            }
            let kind = match state.phase {
                ProbePhase::Pending => QueryKind::FindSupernode,
                ProbePhase::FindNodeSent if state.timed_out(now_ms, timeout) => QueryKind::GetPeers,
                ProbePhase::GetPeersSent if state.timed_out(now_ms, timeout) => {
                    state.stalled = true;
                    debug!(addr = %addr, round = self.round.number, "Discovery target stalled");
                    continue;
                }
                _ => continue,
            };

            self.send_query(addr, kind, now_ms);
            sent += 1;
        }
    }

    fn send_query(&mut self, to: SocketAddr, kind: QueryKind, now_ms: u64) {
        let txid = self.next_txid;
        self.next_txid = self.next_txid.wrapping_add(1);

        let result = self.sender.send_query(to, &Query { txid, kind });
        let round = self.round.number;
        let Some(state) = self.round.states.get_mut(&to) else {
            return;
        };

        match result {
            Ok(()) => {
                state.phase = match kind {
                    QueryKind::FindSupernode => ProbePhase::FindNodeSent,
                    QueryKind::GetPeers => ProbePhase::GetPeersSent,
                };
                state.last_query_ms = Some(now_ms);
                self.pending.insert(txid, PendingQuery { target: to, kind, round });
                trace!(addr = %to, ?kind, txid, round, "Discovery query sent");
            }
            Err(e) => {
                state.stalled = true;
                debug!(addr = %to, ?kind, error = %e, "Discovery query not sent");
            }
        }
    }

    fn advance(&mut self, addr: &SocketAddr, phase: ProbePhase) {
        if let Some(state) = self.round.states.get_mut(addr)
            && phase > state.phase
        {
            state.phase = phase;
        }
    }

    fn learn_snode(&mut self, addr: SocketAddr) {
        if let Ok(index) = self.snodes.add(addr) {
            self.publish();
            info!(snode = %addr, index, round = self.round.number, "Supernode discovered");
        }
    }

    fn enqueue(&mut self, from: SocketAddr, addr: SocketAddr) {
        if addr == from || self.snodes.contains(&addr) || self.check_family(addr).is_err() {
            return;
        }
        if self.next_round.add(addr).is_ok() {
            trace!(addr = %addr, via = %from, "Queued for next round");
        }
    }
}

fn first_addrs(set: &AddrSet) -> Vec<SocketAddr> {
    set.snapshot()
        .iter()
        .take(MAX_ADDRS_PER_MESSAGE)
        .copied()
        .collect()
}

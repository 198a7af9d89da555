use libp2p_identity::PeerId;
use parking_lot::Mutex;
use rand::seq::IteratorRandom;
/// Peer manager for sync operations.
///
/// Tracks which peers can serve which protocol, whether they are busy, and which ones are
/// serving a ban for misbehaviour.
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::types::{EthProtocol, SnapProtocol};

/// Peer pool shared by every fetcher of a sync run.
pub type SharedPeerManager = Arc<Mutex<PeerManager>>;

/// Sync-specific peer state.
///
/// A peer is handed to at most one job at a time: `idle` is cleared on dispatch and set again
/// when the job settles.
#[derive(Clone)]
pub struct SyncPeer {
    pub peer_id: PeerId,
    pub idle: bool,
    pub banned_until: Option<Instant>,
    pub eth: Option<Arc<dyn EthProtocol>>,
    pub snap: Option<Arc<dyn SnapProtocol>>,
}

impl fmt::Debug for SyncPeer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncPeer")
            .field("peer_id", &self.peer_id)
            .field("idle", &self.idle)
            .field("banned_until", &self.banned_until)
            .field("eth", &self.eth.is_some())
            .field("snap", &self.snap.is_some())
            .finish()
    }
}

impl SyncPeer {
    pub fn new(peer_id: PeerId) -> Self {
        Self {
            peer_id,
            idle: true,
            banned_until: None,
            eth: None,
            snap: None,
        }
    }

    pub fn with_eth(mut self, eth: Arc<dyn EthProtocol>) -> Self {
        self.eth = Some(eth);
        self
    }

    pub fn with_snap(mut self, snap: Arc<dyn SnapProtocol>) -> Self {
        self.snap = Some(snap);
        self
    }

    /// Check if peer is serving a ban at `now`.
    pub fn is_banned(&self, now: Instant) -> bool {
        self.banned_until.is_some_and(|until| until > now)
    }

    /// Check if peer can take a new job.
    pub fn is_available(&self, now: Instant) -> bool {
        self.idle && !self.is_banned(now)
    }
}

/// Peer manager for sync operations.
#[derive(Debug, Default)]
pub struct PeerManager {
    peers: HashMap<PeerId, SyncPeer>,
}

impl PeerManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared(self) -> SharedPeerManager {
        Arc::new(Mutex::new(self))
    }

    /// Add a peer to the manager. An already known peer keeps its state.
    pub fn add_peer(&mut self, peer: SyncPeer) -> &mut SyncPeer {
        self.peers.entry(peer.peer_id).or_insert(peer)
    }

    /// Remove a peer from the manager.
    pub fn remove_peer(&mut self, peer_id: &PeerId) -> Option<SyncPeer> {
        self.peers.remove(peer_id)
    }

    /// Get a peer by ID.
    pub fn get_peer(&self, peer_id: &PeerId) -> Option<&SyncPeer> {
        self.peers.get(peer_id)
    }

    pub fn contains(&self, peer_id: &PeerId) -> bool {
        self.peers.contains_key(peer_id)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Pick a random idle, unbanned peer accepted by `filter`.
    pub fn idle_peer(&self, filter: impl Fn(&SyncPeer) -> bool) -> Option<SyncPeer> {
        let now = Instant::now();
        self.peers
            .values()
            .filter(|peer| peer.is_available(now) && filter(peer))
            .choose(&mut rand::thread_rng())
            .cloned()
    }

    pub fn idle_count(&self) -> usize {
        let now = Instant::now();
        self.peers.values().filter(|peer| peer.is_available(now)).count()
    }

    pub fn set_idle(&mut self, peer_id: &PeerId, idle: bool) {
        if let Some(peer) = self.peers.get_mut(peer_id) {
            peer.idle = idle;
        }
    }

    /// Keep a peer out of selection for `duration`.
    pub fn ban(&mut self, peer_id: &PeerId, duration: Duration) {
        if let Some(peer) = self.peers.get_mut(peer_id) {
            debug!(peer = %peer_id, ban_ms = duration.as_millis() as u64, "Banning peer");
            peer.banned_until = Some(Instant::now() + duration);
            peer.idle = true;
        }
    }

    pub fn is_banned(&self, peer_id: &PeerId) -> bool {
        self.peers
            .get(peer_id)
            .is_some_and(|peer| peer.is_banned(Instant::now()))
    }

    /// Get all tracked peers.
    pub fn get_all_peers(&self) -> impl Iterator<Item = &SyncPeer> {
        self.peers.values()
    }
}

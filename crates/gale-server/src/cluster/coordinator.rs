//! Peer registry and least-loaded selection.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use gale_core::{ConnectionId, HmacSigner, Signer};
use metrics::{counter, gauge};
use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::ClusterError;

const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

type LoadFn = dyn Fn() -> i64 + Send + Sync;

/// Last known state of a joined peer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PeerStatus {
    /// System-plane connection the peer joined on.
    pub peer_id: ConnectionId,
    /// Address clients should dial to reach the peer.
    pub address: String,
    /// Load from the most recent report.
    pub load: i64,
    /// When the peer last joined or reported.
    pub last_report: Instant,
}

#[derive(Debug, Clone)]
struct Candidate<'a> {
    load: i64,
    last_report: Instant,
    address: &'a str,
}

impl Candidate<'_> {
    fn rank(&self, other: &Self) -> Ordering {
        (self.load, self.last_report, self.address)
            .cmp(&(other.load, other.last_report, other.address))
    }
}

/// Cluster state of one server: who joined, how loaded they are, and where
/// new clients should go.
pub struct Coordinator {
    self_address: RwLock<String>,
    started: Instant,
    network_key: String,
    remove_interval: Duration,
    signer: Arc<dyn Signer>,
    load: Box<LoadFn>,
    peers: RwLock<HashMap<ConnectionId, PeerStatus>>,
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("self_address", &*self.self_address.read())
            .field("remove_interval", &self.remove_interval)
            .field("peers", &self.peers.read().len())
            .finish_non_exhaustive()
    }
}

impl Coordinator {
    /// New coordinator. `load` reports this server's own current load.
    pub fn new(
        network_key: impl Into<String>,
        remove_interval: Duration,
        load: impl Fn() -> i64 + Send + Sync + 'static,
    ) -> Self {
        Self {
            self_address: RwLock::new(String::new()),
            started: Instant::now(),
            network_key: network_key.into(),
            remove_interval,
            signer: Arc::new(HmacSigner),
            load: Box::new(load),
            peers: RwLock::new(HashMap::new()),
        }
    }

    /// Address this server advertises.
    pub fn self_address(&self) -> String {
        self.self_address.read().clone()
    }

    /// Set the advertised address once the listener is bound.
    pub fn set_self_address(&self, address: impl Into<String>) {
        *self.self_address.write() = address.into();
    }

    /// This server's current load.
    pub fn self_load(&self) -> i64 {
        (self.load)()
    }

    /// Signature a peer must present to join with `address`.
    pub fn sign(&self, address: &str) -> String {
        self.signer.sign(address, &self.network_key)
    }

    /// Register a peer that presented a valid signature for `address`.
    pub fn join(
        &self,
        peer_id: ConnectionId,
        address: &str,
        signature: &str,
    ) -> Result<(), ClusterError> {
        if !self.signer.verify(address, &self.network_key, signature) {
            counter!("gale_cluster_joins_total", "outcome" => "rejected").increment(1);
            warn!(peer_id = %peer_id, address, "join rejected: invalid sign");
            return Err(ClusterError::InvalidSign);
        }
        let status = PeerStatus {
            peer_id: peer_id.clone(),
            address: address.to_owned(),
            load: 0,
            last_report: Instant::now(),
        };
        let count = {
            let mut peers = self.peers.write();
            let _ = peers.insert(peer_id.clone(), status);
            peers.len()
        };
        counter!("gale_cluster_joins_total", "outcome" => "accepted").increment(1);
        gauge!("gale_cluster_peers").set(count as f64);
        info!(peer_id = %peer_id, address, peers = count, "peer joined");
        Ok(())
    }

    /// Record a load report from a joined peer.
    pub fn report(&self, peer_id: &ConnectionId, load: i64) -> Result<(), ClusterError> {
        let mut peers = self.peers.write();
        let status = peers.get_mut(peer_id).ok_or(ClusterError::NotJoined)?;
        status.load = load;
        status.last_report = Instant::now();
        debug!(peer_id = %peer_id, load, "peer reported");
        Ok(())
    }

    /// Answer `/get_low_load_server_addr`: empty when the caller does not
    /// want a new address, otherwise the least-loaded known server.
    pub fn low_load_address(&self, wants_new_address: bool) -> String {
        if !wants_new_address {
            return String::new();
        }
        let address = self.select_low_load(Instant::now());
        if address != *self.self_address.read() {
            counter!("gale_cluster_redirects_total").increment(1);
        }
        address
    }

    /// Least-loaded non-stale server at `now`, ordered by
    /// `(load, last_report, address)`. This server always takes part.
    pub fn select_low_load(&self, now: Instant) -> String {
        let self_address = self.self_address.read().clone();
        let mine = Candidate {
            load: self.self_load(),
            last_report: self.started,
            address: &self_address,
        };
        let peers = self.peers.read();
        peers
            .values()
            .filter(|p| !self.is_stale(p, now))
            .map(|p| Candidate {
                load: p.load,
                last_report: p.last_report,
                address: &p.address,
            })
            .fold(mine, |best, c| if c.rank(&best).is_lt() { c } else { best })
            .address
            .to_owned()
    }

    fn is_stale(&self, peer: &PeerStatus, now: Instant) -> bool {
        now.saturating_duration_since(peer.last_report) > self.remove_interval
    }

    /// Remove peers that have been silent longer than the remove interval.
    /// Returns how many were removed.
    pub fn sweep(&self, now: Instant) -> usize {
        let (removed, remaining) = {
            let mut peers = self.peers.write();
            let before = peers.len();
            peers.retain(|_, p| !self.is_stale(p, now));
            (before - peers.len(), peers.len())
        };
        if removed > 0 {
            counter!("gale_cluster_evictions_total").increment(removed as u64);
            gauge!("gale_cluster_peers").set(remaining as f64);
            info!(removed, remaining, "evicted stale peers");
        }
        removed
    }

    /// Snapshot of joined peers.
    pub fn peers(&self) -> Vec<PeerStatus> {
        let mut peers: Vec<_> = self.peers.read().values().cloned().collect();
        peers.sort_by(|a, b| a.address.cmp(&b.address));
        peers
    }

    /// Number of joined peers.
    pub fn peer_count(&self) -> usize {
        self.peers.read().len()
    }

    /// Whether `peer_id` has joined.
    pub fn is_joined(&self, peer_id: &ConnectionId) -> bool {
        self.peers.read().contains_key(peer_id)
    }

    /// Interval between sweeps: half the remove interval, at least one second.
    pub fn sweep_interval(&self) -> Duration {
        (self.remove_interval / 2).max(MIN_SWEEP_INTERVAL)
    }

    /// Run [`Coordinator::sweep`] periodically until `cancel` fires.
    pub fn spawn_sweeper(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(coordinator.sweep_interval());
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    now = ticker.tick() => {
                        let _ = coordinator.sweep(now);
                    }
                }
            }
            debug!("peer sweep stopped");
        })
    }
}

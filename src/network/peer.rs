use crate::error::{NodeError, Result, SyncError};
use crate::storage::{EntityKind, Record};
use crate::utils::{deserialize, serialize};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeerStatus {
    Active,
    Inactive,
}

/// A known remote node. The self peer's record additionally carries the
/// wallet identity, which is persisted separately and never enters this
/// registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Peer {
    pub node_id: Uuid,
    pub ip_address: String,
    pub port: u16,
    pub status: PeerStatus,
    pub software_version: String,
    pub node_type: String,
    pub last_seen: i64,
}

impl Peer {
    pub fn new(node_id: Uuid, ip_address: String, port: u16) -> Peer {
        Peer {
            node_id,
            ip_address,
            port,
            status: PeerStatus::Inactive,
            software_version: String::new(),
            node_type: "full".to_string(),
            last_seen: 0,
        }
    }

    /// Parse an `ip:port` endpoint into a peer with a fresh placeholder
    /// id; the real node id is learned from the first envelope.
    pub fn from_endpoint(endpoint: &str) -> Result<Peer> {
        let addr: SocketAddr = endpoint.parse().map_err(|e| {
            NodeError::Sync(SyncError::PeerUnreachable(format!(
                "invalid endpoint {endpoint}: {e}"
            )))
        })?;
        Ok(Peer::new(Uuid::new_v4(), addr.ip().to_string(), addr.port()))
    }

    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.ip_address, self.port)
    }

    pub fn socket_addr(&self) -> Result<SocketAddr> {
        self.endpoint().parse().map_err(|e| {
            NodeError::Sync(SyncError::PeerUnreachable(format!(
                "invalid peer address {}: {e}",
                self.endpoint()
            )))
        })
    }
}

pub fn peer_record(peer: &Peer) -> Result<Record> {
    Ok(Record {
        id: peer.node_id.to_string(),
        kind: EntityKind::Peer,
        body: serialize(peer)?,
    })
}

pub fn peer_from_record(record: &Record) -> Result<Peer> {
    if record.kind != EntityKind::Peer {
        return Err(NodeError::Storage(format!(
            "expected a peer record, got {:?}",
            record.kind
        )));
    }
    deserialize(&record.body)
}

/// Static registry of known peers. No discovery: entries come from
/// configuration and persisted records.
pub struct PeerRegistry {
    inner: RwLock<Vec<Peer>>,
}

impl Default for PeerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PeerRegistry {
    pub fn new() -> PeerRegistry {
        PeerRegistry {
            inner: RwLock::new(Vec::new()),
        }
    }

    /// Insert a peer unless its endpoint is already registered.
    pub fn register(&self, peer: Peer) {
        let mut inner = self
            .inner
            .write()
            .expect("peer registry lock poisoned - this should never happen");
        if !inner.iter().any(|p| p.endpoint() == peer.endpoint()) {
            inner.push(peer);
        }
    }

    pub fn evict(&self, node_id: &Uuid) {
        let mut inner = self
            .inner
            .write()
            .expect("peer registry lock poisoned - this should never happen");
        inner.retain(|p| p.node_id != *node_id);
    }

    pub fn mark_active(&self, node_id: &Uuid, last_seen: i64) {
        self.with_peer(node_id, |peer| {
            peer.status = PeerStatus::Active;
            peer.last_seen = last_seen;
        });
    }

    pub fn mark_inactive(&self, node_id: &Uuid) {
        self.with_peer(node_id, |peer| {
            peer.status = PeerStatus::Inactive;
        });
    }

    pub fn peers(&self) -> Vec<Peer> {
        self.inner
            .read()
            .expect("peer registry lock poisoned - this should never happen")
            .clone()
    }

    pub fn is_known(&self, endpoint: &str) -> bool {
        self.inner
            .read()
            .expect("peer registry lock poisoned - this should never happen")
            .iter()
            .any(|p| p.endpoint() == endpoint)
    }

    pub fn len(&self) -> usize {
        self.inner
            .read()
            .expect("peer registry lock poisoned - this should never happen")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn with_peer<F: FnOnce(&mut Peer)>(&self, node_id: &Uuid, apply: F) {
        let mut inner = self
            .inner
            .write()
            .expect("peer registry lock poisoned - this should never happen");
        if let Some(peer) = inner.iter_mut().find(|p| p.node_id == *node_id) {
            apply(peer);
        }
    }
}

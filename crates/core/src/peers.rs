//! The peer liveness table.
//!
//! One record per remote participant the transport currently reports as
//! joined. The table is mutated only through the operations defined here:
//! join/leave events insert and remove, health sweeps touch and
//! mark-unresponsive. No call site reaches into records directly, which is
//! what keeps the join-event handler and the periodic sweep from racing.

use chrono::Utc;
use dashmap::DashMap;
use palaver_transport::core::transport::PeerId;
use serde::Deserialize;
use serde::Serialize;

/// Liveness state of one remote participant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerRecord {
    /// Peer identifier assigned by the transport.
    pub peer: PeerId,
    /// When the peer-join signal arrived, unix ms.
    pub joined_at_ms: i64,
    /// Last successful contact (join, pong in either direction), unix ms.
    pub last_seen_ms: i64,
    /// Cleared when a ping fails, set again on the next successful contact.
    pub responsive: bool,
    /// Last measured round trip, if any ping has completed.
    pub latency_ms: Option<u64>,
    /// Whether a local stream is currently attached to this peer.
    pub stream_attached: bool,
    /// Caller-supplied metadata (display name, public key). Opaque here.
    pub metadata: serde_json::Value,
}

/// The table of currently known peers.
#[derive(Default)]
pub struct PeerTable {
    records: DashMap<PeerId, PeerRecord>,
}

impl PeerTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly joined peer. Re-inserting an existing peer resets
    /// its record, which is what a rejoin means.
    pub fn insert(&self, peer: PeerId, metadata: serde_json::Value) {
        let now = Utc::now().timestamp_millis();
        self.records.insert(peer.clone(), PeerRecord {
            peer,
            joined_at_ms: now,
            last_seen_ms: now,
            responsive: true,
            latency_ms: None,
            stream_attached: false,
            metadata,
        });
    }

    /// Record a successful contact, optionally with a measured round trip.
    pub fn touch(&self, peer: &PeerId, latency_ms: Option<u64>) {
        if let Some(mut record) = self.records.get_mut(peer) {
            record.last_seen_ms = Utc::now().timestamp_millis();
            record.responsive = true;
            if latency_ms.is_some() {
                record.latency_ms = latency_ms;
            }
        }
    }

    /// Record a failed ping. The record stays in the table so one dropped
    /// ping does not flap the peer out; the unresponsive timeout decides.
    pub fn mark_unresponsive(&self, peer: &PeerId) {
        if let Some(mut record) = self.records.get_mut(peer) {
            record.responsive = false;
        }
    }

    /// Remove a peer from tracking, returning its last record.
    pub fn remove(&self, peer: &PeerId) -> Option<PeerRecord> {
        self.records.remove(peer).map(|(_, record)| record)
    }

    /// Flag whether a local stream is attached to this peer.
    pub fn set_stream_attached(&self, peer: &PeerId, attached: bool) {
        if let Some(mut record) = self.records.get_mut(peer) {
            record.stream_attached = attached;
        }
    }

    /// Whether the peer is currently tracked.
    pub fn contains(&self, peer: &PeerId) -> bool {
        self.records.contains_key(peer)
    }

    /// Snapshot of one record.
    pub fn get(&self, peer: &PeerId) -> Option<PeerRecord> {
        self.records.get(peer).map(|r| r.value().clone())
    }

    /// Ids of all tracked peers.
    pub fn ids(&self) -> Vec<PeerId> {
        self.records.iter().map(|r| r.key().clone()).collect()
    }

    /// Peers whose last contact is older than `timeout_ms`.
    pub fn stale(&self, timeout_ms: u64) -> Vec<PeerId> {
        let cutoff = Utc::now().timestamp_millis() - timeout_ms as i64;
        self.records
            .iter()
            .filter(|r| r.last_seen_ms < cutoff)
            .map(|r| r.key().clone())
            .collect()
    }

    /// Number of tracked peers.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Snapshot of every record.
    pub fn snapshot(&self) -> Vec<PeerRecord> {
        self.records.iter().map(|r| r.value().clone()).collect()
    }

    /// Drop every record. Used on leave.
    pub fn clear(&self) {
        self.records.clear();
    }
}

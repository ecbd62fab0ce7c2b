//! Detailed status snapshot for display layers.

use serde::Deserialize;
use serde::Serialize;

use crate::client::RoomClient;
use crate::status::ConnectionStatus;
use crate::status::TrackerQuality;

/// Point-in-time view of the client: status, peers, trackers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientInspect {
    /// Lifecycle state.
    pub status: ConnectionStatus,
    /// Identity of this client.
    pub self_id: String,
    /// Liveness view of every tracked peer.
    pub peers: Vec<PeerInspect>,
    /// Relay connectedness summary.
    pub trackers: TrackerInspect,
}

/// One peer as seen by the liveness table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerInspect {
    /// Peer identifier.
    pub peer: String,
    /// Whether the last ping was answered.
    pub responsive: bool,
    /// Last measured round trip, if any.
    pub latency_ms: Option<u64>,
    /// Last successful contact, unix ms.
    pub last_seen_ms: i64,
    /// Whether a local stream is attached to this peer.
    pub stream_attached: bool,
}

/// Relay counts and their quality classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerInspect {
    /// Relays currently connected.
    pub connected: usize,
    /// Relays configured.
    pub total: usize,
    /// Aggregate classification.
    pub quality: TrackerQuality,
}

impl ClientInspect {
    /// Check the status of a client.
    pub fn inspect(client: &RoomClient) -> Self {
        let peers = client
            .peers
            .snapshot()
            .into_iter()
            .map(|record| PeerInspect {
                peer: record.peer.to_string(),
                responsive: record.responsive,
                latency_ms: record.latency_ms,
                last_seen_ms: record.last_seen_ms,
                stream_attached: record.stream_attached,
            })
            .collect();

        let statuses = client.transport.relay_status();
        let connected = statuses.iter().filter(|s| s.connected).count();
        let trackers = TrackerInspect {
            connected,
            total: statuses.len(),
            quality: TrackerQuality::from_statuses(&statuses),
        };

        Self {
            status: client.status(),
            self_id: client.self_id().to_string(),
            peers,
            trackers,
        }
    }
}

//! Peer liveness monitoring.

use std::sync::Arc;
use std::sync::Weak;
use std::time::Duration;

use crate::client::RoomClient;
use crate::session::Session;

/// Pings every tracked peer on a fixed sweep and maintains the liveness
/// view. A peer that stays silent past the unresponsive timeout is dropped
/// from tracking and not pinged further, even if the transport itself still
/// reports it joined.
pub struct PeerMonitor {
    client: Weak<RoomClient>,
    session: Arc<Session>,
    sweep_interval: Duration,
    peer_timeout_ms: u64,
    ping_timeout: Duration,
}

impl PeerMonitor {
    /// Create a monitor for one session, taking its intervals from the
    /// client config.
    pub(crate) fn new(client: &RoomClient, session: Arc<Session>) -> Self {
        Self {
            client: client.self_ref.clone(),
            session,
            sweep_interval: client.config.peer_sweep_interval(),
            peer_timeout_ms: client.config.peer_timeout_ms,
            ping_timeout: client.config.ping_timeout(),
        }
    }

    /// Run one sweep.
    pub async fn sweep(&self) {
        let Some(client) = self.client.upgrade() else {
            return;
        };

        // Peers silent past the timeout leave the liveness view. This is a
        // health signal, not an error; a single failed ping below only
        // leaves the record stale for the next sweep.
        for peer in client.peers.stale(self.peer_timeout_ms) {
            tracing::info!(
                "peer {} silent for over {}ms, dropping from liveness tracking",
                peer,
                self.peer_timeout_ms
            );
            client.handle_peer_unresponsive(&peer).await;
        }

        for peer in client.peers.ids() {
            match self.session.room.ping(&peer, self.ping_timeout).await {
                Ok(latency_ms) => {
                    tracing::debug!("peer {} answered in {}ms", peer, latency_ms);
                    client.peers.touch(&peer, Some(latency_ms));
                }
                Err(e) => {
                    tracing::debug!("ping to {} failed: {}", peer, e);
                    client.peers.mark_unresponsive(&peer);
                }
            }
        }
    }

    /// Run sweeps in a loop until the owning session shuts down.
    pub async fn wait(self: Arc<Self>) {
        loop {
            tokio::time::sleep(self.sweep_interval).await;
            if self.session.timers.is_closed() || self.client.strong_count() == 0 {
                break;
            }
            self.sweep().await;
        }
    }
}

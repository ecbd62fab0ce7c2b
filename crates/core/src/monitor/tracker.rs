//! Tracker relay monitoring.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::Weak;
use std::time::Duration;

use crate::client::RoomClient;
use crate::session::Session;
use crate::status::TrackerQuality;

/// Samples the relay connections on a fixed sweep and classifies their
/// aggregate quality. Zero connected relays on a session that had already
/// become stable is treated as connection loss and forwarded to the
/// lifecycle manager, which guards against reporting it more than once.
pub struct TrackerMonitor {
    client: Weak<RoomClient>,
    session: Arc<Session>,
    sweep_interval: Duration,
    last_quality: Mutex<Option<TrackerQuality>>,
}

impl TrackerMonitor {
    /// Create a monitor for one session.
    pub(crate) fn new(client: &RoomClient, session: Arc<Session>) -> Self {
        Self {
            client: client.self_ref.clone(),
            session,
            sweep_interval: client.config.tracker_sweep_interval(),
            last_quality: Mutex::new(None),
        }
    }

    /// Run one sweep. Statuses are recomputed wholesale on every check.
    pub async fn sweep(&self) {
        let Some(client) = self.client.upgrade() else {
            return;
        };

        let statuses = client.transport.relay_status();
        let connected = statuses.iter().filter(|s| s.connected).count();
        let quality = TrackerQuality::from_statuses(&statuses);

        let changed = {
            let mut last = self.last_quality.lock().unwrap();
            if *last != Some(quality) {
                *last = Some(quality);
                true
            } else {
                false
            }
        };

        if changed {
            tracing::info!(
                "tracker quality now {} ({}/{} connected)",
                quality,
                connected,
                statuses.len()
            );
            client.callbacks.emit_tracker_quality(quality).await;
        }

        if !statuses.is_empty() && connected == 0 && self.session.is_stable() {
            tracing::warn!("all trackers disconnected on a stable session");
            client.handle_connection_loss().await;
        }
    }

    /// Re-broadcast presence to nudge laggard peer discovery.
    pub async fn force_announce(&self) {
        if let Err(e) = self.session.room.announce().await {
            tracing::warn!("announce failed: {}", e);
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

    /// Announce presence in a loop until the owning session shuts down.
    pub async fn announce_wait(self: Arc<Self>, interval: Duration) {
        loop {
            tokio::time::sleep(interval).await;
            if self.session.timers.is_closed() || self.client.strong_count() == 0 {
                break;
            }
            self.force_announce().await;
        }
    }
}

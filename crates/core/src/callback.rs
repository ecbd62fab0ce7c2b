//! Callback interface for lifecycle events.
//!
//! Unlike a single stored handler that later registrations silently clobber,
//! the registry dispatches every event to all subscribers, so voice-control
//! logic can layer onto lifecycle events without stealing them from the UI.

use std::sync::Arc;
use std::sync::RwLock;

use async_trait::async_trait;
use palaver_transport::core::transport::PeerId;

use crate::peers::PeerRecord;
use crate::status::ConnectionStatus;
use crate::status::TrackerQuality;

/// Error type of callback methods. Failures are logged, never propagated
/// into the lifecycle machinery.
pub type CallbackError = Box<dyn std::error::Error + Send + Sync>;

/// Any object that implements this trait can subscribe to lifecycle events.
#[async_trait]
pub trait ClientCallback: Send + Sync {
    /// The connection status changed.
    async fn on_status(&self, _status: ConnectionStatus) -> Result<(), CallbackError> {
        Ok(())
    }

    /// A peer joined the room, or was discovered on join.
    async fn on_peer_join(&self, _peer: &PeerRecord) -> Result<(), CallbackError> {
        Ok(())
    }

    /// A peer left, was disconnected, or timed out of liveness tracking.
    async fn on_peer_leave(&self, _peer: &PeerId) -> Result<(), CallbackError> {
        Ok(())
    }

    /// A reconnection succeeded. Fired after the `connected` status so the
    /// subscriber can re-announce presence; active local streams have
    /// already been re-attached to the new session's peers.
    async fn on_reconnected(&self) -> Result<(), CallbackError> {
        Ok(())
    }

    /// The aggregate tracker quality classification changed.
    async fn on_tracker_quality(&self, _quality: TrackerQuality) -> Result<(), CallbackError> {
        Ok(())
    }
}

/// Shared subscriber handle.
pub type SharedClientCallback = Arc<dyn ClientCallback>;

/// Holds every subscriber and fans events out to them in subscription order.
#[derive(Default)]
pub struct CallbackRegistry {
    subscribers: RwLock<Vec<SharedClientCallback>>,
}

impl CallbackRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a subscriber. Subscribers are never removed; they live as long as
    /// the client.
    pub fn subscribe(&self, callback: SharedClientCallback) {
        self.subscribers.write().unwrap().push(callback);
    }

    fn list(&self) -> Vec<SharedClientCallback> {
        self.subscribers.read().unwrap().clone()
    }

    pub(crate) async fn emit_status(&self, status: ConnectionStatus) {
        for callback in self.list() {
            if let Err(e) = callback.on_status(status).await {
                tracing::warn!("status callback failed: {:?}", e);
            }
        }
    }

    pub(crate) async fn emit_peer_join(&self, record: &PeerRecord) {
        for callback in self.list() {
            if let Err(e) = callback.on_peer_join(record).await {
                tracing::warn!("peer-join callback failed: {:?}", e);
            }
        }
    }

    pub(crate) async fn emit_peer_leave(&self, peer: &PeerId) {
        for callback in self.list() {
            if let Err(e) = callback.on_peer_leave(peer).await {
                tracing::warn!("peer-leave callback failed: {:?}", e);
            }
        }
    }

    pub(crate) async fn emit_reconnected(&self) {
        for callback in self.list() {
            if let Err(e) = callback.on_reconnected().await {
                tracing::warn!("reconnected callback failed: {:?}", e);
            }
        }
    }

    pub(crate) async fn emit_tracker_quality(&self, quality: TrackerQuality) {
        for callback in self.list() {
            if let Err(e) = callback.on_tracker_quality(quality).await {
                tracing::warn!("tracker-quality callback failed: {:?}", e);
            }
        }
    }
}

//! Callback interface for room events.

use async_trait::async_trait;

use crate::core::transport::PeerId;

/// Error type of callback methods. Failures are logged by the caller and do
/// not tear the room down.
pub type CallbackError = Box<dyn std::error::Error + Send + Sync>;

/// Any object that implements this trait can be handed to
/// [TransportInterface::join](crate::core::transport::TransportInterface::join)
/// to receive the events of that room.
#[async_trait]
pub trait RoomCallback: Send + Sync {
    /// Invoked when the transport reports a new peer in the room. Also fired
    /// once for every peer that was already present when joining.
    async fn on_peer_join(&self, _peer: &PeerId) -> Result<(), CallbackError> {
        Ok(())
    }

    /// Invoked when a peer has left the room or its connection was closed.
    async fn on_peer_leave(&self, _peer: &PeerId) -> Result<(), CallbackError> {
        Ok(())
    }

    /// Invoked when a peer probes our liveness. Implementations answer with
    /// [RoomInterface::pong](crate::core::transport::RoomInterface::pong),
    /// echoing `sent_at_ms` so the sender can compute the round trip.
    async fn on_ping(&self, _peer: &PeerId, _sent_at_ms: i64) -> Result<(), CallbackError> {
        Ok(())
    }

    /// Invoked for application payloads. The chat protocol on top is not the
    /// transport's concern.
    async fn on_message(&self, _peer: &PeerId, _data: &[u8]) -> Result<(), CallbackError> {
        Ok(())
    }
}

/// Boxed callback passed to the transport on join.
pub type BoxedRoomCallback = Box<dyn RoomCallback>;

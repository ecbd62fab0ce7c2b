//! Traits that the external room transport must implement.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;

use crate::core::callback::BoxedRoomCallback;
use crate::error::Result;

/// Identifier of a participant in a room, assigned once per client identity
/// and kept across reconnections.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerId(String);

impl PeerId {
    /// Wrap a raw identifier string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw identifier string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PeerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for PeerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Identifier of a local media stream registered with the transport.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamId(String);

impl StreamId {
    /// Wrap a raw stream identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw identifier string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of media carried by a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum StreamKind {
    /// Microphone audio.
    Audio,
}

/// Handle to a local media stream. The actual track lives in the external
/// library; the core only moves this handle around.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaStream {
    /// Stream identifier, unique per capture.
    pub id: StreamId,
    /// What the stream carries.
    pub kind: StreamKind,
}

impl MediaStream {
    /// New audio stream handle with the given id.
    pub fn audio(id: impl Into<String>) -> Self {
        Self {
            id: StreamId::new(id),
            kind: StreamKind::Audio,
        }
    }
}

/// Parameters for joining one room.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomConfig {
    /// Room identifier shared between participants.
    pub room_id: String,
    /// Optional room password, mixed into the signaling namespace.
    pub password: Option<String>,
    /// Identity of the joining client.
    pub self_id: PeerId,
    /// Opaque presence payload broadcast to peers on announce
    /// (display name, public key and similar; the transport does not
    /// interpret it).
    pub metadata: serde_json::Value,
}

/// Connectedness of one tracker relay. The whole list is recomputed on each
/// query, never diffed incrementally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayStatus {
    /// Relay endpoint url.
    pub url: String,
    /// Whether the signaling socket to this relay is currently open.
    pub connected: bool,
}

/// Entry point of the external P2P library.
#[async_trait]
pub trait TransportInterface {
    /// Join a room. On success the returned [RoomInterface] is live and the
    /// given callback starts receiving its events.
    async fn join(
        &self,
        config: RoomConfig,
        callback: BoxedRoomCallback,
    ) -> Result<Arc<dyn RoomInterface>>;

    /// Connectedness of every configured tracker relay.
    fn relay_status(&self) -> Vec<RelayStatus>;
}

/// One live room membership.
#[async_trait]
pub trait RoomInterface: Send + Sync {
    /// Identity this room was joined with.
    fn self_id(&self) -> PeerId;

    /// Peers the transport currently reports as joined.
    fn peers(&self) -> Vec<PeerId>;

    /// Measure the round trip to a peer. Returns the latency in milliseconds
    /// or [Error::PingTimeout](crate::error::Error::PingTimeout) if no pong
    /// arrives within `timeout`.
    async fn ping(&self, peer: &PeerId, timeout: Duration) -> Result<u64>;

    /// Answer an inbound ping, echoing the timestamp it carried.
    async fn pong(&self, peer: &PeerId, sent_at_ms: i64) -> Result<()>;

    /// Re-broadcast the presence metadata to all peers.
    async fn announce(&self) -> Result<()>;

    /// Attach a local media stream. `target` limits delivery to one peer;
    /// `None` sends to every current peer.
    async fn add_stream(&self, stream: &MediaStream, target: Option<&PeerId>) -> Result<()>;

    /// Detach a previously attached stream from one peer or from all.
    async fn remove_stream(&self, stream: &StreamId, target: Option<&PeerId>) -> Result<()>;

    /// Close the underlying connection to one peer.
    async fn close_peer(&self, peer: &PeerId) -> Result<()>;

    /// Leave the room and release every peer connection.
    async fn leave(&self) -> Result<()>;
}

/// Shared handle to a joined room.
pub type RoomRef = Arc<dyn RoomInterface>;

/// Shared handle to the transport entry point.
pub type SharedTransport = Arc<dyn TransportInterface + Send + Sync>;

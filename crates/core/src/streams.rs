//! Local stream attachment bookkeeping.
//!
//! Attachment is tied to the live session: a stream sent to a peer dies with
//! that peer's connection, and a session replaced by reconnection takes every
//! attachment with it. This manager keeps enough state to re-send active
//! streams to late joiners and to the peers of a replacement session.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use palaver_transport::core::transport::MediaStream;
use palaver_transport::core::transport::PeerId;
use palaver_transport::core::transport::RoomRef;
use palaver_transport::core::transport::StreamId;
use tokio::task::JoinHandle;

use crate::error::Error;
use crate::error::Result;
use crate::peers::PeerTable;

/// Tracks active local streams and which peers currently have them.
#[derive(Default)]
pub struct StreamManager {
    /// Streams attached room-wide, candidates for re-attachment.
    active: DashMap<StreamId, MediaStream>,
    /// Delayed attach tasks for freshly joined peers, cancellable on leave.
    pending_attach: DashMap<PeerId, JoinHandle<()>>,
}

impl StreamManager {
    /// Create an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a local stream, to one peer or room-wide. Room-wide streams
    /// are remembered and re-sent to peers that join later.
    pub async fn attach_local(
        &self,
        room: &RoomRef,
        table: &PeerTable,
        stream: MediaStream,
        target: Option<&PeerId>,
    ) -> Result<()> {
        room.add_stream(&stream, target)
            .await
            .map_err(|e| Error::StreamAttach(e.to_string()))?;

        match target {
            Some(peer) => table.set_stream_attached(peer, true),
            None => {
                self.active.insert(stream.id.clone(), stream);
                for peer in table.ids() {
                    table.set_stream_attached(&peer, true);
                }
            }
        }

        Ok(())
    }

    /// Detach a local stream from one peer or from the whole room.
    pub async fn detach_local(
        &self,
        room: &RoomRef,
        table: &PeerTable,
        stream: &StreamId,
        target: Option<&PeerId>,
    ) -> Result<()> {
        room.remove_stream(stream, target)
            .await
            .map_err(|e| Error::StreamAttach(e.to_string()))?;

        match target {
            Some(peer) => table.set_stream_attached(peer, false),
            None => {
                self.active.remove(stream);
                if self.active.is_empty() {
                    for peer in table.ids() {
                        table.set_stream_attached(&peer, false);
                    }
                }
            }
        }

        Ok(())
    }

    /// Re-send every active stream to a peer that joined after the streams
    /// were started. The short delay lets the new peer connection settle
    /// before media is attached; the task is cancelled if the peer leaves
    /// first.
    pub fn schedule_attach(
        self: Arc<Self>,
        room: RoomRef,
        table: Arc<PeerTable>,
        peer: PeerId,
        delay: Duration,
    ) {
        if self.active.is_empty() {
            return;
        }

        let manager = self.clone();
        let handle = tokio::spawn({
            let peer = peer.clone();
            async move {
                tokio::time::sleep(delay).await;

                let streams: Vec<MediaStream> =
                    manager.active.iter().map(|s| s.value().clone()).collect();
                for stream in streams {
                    match room.add_stream(&stream, Some(&peer)).await {
                        Ok(()) => table.set_stream_attached(&peer, true),
                        Err(e) => {
                            tracing::warn!("late stream attach to {} failed: {}", peer, e);
                        }
                    }
                }

                manager.pending_attach.remove(&peer);
            }
        });

        if let Some(previous) = self.pending_attach.insert(peer, handle) {
            previous.abort();
        }
    }

    /// Drop the pending attach for a peer that left, whatever the cause.
    pub fn peer_left(&self, peer: &PeerId) {
        if let Some((_, handle)) = self.pending_attach.remove(peer) {
            handle.abort();
        }
    }

    /// Cancel every pending delayed attach. Runs on leave and teardown.
    pub fn cancel_pending(&self) {
        let peers: Vec<PeerId> = self.pending_attach.iter().map(|e| e.key().clone()).collect();
        for peer in peers {
            if let Some((_, handle)) = self.pending_attach.remove(&peer) {
                handle.abort();
            }
        }
    }

    /// Re-attach every active stream to all peers of a replacement session.
    /// The prior attachment was tied to the destroyed session and did not
    /// survive it. Returns how many streams were re-attached.
    pub async fn reattach_all(&self, room: &RoomRef, table: &PeerTable) -> usize {
        let streams: Vec<MediaStream> = self.active.iter().map(|s| s.value().clone()).collect();

        let mut reattached = 0;
        for stream in &streams {
            match room.add_stream(stream, None).await {
                Ok(()) => reattached += 1,
                Err(e) => tracing::warn!("re-attach of stream {} failed: {}", stream.id, e),
            }
        }

        if reattached > 0 {
            for peer in table.ids() {
                table.set_stream_attached(&peer, true);
            }
        }

        reattached
    }

    /// Whether any room-wide stream is active.
    pub fn has_active(&self) -> bool {
        !self.active.is_empty()
    }

    /// Snapshot of active room-wide streams.
    pub fn active_streams(&self) -> Vec<MediaStream> {
        self.active.iter().map(|s| s.value().clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use palaver_transport::connections::dummy::DummyTransport;
    use palaver_transport::connections::dummy::StreamOp;
    use palaver_transport::core::callback::RoomCallback;
    use palaver_transport::core::transport::RoomConfig;
    use palaver_transport::core::transport::TransportInterface;

    use super::*;

    struct Noop;

    #[async_trait]
    impl RoomCallback for Noop {}

    async fn joined_room(transport: &DummyTransport, room_id: &str, self_id: &str) -> RoomRef {
        transport
            .join(
                RoomConfig {
                    room_id: room_id.to_string(),
                    password: None,
                    self_id: self_id.into(),
                    metadata: serde_json::Value::Null,
                },
                Box::new(Noop),
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_attach_and_detach_bookkeeping() {
        let transport = DummyTransport::new("wss://relay.example.com");
        let room = joined_room(&transport, "streams-attach", "alice").await;
        joined_room(&transport, "streams-attach", "bob").await;

        let manager = Arc::new(StreamManager::new());
        let table = PeerTable::new();
        table.insert("bob".into(), serde_json::Value::Null);

        let stream = MediaStream::audio("mic-1");
        manager
            .attach_local(&room, &table, stream.clone(), None)
            .await
            .unwrap();
        assert!(manager.has_active());
        assert!(table.get(&"bob".into()).unwrap().stream_attached);

        manager
            .detach_local(&room, &table, &stream.id, None)
            .await
            .unwrap();
        assert!(!manager.has_active());
        assert!(!table.get(&"bob".into()).unwrap().stream_attached);

        let session = &transport.sessions()[0];
        assert_eq!(session.stream_log(), vec![
            StreamOp::Add(stream.id.clone(), None),
            StreamOp::Remove(stream.id.clone(), None),
        ]);
    }

    #[tokio::test]
    async fn test_late_joiner_gets_active_stream_after_delay() {
        let transport = DummyTransport::new("wss://relay.example.com");
        let room = joined_room(&transport, "streams-late", "alice").await;
        joined_room(&transport, "streams-late", "bob").await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        let manager = Arc::new(StreamManager::new());
        let table = Arc::new(PeerTable::new());
        table.insert("bob".into(), serde_json::Value::Null);

        let stream = MediaStream::audio("mic-1");
        manager
            .attach_local(&room, &table, stream.clone(), None)
            .await
            .unwrap();

        manager.clone().schedule_attach(
            room.clone(),
            table.clone(),
            "bob".into(),
            Duration::from_millis(30),
        );

        tokio::time::sleep(Duration::from_millis(100)).await;
        let log = transport.sessions()[0].stream_log();
        assert!(log.contains(&StreamOp::Add(stream.id.clone(), Some("bob".into()))));
    }

    #[tokio::test]
    async fn test_peer_leave_cancels_pending_attach() {
        let transport = DummyTransport::new("wss://relay.example.com");
        let room = joined_room(&transport, "streams-cancel", "alice").await;
        joined_room(&transport, "streams-cancel", "bob").await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        let manager = Arc::new(StreamManager::new());
        let table = Arc::new(PeerTable::new());
        table.insert("bob".into(), serde_json::Value::Null);

        manager
            .attach_local(&room, &table, MediaStream::audio("mic-1"), None)
            .await
            .unwrap();

        manager.clone().schedule_attach(
            room.clone(),
            table.clone(),
            "bob".into(),
            Duration::from_millis(50),
        );
        manager.peer_left(&"bob".into());

        tokio::time::sleep(Duration::from_millis(120)).await;
        let log = transport.sessions()[0].stream_log();
        assert!(!log.iter().any(|op| matches!(op, StreamOp::Add(_, Some(_)))));
    }

    #[tokio::test]
    async fn test_reattach_all_targets_room_wide() {
        let transport = DummyTransport::new("wss://relay.example.com");
        let room = joined_room(&transport, "streams-reattach", "alice").await;

        let manager = Arc::new(StreamManager::new());
        let table = PeerTable::new();
        manager
            .attach_local(&room, &table, MediaStream::audio("mic-1"), None)
            .await
            .unwrap();

        // A replacement session after reconnection.
        let replacement = joined_room(&transport, "streams-reattach-2", "alice").await;
        let reattached = manager.reattach_all(&replacement, &table).await;

        assert_eq!(reattached, 1);
        assert_eq!(transport.sessions()[1].stream_log().len(), 1);
    }
}

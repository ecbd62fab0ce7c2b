//! The connection lifecycle manager.
//!
//! [RoomClient] owns the one active [Session], drives join/leave/reconnect,
//! and composes the health monitors, the reconnect scheduler and the stream
//! manager, forwarding their signals to the subscribed callbacks.

use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::Weak;

use async_trait::async_trait;
use palaver_transport::core::callback::BoxedRoomCallback;
use palaver_transport::core::callback::CallbackError;
use palaver_transport::core::callback::RoomCallback;
use palaver_transport::core::transport::MediaStream;
use palaver_transport::core::transport::PeerId;
use palaver_transport::core::transport::RoomConfig;
use palaver_transport::core::transport::SharedTransport;
use palaver_transport::core::transport::StreamId;

use crate::callback::CallbackRegistry;
use crate::callback::SharedClientCallback;
use crate::config::ClientConfig;
use crate::error::Error;
use crate::error::Result;
use crate::inspect::ClientInspect;
use crate::monitor::PeerMonitor;
use crate::monitor::TrackerMonitor;
use crate::peers::PeerTable;
use crate::reconnect::JoinParams;
use crate::reconnect::ReconnectScheduler;
use crate::session::Session;
use crate::status::ConnectionStatus;
use crate::streams::StreamManager;

/// The lifecycle state machine of one room membership.
///
/// States move `Disconnected → Connecting → Connected → Stable`, with
/// `Reconnecting` reachable from `Connected`/`Stable` on loss and `Failed`
/// reachable from `Reconnecting` after retry exhaustion. `Disconnected` and
/// `Failed` are terminal until a new explicit [join](RoomClient::join).
pub struct RoomClient {
    pub(crate) config: ClientConfig,
    pub(crate) transport: SharedTransport,
    /// Handle to the owning Arc, for timers and callbacks that must outlive
    /// one call but not the client.
    pub(crate) self_ref: Weak<RoomClient>,
    self_id: PeerId,
    status: Mutex<ConnectionStatus>,
    /// Exclusively owned here. Monitors read snapshots and report back via
    /// callbacks; nothing else mutates it.
    session: Mutex<Option<Arc<Session>>>,
    pub(crate) peers: Arc<PeerTable>,
    pub(crate) streams: Arc<StreamManager>,
    pub(crate) callbacks: Arc<CallbackRegistry>,
    pub(crate) reconnect: ReconnectScheduler,
    /// Bumped whenever the owned session changes, so events from a replaced
    /// session can be recognized and ignored.
    generation: AtomicU64,
    /// Whether any session of this client reached stability. Gates whether
    /// a failed join is retried automatically or surfaced as-is.
    had_stable: AtomicBool,
}

impl RoomClient {
    pub(crate) fn new(
        transport: SharedTransport,
        config: ClientConfig,
        self_id: PeerId,
        callbacks: CallbackRegistry,
    ) -> Arc<Self> {
        let reconnect = ReconnectScheduler::new(config.backoff());
        Arc::new_cyclic(|self_ref| Self {
            config,
            transport,
            self_ref: self_ref.clone(),
            self_id,
            status: Mutex::new(ConnectionStatus::Disconnected),
            session: Mutex::new(None),
            peers: Arc::new(PeerTable::new()),
            streams: Arc::new(StreamManager::new()),
            callbacks: Arc::new(callbacks),
            reconnect,
            generation: AtomicU64::new(0),
            had_stable: AtomicBool::new(false),
        })
    }

    /// Identity this client joins rooms with.
    pub fn self_id(&self) -> &PeerId {
        &self.self_id
    }

    /// Current lifecycle state.
    pub fn status(&self) -> ConnectionStatus {
        *self.status.lock().unwrap()
    }

    /// The active session, if any.
    pub fn session(&self) -> Option<Arc<Session>> {
        self.session.lock().unwrap().clone()
    }

    /// Add a lifecycle event subscriber.
    pub fn subscribe(&self, callback: SharedClientCallback) {
        self.callbacks.subscribe(callback);
    }

    /// Snapshot of peers, trackers and status for display.
    pub fn inspect(&self) -> ClientInspect {
        ClientInspect::inspect(self)
    }

    /// Liveness view of the current peers.
    pub fn peer_table(&self) -> &PeerTable {
        &self.peers
    }

    /// Whether automatic recovery is currently in flight.
    pub fn is_reconnecting(&self) -> bool {
        self.reconnect.is_reconnecting()
    }

    /// Whether a retry timer is armed.
    pub fn has_pending_reconnect(&self) -> bool {
        self.reconnect.has_pending_timer()
    }

    async fn transition(&self, status: ConnectionStatus) {
        {
            let mut current = self.status.lock().unwrap();
            if *current == status {
                return;
            }
            tracing::debug!("status {} -> {}", current, status);
            *current = status;
        }
        self.callbacks.emit_status(status).await;
    }

    /// Join a room. Any prior session owned by this manager is torn down
    /// first, with a settle delay so the old signaling state drains before
    /// rejoining; otherwise peers would see the same identity twice.
    pub async fn join(&self, room_id: &str, password: Option<&str>) -> Result<()> {
        self.reconnect.cancel_pending();
        self.reconnect.finish();
        self.reconnect.reset_attempts();

        if self.teardown_session().await {
            tokio::time::sleep(self.config.settle_delay()).await;
        }

        let params = JoinParams {
            room_id: room_id.to_string(),
            password: password.map(String::from),
        };
        self.reconnect.record_params(params.clone());
        self.transition(ConnectionStatus::Connecting).await;

        match self.establish(&params).await {
            Ok(()) => {
                self.transition(ConnectionStatus::Connected).await;
                Ok(())
            }
            Err(e) => {
                tracing::error!("join of room {} failed: {}", room_id, e);
                self.transition(ConnectionStatus::Failed).await;

                // A cold start surfaces the error as-is. A client that had a
                // working session recovers on its own.
                if self.had_stable.load(Ordering::SeqCst) && self.reconnect.try_begin() {
                    self.transition(ConnectionStatus::Reconnecting).await;
                    self.reconnect.schedule(self);
                }

                Err(e)
            }
        }
    }

    /// Leave the current room. Best-effort and idempotent: every timer is
    /// cancelled (stability, both monitors, any pending reconnect), each
    /// peer connection is closed before the transport leave, and the peer
    /// table is cleared.
    pub async fn leave(&self) {
        self.reconnect.cancel_pending();
        self.reconnect.finish();
        self.reconnect.reset_attempts();
        self.had_stable.store(false, Ordering::SeqCst);

        let had_session = self.teardown_session().await;
        if had_session || self.status() != ConnectionStatus::Disconnected {
            self.transition(ConnectionStatus::Disconnected).await;
        }
    }

    /// Called by the health monitors once they judge the session unhealthy.
    /// No-op while a reconnection is already in flight, so a burst of loss
    /// signals produces exactly one recovery.
    pub async fn handle_connection_loss(&self) {
        if !self.reconnect.try_begin() {
            tracing::debug!("reconnection already in flight, ignoring loss signal");
            return;
        }

        tracing::warn!("connection lost, starting recovery");
        self.transition(ConnectionStatus::Reconnecting).await;
        self.reconnect.schedule(self);
    }

    /// Manual "retry now": like a loss signal, but the attempt counter is
    /// reset so the caller gets a full budget.
    pub async fn force_reconnect(&self) {
        if !self.reconnect.has_params() {
            tracing::debug!("nothing to reconnect, no join recorded");
            return;
        }

        self.reconnect.reset_attempts();

        if self.reconnect.try_begin() {
            self.transition(ConnectionStatus::Reconnecting).await;
        } else {
            // Already recovering; rearm with the reset counter.
            self.reconnect.cancel_pending();
        }
        self.reconnect.schedule(self);
    }

    /// Attach a local media stream, to one peer or room-wide.
    pub async fn attach_local_stream(
        &self,
        stream: MediaStream,
        target: Option<&PeerId>,
    ) -> Result<()> {
        let session = self.session().ok_or(Error::NotJoined)?;
        self.streams
            .attach_local(&session.room, &self.peers, stream, target)
            .await
    }

    /// Detach a previously attached local stream.
    pub async fn detach_local_stream(
        &self,
        stream: &StreamId,
        target: Option<&PeerId>,
    ) -> Result<()> {
        let session = self.session().ok_or(Error::NotJoined)?;
        self.streams
            .detach_local(&session.room, &self.peers, stream, target)
            .await
    }

    /// Join with stored parameters after a backoff delay has elapsed. Runs
    /// from the scheduler's timer task; a renewed failure arms the next
    /// timer instead of recursing.
    pub(crate) async fn retry_join(&self, params: JoinParams) {
        self.reconnect.clear_fired_timer();
        tracing::info!(
            "reconnection attempt {} to room {}",
            self.reconnect.attempts(),
            params.room_id
        );

        self.teardown_session().await;
        tokio::time::sleep(self.config.settle_delay()).await;

        match self.establish(&params).await {
            Ok(()) => {
                self.reconnect.finish();
                self.transition(ConnectionStatus::Connected).await;

                // Distinct from `connected`: state that lived in the replaced
                // session is gone for peers, so subscribers re-announce and
                // active streams are re-attached to the new peer set.
                self.callbacks.emit_reconnected().await;
                if let Some(session) = self.session() {
                    let reattached = self.streams.reattach_all(&session.room, &self.peers).await;
                    if reattached > 0 {
                        tracing::info!("re-attached {} local stream(s)", reattached);
                    }
                }
            }
            Err(e) => {
                tracing::warn!("reconnection attempt failed: {}", e);
                self.reconnect.schedule(self);
            }
        }
    }

    /// Final forced cleanup after retry exhaustion. The attempt counter is
    /// not reset; a new explicit join is required.
    pub(crate) async fn give_up(&self) {
        let max = self.reconnect.policy().max_attempts;
        tracing::error!("{}", Error::MaxRetriesExceeded(max));

        self.reconnect.cancel_pending();
        self.teardown_session().await;
        self.reconnect.finish();
        self.transition(ConnectionStatus::Failed).await;
    }

    /// Ask the transport for a session and wire everything up: seed the
    /// peer table, arm the stability timer, start both monitors and the
    /// announce loop, and announce immediately.
    async fn establish(&self, params: &JoinParams) -> Result<()> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let room_config = RoomConfig {
            room_id: params.room_id.clone(),
            password: params.password.clone(),
            self_id: self.self_id.clone(),
            metadata: self.config.profile.clone(),
        };
        let callback: BoxedRoomCallback = Box::new(LifecycleRoomCallback {
            client: self.self_ref.clone(),
            generation,
        });

        let room = self.transport.join(room_config, callback).await?;
        let session = Arc::new(Session::new(
            room.clone(),
            params.room_id.clone(),
            params.password.clone(),
        ));
        *self.session.lock().unwrap() = Some(session.clone());

        for peer in room.peers() {
            self.peers.insert(peer, serde_json::Value::Null);
        }

        self.arm_stability_timer(&session);
        self.start_monitors(&session);

        if let Err(e) = room.announce().await {
            tracing::warn!("initial announce failed: {}", e);
        }

        self.reconnect.reset_attempts();
        tracing::info!("joined room {} as {}", params.room_id, self.self_id);
        Ok(())
    }

    fn arm_stability_timer(&self, session: &Arc<Session>) {
        let weak_client = self.self_ref.clone();
        let weak_session = Arc::downgrade(session);
        let grace = self.config.stability_grace();

        session.timers.arm(tokio::spawn(async move {
            tokio::time::sleep(grace).await;

            let (Some(client), Some(session)) = (weak_client.upgrade(), weak_session.upgrade())
            else {
                return;
            };

            // The session may already be written off while its teardown
            // waits for the retry timer.
            if client.reconnect.is_reconnecting() {
                return;
            }

            session.mark_stable();
            client.had_stable.store(true, Ordering::SeqCst);
            client.reconnect.reset_attempts();
            client.transition(ConnectionStatus::Stable).await;
            tracing::info!("session stable after {:?}", grace);
        }));
    }

    fn start_monitors(&self, session: &Arc<Session>) {
        let peer_monitor = Arc::new(PeerMonitor::new(self, session.clone()));
        session.timers.arm(tokio::spawn(peer_monitor.wait()));

        let tracker_monitor = Arc::new(TrackerMonitor::new(self, session.clone()));
        session
            .timers
            .arm(tokio::spawn(tracker_monitor.clone().wait()));
        session.timers.arm(tokio::spawn(
            tracker_monitor.announce_wait(self.config.announce_interval()),
        ));
    }

    /// Tear down the owned session, if any. The session's timers are
    /// cancelled before anything else so an old sweep can never act on a
    /// session it no longer owns. Returns whether there was one.
    async fn teardown_session(&self) -> bool {
        let Some(session) = self.session.lock().unwrap().take() else {
            return false;
        };

        self.generation.fetch_add(1, Ordering::SeqCst);
        session.shutdown();
        self.streams.cancel_pending();

        for peer in self.peers.ids() {
            if let Err(e) = session.room.close_peer(&peer).await {
                tracing::debug!("closing connection to {} failed: {}", peer, e);
            }
        }
        if let Err(e) = session.room.leave().await {
            tracing::warn!("transport leave failed: {}", e);
        }

        self.peers.clear();
        true
    }

    fn is_current_generation(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    pub(crate) async fn handle_peer_join(&self, peer: PeerId) {
        if peer == self.self_id {
            return;
        }

        self.peers.insert(peer.clone(), serde_json::Value::Null);
        if let Some(record) = self.peers.get(&peer) {
            self.callbacks.emit_peer_join(&record).await;
        }

        // Late joiner: re-send active local streams once its connection has
        // had a moment to settle.
        if let Some(session) = self.session() {
            self.streams.clone().schedule_attach(
                session.room.clone(),
                self.peers.clone(),
                peer,
                self.config.stream_attach_delay(),
            );
        }
    }

    pub(crate) async fn handle_peer_leave(&self, peer: &PeerId) {
        self.streams.peer_left(peer);
        if self.peers.remove(peer).is_some() {
            self.callbacks.emit_peer_leave(peer).await;
        }
    }

    /// A peer exceeded the unresponsive timeout. Same departure path as an
    /// explicit leave, so stream teardown and subscribers see one uniform
    /// signal; the transport's own peer list is not touched.
    pub(crate) async fn handle_peer_unresponsive(&self, peer: &PeerId) {
        self.handle_peer_leave(peer).await;
    }

    pub(crate) async fn handle_ping(&self, peer: &PeerId, sent_at_ms: i64) {
        let Some(session) = self.session() else {
            return;
        };

        if let Err(e) = session.room.pong(peer, sent_at_ms).await {
            tracing::debug!("pong to {} failed: {}", peer, e);
        }
        self.peers.touch(peer, None);
    }
}

/// Bridges transport events into the lifecycle manager. Events from a
/// replaced session carry a stale generation and are ignored.
struct LifecycleRoomCallback {
    client: Weak<RoomClient>,
    generation: u64,
}

impl LifecycleRoomCallback {
    fn current_client(&self) -> Option<Arc<RoomClient>> {
        let client = self.client.upgrade()?;
        client
            .is_current_generation(self.generation)
            .then_some(client)
    }
}

#[async_trait]
impl RoomCallback for LifecycleRoomCallback {
    async fn on_peer_join(&self, peer: &PeerId) -> std::result::Result<(), CallbackError> {
        if let Some(client) = self.current_client() {
            client.handle_peer_join(peer.clone()).await;
        }
        Ok(())
    }

    async fn on_peer_leave(&self, peer: &PeerId) -> std::result::Result<(), CallbackError> {
        if let Some(client) = self.current_client() {
            client.handle_peer_leave(peer).await;
        }
        Ok(())
    }

    async fn on_ping(
        &self,
        peer: &PeerId,
        sent_at_ms: i64,
    ) -> std::result::Result<(), CallbackError> {
        if let Some(client) = self.current_client() {
            client.handle_ping(peer, sent_at_ms).await;
        }
        Ok(())
    }
}

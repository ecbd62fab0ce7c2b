//! A dummy transport for local testing.
//! Sessions joining the same room id are wired together in memory with no
//! real network; relay connectedness and join failures are scriptable so the
//! lifecycle core can replay loss scenarios.

use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use lazy_static::lazy_static;
use rand::distributions::Distribution;
use tokio::sync::oneshot;

use crate::core::callback::BoxedRoomCallback;
use crate::core::transport::MediaStream;
use crate::core::transport::PeerId;
use crate::core::transport::RelayStatus;
use crate::core::transport::RoomConfig;
use crate::core::transport::RoomInterface;
use crate::core::transport::StreamId;
use crate::core::transport::TransportInterface;
use crate::error::Error;
use crate::error::Result;
use crate::relay::RelayEndpoint;

/// Max delay in ms on delivering an event
const DUMMY_DELAY_MAX: u64 = 10;
/// Min delay in ms on delivering an event
const DUMMY_DELAY_MIN: u64 = 0;
/// Config random delay when delivering pings
const DELIVER_PING_DELAY: bool = true;

lazy_static! {
    static ref ROOMS: DashMap<String, Arc<RoomBus>> = DashMap::new();
}

/// Stream operation recorded by a [DummyRoom] for test assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamOp {
    /// `add_stream` was forwarded with this stream and target.
    Add(StreamId, Option<PeerId>),
    /// `remove_stream` was forwarded with this stream and target.
    Remove(StreamId, Option<PeerId>),
}

struct Member {
    callback: Arc<BoxedRoomCallback>,
    responsive: Arc<AtomicBool>,
}

/// Shared state of one in-memory room, keyed by signaling namespace.
struct RoomBus {
    members: DashMap<PeerId, Member>,
    /// Pings awaiting a pong, keyed by (pinger, pingee).
    pending_pongs: DashMap<(PeerId, PeerId), oneshot::Sender<i64>>,
}

impl RoomBus {
    fn new() -> Self {
        Self {
            members: DashMap::new(),
            pending_pongs: DashMap::new(),
        }
    }
}

/// One in-memory room membership.
/// Implements the [RoomInterface] trait with no real network.
pub struct DummyRoom {
    namespace: String,
    self_id: PeerId,
    bus: Arc<RoomBus>,
    closed: AtomicBool,
    stream_log: Mutex<Vec<StreamOp>>,
    announces: AtomicU64,
}

/// [DummyTransport] creates [DummyRoom] sessions and reports scriptable
/// relay statuses.
pub struct DummyTransport {
    relays: Mutex<Vec<RelayStatus>>,
    fail_joins: AtomicU32,
    sessions: Mutex<Vec<Arc<DummyRoom>>>,
}

fn namespace_of(room_id: &str, password: Option<&str>) -> String {
    format!("{}#{}", room_id, password.unwrap_or_default())
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

impl DummyTransport {
    /// Create a new [DummyTransport] with the given comma-separated relay
    /// urls, all initially connected.
    pub fn new(relay_urls: &str) -> Self {
        let relays = RelayEndpoint::vec_from_str(relay_urls)
            .unwrap()
            .into_iter()
            .map(|r| RelayStatus {
                url: r.to_string(),
                connected: true,
            })
            .collect();

        Self {
            relays: Mutex::new(relays),
            fail_joins: AtomicU32::new(0),
            sessions: Mutex::new(Vec::new()),
        }
    }

    /// Replace the reported relay statuses. Used by tests to simulate
    /// tracker loss and recovery.
    pub fn set_relay_status(&self, statuses: Vec<RelayStatus>) {
        *self.relays.lock().unwrap() = statuses;
    }

    /// Mark every configured relay as connected or disconnected.
    pub fn set_all_relays_connected(&self, connected: bool) {
        for relay in self.relays.lock().unwrap().iter_mut() {
            relay.connected = connected;
        }
    }

    /// Make the next `n` join calls fail with a signaling error.
    pub fn fail_joins(&self, n: u32) {
        self.fail_joins.store(n, Ordering::SeqCst);
    }

    /// Sessions created by this transport, in join order. Closed sessions
    /// are retained so tests can inspect their stream logs.
    pub fn sessions(&self) -> Vec<Arc<DummyRoom>> {
        self.sessions.lock().unwrap().clone()
    }
}

impl DummyRoom {
    fn member_callback(&self, peer: &PeerId) -> Option<(Arc<BoxedRoomCallback>, bool)> {
        self.bus.members.get(peer).map(|m| {
            (
                m.callback.clone(),
                m.responsive.load(Ordering::SeqCst),
            )
        })
    }

    fn check_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            Err(Error::RoomClosed)
        } else {
            Ok(())
        }
    }

    /// Stop answering pings, simulating a silent peer whose connection the
    /// transport still reports as alive.
    pub fn set_responsive(&self, responsive: bool) {
        if let Some(member) = self.bus.members.get(&self.self_id) {
            member.responsive.store(responsive, Ordering::SeqCst);
        }
    }

    /// Stream operations this session has forwarded, in call order.
    pub fn stream_log(&self) -> Vec<StreamOp> {
        self.stream_log.lock().unwrap().clone()
    }

    /// How many times presence was announced through this session.
    pub fn announce_count(&self) -> u64 {
        self.announces.load(Ordering::SeqCst)
    }

    /// Whether this session has been left.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransportInterface for DummyTransport {
    async fn join(
        &self,
        config: RoomConfig,
        callback: BoxedRoomCallback,
    ) -> Result<Arc<dyn RoomInterface>> {
        if self.fail_joins.load(Ordering::SeqCst) > 0 {
            self.fail_joins.fetch_sub(1, Ordering::SeqCst);
            return Err(Error::Signaling("injected join failure".to_string()));
        }

        let namespace = namespace_of(&config.room_id, config.password.as_deref());
        let bus = ROOMS
            .entry(namespace.clone())
            .or_insert_with(|| Arc::new(RoomBus::new()))
            .clone();

        if bus.members.contains_key(&config.self_id) {
            return Err(Error::RoomAlreadyJoined(config.room_id));
        }

        let existing: Vec<PeerId> = bus.members.iter().map(|m| m.key().clone()).collect();

        let callback = Arc::new(callback);
        bus.members.insert(config.self_id.clone(), Member {
            callback: callback.clone(),
            responsive: Arc::new(AtomicBool::new(true)),
        });

        let room = Arc::new(DummyRoom {
            namespace,
            self_id: config.self_id.clone(),
            bus: bus.clone(),
            closed: AtomicBool::new(false),
            stream_log: Mutex::new(Vec::new()),
            announces: AtomicU64::new(0),
        });

        // Both sides discover each other, as a real tracker exchange would.
        for peer in existing {
            let joined = config.self_id.clone();
            let peer_callback = bus.members.get(&peer).map(|m| m.callback.clone());
            let own_callback = callback.clone();
            tokio::spawn(async move {
                if let Some(cb) = peer_callback {
                    let _ = cb.on_peer_join(&joined).await;
                }
                let _ = own_callback.on_peer_join(&peer).await;
            });
        }

        self.sessions.lock().unwrap().push(room.clone());
        Ok(room)
    }

    fn relay_status(&self) -> Vec<RelayStatus> {
        self.relays.lock().unwrap().clone()
    }
}

#[async_trait]
impl RoomInterface for DummyRoom {
    fn self_id(&self) -> PeerId {
        self.self_id.clone()
    }

    fn peers(&self) -> Vec<PeerId> {
        self.bus
            .members
            .iter()
            .map(|m| m.key().clone())
            .filter(|id| id != &self.self_id)
            .collect()
    }

    async fn ping(&self, peer: &PeerId, timeout: Duration) -> Result<u64> {
        self.check_open()?;

        let Some((callback, responsive)) = self.member_callback(peer) else {
            return Err(Error::PeerNotFound(peer.to_string()));
        };

        let sent_at = now_ms();
        let (tx, rx) = oneshot::channel();
        self.bus
            .pending_pongs
            .insert((self.self_id.clone(), peer.clone()), tx);

        if responsive {
            let pinger = self.self_id.clone();
            tokio::spawn(async move {
                if DELIVER_PING_DELAY {
                    random_delay().await;
                }
                let _ = callback.on_ping(&pinger, sent_at).await;
            });
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(echo)) => Ok((now_ms() - echo).max(0) as u64),
            _ => {
                self.bus
                    .pending_pongs
                    .remove(&(self.self_id.clone(), peer.clone()));
                Err(Error::PingTimeout(peer.to_string()))
            }
        }
    }

    async fn pong(&self, peer: &PeerId, sent_at_ms: i64) -> Result<()> {
        self.check_open()?;

        if let Some((_, tx)) = self
            .bus
            .pending_pongs
            .remove(&(peer.clone(), self.self_id.clone()))
        {
            let _ = tx.send(sent_at_ms);
        }

        Ok(())
    }

    async fn announce(&self) -> Result<()> {
        self.check_open()?;
        self.announces.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn add_stream(&self, stream: &MediaStream, target: Option<&PeerId>) -> Result<()> {
        self.check_open()?;

        if let Some(peer) = target {
            if !self.bus.members.contains_key(peer) {
                return Err(Error::StreamAttach(format!(
                    "target peer {} not in room",
                    peer
                )));
            }
        }

        self.stream_log
            .lock()
            .unwrap()
            .push(StreamOp::Add(stream.id.clone(), target.cloned()));
        Ok(())
    }

    async fn remove_stream(&self, stream: &StreamId, target: Option<&PeerId>) -> Result<()> {
        self.check_open()?;
        self.stream_log
            .lock()
            .unwrap()
            .push(StreamOp::Remove(stream.clone(), target.cloned()));
        Ok(())
    }

    async fn close_peer(&self, peer: &PeerId) -> Result<()> {
        tracing::debug!("[dummy] close_peer {}", peer);
        Ok(())
    }

    async fn leave(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        self.bus.members.remove(&self.self_id);

        let remaining: Vec<Arc<BoxedRoomCallback>> = self
            .bus
            .members
            .iter()
            .map(|m| m.value().callback.clone())
            .collect();
        let left = self.self_id.clone();
        tokio::spawn(async move {
            for callback in remaining {
                let _ = callback.on_peer_leave(&left).await;
            }
        });

        if self.bus.members.is_empty() {
            ROOMS.remove(&self.namespace);
        }

        Ok(())
    }
}

async fn random_delay() {
    tokio::time::sleep(Duration::from_millis(random(
        DUMMY_DELAY_MIN,
        DUMMY_DELAY_MAX,
    )))
    .await;
}

fn random(low: u64, high: u64) -> u64 {
    let range = rand::distributions::Uniform::new(low, high);
    let mut rng = rand::thread_rng();
    range.sample(&mut rng)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use super::*;
    use crate::core::callback::CallbackError;
    use crate::core::callback::RoomCallback;
    use crate::core::transport::RoomRef;

    struct Noop;

    #[async_trait]
    impl RoomCallback for Noop {}

    /// Answers pings through a room handle filled in after join.
    struct Answering {
        room: StdMutex<Option<RoomRef>>,
    }

    impl Answering {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                room: StdMutex::new(None),
            })
        }
    }

    struct AnsweringHandle(Arc<Answering>);

    #[async_trait]
    impl RoomCallback for AnsweringHandle {
        async fn on_ping(
            &self,
            peer: &PeerId,
            sent_at_ms: i64,
        ) -> std::result::Result<(), CallbackError> {
            let room = self.0.room.lock().unwrap().clone();
            if let Some(room) = room {
                room.pong(peer, sent_at_ms).await?;
            }
            Ok(())
        }
    }

    fn config(room_id: &str, self_id: &str) -> RoomConfig {
        RoomConfig {
            room_id: room_id.to_string(),
            password: None,
            self_id: self_id.into(),
            metadata: serde_json::Value::Null,
        }
    }

    #[tokio::test]
    async fn test_same_room_sessions_discover_each_other() {
        let transport = DummyTransport::new("wss://relay.example.com");

        let a = transport
            .join(config("room-discover", "alice"), Box::new(Noop))
            .await
            .unwrap();
        let b = transport
            .join(config("room-discover", "bob"), Box::new(Noop))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(a.peers(), vec![PeerId::from("bob")]);
        assert_eq!(b.peers(), vec![PeerId::from("alice")]);
    }

    #[tokio::test]
    async fn test_ping_answered_by_remote_callback() {
        let transport = DummyTransport::new("wss://relay.example.com");

        let answering = Answering::new();
        let a = transport
            .join(config("room-ping", "alice"), Box::new(Noop))
            .await
            .unwrap();
        let b = transport
            .join(
                config("room-ping", "bob"),
                Box::new(AnsweringHandle(answering.clone())),
            )
            .await
            .unwrap();
        *answering.room.lock().unwrap() = Some(b);

        tokio::time::sleep(Duration::from_millis(50)).await;

        let latency = a
            .ping(&"bob".into(), Duration::from_secs(1))
            .await
            .unwrap();
        assert!(latency < 1000);
    }

    #[tokio::test]
    async fn test_ping_times_out_on_silent_peer() {
        let transport = DummyTransport::new("wss://relay.example.com");

        let a = transport
            .join(config("room-silent", "alice"), Box::new(Noop))
            .await
            .unwrap();
        transport
            .join(config("room-silent", "bob"), Box::new(Noop))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;

        let err = a
            .ping(&"bob".into(), Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PingTimeout(_)));
    }

    #[tokio::test]
    async fn test_leave_notifies_remaining_members() {
        let transport = DummyTransport::new("wss://relay.example.com");

        struct Leaves(Arc<StdMutex<Vec<PeerId>>>);

        #[async_trait]
        impl RoomCallback for Leaves {
            async fn on_peer_leave(
                &self,
                peer: &PeerId,
            ) -> std::result::Result<(), CallbackError> {
                self.0.lock().unwrap().push(peer.clone());
                Ok(())
            }
        }

        let seen = Arc::new(StdMutex::new(Vec::new()));
        let a = transport
            .join(config("room-leave", "alice"), Box::new(Leaves(seen.clone())))
            .await
            .unwrap();
        let b = transport
            .join(config("room-leave", "bob"), Box::new(Noop))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        b.leave().await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(a.peers(), Vec::<PeerId>::new());
        assert_eq!(seen.lock().unwrap().clone(), vec![PeerId::from("bob")]);
    }

    #[tokio::test]
    async fn test_duplicate_identity_rejected() {
        let transport = DummyTransport::new("wss://relay.example.com");

        transport
            .join(config("room-dup", "alice"), Box::new(Noop))
            .await
            .unwrap();
        let err = transport
            .join(config("room-dup", "alice"), Box::new(Noop))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Error::RoomAlreadyJoined(_)));
    }

    #[tokio::test]
    async fn test_injected_join_failures() {
        let transport = DummyTransport::new("wss://relay.example.com");
        transport.fail_joins(2);

        assert!(transport
            .join(config("room-fail", "alice"), Box::new(Noop))
            .await
            .is_err());
        assert!(transport
            .join(config("room-fail", "alice"), Box::new(Noop))
            .await
            .is_err());
        assert!(transport
            .join(config("room-fail", "alice"), Box::new(Noop))
            .await
            .is_ok());
    }
}

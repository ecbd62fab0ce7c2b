//! End-to-end lifecycle scenarios over the dummy transport.

use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;
use std::time::Instant;

use async_trait::async_trait;
use palaver_core::callback::CallbackError;
use palaver_core::callback::ClientCallback;
use palaver_core::peers::PeerRecord;
use palaver_core::ClientBuilder;
use palaver_core::ClientConfig;
use palaver_core::ConnectionStatus;
use palaver_core::RoomClient;
use palaver_transport::connections::dummy::DummyTransport;
use palaver_transport::connections::dummy::StreamOp;
use palaver_transport::core::callback::RoomCallback;
use palaver_transport::core::transport::MediaStream;
use palaver_transport::core::transport::PeerId;
use palaver_transport::core::transport::RoomConfig;
use palaver_transport::core::transport::TransportInterface;

const RELAYS: &str = "wss://a.relay.example.com,wss://b.relay.example.com";

/// Timings scaled down so failure scenarios replay in milliseconds.
fn fast_config() -> ClientConfig {
    ClientConfig {
        stability_grace_ms: 50,
        peer_sweep_interval_ms: 50,
        peer_timeout_ms: 200,
        ping_timeout_ms: 100,
        tracker_sweep_interval_ms: 40,
        announce_interval_ms: 10_000,
        settle_delay_ms: 10,
        stream_attach_delay_ms: 20,
        backoff_base_delay_ms: 20,
        backoff_factor: 1.5,
        backoff_max_delay_ms: 100,
        max_reconnect_attempts: 3,
        profile: serde_json::Value::Null,
    }
}

#[derive(Default)]
struct Recorder {
    statuses: Mutex<Vec<ConnectionStatus>>,
    joins: Mutex<Vec<PeerId>>,
    leaves: Mutex<Vec<PeerId>>,
    reconnects: AtomicU32,
}

#[async_trait]
impl ClientCallback for Recorder {
    async fn on_status(&self, status: ConnectionStatus) -> Result<(), CallbackError> {
        self.statuses.lock().unwrap().push(status);
        Ok(())
    }

    async fn on_peer_join(&self, peer: &PeerRecord) -> Result<(), CallbackError> {
        self.joins.lock().unwrap().push(peer.peer.clone());
        Ok(())
    }

    async fn on_peer_leave(&self, peer: &PeerId) -> Result<(), CallbackError> {
        self.leaves.lock().unwrap().push(peer.clone());
        Ok(())
    }

    async fn on_reconnected(&self) -> Result<(), CallbackError> {
        self.reconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl Recorder {
    fn status_count(&self, status: ConnectionStatus) -> usize {
        self.statuses
            .lock()
            .unwrap()
            .iter()
            .filter(|s| **s == status)
            .count()
    }
}

struct Noop;

#[async_trait]
impl RoomCallback for Noop {}

fn room_config(room_id: &str, self_id: &str) -> RoomConfig {
    RoomConfig {
        room_id: room_id.to_string(),
        password: None,
        self_id: self_id.into(),
        metadata: serde_json::Value::Null,
    }
}

async fn wait_for_status(client: &RoomClient, status: ConnectionStatus, timeout: Duration) {
    let deadline = Instant::now() + timeout;
    while client.status() != status {
        assert!(
            Instant::now() < deadline,
            "timed out waiting for status {}, currently {}",
            status,
            client.status()
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn test_two_clients_discover_each_other() {
    let transport_a = Arc::new(DummyTransport::new(RELAYS));
    let transport_b = Arc::new(DummyTransport::new(RELAYS));

    let a = ClientBuilder::new(transport_a)
        .self_id("alice".into())
        .config(fast_config())
        .build();
    let b = ClientBuilder::new(transport_b)
        .self_id("bob".into())
        .config(fast_config())
        .build();

    a.join("lobby", None).await.unwrap();
    b.join("lobby", None).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(a.peer_table().contains(&"bob".into()));
    assert!(b.peer_table().contains(&"alice".into()));

    let inspect = a.inspect();
    assert_eq!(inspect.self_id, "alice");
    assert_eq!(inspect.peers.len(), 1);
    assert_eq!(inspect.trackers.connected, 2);
    assert_eq!(inspect.trackers.total, 2);

    a.leave().await;
    b.leave().await;
}

#[tokio::test]
async fn test_session_becomes_stable_after_grace() {
    let transport = Arc::new(DummyTransport::new(RELAYS));
    let recorder = Arc::new(Recorder::default());
    let client = ClientBuilder::new(transport.clone())
        .self_id("alice".into())
        .config(fast_config())
        .callback(recorder.clone())
        .build();

    client.join("stability", None).await.unwrap();
    assert_eq!(client.status(), ConnectionStatus::Connected);

    wait_for_status(&client, ConnectionStatus::Stable, Duration::from_secs(1)).await;
    assert_eq!(recorder.status_count(ConnectionStatus::Connected), 1);
    assert_eq!(recorder.status_count(ConnectionStatus::Stable), 1);

    // Presence is announced right after the join.
    assert!(transport.sessions()[0].announce_count() >= 1);

    client.leave().await;
}

#[tokio::test]
async fn test_leave_is_idempotent_and_cancels_timers() {
    let transport = Arc::new(DummyTransport::new(RELAYS));
    let recorder = Arc::new(Recorder::default());
    let client = ClientBuilder::new(transport.clone())
        .self_id("alice".into())
        .config(fast_config())
        .callback(recorder.clone())
        .build();

    client.join("leave-room", None).await.unwrap();
    let session = client.session().unwrap();

    client.leave().await;
    client.leave().await;

    assert_eq!(client.status(), ConnectionStatus::Disconnected);
    assert_eq!(recorder.status_count(ConnectionStatus::Disconnected), 1);
    assert!(client.session().is_none());
    assert!(!client.has_pending_reconnect());
    assert!(session.timers.is_closed());
    assert!(transport.sessions()[0].is_closed());
    assert!(client.peer_table().is_empty());
}

#[tokio::test]
async fn test_peer_churn_replay_keeps_exact_membership() {
    let transport_a = Arc::new(DummyTransport::new(RELAYS));
    let raw = Arc::new(DummyTransport::new(RELAYS));

    // Long sweep intervals so liveness cleanup does not interfere.
    let client = ClientBuilder::new(transport_a)
        .self_id("alice".into())
        .build();
    client.join("churn", None).await.unwrap();

    let b = raw
        .join(room_config("churn", "bob"), Box::new(Noop))
        .await
        .unwrap();
    raw.join(room_config("churn", "carol"), Box::new(Noop))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(client.peer_table().contains(&"bob".into()));
    assert!(client.peer_table().contains(&"carol".into()));

    b.leave().await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let ids = client.peer_table().ids();
    assert_eq!(ids, vec![PeerId::from("carol")]);

    client.leave().await;
}

#[tokio::test]
async fn test_silent_peer_dropped_from_liveness_tracking() {
    let transport = Arc::new(DummyTransport::new(RELAYS));
    let raw = Arc::new(DummyTransport::new(RELAYS));
    let recorder = Arc::new(Recorder::default());

    let client = ClientBuilder::new(transport)
        .self_id("alice".into())
        .config(fast_config())
        .callback(recorder.clone())
        .build();
    client.join("silence", None).await.unwrap();

    // Bob never answers pings.
    let bob = raw
        .join(room_config("silence", "bob"), Box::new(Noop))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(client.peer_table().contains(&"bob".into()));

    // Past the unresponsive timeout bob leaves the liveness view, while the
    // transport itself still reports him joined.
    let deadline = Instant::now() + Duration::from_secs(2);
    while client.peer_table().contains(&"bob".into()) {
        assert!(Instant::now() < deadline, "bob was never dropped");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    assert_eq!(recorder.leaves.lock().unwrap().clone(), vec![PeerId::from(
        "bob"
    )]);
    assert!(bob.peers().contains(&"alice".into()));
    assert_ne!(client.status(), ConnectionStatus::Reconnecting);

    client.leave().await;
}

#[tokio::test]
async fn test_tracker_loss_on_stable_session_reconnects_once() {
    let transport = Arc::new(DummyTransport::new(RELAYS));
    let recorder = Arc::new(Recorder::default());
    let client = ClientBuilder::new(transport.clone())
        .self_id("alice".into())
        .config(fast_config())
        .callback(recorder.clone())
        .build();

    client.join("trackers", None).await.unwrap();
    wait_for_status(&client, ConnectionStatus::Stable, Duration::from_secs(1)).await;

    let stream = MediaStream::audio("mic-1");
    client.attach_local_stream(stream.clone(), None).await.unwrap();

    transport.set_all_relays_connected(false);
    wait_for_status(&client, ConnectionStatus::Reconnecting, Duration::from_secs(1)).await;
    transport.set_all_relays_connected(true);

    wait_for_status(&client, ConnectionStatus::Stable, Duration::from_secs(2)).await;

    // Loss was reported once, recovery signaled once, and the stream was
    // re-attached to the replacement session.
    assert_eq!(recorder.status_count(ConnectionStatus::Reconnecting), 1);
    assert_eq!(recorder.reconnects.load(Ordering::SeqCst), 1);

    let sessions = transport.sessions();
    assert_eq!(sessions.len(), 2);
    assert!(sessions[0].is_closed());
    assert!(sessions[1]
        .stream_log()
        .contains(&StreamOp::Add(stream.id.clone(), None)));

    client.leave().await;
}

#[tokio::test]
async fn test_retry_exhaustion_is_terminal() {
    let transport = Arc::new(DummyTransport::new(RELAYS));
    let recorder = Arc::new(Recorder::default());
    let client = ClientBuilder::new(transport.clone())
        .self_id("alice".into())
        .config(fast_config())
        .callback(recorder.clone())
        .build();

    client.join("exhaustion", None).await.unwrap();
    wait_for_status(&client, ConnectionStatus::Stable, Duration::from_secs(1)).await;

    // Every retry will fail at the signaling layer.
    transport.fail_joins(100);
    transport.set_all_relays_connected(false);
    wait_for_status(&client, ConnectionStatus::Reconnecting, Duration::from_secs(1)).await;
    transport.set_all_relays_connected(true);

    wait_for_status(&client, ConnectionStatus::Failed, Duration::from_secs(2)).await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    // Terminal: no further timer armed, no recovery signal, still failed.
    assert_eq!(client.status(), ConnectionStatus::Failed);
    assert!(!client.has_pending_reconnect());
    assert!(!client.is_reconnecting());
    assert_eq!(recorder.reconnects.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_force_reconnect_restores_after_exhaustion() {
    let transport = Arc::new(DummyTransport::new(RELAYS));
    let recorder = Arc::new(Recorder::default());
    let client = ClientBuilder::new(transport.clone())
        .self_id("alice".into())
        .config(fast_config())
        .callback(recorder.clone())
        .build();

    client.join("manual-retry", None).await.unwrap();
    wait_for_status(&client, ConnectionStatus::Stable, Duration::from_secs(1)).await;

    transport.fail_joins(100);
    transport.set_all_relays_connected(false);
    wait_for_status(&client, ConnectionStatus::Reconnecting, Duration::from_secs(1)).await;
    transport.set_all_relays_connected(true);
    wait_for_status(&client, ConnectionStatus::Failed, Duration::from_secs(2)).await;

    // Manual "retry now" gets a fresh attempt budget and succeeds.
    transport.fail_joins(0);
    client.force_reconnect().await;
    wait_for_status(&client, ConnectionStatus::Stable, Duration::from_secs(2)).await;
    assert_eq!(recorder.reconnects.load(Ordering::SeqCst), 1);

    client.leave().await;
}

#[tokio::test]
async fn test_duplicate_loss_signals_start_one_recovery() {
    let transport = Arc::new(DummyTransport::new(RELAYS));
    let recorder = Arc::new(Recorder::default());

    let mut config = fast_config();
    // Long enough that the retry timer is still pending when the second
    // signal arrives.
    config.backoff_base_delay_ms = 5000;

    let client = ClientBuilder::new(transport)
        .self_id("alice".into())
        .config(config)
        .callback(recorder.clone())
        .build();
    client.join("duplicate-loss", None).await.unwrap();

    client.handle_connection_loss().await;
    client.handle_connection_loss().await;

    assert_eq!(recorder.status_count(ConnectionStatus::Reconnecting), 1);
    assert!(client.has_pending_reconnect());

    // Leave cancels the pending retry timer.
    client.leave().await;
    assert!(!client.has_pending_reconnect());
    assert!(!client.is_reconnecting());
}

#[tokio::test]
async fn test_join_while_joined_replaces_session() {
    let transport = Arc::new(DummyTransport::new(RELAYS));
    let client = ClientBuilder::new(transport.clone())
        .self_id("alice".into())
        .config(fast_config())
        .build();

    client.join("first-room", None).await.unwrap();
    client.join("second-room", None).await.unwrap();

    let sessions = transport.sessions();
    assert_eq!(sessions.len(), 2);
    assert!(sessions[0].is_closed());
    assert!(!sessions[1].is_closed());
    assert_eq!(client.session().unwrap().room_id, "second-room");

    client.leave().await;
}

#[tokio::test]
async fn test_cold_start_join_failure_surfaces_without_retry() {
    let transport = Arc::new(DummyTransport::new(RELAYS));
    let recorder = Arc::new(Recorder::default());
    let client = ClientBuilder::new(transport.clone())
        .self_id("alice".into())
        .config(fast_config())
        .callback(recorder.clone())
        .build();

    transport.fail_joins(1);
    assert!(client.join("cold-start", None).await.is_err());

    assert_eq!(client.status(), ConnectionStatus::Failed);
    assert!(!client.has_pending_reconnect());
    assert!(!client.is_reconnecting());
}

#[tokio::test]
async fn test_peers_exchange_pings_and_measure_latency() {
    let transport_a = Arc::new(DummyTransport::new(RELAYS));
    let transport_b = Arc::new(DummyTransport::new(RELAYS));

    let a = ClientBuilder::new(transport_a)
        .self_id("alice".into())
        .config(fast_config())
        .build();
    let b = ClientBuilder::new(transport_b)
        .self_id("bob".into())
        .config(fast_config())
        .build();

    let joins = futures::future::join_all(vec![a.join("latency", None), b.join("latency", None)]);
    for result in joins.await {
        result.unwrap();
    }

    // Both monitors answer each other's pings, so records stay fresh and
    // carry a measured round trip.
    tokio::time::sleep(Duration::from_millis(300)).await;

    let record = a.peer_table().get(&"bob".into()).unwrap();
    assert!(record.responsive);
    assert!(record.latency_ms.is_some());

    a.leave().await;
    b.leave().await;
}

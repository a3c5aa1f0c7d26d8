//! Registry and pump behavior, driven through in-memory transports.
//!
//! Most tests run on the default current-thread runtime: spawned pumps do
//! not get to run until the test itself awaits something, which makes
//! queue-filling and eviction deterministic. Liveness tests pause time and
//! let the runtime auto-advance to the next timer.

use std::sync::Arc;
use std::time::Duration;

use chatgate_presence::{MemoryPresenceStore, PresenceConfig, PresenceError, PresenceStore};
use chatgate_protocol::{ConnectionId, Payload, SessionData, UserId};
use chatgate_session::{
    ChannelInbound, ConnectionRegistry, ConnectionState, DiscardInbound, InboundMessage,
    RegistryConfig, RegistryError,
};
use chrono::{DateTime, Utc};
use chatgate_transport::Frame;
use chatgate_transport::memory::{self, MemoryPeer};
use tokio::sync::mpsc::UnboundedReceiver;

type Registry = ConnectionRegistry<Arc<MemoryPresenceStore>, ChannelInbound>;

struct Harness {
    registry: Arc<Registry>,
    presence: Arc<MemoryPresenceStore>,
    inbound: UnboundedReceiver<InboundMessage>,
}

fn harness_with(presence: PresenceConfig, config: RegistryConfig) -> Harness {
    let presence = Arc::new(MemoryPresenceStore::new(presence));
    let (handler, inbound) = ChannelInbound::new();
    let registry = Arc::new(ConnectionRegistry::new(Arc::clone(&presence), handler, config));
    Harness {
        registry,
        presence,
        inbound,
    }
}

fn harness() -> Harness {
    harness_with(PresenceConfig::default(), RegistryConfig::default())
}

fn u1() -> UserId {
    UserId::from("u1")
}

/// Lets spawned pumps run without letting paused time move.
async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

/// A presence store whose writes take a while to land, like a remote
/// `SET EX` round trip.
struct SlowWrites {
    inner: Arc<MemoryPresenceStore>,
    delay: Duration,
}

impl PresenceStore for SlowWrites {
    async fn set_session(
        &self,
        user_id: &UserId,
        connection_id: ConnectionId,
        connected_at: DateTime<Utc>,
    ) -> Result<SessionData, PresenceError> {
        tokio::time::sleep(self.delay).await;
        self.inner.set_session(user_id, connection_id, connected_at).await
    }

    async fn get_session(&self, user_id: &UserId) -> Result<SessionData, PresenceError> {
        self.inner.get_session(user_id).await
    }

    async fn remove_session(&self, user_id: &UserId) -> Result<(), PresenceError> {
        self.inner.remove_session(user_id).await
    }

    async fn is_online(&self, user_id: &UserId) -> Result<bool, PresenceError> {
        self.inner.is_online(user_id).await
    }

    async fn refresh_ttl(&self, user_id: &UserId) -> Result<(), PresenceError> {
        self.inner.refresh_ttl(user_id).await
    }
}

/// Reads frames until the server closes the writer.
async fn drain(peer: &mut MemoryPeer) -> Vec<Frame> {
    let mut frames = Vec::new();
    while let Some(frame) = peer.recv().await {
        frames.push(frame);
    }
    frames
}

// ---------------------------------------------------------------------------
// Admission and eviction
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_admit_writes_presence_record() {
    let h = harness();
    let (transport, _peer) = memory::pair();

    let conn = h.registry.admit(u1(), transport).await.unwrap();

    let record = h.presence.get_session(&u1()).await.unwrap();
    assert_eq!(record.connection_id, conn.id().to_string());
    assert_eq!(record.gateway_address, PresenceConfig::default().gateway_address);
    assert_eq!(record.connected_at, conn.connected_at());
    assert_eq!(conn.state(), ConnectionState::Active);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_peer_gone_during_slow_presence_write_leaves_no_record() {
    let presence = Arc::new(MemoryPresenceStore::default());
    let registry = Arc::new(ConnectionRegistry::new(
        SlowWrites {
            inner: Arc::clone(&presence),
            delay: Duration::from_millis(50),
        },
        DiscardInbound,
        RegistryConfig::default(),
    ));
    let (transport, peer) = memory::pair();
    assert!(peer.send(Frame::Close));

    let conn = registry.admit(u1(), transport).await.unwrap();
    conn.closed().await;

    let mut online = true;
    for _ in 0..200 {
        online = presence.is_online(&u1()).await.unwrap();
        if !online {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(!online, "record should be gone once the connection is torn down");

    // Nothing lands late and brings it back.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!presence.is_online(&u1()).await.unwrap());
    assert!(registry.is_empty());
}

#[tokio::test]
async fn test_admit_same_user_twice_evicts_first_connection() {
    let h = harness();
    let (t1, mut peer1) = memory::pair();
    let (t2, _peer2) = memory::pair();

    let c1 = h.registry.admit(u1(), t1).await.unwrap();
    let c2 = h.registry.admit(u1(), t2).await.unwrap();

    // The first socket gets a close frame, then its writer is released.
    assert_eq!(peer1.recv().await, Some(Frame::Close));
    assert_eq!(peer1.recv().await, None);
    c1.closed().await;

    let current = h.registry.lookup(&u1()).unwrap();
    assert!(Arc::ptr_eq(&current, &c2));
    assert_eq!(current.id(), c2.id());
    assert_eq!(h.registry.len(), 1);

    // The evicted connection's teardown must not delete the new record.
    let record = h.presence.get_session(&u1()).await.unwrap();
    assert_eq!(record.connection_id, c2.id().to_string());
}

#[tokio::test]
async fn test_eviction_drops_queued_payloads_and_closes_old_socket() {
    let h = harness();
    let (t1, mut peer1) = memory::pair();
    let (t2, mut peer2) = memory::pair();
    let c1 = h.registry.admit(u1(), t1).await.unwrap();
    for i in 0..3 {
        h.registry.send(&u1(), format!("m{i}")).unwrap();
    }

    h.registry.admit(u1(), t2).await.unwrap();

    assert_eq!(drain(&mut peer1).await, vec![Frame::Close]);
    c1.closed().await;
    assert!(c1.is_replaced());

    // The replacement only sees what is sent after it took over.
    h.registry.send(&u1(), "after").unwrap();
    assert_eq!(peer2.recv().await, Some(Frame::Text("after".into())));
}

#[tokio::test]
async fn test_evicted_handle_refuses_payloads() {
    let h = harness();
    let (t1, _peer1) = memory::pair();
    let (t2, _peer2) = memory::pair();
    let c1 = h.registry.admit(u1(), t1).await.unwrap();
    h.registry.admit(u1(), t2).await.unwrap();

    let result = c1.try_enqueue(Payload::from("to the old socket"));

    assert!(matches!(result, Err(RegistryError::NotConnected(_))));
    assert_ne!(c1.state(), ConnectionState::Active);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_admissions_leave_single_winner() {
    let h = harness();
    let mut peers = Vec::new();
    let mut tasks = Vec::new();
    for _ in 0..16 {
        let (transport, peer) = memory::pair();
        peers.push(peer);
        let registry = Arc::clone(&h.registry);
        tasks.push(tokio::spawn(async move {
            registry.admit(u1(), transport).await.unwrap()
        }));
    }

    let mut admitted = Vec::new();
    for task in tasks {
        admitted.push(task.await.unwrap());
    }

    assert_eq!(h.registry.len(), 1);
    let winner = h.registry.lookup(&u1()).unwrap();
    for conn in &admitted {
        assert_eq!(conn.is_active(), Arc::ptr_eq(conn, &winner));
    }
    assert_eq!(peers.len(), 16);
}

#[tokio::test]
async fn test_admit_with_presence_down_still_registers() {
    let h = harness();
    h.presence.set_unavailable(true);
    let (transport, mut peer) = memory::pair();

    let result = h.registry.admit(u1(), transport).await;

    assert!(matches!(
        result,
        Err(RegistryError::Presence(PresenceError::StoreUnavailable(_)))
    ));
    let conn = h.registry.lookup(&u1()).expect("still registered");
    assert!(conn.is_active());

    // And still pumping.
    h.registry.send(&u1(), "still here").unwrap();
    assert_eq!(peer.recv().await, Some(Frame::Text("still here".into())));
}

// ---------------------------------------------------------------------------
// Sending
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_send_unknown_user_returns_not_connected() {
    let h = harness();

    let result = h.registry.send(&UserId::from("u9"), "anyone?");

    assert!(matches!(result, Err(RegistryError::NotConnected(u)) if u == UserId::from("u9")));
}

#[tokio::test]
async fn test_send_past_queue_capacity_returns_backpressure() {
    let h = harness();
    let (transport, _peer) = memory::pair();
    h.registry.admit(u1(), transport).await.unwrap();

    // Nothing here yields, so the write pump cannot drain in between.
    for i in 0..256 {
        h.registry.send(&u1(), format!("m{i}")).unwrap();
    }
    let result = h.registry.send(&u1(), "m256");

    assert!(matches!(
        result,
        Err(RegistryError::BackpressureExceeded(u)) if u == u1()
    ));
}

#[tokio::test]
async fn test_send_delivers_payload_exactly_once() {
    let h = harness();
    let (transport, mut peer) = memory::pair();
    h.registry.admit(u1(), transport).await.unwrap();

    h.registry.send(&u1(), "hello").unwrap();

    assert_eq!(peer.recv().await, Some(Frame::Text("hello".into())));
    settle().await;
    assert_eq!(peer.try_recv(), None);
}

#[tokio::test]
async fn test_send_preserves_order_and_binary_payloads() {
    let h = harness();
    let (transport, mut peer) = memory::pair();
    h.registry.admit(u1(), transport).await.unwrap();

    h.registry.send(&u1(), "one").unwrap();
    h.registry.send(&u1(), vec![0u8, 1, 2]).unwrap();
    h.registry.send(&u1(), "three").unwrap();

    assert_eq!(peer.recv().await, Some(Frame::Text("one".into())));
    assert_eq!(peer.recv().await, Some(Frame::Binary(vec![0, 1, 2])));
    assert_eq!(peer.recv().await, Some(Frame::Text("three".into())));
}

// ---------------------------------------------------------------------------
// Removal
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_stale_remove_keeps_newer_connection_and_presence() {
    let h = harness();
    let (t1, _peer1) = memory::pair();
    let (t2, _peer2) = memory::pair();
    let c1 = h.registry.admit(u1(), t1).await.unwrap();
    let c2 = h.registry.admit(u1(), t2).await.unwrap();

    h.registry.remove(&c1).await;
    h.registry.remove(&c1).await;

    let current = h.registry.lookup(&u1()).unwrap();
    assert!(Arc::ptr_eq(&current, &c2));
    let record = h.presence.get_session(&u1()).await.unwrap();
    assert_eq!(record.connection_id, c2.id().to_string());
}

#[tokio::test]
async fn test_disconnect_closes_socket_and_clears_presence() {
    let h = harness();
    let (transport, mut peer) = memory::pair();
    let conn = h.registry.admit(u1(), transport).await.unwrap();

    h.registry.disconnect(&u1()).await.unwrap();

    assert_eq!(drain(&mut peer).await, vec![Frame::Close]);
    conn.closed().await;
    assert!(h.registry.is_empty());
    assert!(!h.presence.is_online(&u1()).await.unwrap());
}

#[tokio::test]
async fn test_disconnect_unknown_user_returns_not_connected() {
    let h = harness();

    let result = h.registry.disconnect(&u1()).await;

    assert!(matches!(result, Err(RegistryError::NotConnected(_))));
}

#[tokio::test]
async fn test_queued_payloads_flush_before_close_frame() {
    let h = harness();
    let (transport, mut peer) = memory::pair();
    h.registry.admit(u1(), transport).await.unwrap();

    h.registry.send(&u1(), "last words").unwrap();
    h.registry.disconnect(&u1()).await.unwrap();

    assert_eq!(
        drain(&mut peer).await,
        vec![Frame::Text("last words".into()), Frame::Close]
    );
}

#[tokio::test]
async fn test_close_all_empties_registry() {
    let h = harness();
    let (t1, mut peer1) = memory::pair();
    let (t2, mut peer2) = memory::pair();
    h.registry.admit(u1(), t1).await.unwrap();
    h.registry.admit(UserId::from("u2"), t2).await.unwrap();
    let mut users = h.registry.connected_users();
    users.sort_by(|a, b| a.as_str().cmp(b.as_str()));
    assert_eq!(users, vec![u1(), UserId::from("u2")]);

    h.registry.close_all().await;

    assert!(h.registry.is_empty());
    assert_eq!(h.presence.live_count(), 0);
    assert_eq!(drain(&mut peer1).await, vec![Frame::Close]);
    assert_eq!(drain(&mut peer2).await, vec![Frame::Close]);
}

// ---------------------------------------------------------------------------
// Read side
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_inbound_payloads_reach_handler() {
    let mut h = harness();
    let (transport, peer) = memory::pair();
    h.registry.admit(u1(), transport).await.unwrap();

    assert!(peer.send(Frame::Text("hi".into())));
    assert!(peer.send(Frame::Binary(vec![9])));

    let first = h.inbound.recv().await.unwrap();
    assert_eq!(first.from, u1());
    assert_eq!(first.payload, Payload::Text("hi".into()));
    let second = h.inbound.recv().await.unwrap();
    assert_eq!(second.payload, Payload::Binary(vec![9]));
}

#[tokio::test]
async fn test_peer_hang_up_removes_connection_and_presence() {
    let h = harness();
    let (transport, mut peer) = memory::pair();
    let conn = h.registry.admit(u1(), transport).await.unwrap();

    peer.hang_up();
    conn.closed().await;

    assert!(h.registry.lookup(&u1()).is_none());
    assert!(!h.presence.is_online(&u1()).await.unwrap());
    assert_eq!(drain(&mut peer).await, vec![Frame::Close]);
}

#[tokio::test]
async fn test_peer_close_frame_tears_down() {
    let h = harness();
    let (transport, peer) = memory::pair();
    let conn = h.registry.admit(u1(), transport).await.unwrap();

    assert!(peer.send(Frame::Close));
    conn.closed().await;

    assert!(h.registry.is_empty());
}

#[tokio::test]
async fn test_read_error_tears_down() {
    let h = harness();
    let (transport, peer) = memory::pair();
    let conn = h.registry.admit(u1(), transport).await.unwrap();

    assert!(peer.fail("connection reset"));
    conn.closed().await;

    assert!(h.registry.is_empty());
    assert_eq!(conn.state(), ConnectionState::Closed);
}

// ---------------------------------------------------------------------------
// Liveness
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_write_pump_pings_after_ping_period() {
    let h = harness();
    let (transport, mut peer) = memory::pair();
    let start = tokio::time::Instant::now();
    h.registry.admit(u1(), transport).await.unwrap();

    let frame = peer.recv().await;

    assert_eq!(frame, Some(Frame::Ping(Vec::new())));
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_secs(30) && elapsed < Duration::from_secs(31));
}

#[tokio::test(start_paused = true)]
async fn test_missing_pong_tears_down_after_pong_wait() {
    let h = harness();
    let (transport, mut peer) = memory::pair();
    let start = tokio::time::Instant::now();
    let conn = h.registry.admit(u1(), transport).await.unwrap();

    conn.closed().await;

    assert!(start.elapsed() >= Duration::from_secs(60));
    assert!(h.registry.is_empty());
    assert!(!h.presence.is_online(&u1()).await.unwrap());
    let frames = drain(&mut peer).await;
    assert!(frames.contains(&Frame::Ping(Vec::new())));
    assert_eq!(frames.last(), Some(&Frame::Close));
}

#[tokio::test(start_paused = true)]
async fn test_pong_extends_deadline_and_refreshes_presence() {
    // Presence TTL shorter than the liveness window, so only a refresh
    // keeps the record alive at t=70s.
    let h = harness_with(
        PresenceConfig {
            ttl: Duration::from_secs(50),
            ..PresenceConfig::default()
        },
        RegistryConfig::default(),
    );
    let (transport, peer) = memory::pair();
    let conn = h.registry.admit(u1(), transport).await.unwrap();
    let admitted = conn.last_seen();

    tokio::time::advance(Duration::from_secs(40)).await;
    assert!(peer.send(Frame::Pong(Vec::new())));
    settle().await;
    assert!(conn.last_seen() > admitted);

    // Past the original 60s read deadline and the original 50s TTL.
    tokio::time::advance(Duration::from_secs(30)).await;
    settle().await;

    assert!(conn.is_active());
    assert!(h.registry.lookup(&u1()).is_some());
    assert!(h.presence.is_online(&u1()).await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_client_ping_does_not_extend_deadline() {
    let h = harness();
    let (transport, peer) = memory::pair();
    let start = tokio::time::Instant::now();
    let conn = h.registry.admit(u1(), transport).await.unwrap();

    tokio::time::advance(Duration::from_secs(50)).await;
    assert!(peer.send(Frame::Ping(Vec::new())));
    settle().await;

    conn.closed().await;
    assert!(start.elapsed() < Duration::from_secs(61));
}

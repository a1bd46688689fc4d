//! Integration tests for the peer matchmaker
//!
//! These tests drive the coordinator through its public surface:
//! - Join, create and join-or-create flows against recorded collaborators
//! - Retry timing and stop semantics on a hand-advanced clock
//! - Racing peers converging through the simulated directory and network

mod fixtures;

use peer_matchmaker::backend::RecordingBackend;
use peer_matchmaker::coordinator::CoordinatorPhase;
use peer_matchmaker::error::ConnectionError;
use peer_matchmaker::metrics::JoinKind;
use peer_matchmaker::types::{HostPreference, LocalIdentity, SessionRegistration, SessionRole};
use std::time::Duration;

use fixtures::{fast_config, SimWorld, TestPeer, GAME_KEY};

#[test]
fn test_full_host_triggers_exactly_one_retry() {
    let peer = TestPeer::new("m");

    peer.coordinator
        .join_game(HostPreference::FirstAvailable, true, Duration::from_secs(1))
        .unwrap();
    peer.answer(&[("h1", 4, 4)]);

    // Nothing happens before the interval is up
    peer.timer.advance(Duration::from_millis(500));
    assert_eq!(peer.registry.request_count(), 1);

    peer.timer.advance(Duration::from_millis(500));
    assert_eq!(peer.registry.request_count(), 2);

    // Once a host frees up the retry connects and the chain goes quiet
    peer.answer(&[("h1", 3, 4)]);
    assert_eq!(peer.backend.connects().len(), 1);
    assert_eq!(peer.timer.pending_count(), 0);

    println!("✅ Full host retry test passed");
}

#[test]
fn test_create_game_success_and_failure() {
    let peer = TestPeer::new("m");
    assert!(peer.coordinator.create_game(Some("g1"), None).unwrap());
    let registrations = peer.registry.registrations();
    assert_eq!(registrations.len(), 1);
    assert_eq!(registrations[0].0, GAME_KEY);
    assert_eq!(registrations[0].1.name, "g1");

    let failing = TestPeer::with(
        fast_config(),
        "m",
        RecordingBackend::failing(ConnectionError::Refused {
            reason: "no sockets".to_string(),
        }),
    );
    assert!(!failing.coordinator.create_game(Some("g1"), None).unwrap());
    assert!(failing.registry.registrations().is_empty());

    println!("✅ Create game test passed");
}

#[test]
fn test_join_or_create_never_creates_twice_after_failure() {
    let peer = TestPeer::with(
        fast_config(),
        "m",
        RecordingBackend::failing(ConnectionError::PortInUse { port: 25000 }),
    );

    peer.coordinator.join_or_create_game().unwrap();
    peer.answer(&[]);

    for _ in 0..5 {
        peer.answer(&[]);
        peer.timer.advance(Duration::from_secs(1));
    }

    assert_eq!(peer.backend.init_calls().len(), 1);
    assert_eq!(
        peer.coordinator.metrics().join_attempts(JoinKind::JoinOrCreate),
        1
    );
    assert!(peer.coordinator.metrics().join_attempts(JoinKind::Join) >= 5);

    // The fallback join still picks up a host once one appears
    peer.answer(&[("h1", 0, 4)]);
    assert_eq!(peer.backend.connects()[0].identity, "h1");

    println!("✅ Join-or-create fallback test passed");
}

#[test]
fn test_stop_then_reset_cycle() {
    let peer = TestPeer::new("m");

    peer.coordinator
        .join_game(HostPreference::FirstAvailable, true, Duration::from_secs(1))
        .unwrap();
    peer.answer(&[]);
    peer.coordinator.stop_auto_retry().unwrap();

    peer.timer.advance(Duration::from_secs(30));
    peer.coordinator.join_with_defaults().unwrap();
    assert_eq!(peer.registry.request_count(), 1);
    assert!(peer.coordinator.snapshot().unwrap().stopped);

    peer.coordinator.reset().unwrap();
    peer.coordinator.join_with_defaults().unwrap();
    assert_eq!(peer.registry.request_count(), 2);
    assert_eq!(
        peer.coordinator.snapshot().unwrap().phase,
        CoordinatorPhase::Searching
    );

    println!("✅ Stop and reset test passed");
}

#[test]
fn test_host_probes_capped_at_configured_attempts() {
    let mut config = fast_config();
    config.max_min_peers_attempts = 3;
    let peer = TestPeer::with(config, "m", RecordingBackend::new());

    peer.coordinator.join_or_create_game().unwrap();
    peer.answer(&[]);

    for _ in 0..10 {
        peer.timer.advance(Duration::from_secs(2));
        peer.answer(&[("m", 0, 4)]);
    }

    assert_eq!(
        peer.coordinator.metrics().join_attempts(JoinKind::MinPeersProbe),
        3
    );
    let state = peer.coordinator.snapshot().unwrap();
    assert_eq!(state.role, Some(SessionRole::Host));
    assert!(!state.ensuring_min_peers);

    println!("✅ Min-peers attempt cap test passed");
}

#[tokio::test(start_paused = true)]
async fn test_racing_hosts_converge_on_one_session() {
    let world = SimWorld::new(Duration::from_millis(50));
    let lower = world.spawn_peer("peer-a", fast_config());
    let higher = world.spawn_peer("peer-b", fast_config());

    lower.join_or_create_game().unwrap();
    higher.join_or_create_game().unwrap();

    // Both see an empty directory and host
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(world.network.sessions().len(), 2);

    tokio::time::sleep(Duration::from_secs(10)).await;

    let sessions = world.network.sessions();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].host, "peer-b");
    assert_eq!(sessions[0].members, vec!["peer-a".to_string()]);

    let lower_state = lower.snapshot().unwrap();
    assert_eq!(lower_state.role, Some(SessionRole::Client));
    let higher_state = higher.snapshot().unwrap();
    assert_eq!(higher_state.role, Some(SessionRole::Host));
    assert_eq!(higher_state.current_peer_count, 1);
    assert!(!higher_state.ensuring_min_peers);

    let listed = world.directory.listing(GAME_KEY);
    assert_eq!(listed.len(), 1);
    assert_eq!(listed.hosts[0].connected_peer_count, 1);

    println!("✅ Racing hosts convergence test passed");
}

#[tokio::test(start_paused = true)]
async fn test_late_joiner_finds_existing_host() {
    let world = SimWorld::new(Duration::from_millis(20));
    let host = world.spawn_peer("host", fast_config());
    let joiner = world.spawn_peer("joiner", fast_config());

    assert!(host.create_game(Some("lobby"), Some("casual")).unwrap());
    joiner.join_or_create_game().unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;

    let sessions = world.network.sessions();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].members, vec!["joiner".to_string()]);
    assert_eq!(joiner.snapshot().unwrap().role, Some(SessionRole::Client));
    assert_eq!(host.snapshot().unwrap().current_peer_count, 1);

    println!("✅ Late joiner test passed");
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_joiners_fill_one_session() {
    let world = SimWorld::new(Duration::from_millis(20));
    let host = world.spawn_peer("host", fast_config());
    assert!(host.create_game(Some("lobby"), None).unwrap());

    let joiners: Vec<_> = ["j1", "j2", "j3"]
        .into_iter()
        .map(|id| world.spawn_peer(id, fast_config()))
        .collect();

    let handles: Vec<_> = joiners
        .iter()
        .cloned()
        .map(|joiner| {
            tokio::spawn(async move {
                joiner.join_game(HostPreference::FirstAvailable, true, Duration::from_secs(1))
            })
        })
        .collect();
    let results = futures::future::join_all(handles).await;
    assert!(results.into_iter().all(|r| matches!(r, Ok(Ok(())))));

    tokio::time::sleep(Duration::from_secs(1)).await;

    let sessions = world.network.sessions();
    assert_eq!(sessions.len(), 1);
    let mut members = sessions[0].members.clone();
    members.sort();
    assert_eq!(members, vec!["j1", "j2", "j3"]);
    assert_eq!(host.snapshot().unwrap().current_peer_count, 3);
    for joiner in &joiners {
        assert_eq!(joiner.snapshot().unwrap().role, Some(SessionRole::Client));
        assert!(!joiner.join_retry_armed());
    }

    println!("✅ Concurrent joiners test passed");
}

#[tokio::test(start_paused = true)]
async fn test_unreachable_registry_is_retried() {
    let world = SimWorld::new(Duration::from_millis(50));
    let (joiner, registry) = world.spawn_peer_with_registry("joiner", fast_config());
    let host = world.spawn_peer("host", fast_config());
    registry.set_reachable(false);

    joiner
        .join_game(HostPreference::FirstAvailable, true, Duration::from_secs(1))
        .unwrap();
    tokio::time::sleep(Duration::from_millis(3500)).await;

    let requests = joiner.metrics().directory().listing_requests_total.get();
    assert_eq!(requests, 4);
    assert!(world.network.sessions().is_empty());

    assert!(host.create_game(Some("lobby"), None).unwrap());
    registry.set_reachable(true);
    tokio::time::sleep(Duration::from_secs(2)).await;

    let sessions = world.network.sessions();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].members, vec!["joiner".to_string()]);
    assert!(!joiner.join_retry_armed());

    println!("✅ Unreachable registry test passed");
}

#[tokio::test(start_paused = true)]
async fn test_stopped_peer_stays_put() {
    let world = SimWorld::new(Duration::from_millis(50));
    let joiner = world.spawn_peer("joiner", fast_config());

    joiner
        .join_game(HostPreference::FirstAvailable, true, Duration::from_secs(1))
        .unwrap();
    tokio::time::sleep(Duration::from_millis(1500)).await;
    joiner.stop_auto_retry().unwrap();

    world.directory.register(
        GAME_KEY,
        SessionRegistration {
            identity: LocalIdentity::from("ghost"),
            name: "ghost".to_string(),
            comment: None,
            peer_limit: 4,
            port: 25000,
        },
    );
    tokio::time::sleep(Duration::from_secs(5)).await;

    assert!(world.network.sessions().is_empty());
    assert_eq!(joiner.snapshot().unwrap().role, None);

    println!("✅ Stopped peer test passed");
}

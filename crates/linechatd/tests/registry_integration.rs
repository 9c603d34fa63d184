//! Integration tests for the Registry Actor.
//!
//! These tests verify the registry works correctly as a complete system,
//! through spawn_registry() and the RegistryHandle interface.
//!
//! Tests CAN use `.unwrap()` and `.expect()` - this is allowed.

use std::sync::Arc;
use std::time::Duration;

use linechat_core::{ChatName, SessionId};
use linechatd::registry::{spawn_registry, RegistryError, RegistryEvent, RemovalReason};
use linechatd::server::{Session, SessionHandle};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

// ============================================================================
// Test Helpers
// ============================================================================

/// Helper to create a session that writes nowhere.
fn create_test_session(id: u64, name: &str) -> SessionHandle {
    Arc::new(Session::new(
        SessionId::new(id),
        ChatName::new(name),
        tokio::io::sink(),
        CancellationToken::new(),
        Duration::from_secs(1),
    ))
}

async fn next_event(events: &mut tokio::sync::broadcast::Receiver<RegistryEvent>) -> RegistryEvent {
    timeout(Duration::from_secs(1), events.recv())
        .await
        .expect("event within timeout")
        .expect("event channel open")
}

// ============================================================================
// Lifecycle Tests
// ============================================================================

#[tokio::test]
async fn test_basic_lifecycle() {
    let handle = spawn_registry(10);
    let mut events = handle.subscribe();

    let alice = create_test_session(1, "alice");
    handle.try_add(Arc::clone(&alice)).await.expect("add should succeed");

    assert_eq!(
        next_event(&mut events).await,
        RegistryEvent::Joined {
            name: ChatName::new("alice"),
            id: SessionId::new(1),
        }
    );
    assert_eq!(handle.count().await, 1);

    let removed = handle
        .remove(ChatName::new("alice"), SessionId::new(1), RemovalReason::Exited)
        .await;
    assert!(removed);
    assert!(!alice.is_alive(), "removal closes the session");

    assert_eq!(
        next_event(&mut events).await,
        RegistryEvent::Left {
            name: ChatName::new("alice"),
            id: SessionId::new(1),
            reason: RemovalReason::Exited,
        }
    );
    assert_eq!(handle.count().await, 0);
    assert!(handle.is_connected());
}

#[tokio::test]
async fn test_stale_remove_keeps_new_owner() {
    let handle = spawn_registry(10);

    handle.try_add(create_test_session(1, "alice")).await.unwrap();
    handle
        .remove(ChatName::new("alice"), SessionId::new(1), RemovalReason::Disconnected)
        .await;

    let second = create_test_session(2, "alice");
    handle.try_add(Arc::clone(&second)).await.unwrap();

    // A late removal for the first connection must not evict the second
    let removed = handle
        .remove(ChatName::new("alice"), SessionId::new(1), RemovalReason::SendFailed)
        .await;
    assert!(!removed);
    assert!(second.is_alive());
    assert_eq!(handle.count().await, 1);
}

#[tokio::test]
async fn test_remove_is_idempotent() {
    let handle = spawn_registry(10);
    handle.try_add(create_test_session(1, "bob")).await.unwrap();

    let name = ChatName::new("bob");
    assert!(handle.remove(name.clone(), SessionId::new(1), RemovalReason::Exited).await);
    assert!(!handle.remove(name, SessionId::new(1), RemovalReason::Exited).await);
}

#[tokio::test]
async fn test_capacity_enforced() {
    let handle = spawn_registry(2);

    handle.try_add(create_test_session(1, "a")).await.unwrap();
    handle.try_add(create_test_session(2, "b")).await.unwrap();

    let err = handle.try_add(create_test_session(3, "c")).await.unwrap_err();
    assert_eq!(err, RegistryError::RegistryFull { max: 2 });

    // A taken name is reported before capacity
    let err = handle.try_add(create_test_session(4, "a")).await.unwrap_err();
    assert_eq!(err, RegistryError::NameTaken(ChatName::new("a")));
}

#[tokio::test]
async fn test_close_all_reports_shutdown() {
    let handle = spawn_registry(10);
    let mut events = handle.subscribe();

    let sessions: Vec<_> = (1..=3)
        .map(|i| create_test_session(i, &format!("user{i}")))
        .collect();
    for session in &sessions {
        handle.try_add(Arc::clone(session)).await.unwrap();
    }
    for _ in 0..3 {
        next_event(&mut events).await;
    }

    assert_eq!(handle.close_all().await, 3);
    assert_eq!(handle.count().await, 0);
    assert!(sessions.iter().all(|s| !s.is_alive()));

    for _ in 0..3 {
        match next_event(&mut events).await {
            RegistryEvent::Left { reason, .. } => assert_eq!(reason, RemovalReason::Shutdown),
            other => panic!("unexpected event: {other:?}"),
        }
    }
}

// ============================================================================
// Concurrency Tests
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_same_name_one_winner() {
    let handle = spawn_registry(100);

    let mut tasks = Vec::new();
    for i in 0..16 {
        let handle = handle.clone();
        tasks.push(tokio::spawn(async move {
            handle.try_add(create_test_session(i, "dup")).await
        }));
    }

    let mut winners = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(()) => winners += 1,
            Err(e) => assert_eq!(e, RegistryError::NameTaken(ChatName::new("dup"))),
        }
    }

    assert_eq!(winners, 1);
    assert_eq!(handle.names().await, vec![ChatName::new("dup")]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_distinct_names() {
    let handle = spawn_registry(100);

    let mut tasks = Vec::new();
    for i in 0..32 {
        let handle = handle.clone();
        tasks.push(tokio::spawn(async move {
            handle
                .try_add(create_test_session(i, &format!("user{i:02}")))
                .await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(handle.count().await, 32);
    assert_eq!(handle.recipients().await.len(), 32);

    let names = handle.names().await;
    let mut sorted = names.clone();
    sorted.sort();
    assert_eq!(names, sorted, "names() is sorted");
}

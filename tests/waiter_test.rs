//! Outcome wait behavior: push, poll fallback, timeout, cleanup.

use std::sync::Arc;
use std::time::{Duration, Instant};

use lockq::engine::{EngineConfig, QueueEngine};
use lockq::error::Error;
use lockq::model::*;
use lockq::storage::{MemoryStore, WorkItemStore};

fn test_config() -> EngineConfig {
    EngineConfig {
        wait_timeout: Duration::from_secs(2),
        poll_interval: Duration::from_millis(20),
        retention: Duration::from_secs(1),
        exclusive_claim: false,
    }
}

fn test_engine() -> Arc<QueueEngine> {
    Arc::new(QueueEngine::in_memory(test_config()).expect("failed to create engine"))
}

#[tokio::test]
async fn in_flight_wait_sees_completion() {
    let engine = test_engine();
    let id = engine.submit(3, "A").await.unwrap();

    let waiter = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.await_outcome(id, Duration::from_secs(2)).await })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    engine.claim_next().await.unwrap();
    engine.complete(id, true, None).await.unwrap();

    let item = waiter.await.unwrap().unwrap();
    assert_eq!(item.status, Status::Completed);
    assert!(item.completed_at.is_some());
    assert_eq!(engine.active_waiters(), 0);
}

#[tokio::test]
async fn wait_after_completion_returns_immediately() {
    let engine = test_engine();
    let id = engine.submit(3, "A").await.unwrap();
    engine.claim_next().await.unwrap();
    engine.complete(id, true, None).await.unwrap();

    let started = Instant::now();
    let item = engine
        .await_outcome(id, Duration::from_secs(2))
        .await
        .unwrap();
    assert_eq!(item.status, Status::Completed);
    assert!(started.elapsed() < Duration::from_millis(500));
}

#[tokio::test]
async fn failed_outcome_is_returned_not_raised() {
    let engine = test_engine();
    let id = engine.submit(5, "A").await.unwrap();
    engine.claim_next().await.unwrap();
    engine
        .complete(id, false, Some("no power".into()))
        .await
        .unwrap();

    let item = engine
        .await_outcome(id, Duration::from_secs(1))
        .await
        .unwrap();
    assert_eq!(item.status, Status::Failed);
    assert_eq!(item.failure_reason.as_deref(), Some("no power"));
}

#[tokio::test]
async fn timeout_leaves_item_processing() {
    let engine = test_engine();
    let id = engine.submit(3, "A").await.unwrap();
    engine.claim_next().await.unwrap();

    let started = Instant::now();
    let err = engine
        .await_outcome(id, Duration::from_millis(150))
        .await
        .unwrap_err();
    let waited = started.elapsed();

    assert!(matches!(err, Error::Timeout(t) if t == id));
    assert!(waited >= Duration::from_millis(150));
    assert!(waited < Duration::from_secs(1));
    assert_eq!(engine.get(id).await.unwrap().status, Status::Processing);
    assert_eq!(engine.active_waiters(), 0);

    // A late completion still lands; the timed-out caller just never saw it.
    let item = engine.complete(id, true, None).await.unwrap();
    assert_eq!(item.status, Status::Completed);
}

#[tokio::test]
async fn wait_on_unknown_item_is_not_found() {
    let engine = test_engine();
    let err = engine
        .await_outcome(WorkId::new(), Duration::from_millis(200))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
    assert_eq!(engine.active_waiters(), 0);
}

#[tokio::test]
async fn poll_observes_completion_from_another_engine() {
    // Two brokers sharing one store: pushes do not cross between them.
    let store: Arc<dyn WorkItemStore> = Arc::new(MemoryStore::new());
    let front = Arc::new(QueueEngine::new(Arc::clone(&store), test_config()).unwrap());
    let device_side = QueueEngine::new(store, test_config()).unwrap();

    let id = front.submit(2, "A").await.unwrap();
    let waiter = {
        let front = Arc::clone(&front);
        tokio::spawn(async move { front.await_outcome(id, Duration::from_secs(2)).await })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    let claimed = device_side.claim_next().await.unwrap().expect("should claim");
    assert_eq!(claimed.id, id);
    device_side.complete(id, true, None).await.unwrap();

    let item = waiter.await.unwrap().unwrap();
    assert_eq!(item.status, Status::Completed);
}

#[tokio::test]
async fn many_waiters_each_get_their_own_outcome() {
    let engine = test_engine();

    let mut waiters = Vec::new();
    for i in 0..6 {
        let id = engine.submit(i % 8 + 1, &format!("r{i}")).await.unwrap();
        let engine = Arc::clone(&engine);
        waiters.push((
            id,
            tokio::spawn(async move { engine.await_outcome(id, Duration::from_secs(2)).await }),
        ));
    }

    // Odd-numbered requesters fail.
    while let Some(item) = engine.claim_next().await.unwrap() {
        let n: usize = item.requester_id[1..].parse().unwrap();
        let ok = n % 2 == 0;
        engine
            .complete(item.id, ok, (!ok).then(|| format!("fail {n}")))
            .await
            .unwrap();
    }

    for (i, (id, handle)) in waiters.into_iter().enumerate() {
        let item = handle.await.unwrap().unwrap();
        assert_eq!(item.id, id);
        if i % 2 == 0 {
            assert_eq!(item.status, Status::Completed);
        } else {
            assert_eq!(item.status, Status::Failed);
            assert_eq!(item.failure_reason, Some(format!("fail {i}")));
        }
    }
    assert_eq!(engine.active_waiters(), 0);
}

#[tokio::test]
async fn retention_does_not_outrun_a_waiter() {
    let engine = test_engine();
    let id = engine.submit(1, "A").await.unwrap();
    engine.claim_next().await.unwrap();
    engine.complete(id, true, None).await.unwrap();

    // Within the retention window the sweep leaves the item readable.
    assert_eq!(engine.retention_sweep().await.unwrap(), 0);
    let item = engine
        .await_outcome(id, Duration::from_millis(500))
        .await
        .unwrap();
    assert_eq!(item.status, Status::Completed);
}

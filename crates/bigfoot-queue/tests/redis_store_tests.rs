//! Redis job store tests.
//!
//! Run with `cargo test -- --ignored` against a local Redis, or point
//! `REDIS_URL` at another server.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use redis::aio::MultiplexedConnection;

use bigfoot_models::{EmailJob, JobId, JobState};
use bigfoot_queue::{
    handler_fn, BackoffPolicy, JobOptions, JobStore, ManagerConfig, QueueDefaults, QueueManager,
    RedisJobStore, SystemClock,
};

const QUEUE: &str = "email-notifications";

async fn connect() -> MultiplexedConnection {
    dotenvy::dotenv().ok();
    let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
    let client = redis::Client::open(url.as_str()).unwrap();
    client.get_multiplexed_async_connection().await.unwrap()
}

/// Fresh key prefix per test run.
fn test_prefix() -> String {
    format!("bigfoot:test:{}", JobId::new())
}

async fn drop_keys(conn: &mut MultiplexedConnection, prefix: &str) {
    let keys: Vec<String> = redis::cmd("KEYS")
        .arg(format!("{prefix}:*"))
        .query_async(conn)
        .await
        .unwrap();
    if !keys.is_empty() {
        redis::cmd("DEL")
            .arg(&keys)
            .query_async::<()>(conn)
            .await
            .unwrap();
    }
}

fn email(subject: &str) -> EmailJob {
    EmailJob::new("test", "viewer@example.com", subject, "body")
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_claims_follow_priority_then_fifo() {
    let mut conn = connect().await;
    let prefix = test_prefix();
    let store = Arc::new(RedisJobStore::new(conn.clone(), prefix.clone()));
    let manager = QueueManager::new(store.clone(), Arc::new(SystemClock), ManagerConfig::default());
    manager
        .declare_queue(QUEUE, QueueDefaults::default())
        .await
        .unwrap();

    let low_1 = manager.add_job(QUEUE, email("low 1"), JobOptions::new()).await.unwrap();
    let high = manager
        .add_job(QUEUE, email("high"), JobOptions::new().with_priority(10))
        .await
        .unwrap();
    let low_2 = manager.add_job(QUEUE, email("low 2"), JobOptions::new()).await.unwrap();

    let now = Utc::now();
    let mut order = Vec::new();
    while let Some(job) = store.claim_next(QUEUE, now).await.unwrap() {
        assert_eq!(job.state, JobState::Active);
        order.push(job.id);
    }
    let counts = store.counts(QUEUE).await.unwrap();
    drop_keys(&mut conn, &prefix).await;

    assert_eq!(order, vec![high, low_1, low_2]);
    assert_eq!(counts.active, 3);
    assert_eq!(counts.waiting, 0);
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_transitions_and_cleanup() {
    let mut conn = connect().await;
    let prefix = test_prefix();
    let store = RedisJobStore::new(conn.clone(), prefix.clone());
    let manager = QueueManager::new(
        Arc::new(RedisJobStore::new(conn.clone(), prefix.clone())),
        Arc::new(SystemClock),
        ManagerConfig::default(),
    );
    manager
        .declare_queue(QUEUE, QueueDefaults::new(2, BackoffPolicy::fixed(Duration::from_secs(60))))
        .await
        .unwrap();

    let id = manager.add_job(QUEUE, email("retry me"), JobOptions::new()).await.unwrap();
    let now = Utc::now();
    let claimed = store.claim_next(QUEUE, now).await.unwrap().unwrap();
    assert_eq!(claimed.id, id);

    // Scheduled a minute out, so not claimable yet
    let later = now + chrono::Duration::seconds(60);
    store.retry(QUEUE, &id, 1, "boom", later, false).await.unwrap();
    assert!(store.claim_next(QUEUE, now).await.unwrap().is_none());
    assert!(store.complete(QUEUE, &id, now).await.is_err());

    store.claim_next(QUEUE, later).await.unwrap().unwrap();
    store.complete(QUEUE, &id, later).await.unwrap();
    let done = store.get(QUEUE, &id).await.unwrap().unwrap();
    assert_eq!(done.state, JobState::Completed);
    assert_eq!(done.attempts_made, 1);
    assert_eq!(done.last_error.as_deref(), Some("boom"));

    let removed = store
        .clean(QUEUE, JobState::Completed, later + chrono::Duration::seconds(1), None)
        .await
        .unwrap();
    let counts = store.counts(QUEUE).await.unwrap();
    let gone = store.get(QUEUE, &id).await.unwrap();
    drop_keys(&mut conn, &prefix).await;

    assert_eq!(removed, 1);
    assert_eq!(counts.total(), 0);
    assert!(gone.is_none());
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_requeue_touches_only_listed_jobs() {
    let mut conn = connect().await;
    let prefix = test_prefix();
    let store = Arc::new(RedisJobStore::new(conn.clone(), prefix.clone()));
    let manager = QueueManager::new(store.clone(), Arc::new(SystemClock), ManagerConfig::default());
    manager
        .declare_queue(QUEUE, QueueDefaults::default())
        .await
        .unwrap();

    let mine = manager.add_job(QUEUE, email("mine"), JobOptions::new()).await.unwrap();
    let theirs = manager.add_job(QUEUE, email("theirs"), JobOptions::new()).await.unwrap();
    let now = Utc::now();
    store.claim_next(QUEUE, now).await.unwrap();
    store.claim_next(QUEUE, now).await.unwrap();

    let stale = store
        .stale_active(QUEUE, now + chrono::Duration::seconds(1))
        .await
        .unwrap();
    let requeued = store
        .requeue_active(QUEUE, &[mine.clone()], "interrupted", now)
        .await
        .unwrap();
    let mine = store.get(QUEUE, &mine).await.unwrap().unwrap();
    let theirs = store.get(QUEUE, &theirs).await.unwrap().unwrap();
    drop_keys(&mut conn, &prefix).await;

    assert_eq!(stale.len(), 2);
    assert_eq!(requeued, 1);
    assert_eq!(mine.state, JobState::Waiting);
    assert_eq!(mine.stalls, 1);
    assert_eq!(theirs.state, JobState::Active);
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_worker_drains_queue_through_redis() {
    let mut conn = connect().await;
    let prefix = test_prefix();
    let store: Arc<dyn JobStore> = Arc::new(RedisJobStore::new(conn.clone(), prefix.clone()));
    let config = ManagerConfig::default().with_poll_interval(Duration::from_millis(10));
    let producer = QueueManager::new(Arc::clone(&store), Arc::new(SystemClock), config.clone());
    let consumer = QueueManager::new(Arc::clone(&store), Arc::new(SystemClock), config);

    producer
        .declare_queue(QUEUE, QueueDefaults::default())
        .await
        .unwrap();
    consumer
        .register_queue(
            QUEUE,
            2,
            QueueDefaults::default(),
            Arc::new(handler_fn(|_payload| async { Ok(()) })),
        )
        .await
        .unwrap();
    consumer.start().await.unwrap();

    for i in 0..5 {
        producer
            .add_job(QUEUE, email(&format!("job {i}")), JobOptions::new())
            .await
            .unwrap();
    }

    let deadline = std::time::Instant::now() + Duration::from_secs(10);
    let completed = loop {
        let completed = store.counts(QUEUE).await.unwrap().completed;
        if completed == 5 || std::time::Instant::now() > deadline {
            break completed;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    };
    consumer.shutdown().await;
    drop_keys(&mut conn, &prefix).await;

    assert_eq!(completed, 5);
}

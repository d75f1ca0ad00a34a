//! Integration tests for feed filtering, expiry backfill, and reaping.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use common::photo::now_ms;
use common::reaper::{self, ReapJob};
use common::{Config, CoupleContext, Engine, FeedSynchronizer, DEFAULT_TTL_MS};
use remote_store::{MemoryRecordStore, NewPhotoRecord, PayloadStore, RecordStore};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::INFO)
        .try_init();
}

async fn eventually<F, Fut>(timeout: Duration, mut check: F) -> anyhow::Result<()>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    anyhow::bail!("condition not met within {timeout:?}")
}

fn synchronizer(
    records: Arc<MemoryRecordStore>,
    payloads: PayloadStore,
) -> (Engine, FeedSynchronizer) {
    let queue = Arc::new(common::UploadQueue::new(Arc::new(
        common::queue::MemoryQueueStore::new(),
    )));
    let ctx = CoupleContext::new("c1", "alice").unwrap();
    let engine = Engine::with_parts(ctx, &Config::default(), records, payloads, queue);
    let feed = engine.feed().clone();
    (engine, feed)
}

/// Seed a record with its payload in place, as a partner's upload would
/// leave them.
async fn seed(
    records: &MemoryRecordStore,
    payloads: &PayloadStore,
    name: &str,
    created_at: i64,
    expires_at: Option<i64>,
) -> anyhow::Result<String> {
    let path = format!("couples/c1/{name}.jpg");
    payloads.put(&path, Bytes::from(name.as_bytes().to_vec())).await?;
    let id = records
        .insert(
            "c1",
            NewPhotoRecord {
                image_path: path,
                caption: name.to_string(),
                sender_id: "bob".to_string(),
                created_at,
                expires_at,
            },
        )
        .await?;
    Ok(id)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn expired_undownloaded_is_filtered_and_reaped() -> anyhow::Result<()> {
    init_tracing();

    let records = Arc::new(MemoryRecordStore::new());
    let payloads = PayloadStore::memory();
    let now = now_ms();

    // Both past their window; only p2 was ever downloaded.
    let _p1 = seed(&records, &payloads, "p1", now - 3 * DEFAULT_TTL_MS, Some(now - DEFAULT_TTL_MS)).await?;
    let p2 = seed(&records, &payloads, "p2", now - 2 * DEFAULT_TTL_MS, Some(now - DEFAULT_TTL_MS)).await?;
    records.mark_downloaded("c1", &p2, "bob").await?;

    let (engine, feed) = synchronizer(records.clone(), payloads.clone());
    let sub = feed.subscribe().await?;

    let emitted = sub.recv().await.unwrap();
    assert_eq!(emitted.len(), 1);
    assert_eq!(emitted[0].id, p2);

    // p1 is reaped: record and payload both gone, the sibling untouched.
    eventually(Duration::from_secs(2), || {
        let records = records.clone();
        async move {
            records
                .list("c1")
                .await
                .map(|l| l.len() == 1)
                .unwrap_or(false)
        }
    })
    .await?;
    assert_eq!(records.list("c1").await?[0].id, p2);
    assert!(!payloads.exists("couples/c1/p1.jpg").await?);
    assert!(payloads.exists("couples/c1/p2.jpg").await?);

    engine.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn legacy_record_gets_expiry_backfilled() -> anyhow::Result<()> {
    init_tracing();

    let records = Arc::new(MemoryRecordStore::new());
    let payloads = PayloadStore::memory();
    let created_at = now_ms() - 1_000;
    let _id = seed(&records, &payloads, "legacy", created_at, None).await?;

    let (engine, feed) = synchronizer(records.clone(), payloads.clone());
    let sub = feed.subscribe().await?;

    // The emitted photo already carries the derived expiry.
    let emitted = sub.recv().await.unwrap();
    assert_eq!(emitted[0].expires_at, created_at + DEFAULT_TTL_MS);

    // And the record self-heals remotely.
    eventually(Duration::from_secs(2), || {
        let records = records.clone();
        async move {
            records
                .list("c1")
                .await
                .map(|l| l[0].expires_at == Some(created_at + DEFAULT_TTL_MS))
                .unwrap_or(false)
        }
    })
    .await?;

    engine.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn downloaded_photo_outlives_its_ttl() -> anyhow::Result<()> {
    init_tracing();

    let records = Arc::new(MemoryRecordStore::new());
    let payloads = PayloadStore::memory();
    let now = now_ms();

    let id = seed(&records, &payloads, "kept", now - 2 * DEFAULT_TTL_MS, Some(now - DEFAULT_TTL_MS)).await?;
    records.mark_downloaded("c1", &id, "bob").await?;

    let (engine, feed) = synchronizer(records.clone(), payloads.clone());
    let sub = feed.subscribe().await?;

    let emitted = sub.recv().await.unwrap();
    assert_eq!(emitted.len(), 1);

    // Give the reap worker room to misbehave, then confirm it did not.
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(records.list("c1").await?.len(), 1);
    assert!(payloads.exists("couples/c1/kept.jpg").await?);

    engine.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn download_fetches_payload_and_acknowledges() -> anyhow::Result<()> {
    init_tracing();

    let records = Arc::new(MemoryRecordStore::new());
    let payloads = PayloadStore::memory();
    let now = now_ms();
    seed(&records, &payloads, "fresh", now, Some(now + DEFAULT_TTL_MS)).await?;

    let (engine, feed) = synchronizer(records.clone(), payloads.clone());
    let sub = feed.subscribe().await?;
    let photo = sub.recv().await.unwrap().remove(0);

    let bytes = feed.download(&photo).await?;
    assert_eq!(bytes.as_ref(), b"fresh");

    let record = &records.list("c1").await?[0];
    assert!(record.downloaded_by.contains("alice"));

    // Acknowledging again stays a single-entry union.
    feed.download(&photo).await?;
    assert_eq!(records.list("c1").await?[0].downloaded_by.len(), 1);

    engine.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn bad_records_are_skipped_without_aborting_the_batch() -> anyhow::Result<()> {
    init_tracing();

    let records = Arc::new(MemoryRecordStore::new());
    let payloads = PayloadStore::memory();
    let now = now_ms();

    // One malformed record (no payload path), one whose payload is missing,
    // one resolvable.
    records
        .insert(
            "c1",
            NewPhotoRecord {
                image_path: String::new(),
                caption: "malformed".to_string(),
                sender_id: "bob".to_string(),
                created_at: now,
                expires_at: Some(now + DEFAULT_TTL_MS),
            },
        )
        .await?;
    records
        .insert(
            "c1",
            NewPhotoRecord {
                image_path: "couples/c1/ghost.jpg".to_string(),
                caption: "ghost".to_string(),
                sender_id: "bob".to_string(),
                created_at: now,
                expires_at: Some(now + DEFAULT_TTL_MS),
            },
        )
        .await?;
    seed(&records, &payloads, "good", now, Some(now + DEFAULT_TTL_MS)).await?;

    let (engine, feed) = synchronizer(records.clone(), payloads.clone());
    let sub = feed.subscribe().await?;

    let emitted = sub.recv().await.unwrap();
    assert_eq!(emitted.len(), 1);
    assert_eq!(emitted[0].caption, "good");

    // Skipped is not reaped: all three records survive.
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(records.list("c1").await?.len(), 3);

    engine.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn new_uploads_reach_live_subscribers() -> anyhow::Result<()> {
    init_tracing();

    let records = Arc::new(MemoryRecordStore::new());
    let payloads = PayloadStore::memory();
    let now = now_ms();
    seed(&records, &payloads, "old", now - 5_000, Some(now + DEFAULT_TTL_MS)).await?;

    let (engine, feed) = synchronizer(records.clone(), payloads.clone());
    let sub = feed.subscribe().await?;
    assert_eq!(sub.recv().await.unwrap().len(), 1);

    seed(&records, &payloads, "new", now, Some(now + DEFAULT_TTL_MS)).await?;
    let emitted = sub.recv().await.unwrap();
    assert_eq!(emitted.len(), 2);
    assert_eq!(emitted[0].caption, "new");
    assert_eq!(emitted[1].caption, "old");

    engine.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn reap_is_idempotent_and_leaves_siblings_alone() -> anyhow::Result<()> {
    init_tracing();

    let records = Arc::new(MemoryRecordStore::new());
    let payloads = PayloadStore::memory();
    let now = now_ms();

    let sibling = seed(&records, &payloads, "sibling", now, Some(now + DEFAULT_TTL_MS)).await?;
    // The target's payload was already deleted by an earlier partial reap.
    let target = records
        .insert(
            "c1",
            NewPhotoRecord {
                image_path: "couples/c1/target.jpg".to_string(),
                caption: "target".to_string(),
                sender_id: "bob".to_string(),
                created_at: now - 2 * DEFAULT_TTL_MS,
                expires_at: Some(now - DEFAULT_TTL_MS),
            },
        )
        .await?;

    let job = ReapJob {
        couple_id: "c1".to_string(),
        record_id: target.clone(),
        image_path: "couples/c1/target.jpg".to_string(),
    };

    reaper::execute(&*records, &payloads, &job).await?;
    assert_eq!(records.list("c1").await?.len(), 1);
    assert_eq!(records.list("c1").await?[0].id, sibling);

    // Running the same job again is a clean no-op.
    reaper::execute(&*records, &payloads, &job).await?;
    assert_eq!(records.list("c1").await?.len(), 1);
    assert!(payloads.exists("couples/c1/sibling.jpg").await?);

    Ok(())
}

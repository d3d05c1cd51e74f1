//! Worker behaviour against the in-memory stream and repository.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use mockall::Sequence;
use rstest::{fixture, rstest};
use tokio::sync::watch;

use super::*;
use crate::domain::ports::{MockOrderQueue, MockOrderRepository};
use crate::domain::{OrderId, OrderIntent, UserId, VoucherId};
use crate::test_support::{
    InMemoryOrderQueue, InMemoryOrderRepository, InMemoryStore, RecordingSleeper,
};

const VOUCHER: VoucherId = VoucherId::new(10);

struct Harness {
    store: Arc<InMemoryStore>,
    queue: Arc<InMemoryOrderQueue>,
    repository: Arc<InMemoryOrderRepository>,
    sleeper: Arc<RecordingSleeper>,
    worker: OrderPersistenceWorker,
}

fn config() -> OrderWorkerConfig {
    OrderWorkerConfig {
        poll_block: Duration::from_millis(20),
        ..OrderWorkerConfig::default()
    }
}

#[fixture]
fn harness() -> Harness {
    let store = Arc::new(InMemoryStore::new());
    let queue = Arc::new(InMemoryOrderQueue::new(store.clone()));
    let repository = Arc::new(InMemoryOrderRepository::new().with_stock(VOUCHER, 5));
    let sleeper = Arc::new(RecordingSleeper::default());
    let worker = OrderPersistenceWorker::with_sleeper(
        OrderWorkerPorts::new(queue.clone(), repository.clone()),
        DistributedLock::with_sleeper(store.clone(), sleeper.clone()),
        sleeper.clone(),
        config(),
    );
    Harness {
        store,
        queue,
        repository,
        sleeper,
        worker,
    }
}

fn intent(order: u64, user: u64) -> OrderIntent {
    OrderIntent {
        order_id: OrderId::new(order),
        user_id: UserId::new(user),
        voucher_id: VOUCHER,
        created_at: Utc
            .with_ymd_and_hms(2026, 5, 1, 10, 0, 0)
            .single()
            .expect("valid time"),
    }
}

#[rstest]
#[tokio::test]
async fn admitted_orders_are_persisted_then_acknowledged(harness: Harness) {
    harness.queue.ensure_group().await.expect("group");
    harness.queue.append(&intent(1, 100));

    let outcome = harness.worker.poll_once().await.expect("processed");

    assert_eq!(outcome, Some(MessageOutcome::Persisted));
    assert_eq!(harness.repository.orders(), vec![intent(1, 100)]);
    assert_eq!(harness.repository.stock(VOUCHER), Some(4));
    assert_eq!(harness.queue.pending_count(), 0);
    assert_eq!(harness.store.peek("lock:order:100"), None, "user lock released");
}

#[rstest]
#[tokio::test]
async fn empty_polls_return_nothing(harness: Harness) {
    harness.queue.ensure_group().await.expect("group");
    assert_eq!(harness.worker.poll_once().await.expect("polled"), None);
}

#[rstest]
#[tokio::test]
async fn duplicates_are_acknowledged_without_a_second_write(harness: Harness) {
    harness.queue.ensure_group().await.expect("group");
    harness.queue.append(&intent(1, 100));
    harness.queue.append(&intent(2, 100));

    harness.worker.poll_once().await.expect("first");
    let second = harness.worker.poll_once().await.expect("second");

    assert_eq!(second, Some(MessageOutcome::AlreadyPersisted));
    assert_eq!(harness.repository.orders().len(), 1);
    assert_eq!(harness.repository.stock(VOUCHER), Some(4));
    assert_eq!(harness.queue.pending_count(), 0);
}

#[rstest]
#[tokio::test]
async fn failed_writes_stay_pending_until_drained(harness: Harness) {
    harness.queue.ensure_group().await.expect("group");
    harness.queue.append(&intent(1, 100));
    harness.repository.fail_next_persists(2);

    let err = harness.worker.poll_once().await.expect_err("write failed");
    assert!(matches!(err, WorkerError::Repository(_)));
    assert_eq!(harness.queue.pending_count(), 1);
    assert_eq!(harness.store.peek("lock:order:100"), None, "lock released on failure");

    let (_tx, shutdown) = watch::channel(false);
    let settled = harness.worker.drain_pending(&shutdown).await;

    assert_eq!(settled, 1);
    assert_eq!(harness.repository.orders(), vec![intent(1, 100)]);
    assert_eq!(harness.queue.pending_count(), 0);
    assert_eq!(
        harness.sleeper.calls(),
        vec![Duration::from_millis(20)],
        "one backoff after the second failure"
    );
}

#[rstest]
#[tokio::test]
async fn malformed_entries_are_acknowledged_and_skipped(harness: Harness) {
    harness.queue.ensure_group().await.expect("group");
    harness
        .queue
        .append_fields(vec![("userId".to_owned(), "not-a-number".to_owned())]);
    harness.queue.append(&intent(1, 100));

    let first = harness.worker.poll_once().await.expect("skipped");
    let second = harness.worker.poll_once().await.expect("persisted");

    assert_eq!(first, Some(MessageOutcome::Skipped));
    assert_eq!(second, Some(MessageOutcome::Persisted));
    assert_eq!(harness.queue.pending_count(), 0);
}

#[rstest]
#[tokio::test]
async fn busy_user_lock_leaves_the_entry_pending(harness: Harness) {
    harness.queue.ensure_group().await.expect("group");
    harness.store.put("lock:order:100", "another-worker");
    harness.queue.append(&intent(1, 100));

    let err = harness.worker.poll_once().await.expect_err("lock busy");

    assert!(matches!(
        err,
        WorkerError::Lock(LockError::AcquisitionTimeout { attempts: 1, .. })
    ));
    assert!(harness.repository.orders().is_empty());
    assert_eq!(harness.queue.pending_count(), 1);
}

#[rstest]
#[tokio::test]
async fn repository_reports_drive_the_outcome() {
    let store = Arc::new(InMemoryStore::new());
    let queue = Arc::new(InMemoryOrderQueue::new(store.clone()));
    let mut repository = MockOrderRepository::new();
    repository.expect_exists().times(1).returning(|_, _| Ok(false));
    repository
        .expect_persist()
        .times(1)
        .returning(|_| Ok(PersistOutcome::StockExhausted));
    let worker = OrderPersistenceWorker::new(
        OrderWorkerPorts::new(queue.clone(), Arc::new(repository)),
        DistributedLock::new(store),
        config(),
    );
    queue.ensure_group().await.expect("group");
    queue.append(&intent(1, 100));

    let outcome = worker.poll_once().await.expect("processed");

    assert_eq!(outcome, Some(MessageOutcome::StockExhausted));
    assert_eq!(queue.pending_count(), 0, "acknowledged so it is not retried forever");
}

#[rstest]
#[tokio::test]
async fn run_recovers_pending_entries_then_stops_on_shutdown(harness: Harness) {
    harness.queue.ensure_group().await.expect("group");
    harness.queue.append(&intent(1, 100));
    harness.queue.append(&intent(2, 200));
    // A previous process claimed the first entry and died before acknowledging.
    let claimed = harness
        .queue
        .read_next(Duration::ZERO)
        .await
        .expect("read")
        .expect("entry");
    assert_eq!(claimed.intent, intent(1, 100));

    let worker = Arc::new(harness.worker);
    let (tx, shutdown) = watch::channel(false);
    let running = tokio::spawn({
        let worker = worker.clone();
        async move { worker.run(shutdown).await }
    });

    for _ in 0..200 {
        if harness.repository.orders().len() == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    tx.send(true).expect("worker listening");
    tokio::time::timeout(Duration::from_secs(1), running)
        .await
        .expect("worker stops promptly")
        .expect("worker task");

    assert_eq!(
        harness.repository.orders(),
        vec![intent(1, 100), intent(2, 200)]
    );
    assert_eq!(harness.queue.pending_count(), 0);
}

#[rstest]
#[tokio::test]
async fn lost_consumer_group_is_recreated_while_draining() {
    let store = Arc::new(InMemoryStore::new());
    let sleeper = Arc::new(RecordingSleeper::default());
    let mut queue = MockOrderQueue::new();
    let mut seq = Sequence::new();
    queue
        .expect_read_pending()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|| {
            Err(OrderQueueError::unavailable(
                "NOGROUP No such key 'stream.orders' or consumer group 'g1'",
            ))
        });
    queue
        .expect_ensure_group()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|| Ok(()));
    queue
        .expect_read_pending()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|| Ok(None));
    let worker = OrderPersistenceWorker::with_sleeper(
        OrderWorkerPorts::new(Arc::new(queue), Arc::new(MockOrderRepository::new())),
        DistributedLock::with_sleeper(store, sleeper.clone()),
        sleeper,
        config(),
    );
    let (_tx, shutdown) = watch::channel(false);

    let settled = tokio::time::timeout(Duration::from_secs(1), worker.drain_pending(&shutdown))
        .await
        .expect("drain ends once the group exists again");

    assert_eq!(settled, 0);
}

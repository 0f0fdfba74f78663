//! Scheduler tests against the real clock.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use service_bootstrap::scheduler::{Scheduler, TaskError};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn every_second_survives_panics() {
    let scheduler = Arc::new(Scheduler::utc());
    let counter = Arc::new(AtomicU32::new(0));

    let count = Arc::clone(&counter);
    scheduler
        .add_named_task("counter", "* * * * * *", move || {
            let n = count.fetch_add(1, Ordering::SeqCst) + 1;
            if n == 2 {
                panic!("forced failure on run {n}");
            }
        })
        .unwrap();

    assert!(scheduler.start());
    tokio::time::sleep(Duration::from_millis(3500)).await;
    let in_flight = scheduler.stop().await;
    assert_eq!(in_flight.drain(Duration::from_secs(1)).await, 0);

    assert!(counter.load(Ordering::SeqCst) >= 3, "ran {} times", counter.load(Ordering::SeqCst));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn every_interval_and_async_failures() {
    let scheduler = Arc::new(Scheduler::utc());
    let runs = Arc::new(AtomicU32::new(0));

    let count = Arc::clone(&runs);
    scheduler
        .add_async_task("flaky", "@every 1s", move || {
            let count = Arc::clone(&count);
            async move {
                count.fetch_add(1, Ordering::SeqCst);
                Err::<(), TaskError>("upstream unavailable".into())
            }
        })
        .unwrap();

    scheduler.start();
    tokio::time::sleep(Duration::from_millis(3500)).await;
    scheduler.stop().await.drain(Duration::from_secs(1)).await;

    assert!(runs.load(Ordering::SeqCst) >= 2);
}

#[tokio::test]
async fn stop_is_final() {
    let scheduler = Arc::new(Scheduler::utc());
    let counter = Arc::new(AtomicU32::new(0));
    let count = Arc::clone(&counter);
    scheduler
        .add_task("* * * * * *", move || {
            count.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

    scheduler.start();
    scheduler.stop().await.drain(Duration::from_secs(1)).await;
    let after_stop = counter.load(Ordering::SeqCst);

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(counter.load(Ordering::SeqCst), after_stop);
    assert!(!scheduler.start());
}

#[test]
fn rejects_seven_fields() {
    let scheduler = Scheduler::utc();
    assert!(scheduler.add_task("0 0 0 * * * 2024", || {}).is_err());
    assert!(scheduler.is_empty());
}

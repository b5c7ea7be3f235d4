mod test_helpers;

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::anyhow;
use test_helpers::{counter, load, small_pool};
use parrot_pool::{Backoff, JobFault, Pool};

/// Pool whose default handler always fails, recording when each attempt started
fn failing_pool(attempt_times: Arc<Mutex<Vec<Instant>>>) -> Pool<u32> {
    let pool = small_pool(1);
    pool.register_default(move |_: &u32| {
        let mut times = attempt_times.lock().unwrap();
        times.push(Instant::now());
        Err(anyhow!("attempt {}", times.len()))
    });
    pool
}

#[test]
fn test_failing_job_is_retried_up_to_cap_then_sunk_once() {
    let times = Arc::new(Mutex::new(Vec::new()));
    let pool = failing_pool(Arc::clone(&times));
    let (sunk_tx, sunk_rx) = flume::unbounded();

    pool.set_max_attempts(3).set_fault_sink(move |n: &u32, fault: &JobFault| {
        let _ = sunk_tx.send((*n, fault.to_string()));
    });

    pool.send_job_sync(42);
    pool.close();

    assert_eq!(times.lock().unwrap().len(), 3);
    let sunk: Vec<_> = sunk_rx.drain().collect();
    assert_eq!(sunk, vec![(42, "Handler failed: attempt 3".to_string())]);
}

#[test]
fn test_retry_delay_separates_attempts() {
    let times = Arc::new(Mutex::new(Vec::new()));
    let pool = failing_pool(Arc::clone(&times));

    pool.set_max_attempts(2)
        .set_retry_delay(Duration::from_millis(100))
        .clear_fault_sink();

    pool.send_job(1);
    pool.close();

    let times = times.lock().unwrap();
    assert_eq!(times.len(), 2);
    assert!(times[1] - times[0] >= Duration::from_millis(100));
}

#[test]
fn test_linear_backoff_grows_between_attempts() {
    let times = Arc::new(Mutex::new(Vec::new()));
    let pool = failing_pool(Arc::clone(&times));

    pool.set_max_attempts(3)
        .set_backoff(Backoff::Linear {
            base: Duration::from_millis(30),
        })
        .clear_fault_sink();

    pool.send_job(1);
    pool.close();

    let times = times.lock().unwrap();
    assert_eq!(times.len(), 3);
    assert!(times[1] - times[0] >= Duration::from_millis(30));
    assert!(times[2] - times[1] >= Duration::from_millis(60));
}

#[test]
fn test_max_retry_delay_caps_backoff() {
    let times = Arc::new(Mutex::new(Vec::new()));
    let pool = failing_pool(Arc::clone(&times));

    // Uncapped this would wait 200ms + 400ms
    pool.set_max_attempts(3)
        .set_backoff(Backoff::Exponential {
            base: Duration::from_millis(200),
        })
        .set_max_retry_delay(Some(Duration::from_millis(20)))
        .clear_fault_sink();

    pool.send_job(1);
    pool.close();

    let times = times.lock().unwrap();
    assert_eq!(times.len(), 3);
    assert!(times[2] - times[0] < Duration::from_millis(500));
}

#[test]
fn test_unlimited_attempts_stop_when_predicate_declines() {
    let times = Arc::new(Mutex::new(Vec::new()));
    let pool = failing_pool(Arc::clone(&times));
    let consulted = Arc::new(Mutex::new(Vec::new()));
    let sunk = counter();

    let seen = Arc::clone(&consulted);
    let sunk_by_sink = Arc::clone(&sunk);
    pool.set_max_attempts(0)
        .set_retry_predicate(move |n: &u32, _: &JobFault, attempt: u32| {
            seen.lock().unwrap().push((*n, attempt));
            attempt < 3
        })
        .set_fault_sink(move |_: &u32, _: &JobFault| {
            sunk_by_sink.fetch_add(1, Ordering::SeqCst);
        });

    pool.send_job(7);
    pool.close();

    assert_eq!(times.lock().unwrap().len(), 4);
    assert_eq!(*consulted.lock().unwrap(), vec![(7, 0), (7, 1), (7, 2), (7, 3)]);
    assert_eq!(load(&sunk), 1);
}

#[test]
fn test_predicate_not_consulted_once_cap_is_reached() {
    let times = Arc::new(Mutex::new(Vec::new()));
    let pool = failing_pool(Arc::clone(&times));
    let consulted = counter();

    let seen = Arc::clone(&consulted);
    pool.set_max_attempts(2)
        .set_retry_predicate(move |_: &u32, _: &JobFault, _: u32| {
            seen.fetch_add(1, Ordering::SeqCst);
            true
        })
        .clear_fault_sink();

    pool.send_job(1);
    pool.close();

    assert_eq!(times.lock().unwrap().len(), 2);
    assert_eq!(load(&consulted), 1);
}

#[test]
fn test_cleared_predicate_retries_to_cap() {
    let times = Arc::new(Mutex::new(Vec::new()));
    let pool = failing_pool(Arc::clone(&times));

    pool.set_max_attempts(3)
        .set_retry_predicate(|_: &u32, _: &JobFault, _: u32| false)
        .clear_retry_predicate()
        .clear_fault_sink();

    pool.send_job(1);
    pool.close();

    assert_eq!(times.lock().unwrap().len(), 3);
}

#[test]
fn test_panicking_handler_is_retried_and_reported_as_panic() {
    let pool: Pool<u32> = small_pool(1);
    let calls = counter();
    let (sunk_tx, sunk_rx) = flume::unbounded();

    let handler_calls = Arc::clone(&calls);
    pool.register_default(move |n: &u32| {
        handler_calls.fetch_add(1, Ordering::SeqCst);
        panic!("bad payload {}", n)
    })
    .set_max_attempts(2)
    .set_fault_sink(move |_: &u32, fault: &JobFault| {
        let _ = sunk_tx.send((fault.is_panic(), fault.to_string()));
    });

    pool.send_job(5);
    pool.close();

    assert_eq!(load(&calls), 2);
    assert_eq!(
        sunk_rx.drain().collect::<Vec<_>>(),
        vec![(true, "Handler panicked: bad payload 5".to_string())]
    );
    // A panicking handler does not cost the pool a worker
    assert_eq!(pool.respawn_count(), 0);
}

#[test]
fn test_handler_that_recovers_skips_sink() {
    let pool: Pool<u32> = small_pool(1);
    let calls = counter();
    let sunk = counter();

    let handler_calls = Arc::clone(&calls);
    let sunk_by_sink = Arc::clone(&sunk);
    pool.register_default(move |_: &u32| {
        if handler_calls.fetch_add(1, Ordering::SeqCst) < 2 {
            return Err(anyhow!("not yet"));
        }
        Ok(())
    })
    .set_max_attempts(5)
    .set_fault_sink(move |_: &u32, _: &JobFault| {
        sunk_by_sink.fetch_add(1, Ordering::SeqCst);
    });

    pool.send_job(1);
    pool.close();

    assert_eq!(load(&calls), 3);
    assert_eq!(load(&sunk), 0);
}

#[test]
fn test_cleared_fault_sink_discards_faults() {
    let times = Arc::new(Mutex::new(Vec::new()));
    let pool = failing_pool(Arc::clone(&times));

    pool.set_max_attempts(1).clear_fault_sink();
    assert!(pool.retry_policy().fault_sink().is_none());

    pool.send_job(1);
    pool.send_job(2);
    pool.close();

    assert_eq!(times.lock().unwrap().len(), 2);
    assert_eq!(pool.respawn_count(), 0);
}

#[test]
fn test_retry_policy_snapshot_reflects_setters() {
    let pool: Pool<u32> = small_pool(1);

    let policy = pool.retry_policy();
    assert_eq!(policy.max_attempts(), 1);
    assert_eq!(policy.backoff(), Backoff::Constant(Duration::ZERO));
    assert!(policy.fault_sink().is_some());
    assert!(!policy.has_retry_predicate());

    pool.set_max_attempts(4)
        .set_retry_delay(Duration::from_millis(15))
        .set_max_retry_delay(Some(Duration::from_millis(10)))
        .set_retry_predicate(|_: &u32, _: &JobFault, _: u32| true);

    let policy = pool.retry_policy();
    assert_eq!(policy.max_attempts(), 4);
    assert_eq!(policy.backoff(), Backoff::Constant(Duration::from_millis(15)));
    assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(10));
    assert!(policy.has_retry_predicate());
    pool.close();
}

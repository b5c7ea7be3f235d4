mod test_helpers;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use anyhow::anyhow;
use test_helpers::{counter, eventually, load, small_pool, DEFAULT_WAIT_TIME};
use parrot_pool::{JobFault, Pool};

/// Pool whose handler fails for odd payloads and whose sink panics
fn pool_with_panicking_sink(size: usize) -> (Pool<u32>, flume::Receiver<u32>) {
    let pool = small_pool(size);
    let (done_tx, done_rx) = flume::unbounded();

    pool.register_default(move |n: &u32| {
        if n % 2 == 1 {
            return Err(anyhow!("odd payload {}", n));
        }
        done_tx.send(*n)?;
        Ok(())
    })
    .set_fault_sink(|n: &u32, fault: &JobFault| panic!("sink gave up on {}: {}", n, fault));

    (pool, done_rx)
}

#[test]
fn test_worker_killed_by_sink_is_replaced() {
    let (pool, done_rx) = pool_with_panicking_sink(1);

    pool.send_job(1);
    assert!(eventually(|| pool.respawn_count() == 1));

    // The only worker died; the job below needs its replacement
    pool.send_job_sync(2);
    assert_eq!(done_rx.recv_timeout(DEFAULT_WAIT_TIME), Ok(2));

    pool.close();
    assert!(pool.is_closed());
}

#[test]
fn test_every_faulted_worker_gets_one_replacement() {
    let (pool, done_rx) = pool_with_panicking_sink(2);

    for n in [1, 3, 5, 7, 9] {
        pool.send_job(n);
    }
    assert!(eventually(|| pool.respawn_count() == 5));

    for n in [2, 4, 6] {
        pool.send_job(n);
    }
    pool.close();

    let mut done: Vec<u32> = done_rx.drain().collect();
    done.sort();
    assert_eq!(done, vec![2, 4, 6]);
    assert_eq!(pool.respawn_count(), 5);
}

#[test]
fn test_close_keeps_replacing_workers_until_drained() {
    let (pool, done_rx) = pool_with_panicking_sink(3);

    for n in 0..30 {
        pool.send_job(n);
    }
    pool.close();

    assert!(pool.is_closed());
    let mut done: Vec<u32> = done_rx.drain().collect();
    done.sort();
    assert_eq!(done, (0..30).filter(|n| n % 2 == 0).collect::<Vec<_>>());
    assert_eq!(pool.respawn_count(), 15);
}

#[test]
fn test_panicking_predicate_does_not_kill_worker() {
    let pool: Pool<u32> = small_pool(1);
    let calls = counter();
    let (sunk_tx, sunk_rx) = flume::unbounded();

    let handler_calls = Arc::clone(&calls);
    pool.register_default(move |_: &u32| {
        handler_calls.fetch_add(1, Ordering::SeqCst);
        Err(anyhow!("always"))
    })
    .set_max_attempts(0)
    .set_retry_predicate(|_: &u32, _: &JobFault, _: u32| -> bool { panic!("predicate bug") })
    .set_fault_sink(move |n: &u32, fault: &JobFault| {
        let _ = sunk_tx.send((*n, fault.to_string()));
    });

    pool.send_job(8);
    pool.close();

    assert_eq!(load(&calls), 1);
    assert_eq!(sunk_rx.drain().collect::<Vec<_>>(), vec![(8, "Handler failed: always".to_string())]);
    assert_eq!(pool.respawn_count(), 0);
}

#[test]
fn test_replacement_keeps_serving_named_handlers() {
    let pool: Pool<u32> = small_pool(1);
    let served = counter();

    pool.register("explode", |_: &u32| Err(anyhow!("always")))
        .set_fault_sink(|_: &u32, _: &JobFault| panic!("sink panic"));

    let seen = Arc::clone(&served);
    pool.register("count", move |_: &u32| {
        seen.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    pool.send_job_for_worker_id("explode", 0);
    pool.send_job_for_worker_id("count", 1);
    pool.send_job_for_worker_id("explode", 2);
    pool.send_job_for_worker_id("count", 3);

    // Once closing starts nobody replaces a dead worker, so wait before closing
    assert!(eventually(|| load(&served) == 2 && pool.respawn_count() == 2));
    pool.close();
}

// Helpers shared by the integration tests
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parrot_pool::{Pool, PoolConfig};

/// Upper bound for anything a test waits on
pub const DEFAULT_WAIT_TIME: Duration = Duration::from_secs(5);

/// Small pool with a recognizable thread name prefix
pub fn small_pool<T: Send + 'static>(size: usize) -> Pool<T> {
    parrot_pool::logging::init_test();
    Pool::with_config(PoolConfig::default().with_size(size).with_thread_name_prefix("test-worker"))
        .expect("pool should start")
}

pub fn counter() -> Arc<AtomicUsize> {
    Arc::new(AtomicUsize::new(0))
}

/// Poll `condition` until it holds or `DEFAULT_WAIT_TIME` elapses
pub fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + DEFAULT_WAIT_TIME;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}

pub fn load(counter: &AtomicUsize) -> usize {
    counter.load(Ordering::SeqCst)
}

use std::error::Error;
use std::io;

use anyhow::anyhow;
use parrot_pool::{JobFault, Pool, PoolError};

#[test]
fn test_pool_error_messages() {
    assert_eq!(PoolError::InvalidSize.to_string(), "Pool size must be at least 1");

    let spawn = PoolError::Spawn {
        name: "parrot-pool-worker-3".to_string(),
        source: io::Error::new(io::ErrorKind::Other, "out of threads"),
    };
    assert_eq!(
        spawn.to_string(),
        "Failed to spawn thread parrot-pool-worker-3: out of threads"
    );
    assert_eq!(spawn.source().unwrap().to_string(), "out of threads");
}

#[test]
fn test_job_fault_from_handler_error() {
    let fault = JobFault::from(anyhow!("disk full"));

    assert!(!fault.is_panic());
    assert_eq!(fault.to_string(), "Handler failed: disk full");
}

#[test]
fn test_job_fault_from_panic_payloads() {
    let owned = std::panic::catch_unwind(|| panic!("index {} out of range", 4)).unwrap_err();
    let fault = JobFault::from_panic(owned);
    assert!(fault.is_panic());
    assert_eq!(fault.to_string(), "Handler panicked: index 4 out of range");

    let fault = JobFault::from_panic(Box::new("static message"));
    assert_eq!(fault.to_string(), "Handler panicked: static message");

    let fault = JobFault::from_panic(Box::new(17u8));
    assert_eq!(fault.to_string(), "Handler panicked: unknown panic payload");
}

#[test]
fn test_invalid_size_is_reported_before_any_thread_starts() {
    let err = Pool::<u32>::with_size(0).unwrap_err();
    assert!(matches!(err, PoolError::InvalidSize));
}

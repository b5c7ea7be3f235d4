// Retrying Pool Example
//
// Starts a small pool with two named handlers: one that is flaky and gets
// retried with exponential backoff, and one that never succeeds so its jobs
// end up in the fault sink.
//
// Run with:
//   cargo run -p parrot-pool --example retrying_pool

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail};
use parrot_pool::logging::{self, info, warn};
use parrot_pool::{Backoff, JobFault, Pool, PoolConfig};

#[derive(Debug)]
struct Upload {
    name: String,
    bytes: usize,
}

fn main() -> anyhow::Result<()> {
    logging::init_development();

    let config = PoolConfig::default()
        .with_size(3)
        .with_thread_name_prefix("uploader")
        .with_max_attempts(4)
        .with_backoff(Backoff::Exponential {
            base: Duration::from_millis(20),
        })
        .with_max_delay(Duration::from_millis(100));
    let pool: Pool<Upload> = Pool::with_config(config)?;

    let flaky_calls = Arc::new(AtomicU32::new(0));
    let calls = Arc::clone(&flaky_calls);
    pool.register("store", move |upload: &Upload| {
        // Every third call succeeds
        if calls.fetch_add(1, Ordering::SeqCst) % 3 != 2 {
            bail!("storage busy while writing {}", upload.name);
        }
        info!(name = %upload.name, bytes = upload.bytes, "Stored");
        Ok(())
    })
    .register("quarantine", |upload: &Upload| {
        Err(anyhow!("{} rejected by scanner", upload.name))
    })
    .set_retry_predicate(|_: &Upload, fault: &JobFault, attempt: u32| {
        // Panics are bugs, retrying will not help
        !fault.is_panic() && attempt < 3
    })
    .set_fault_sink(|upload: &Upload, fault: &JobFault| {
        warn!(name = %upload.name, error = %fault, "Upload abandoned");
    });

    for (i, name) in ["a.png", "b.png", "c.png"].iter().enumerate() {
        pool.send_job_sync_for_worker_id(
            "store",
            Upload {
                name: name.to_string(),
                bytes: 1024 * (i + 1),
            },
        );
    }
    pool.send_job_for_worker_id(
        "quarantine",
        Upload {
            name: "virus.exe".to_string(),
            bytes: 66,
        },
    );

    pool.close();
    info!(
        store_calls = flaky_calls.load(Ordering::SeqCst),
        respawned = pool.respawn_count(),
        "Pool closed"
    );
    Ok(())
}

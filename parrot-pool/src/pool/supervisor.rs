//! # Pool Supervisor
//!
//! Keeps the pool at its configured size. The supervisor runs on its own
//! thread and owns the worker exit channel:
//! - a worker that faulted is answered with exactly one replacement, whether
//!   the pool is open or closing
//! - a worker that drained (queue disconnected and empty) is retired
//!
//! `close` disconnects the queue and then signals shutdown. From then on the
//! supervisor only waits until every worker has retired, which is what makes
//! joining it the end of the drain.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{trace, warn};

use super::error::PoolError;
use super::worker::{ExitReason, WorkerExit, WorkerLauncher};

/// What the supervisor did over its lifetime
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct SupervisorReport {
    /// Replacement workers started
    pub(crate) respawned: usize,
    /// Replacements that could not be started
    pub(crate) lost: usize,
}

enum Event {
    Shutdown,
    WorkerExited(WorkerExit),
}

pub(crate) struct Supervisor<T> {
    launcher: Arc<WorkerLauncher<T>>,
    shutdown_rx: flume::Receiver<()>,
    exit_rx: flume::Receiver<WorkerExit>,
}

impl<T: Send + 'static> Supervisor<T> {
    pub(crate) fn new(
        launcher: Arc<WorkerLauncher<T>>,
        shutdown_rx: flume::Receiver<()>,
        exit_rx: flume::Receiver<WorkerExit>,
    ) -> Self {
        Self {
            launcher,
            shutdown_rx,
            exit_rx,
        }
    }

    /// Start the control loop on a named thread.
    pub(crate) fn spawn(self, name: String) -> Result<JoinHandle<SupervisorReport>, PoolError> {
        let dispatch = crate::logging::current_subscriber();
        thread::Builder::new()
            .name(name.clone())
            .spawn(move || tracing::dispatcher::with_default(&dispatch, || self.run()))
            .map_err(|source| PoolError::Spawn { name, source })
    }

    fn run(self) -> SupervisorReport {
        let mut report = SupervisorReport::default();

        loop {
            let event = flume::Selector::new()
                // A dropped shutdown sender means the pool handle is gone
                .recv(&self.shutdown_rx, |_| Event::Shutdown)
                .recv(&self.exit_rx, |exit| match exit {
                    Ok(exit) => Event::WorkerExited(exit),
                    Err(_) => Event::Shutdown,
                })
                .wait();

            match event {
                Event::Shutdown => break,
                Event::WorkerExited(exit) => self.handle_exit(exit, &mut report),
            }
        }

        crate::log_lifecycle!("supervisor", "draining", live = self.launcher.live());
        while self.launcher.live() > 0 {
            match self.exit_rx.recv() {
                Ok(exit) => self.handle_exit(exit, &mut report),
                Err(_) => break,
            }
        }

        crate::log_lifecycle!("supervisor", "stopped", respawned = report.respawned, lost = report.lost);
        report
    }

    fn handle_exit(&self, exit: WorkerExit, report: &mut SupervisorReport) {
        match &exit.reason {
            ExitReason::Faulted(message) => {
                warn!(worker = exit.worker, error = %message, "Worker faulted, starting replacement");
                self.replace(exit.worker, report);
            }
            ExitReason::Drained => {
                let live = self.launcher.retire();
                trace!(worker = exit.worker, live, "Worker drained");
            }
        }
    }

    fn replace(&self, worker: usize, report: &mut SupervisorReport) {
        // The faulted worker is gone either way; a replacement counts itself in
        self.launcher.retire();
        match self.launcher.launch() {
            Ok(number) => {
                report.respawned += 1;
                self.launcher.shared().record_respawn();
                crate::log_worker!(number, "respawned", replaces = worker);
            }
            Err(err) => {
                report.lost += 1;
                crate::log_error!(err, replaces = worker);
            }
        }
    }
}

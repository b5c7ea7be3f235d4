use std::fmt;

/// Worker ID used by `send_job` and `register_default`.
pub const DEFAULT_WORKER_ID: &str = "_DEFAULT";

/// A unit of work travelling from a caller to exactly one worker.
///
/// The envelope is immutable: the worker reads the destination and the
/// payload, nothing else changes it. Blocking sends attach a claim notifier
/// that the worker fires as soon as it takes the job off the queue.
pub struct Job<T> {
    worker_id: String,
    data: T,
    claim: Option<flume::Sender<()>>,
}

impl<T> Job<T> {
    /// Create a fire-and-forget job.
    pub fn new(worker_id: impl Into<String>, data: T) -> Self {
        Self {
            worker_id: worker_id.into(),
            data,
            claim: None,
        }
    }

    /// Create a job whose claim is reported on the returned receiver.
    pub(crate) fn with_claim(worker_id: impl Into<String>, data: T) -> (Self, flume::Receiver<()>) {
        let (claim_tx, claim_rx) = flume::bounded(1);
        let job = Self {
            worker_id: worker_id.into(),
            data,
            claim: Some(claim_tx),
        };
        (job, claim_rx)
    }

    /// Destination worker ID
    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Payload
    pub fn data(&self) -> &T {
        &self.data
    }

    /// Notify the sender (if it is waiting) that a worker owns this job now.
    ///
    /// Fires at most once; later calls do nothing.
    pub(crate) fn claim(&mut self) {
        if let Some(claim_tx) = self.claim.take() {
            // The sender may have given up waiting; that is not our problem.
            let _ = claim_tx.send(());
        }
    }
}

impl<T> fmt::Debug for Job<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("worker_id", &self.worker_id)
            .field("awaiting_claim", &self.claim.is_some())
            .finish()
    }
}

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Function processing one job payload.
///
/// Returning `Err` (or panicking) counts as a failed attempt.
pub type Handler<T> = Arc<dyn Fn(&T) -> anyhow::Result<()> + Send + Sync>;

/// Mapping from worker ID to the handler that processes jobs sent to it
///
/// The registry carries no synchronization of its own; the pool keeps it
/// behind its state lock and only mutates it through the registration calls.
/// A missing entry is valid: jobs for that ID are dropped.
pub struct HandlerRegistry<T> {
    handlers: HashMap<String, Handler<T>>,
}

impl<T> HandlerRegistry<T> {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Install a handler, replacing any previous one for the same ID.
    ///
    /// # Returns
    /// The handler that was replaced, if there was one
    pub fn insert(&mut self, worker_id: impl Into<String>, handler: Handler<T>) -> Option<Handler<T>> {
        self.handlers.insert(worker_id.into(), handler)
    }

    /// Look up the handler for a worker ID.
    pub fn get(&self, worker_id: &str) -> Option<Handler<T>> {
        self.handlers.get(worker_id).cloned()
    }

    pub fn contains(&self, worker_id: &str) -> bool {
        self.handlers.contains_key(worker_id)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Registered worker IDs, in no particular order
    pub fn worker_ids(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }
}

impl<T> Default for HandlerRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for HandlerRegistry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("worker_ids", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

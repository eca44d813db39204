//! The worker plane: one FIFO queue per configured queue name, each queue
//! owned by a single consumer task so that a request is never picked up by
//! more than one worker (SPEC_FULL.md §5 "a single worker owns a request
//! from dispatch through its terminal state"). Concurrency across queues is
//! bounded globally by `IIB_WORKER_POOL_SIZE` via a shared semaphore, so
//! "SERIAL:" queues still serialize while unrelated "PARALLEL:" queues make
//! progress concurrently, without unbounded fan-out.

use std::collections::HashMap;
use std::sync::Arc;

use iib_id::RequestId;
use tokio::sync::{mpsc, Mutex, Semaphore};
use tracing::info;

use crate::driver::BuildDriver;
use crate::state::AppState;

pub struct WorkItem {
    pub request_id: RequestId,
}

/// The queue backend refused the work item — its consumer task is gone.
#[derive(Debug, Clone, Copy)]
pub struct SchedulingError;

impl std::fmt::Display for SchedulingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "queue consumer is no longer running")
    }
}

impl std::error::Error for SchedulingError {}

#[derive(Clone)]
pub struct QueueRegistry {
    senders: Arc<Mutex<HashMap<String, mpsc::UnboundedSender<WorkItem>>>>,
    permits: Arc<Semaphore>,
}

impl QueueRegistry {
    pub fn new() -> Self {
        Self {
            senders: Arc::new(Mutex::new(HashMap::new())),
            permits: Arc::new(Semaphore::new(usize::MAX)),
        }
    }

    /// Size the global concurrency bound once, at startup.
    pub fn with_capacity(worker_pool_size: usize) -> Self {
        Self {
            senders: Arc::new(Mutex::new(HashMap::new())),
            permits: Arc::new(Semaphore::new(worker_pool_size.max(1))),
        }
    }

    /// Enqueue `item` onto `queue`, spawning that queue's consumer loop the
    /// first time the name is seen. Fails only if that queue's consumer task
    /// has died (its receiver dropped) — the scheduling-failure path
    /// (SPEC_FULL.md §4.7 step 6) reacts to this.
    pub async fn dispatch(&self, queue: &str, item: WorkItem, state: &AppState) -> Result<(), SchedulingError> {
        let mut senders = self.senders.lock().await;
        let sender = senders.entry(queue.to_string()).or_insert_with(|| {
            let (tx, rx) = mpsc::unbounded_channel();
            tokio::spawn(run_queue(queue.to_string(), rx, state.clone(), self.permits.clone()));
            tx
        });
        sender.send(item).map_err(|_| SchedulingError)
    }
}

impl Default for QueueRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// One queue's consumer loop: strictly FIFO, one request in flight at a
/// time for this queue, acquiring a global permit before running the driver
/// so the total number of builds running across every queue stays bounded.
async fn run_queue(
    name: String,
    mut rx: mpsc::UnboundedReceiver<WorkItem>,
    state: AppState,
    permits: Arc<Semaphore>,
) {
    info!(queue = %name, "worker queue started");
    while let Some(item) = rx.recv().await {
        let _permit = permits.acquire().await.expect("semaphore never closed");
        let driver = BuildDriver::new(&state);
        driver.run(item.request_id).await;
    }
    info!(queue = %name, "worker queue drained, no more senders");
}

//! Worker pool: consumes stage messages from the named queues.
//!
//! Each queue gets its own number of consumer tasks. A consumer handles one
//! message at a time, so `gpu` concurrency 1 serializes page classification
//! while `llm` can keep many language model calls in flight.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use super::{BoxedJobQueue, JobQueue, QueueName, WorkQueueError};

/// Processes one decoded message. Failures are the handler's to report;
/// the pool never retries.
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    type Message: DeserializeOwned + Send + 'static;

    async fn handle(&self, queue: QueueName, message: Self::Message);
}

const DEFAULT_POLL: Duration = Duration::from_secs(1);
const IDLE_POLL: Duration = Duration::from_millis(20);
const BACKEND_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Shared by the workers of one run so a draining pool can tell when it
/// has run out of work.
#[derive(Default)]
struct Activity {
    /// Messages being handled.
    busy: AtomicUsize,
    /// Held for reading from pop until `busy` is incremented; the idle check
    /// takes it for writing so no message is ever between the two.
    gate: RwLock<()>,
}

pub struct WorkerPool<H: MessageHandler> {
    queue: BoxedJobQueue,
    handler: Arc<H>,
    concurrency: HashMap<QueueName, usize>,
    poll_timeout: Duration,
}

impl<H: MessageHandler> WorkerPool<H> {
    pub fn new(queue: BoxedJobQueue, handler: Arc<H>) -> Self {
        let concurrency = HashMap::from([(QueueName::Gpu, 1), (QueueName::Llm, 20)]);
        Self {
            queue,
            handler,
            concurrency,
            poll_timeout: DEFAULT_POLL,
        }
    }

    pub fn with_concurrency(mut self, queue: QueueName, workers: usize) -> Self {
        self.concurrency.insert(queue, workers);
        self
    }

    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    /// Only consume the given queues (others get zero workers).
    pub fn only(mut self, queues: &[QueueName]) -> Self {
        for q in QueueName::ALL {
            if !queues.contains(&q) {
                self.concurrency.insert(q, 0);
            }
        }
        self
    }

    pub fn concurrency(&self, queue: QueueName) -> usize {
        self.concurrency.get(&queue).copied().unwrap_or(0)
    }

    /// Consume until `shutdown` flips to true.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) -> Result<(), WorkQueueError> {
        let activity = Arc::new(Activity::default());
        let workers = self.spawn_workers(&activity, self.poll_timeout, shutdown);
        join_workers(workers).await;
        Ok(())
    }

    /// Consume until every queue is empty and no message is being handled.
    /// Messages enqueued by handlers are processed too.
    pub async fn run_until_idle(&self) -> Result<(), WorkQueueError> {
        let activity = Arc::new(Activity::default());
        let (stop_tx, stop_rx) = watch::channel(false);
        let workers = self.spawn_workers(&activity, IDLE_POLL, stop_rx);

        loop {
            tokio::time::sleep(IDLE_POLL).await;
            if self.is_idle(&activity).await? {
                break;
            }
        }
        let _ = stop_tx.send(true);
        join_workers(workers).await;
        Ok(())
    }

    fn spawn_workers(
        &self,
        activity: &Arc<Activity>,
        poll_timeout: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Vec<JoinHandle<()>> {
        let mut workers = Vec::new();
        for name in QueueName::ALL {
            for id in 0..self.concurrency(name) {
                let worker = Worker {
                    name,
                    id,
                    queue: self.queue.clone(),
                    handler: self.handler.clone(),
                    activity: activity.clone(),
                    poll_timeout,
                };
                workers.push(tokio::spawn(worker.run(shutdown.clone())));
            }
        }
        workers
    }

    async fn is_idle(&self, activity: &Activity) -> Result<bool, WorkQueueError> {
        let _gate = activity.gate.write().await;
        if activity.busy.load(Ordering::SeqCst) != 0 {
            return Ok(false);
        }
        for q in QueueName::ALL {
            if self.queue.len(q).await? != 0 {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

async fn join_workers(workers: Vec<JoinHandle<()>>) {
    for handle in workers {
        if let Err(e) = handle.await {
            error!("Queue worker panicked: {}", e);
        }
    }
}

struct Worker<H: MessageHandler> {
    name: QueueName,
    id: usize,
    queue: BoxedJobQueue,
    handler: Arc<H>,
    activity: Arc<Activity>,
    poll_timeout: Duration,
}

impl<H: MessageHandler> Worker<H> {
    async fn run(self, shutdown: watch::Receiver<bool>) {
        debug!("{} worker {} started", self.name, self.id);
        while !*shutdown.borrow() {
            let popped = {
                let _gate = self.activity.gate.read().await;
                let popped = self.queue.pop(self.name, self.poll_timeout).await;
                if matches!(popped, Ok(Some(_))) {
                    self.activity.busy.fetch_add(1, Ordering::SeqCst);
                }
                popped
            };

            match popped {
                Ok(Some(payload)) => {
                    self.dispatch(&payload).await;
                    self.activity.busy.fetch_sub(1, Ordering::SeqCst);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!("{} worker {}: queue error: {}", self.name, self.id, e);
                    tokio::time::sleep(BACKEND_RETRY_DELAY).await;
                }
            }
        }
        debug!("{} worker {} stopped", self.name, self.id);
    }

    async fn dispatch(&self, payload: &str) {
        match serde_json::from_str::<H::Message>(payload) {
            Ok(message) => self.handler.handle(self.name, message).await,
            Err(e) => warn!(
                "{} worker {}: dropping malformed message: {}",
                self.name, self.id, e
            ),
        }
    }
}

//! Bounded dispatch of inbound frames.
//!
//! Read loops submit frames into one bounded queue; a fixed pool of workers
//! drains it through [`MessageRelay::handle_frame`]. A full queue makes
//! `submit` wait, which stalls the submitting read loop instead of growing
//! the number of in-flight frames.
//!
//! Frames from one connection may complete out of order when more than one
//! worker is running.

use crate::error::DispatchClosed;
use crate::relay::MessageRelay;
use crate::storage::BoundIdentity;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;

/// One inbound frame waiting to be relayed.
#[derive(Debug, Clone)]
pub struct FrameJob {
    /// Identity of the connection the frame was read from.
    pub sender: BoundIdentity,
    /// Raw frame bytes.
    pub payload: Vec<u8>,
}

/// Fixed worker pool behind a bounded queue.
pub struct Dispatcher {
    sender: RwLock<Option<mpsc::Sender<FrameJob>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher").finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// Start `workers` tasks draining a queue of `queue_capacity` frames.
    pub fn spawn(relay: Arc<MessageRelay>, workers: usize, queue_capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));

        let handles = (0..workers.max(1))
            .map(|worker| tokio::spawn(worker_loop(worker, rx.clone(), relay.clone())))
            .collect();

        tracing::info!(workers, queue_capacity, "dispatcher started");

        Self {
            sender: RwLock::new(Some(tx)),
            workers: Mutex::new(handles),
        }
    }

    /// Queue a frame, waiting while the queue is full.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchClosed`] after [`Dispatcher::shutdown`].
    pub async fn submit(&self, job: FrameJob) -> Result<(), DispatchClosed> {
        let sender = self.sender.read().await.clone().ok_or(DispatchClosed)?;
        sender.send(job).await.map_err(|_| DispatchClosed)
    }

    /// Close the queue and wait for the workers to drain it.
    ///
    /// Frames already queued are relayed before this returns.
    pub async fn shutdown(&self) {
        self.sender.write().await.take();

        let handles = std::mem::take(&mut *self.workers.lock().await);
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "dispatch worker failed");
            }
        }
        tracing::info!("dispatcher stopped");
    }
}

async fn worker_loop(
    worker: usize,
    queue: Arc<Mutex<mpsc::Receiver<FrameJob>>>,
    relay: Arc<MessageRelay>,
) {
    loop {
        let job = queue.lock().await.recv().await;
        let Some(job) = job else {
            break;
        };
        // Failures are logged and counted by the relay.
        let _ = relay.handle_frame(&job.sender, &job.payload).await;
    }
    tracing::debug!(worker, "dispatch worker exiting");
}

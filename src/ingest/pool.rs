//! Preprocessing worker pool.
//!
//! A shared bounded MPMC queue feeds dedicated OS threads; busy workers
//! naturally stop pulling while free ones pick up slack. Contexts move
//! through the channel by ownership, never cloned. Only preprocessing
//! runs here — the spec lock is untouched until the serial indexer
//! takes over.

use std::thread::JoinHandle;

use crate::host::Host;

use super::AddDocumentCtx;

/// Queued documents before submitters start blocking.
const POOL_QUEUE_CAP: usize = 256;

pub(crate) struct WorkerPool<H: Host> {
    sender: async_channel::Sender<Box<AddDocumentCtx<H>>>,
    workers: Vec<JoinHandle<()>>,
}

impl<H: Host> WorkerPool<H> {
    pub fn spawn(num_workers: usize) -> Self {
        let (sender, receiver) = async_channel::bounded(POOL_QUEUE_CAP);
        let mut workers = Vec::with_capacity(num_workers.max(1));
        for i in 0..num_workers.max(1) {
            let rx: async_channel::Receiver<Box<AddDocumentCtx<H>>> = receiver.clone();
            workers.push(
                std::thread::Builder::new()
                    .name(format!("quarry-index-worker-{}", i))
                    .spawn(move || {
                        while let Ok(ctx) = rx.recv_blocking() {
                            super::add_to_indexes(ctx);
                        }
                    })
                    .expect("failed to spawn index worker thread"),
            );
        }
        Self { sender, workers }
    }

    /// Queue a context for preprocessing; falls back to the calling
    /// thread if the pool has shut down.
    pub fn run(&self, ctx: Box<AddDocumentCtx<H>>) {
        if let Err(async_channel::SendError(ctx)) = self.sender.send_blocking(ctx) {
            super::add_to_indexes(ctx);
        }
    }
}

impl<H: Host> Drop for WorkerPool<H> {
    fn drop(&mut self) {
        self.sender.close();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

//! Single-worker FIFO command queue

use crate::utils::error::{DiscPlayerError, Result};
use crossbeam::channel::{bounded, unbounded, Sender};
use log::{debug, error, warn};
use parking_lot::Mutex;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};

/// A queued command and the signal raised once it has run
struct Envelope<C> {
    command: C,
    done: Option<Sender<()>>,
}

/// FIFO queue executed by exactly one worker thread
pub struct CommandQueue<C: Send + 'static> {
    name: String,

    /// `None` once the queue has been shut down
    tx: Mutex<Option<Sender<Envelope<C>>>>,

    worker: Mutex<Option<JoinHandle<()>>>,
    worker_id: ThreadId,

    executed: Arc<AtomicU64>,
}

impl<C: Send + 'static> CommandQueue<C> {
    /// Spawn the worker; `execute` runs each command in submission order
    pub fn spawn<F>(name: &str, mut execute: F) -> Result<Self>
    where
        F: FnMut(C) + Send + 'static,
    {
        let (tx, rx) = unbounded::<Envelope<C>>();
        let executed = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&executed);
        let thread_name = name.to_string();

        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                for envelope in rx.iter() {
                    let Envelope { command, done } = envelope;

                    // A panicking command must not take the worker down with it
                    if panic::catch_unwind(AssertUnwindSafe(|| execute(command))).is_err() {
                        error!("Command panicked on queue {}", thread_name);
                    }
                    counter.fetch_add(1, Ordering::SeqCst);

                    if let Some(done) = done {
                        let _ = done.send(());
                    }
                }
                debug!("Command queue {} drained", thread_name);
            })
            .map_err(|e| DiscPlayerError::Internal(format!("Failed to spawn queue {}: {}", name, e)))?;

        let worker_id = handle.thread().id();

        Ok(Self {
            name: name.to_string(),
            tx: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(handle)),
            worker_id,
            executed,
        })
    }

    fn submit(&self, command: C, done: Option<Sender<()>>) -> bool {
        let tx = self.tx.lock();
        match tx.as_ref() {
            Some(tx) => tx.send(Envelope { command, done }).is_ok(),
            None => false,
        }
    }

    /// Enqueue without waiting; `false` if the queue no longer accepts commands
    pub fn post(&self, command: C) -> bool {
        self.submit(command, None)
    }

    /// Enqueue and block until the worker has executed the command
    ///
    /// Returns `false` if the command was rejected or dropped unexecuted.
    pub fn post_and_wait(&self, command: C) -> bool {
        if self.is_worker_thread() {
            warn!("Queue {}: blocking post from its own worker refused", self.name);
            return false;
        }

        let (done_tx, done_rx) = bounded(1);
        if !self.submit(command, Some(done_tx)) {
            return false;
        }

        done_rx.recv().is_ok()
    }

    /// Stop accepting commands, let the worker drain what is queued, and join it
    ///
    /// Only the first call has any effect.
    pub fn shutdown(&self) {
        let Some(tx) = self.tx.lock().take() else {
            return;
        };
        drop(tx);

        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            if self.is_worker_thread() {
                // Called from a command body; the worker exits once the channel empties
                return;
            }
            if handle.join().is_err() {
                error!("Command queue {} worker panicked", self.name);
            }
        }
        debug!("Command queue {} shut down", self.name);
    }

    pub fn is_shut_down(&self) -> bool {
        self.tx.lock().is_none()
    }

    pub fn is_worker_thread(&self) -> bool {
        thread::current().id() == self.worker_id
    }

    /// Number of commands the worker has finished
    pub fn executed(&self) -> u64 {
        self.executed.load(Ordering::SeqCst)
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<C: Send + 'static> Drop for CommandQueue<C> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

//! Bounded shutdown of threads the controller does not own
//!
//! Listener callbacks and application callbacks run on threads whose code is
//! outside our control. Stopping them escalates: wait for a clean exit,
//! raise the cooperative interrupt flag and wait a short grace period, and
//! finally abandon (detach) the thread if it still refuses to exit.

use crate::utils::error::{DiscPlayerError, Result};
use log::{error, info};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Cooperative interrupt flag shared with a running thread
#[derive(Debug, Clone, Default)]
pub struct InterruptFlag(Arc<AtomicBool>);

impl InterruptFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn interrupt(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_interrupted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A spawned thread paired with its interrupt flag
pub struct StoppableThread {
    name: String,
    handle: JoinHandle<()>,
    interrupt: InterruptFlag,
}

/// How a thread ended up after [`stop_thread`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// Exited within the timeout
    Exited,
    /// Exited after being interrupted
    Interrupted,
    /// Still running after the grace period and was detached
    Abandoned,
}

impl StoppableThread {
    /// Spawn a named thread that receives its interrupt flag
    pub fn spawn<F>(name: &str, body: F) -> Result<Self>
    where
        F: FnOnce(InterruptFlag) + Send + 'static,
    {
        let interrupt = InterruptFlag::new();
        let flag = interrupt.clone();
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || body(flag))
            .map_err(|e| DiscPlayerError::Internal(format!("Failed to spawn {} thread: {}", name, e)))?;

        Ok(Self {
            name: name.to_string(),
            handle,
            interrupt,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> ThreadId {
        self.handle.thread().id()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub fn interrupt_flag(&self) -> &InterruptFlag {
        &self.interrupt
    }
}

fn wait_thread(thread: &StoppableThread, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while !thread.is_finished() && Instant::now() < deadline {
        thread::sleep(POLL_INTERVAL);
    }

    let finished = thread.is_finished();
    if !finished {
        error!("wait_thread timeout: {}", thread.name);
    }
    finished
}

/// Stop a thread: wait, interrupt, wait `grace`, then abandon
pub fn stop_thread(thread: StoppableThread, timeout: Duration, grace: Duration, kind: &str) -> StopOutcome {
    if thread.id() == thread::current().id() {
        // Joining ourselves would never return
        thread.interrupt.interrupt();
        return StopOutcome::Abandoned;
    }

    let outcome = if wait_thread(&thread, timeout) {
        StopOutcome::Exited
    } else {
        thread.interrupt.interrupt();
        if wait_thread(&thread, grace) {
            StopOutcome::Interrupted
        } else {
            error!("abandoning {} thread {}", kind, thread.name);
            StopOutcome::Abandoned
        }
    };

    if outcome != StopOutcome::Abandoned {
        if thread.handle.join().is_err() {
            error!("{} thread {} panicked", kind, thread.name);
        }
        info!("Stopped {} thread {} ({:?})", kind, thread.name, outcome);
    }

    outcome
}

//! Per-controller event delivery thread

use crate::events::{ControllerEvent, ControllerListener};
use crate::utils::error::Result;
use crate::utils::thread::{stop_thread, StopOutcome, StoppableThread};
use crossbeam::channel::{unbounded, Receiver, Sender};
use log::{debug, error, trace};
use parking_lot::{Mutex, RwLock};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Handle returned when a listener is registered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(usize);

type ListenerList = Arc<RwLock<Vec<(ListenerId, Arc<dyn ControllerListener>)>>>;

/// Delivers events to listeners without blocking the emitter
pub struct EventDispatcher {
    listeners: ListenerList,
    next_id: AtomicUsize,

    /// `None` once shut down
    tx: Mutex<Option<Sender<ControllerEvent>>>,
    thread: Mutex<Option<StoppableThread>>,

    delivered: Arc<AtomicU64>,
}

impl EventDispatcher {
    pub fn new(name: &str) -> Result<Self> {
        let (tx, rx) = unbounded();
        let listeners: ListenerList = Arc::new(RwLock::new(Vec::new()));
        let delivered = Arc::new(AtomicU64::new(0));

        let thread = {
            let listeners = Arc::clone(&listeners);
            let delivered = Arc::clone(&delivered);
            StoppableThread::spawn(name, move |interrupt| {
                deliver_loop(rx, listeners, delivered, || interrupt.is_interrupted());
            })?
        };

        Ok(Self {
            listeners,
            next_id: AtomicUsize::new(0),
            tx: Mutex::new(Some(tx)),
            thread: Mutex::new(Some(thread)),
            delivered,
        })
    }

    pub fn add_listener(&self, listener: Arc<dyn ControllerListener>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push((id, listener));
        id
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// Queue an event for delivery; `false` after shutdown
    pub fn emit(&self, event: ControllerEvent) -> bool {
        trace!("{} emits {}", event.source, event.name());
        match self.tx.lock().as_ref() {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }

    /// Events handed to listeners so far
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::SeqCst)
    }

    /// Deliver what is already queued, then stop the thread
    ///
    /// A listener that keeps the thread busy past `timeout` is interrupted
    /// and, after `grace`, abandoned. Called from a listener callback, the
    /// thread is left to drain the queue and exit once the callback returns;
    /// nothing is interrupted and `None` is returned.
    pub fn shutdown(&self, timeout: Duration, grace: Duration) -> Option<StopOutcome> {
        drop(self.tx.lock().take());
        let thread = self.thread.lock().take()?;
        if thread.id() == thread::current().id() {
            debug!("{} shut down from a listener callback, draining", thread.name());
            return None;
        }
        Some(stop_thread(thread, timeout, grace, "listener"))
    }
}

impl Drop for EventDispatcher {
    fn drop(&mut self) {
        drop(self.tx.lock().take());
        // Detach; the loop ends on its own once the channel is drained
        self.thread.lock().take();
    }
}

fn deliver_loop<F>(rx: Receiver<ControllerEvent>, listeners: ListenerList, delivered: Arc<AtomicU64>, interrupted: F)
where
    F: Fn() -> bool,
{
    for event in rx.iter() {
        if interrupted() {
            debug!("Listener thread interrupted, discarding pending events");
            break;
        }

        // Snapshot so listeners may (un)register from inside a callback
        let snapshot: Vec<Arc<dyn ControllerListener>> =
            listeners.read().iter().map(|(_, l)| Arc::clone(l)).collect();

        for listener in snapshot {
            if panic::catch_unwind(AssertUnwindSafe(|| listener.controller_update(&event))).is_err() {
                error!("Listener panicked while handling {} from {}", event.name(), event.source);
            }
        }
        delivered.fetch_add(1, Ordering::SeqCst);
    }
}

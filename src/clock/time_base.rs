//! Time bases the controller extrapolates media time against

use once_cell::sync::Lazy;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Monotonic time source in nanoseconds
pub trait TimeBase: Send + Sync {
    /// Current reading in nanoseconds
    fn nanoseconds(&self) -> i64;
}

static PROCESS_EPOCH: Lazy<Instant> = Lazy::new(Instant::now);

/// Wall-clock time base shared by the whole process
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeBase;

impl SystemTimeBase {
    /// Shared handle to the system time base
    pub fn shared() -> Arc<dyn TimeBase> {
        static SHARED: Lazy<Arc<dyn TimeBase>> = Lazy::new(|| Arc::new(SystemTimeBase));
        Arc::clone(&SHARED)
    }
}

impl TimeBase for SystemTimeBase {
    fn nanoseconds(&self) -> i64 {
        PROCESS_EPOCH.elapsed().as_nanos() as i64
    }
}

/// Time base that only moves when told to
#[derive(Debug, Default)]
pub struct ManualTimeBase {
    now: AtomicI64,
}

impl ManualTimeBase {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(by.as_nanos() as i64, Ordering::SeqCst);
    }

    pub fn set(&self, nanos: i64) {
        self.now.store(nanos, Ordering::SeqCst);
    }
}

impl TimeBase for ManualTimeBase {
    fn nanoseconds(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

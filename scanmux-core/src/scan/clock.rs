use std::sync::atomic::{AtomicU64, Ordering};

use tokio::time::Instant;

/// Monotonic time source used to age cached results.
pub trait Clock: Send + Sync {
    /// Milliseconds since boot, on the same timeline as result timestamps.
    fn elapsed_since_boot_ms(&self) -> u64;
}

/// Clock backed by tokio's monotonic instant, offset so that the moment of
/// construction reads as `boot_offset_ms`.
#[derive(Debug)]
pub struct MonotonicClock {
    origin: Instant,
    boot_offset_ms: u64,
}

impl MonotonicClock {
    pub fn new(boot_offset_ms: u64) -> Self {
        Self {
            origin: Instant::now(),
            boot_offset_ms,
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new(0)
    }
}

impl Clock for MonotonicClock {
    fn elapsed_since_boot_ms(&self) -> u64 {
        self.boot_offset_ms + self.origin.elapsed().as_millis() as u64
    }
}

/// Clock advanced explicitly by its owner.
#[derive(Debug, Default)]
pub struct ManualClock {
    now_ms: AtomicU64,
}

impl ManualClock {
    pub fn new(now_ms: u64) -> Self {
        Self {
            now_ms: AtomicU64::new(now_ms),
        }
    }

    pub fn set(&self, now_ms: u64) {
        self.now_ms.store(now_ms, Ordering::SeqCst);
    }

    pub fn advance(&self, delta_ms: u64) {
        self.now_ms.fetch_add(delta_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn elapsed_since_boot_ms(&self) -> u64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

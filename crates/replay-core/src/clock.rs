//! Wall-clock and monotonic time sources.
//!
//! Two clocks are distinguished throughout the engine: a wall-clock millis
//! source for anything a server or human reads (event timestamps, session
//! boundaries) and a monotonic millis source used only for budget/deadline
//! measurement (hierarchy scan budget, ANR ping round-trip, dead-tap window).
//! Both are behind one trait so tests can inject a deterministic clock
//! instead of sleeping real wall-clock time.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Abstract time source used by every component that measures elapsed time.
pub trait Clock: Send + Sync {
    /// Current wall-clock time in Unix epoch milliseconds.
    fn wall_ms(&self) -> u64;

    /// Current monotonic time in milliseconds since an arbitrary origin.
    ///
    /// Only differences between two calls are meaningful.
    fn monotonic_ms(&self) -> u64;
}

/// Production clock backed by `SystemTime`/`Instant`.
#[derive(Debug, Default)]
pub struct SystemClock {
    origin: std::sync::OnceLock<Instant>,
}

impl SystemClock {
    /// Creates a new system clock.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Clock for SystemClock {
    fn wall_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|duration| duration.as_millis() as u64)
            .unwrap_or(0)
    }

    fn monotonic_ms(&self) -> u64 {
        let origin = self.origin.get_or_init(Instant::now);
        origin.elapsed().as_millis() as u64
    }
}

/// Deterministic clock for tests: both wall and monotonic time are settable
/// counters advanced explicitly by the test body.
#[derive(Debug, Default)]
pub struct MonotonicClock {
    wall_ms: AtomicU64,
    monotonic_ms: AtomicU64,
}

impl MonotonicClock {
    /// Creates a test clock starting at the given wall/monotonic values.
    pub fn at(wall_ms: u64, monotonic_ms: u64) -> Self {
        Self {
            wall_ms: AtomicU64::new(wall_ms),
            monotonic_ms: AtomicU64::new(monotonic_ms),
        }
    }

    /// Advances both wall and monotonic time by `delta_ms`.
    pub fn advance(&self, delta_ms: u64) {
        self.wall_ms.fetch_add(delta_ms, Ordering::SeqCst);
        self.monotonic_ms.fetch_add(delta_ms, Ordering::SeqCst);
    }

    /// Sets wall-clock time directly.
    pub fn set_wall_ms(&self, value: u64) {
        self.wall_ms.store(value, Ordering::SeqCst);
    }
}

impl Clock for MonotonicClock {
    fn wall_ms(&self) -> u64 {
        self.wall_ms.load(Ordering::SeqCst)
    }

    fn monotonic_ms(&self) -> u64 {
        self.monotonic_ms.load(Ordering::SeqCst)
    }
}

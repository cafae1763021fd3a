use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Monotonic nanosecond time source.
///
/// Implementations never move backwards. The zero point is arbitrary; only
/// differences between readings are meaningful.
pub trait HostClock: Send + Sync {
    fn now_ns(&self) -> u64;
}

/// Production clock backed by [`Instant`].
#[derive(Debug)]
pub struct StdHostClock {
    origin: Instant,
}

impl StdHostClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for StdHostClock {
    fn default() -> Self {
        Self::new()
    }
}

impl HostClock for StdHostClock {
    fn now_ns(&self) -> u64 {
        // u64 nanoseconds is ~584 years; truncation is unreachable in practice.
        self.origin.elapsed().as_nanos() as u64
    }
}

/// Manually driven clock for deterministic tests.
///
/// Shared via `Arc` with the system under test; tests call [`set_ns`] or
/// [`advance`] to move time forward.
///
/// [`set_ns`]: FakeHostClock::set_ns
/// [`advance`]: FakeHostClock::advance
#[derive(Debug, Default)]
pub struct FakeHostClock {
    now_ns: AtomicU64,
}

impl FakeHostClock {
    pub fn new(start_ns: u64) -> Self {
        Self {
            now_ns: AtomicU64::new(start_ns),
        }
    }

    pub fn set_ns(&self, ns: u64) {
        self.now_ns.store(ns, Ordering::SeqCst);
    }

    pub fn advance(&self, dt: Duration) {
        let dt_ns: u64 = dt
            .as_nanos()
            .try_into()
            .expect("fake clock advance exceeds u64 nanoseconds");
        self.now_ns.fetch_add(dt_ns, Ordering::SeqCst);
    }
}

impl HostClock for FakeHostClock {
    fn now_ns(&self) -> u64 {
        self.now_ns.load(Ordering::SeqCst)
    }
}

/// Elapsed time since the last reset, read from a shared [`HostClock`].
#[derive(Clone)]
pub struct Stopwatch {
    clock: Arc<dyn HostClock>,
    mark_ns: u64,
}

impl Stopwatch {
    /// Starts a stopwatch at the clock's current reading.
    pub fn start(clock: Arc<dyn HostClock>) -> Self {
        let mark_ns = clock.now_ns();
        Self { clock, mark_ns }
    }

    /// Time elapsed since the last reset.
    pub fn elapsed(&self) -> Duration {
        Duration::from_nanos(self.clock.now_ns().saturating_sub(self.mark_ns))
    }

    /// Moves the reset point to now.
    pub fn reset(&mut self) {
        self.mark_ns = self.clock.now_ns();
    }

    /// Returns the elapsed time and resets, from a single clock reading.
    pub fn lap(&mut self) -> Duration {
        let now_ns = self.clock.now_ns();
        let dt = Duration::from_nanos(now_ns.saturating_sub(self.mark_ns));
        self.mark_ns = now_ns;
        dt
    }
}

impl fmt::Debug for Stopwatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stopwatch")
            .field("mark_ns", &self.mark_ns)
            .field("elapsed", &self.elapsed())
            .finish()
    }
}

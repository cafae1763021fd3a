use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::Duration;

use crate::event::Event;
use crate::timer::TimerId;

/// Dense id of a saved user event. Meaningful only relative to the buffer it
/// was submitted to; swapping buffers invalidates all outstanding ids.
pub type EventId = u32;

/// Outcome of asking a buffer for its next event.
#[derive(Debug)]
pub enum Fetched {
    /// Spurious wake; nothing to deliver.
    None,
    /// A platform event, filled in by the buffer itself.
    System(Event),
    /// A user event previously submitted by id; the queue owns the payload.
    User(EventId),
}

/// The platform seam: blocks for system events and owns platform timers.
///
/// Implementations are internally synchronized. `add_event` may be called
/// from any producer thread while the single consumer sits in
/// [`wait_for_event`](Self::wait_for_event); every other operation completes
/// in bounded time.
pub trait EventQueueBuffer: Send + Sync {
    /// Non-blocking emptiness probe.
    fn is_empty(&self) -> bool;

    /// Blocks until an event may be available or `timeout` elapses
    /// (`None` waits indefinitely). Spurious returns are allowed; the
    /// consumer re-probes via [`fetch`](Self::fetch).
    fn wait_for_event(&self, timeout: Option<Duration>);

    /// Yields the next event, if any.
    fn fetch(&self) -> Fetched;

    /// Submits a saved user event id. Returns `false` if the buffer refuses
    /// it, in which case the queue reclaims the id and drops the payload.
    fn add_event(&self, id: EventId) -> bool;

    /// Allocates a platform timer. `one_shot` lets backends choose one-shot
    /// platform primitives where those are cheaper.
    fn new_timer(&self, duration: Duration, one_shot: bool) -> TimerId;

    /// Releases a platform timer.
    fn delete_timer(&self, timer: TimerId);
}

/// Cap on queued-but-unfetched event ids in [`SimpleEventBuffer`];
/// submissions beyond it are refused.
pub const MAX_PENDING_EVENTS: usize = 4096;

struct SimpleBufferState {
    pending: VecDeque<EventId>,
    next_timer: u64,
}

/// Default in-memory FIFO, used until a platform buffer is adopted.
///
/// Carries no platform event source, so it only ever yields
/// [`Fetched::User`] or [`Fetched::None`]. Timer allocation is pure
/// bookkeeping: the queue core does all the timing.
pub struct SimpleEventBuffer {
    state: Mutex<SimpleBufferState>,
    ready: Condvar,
}

impl SimpleEventBuffer {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SimpleBufferState {
                pending: VecDeque::new(),
                next_timer: 1,
            }),
            ready: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SimpleBufferState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Default for SimpleEventBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl EventQueueBuffer for SimpleEventBuffer {
    fn is_empty(&self) -> bool {
        self.lock().pending.is_empty()
    }

    fn wait_for_event(&self, timeout: Option<Duration>) {
        let state = self.lock();
        if !state.pending.is_empty() {
            return;
        }
        match timeout {
            None => {
                let _state = self.ready.wait(state);
            }
            Some(timeout) => {
                let _state = self.ready.wait_timeout(state, timeout);
            }
        }
    }

    fn fetch(&self) -> Fetched {
        match self.lock().pending.pop_front() {
            Some(id) => Fetched::User(id),
            None => Fetched::None,
        }
    }

    fn add_event(&self, id: EventId) -> bool {
        let mut state = self.lock();
        if state.pending.len() >= MAX_PENDING_EVENTS {
            tracing::debug!(id, "pending queue full; refusing event");
            return false;
        }
        state.pending.push_back(id);
        self.ready.notify_one();
        true
    }

    fn new_timer(&self, _duration: Duration, _one_shot: bool) -> TimerId {
        let mut state = self.lock();
        let raw = state.next_timer;
        state.next_timer += 1;
        TimerId::from_raw(raw)
    }

    fn delete_timer(&self, _timer: TimerId) {
        // Nothing to release; no platform timer exists.
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Instant;

    #[test]
    fn fetch_preserves_submission_order() {
        let buffer = SimpleEventBuffer::new();
        assert!(buffer.is_empty());

        assert!(buffer.add_event(3));
        assert!(buffer.add_event(1));
        assert!(buffer.add_event(2));
        assert!(!buffer.is_empty());

        for expected in [3, 1, 2] {
            match buffer.fetch() {
                Fetched::User(id) => assert_eq!(id, expected),
                other => panic!("expected user event, got {other:?}"),
            }
        }
        assert!(matches!(buffer.fetch(), Fetched::None));
    }

    #[test]
    fn refuses_events_past_the_cap() {
        let buffer = SimpleEventBuffer::new();
        for id in 0..MAX_PENDING_EVENTS {
            assert!(buffer.add_event(id as EventId));
        }
        assert!(!buffer.add_event(u32::MAX));

        // Draining one makes room again.
        assert!(matches!(buffer.fetch(), Fetched::User(0)));
        assert!(buffer.add_event(u32::MAX));
    }

    #[test]
    fn timer_handles_are_distinct() {
        let buffer = SimpleEventBuffer::new();
        let a = buffer.new_timer(Duration::from_millis(1), false);
        let b = buffer.new_timer(Duration::from_millis(1), true);
        assert_ne!(a, b);
        buffer.delete_timer(a);
        buffer.delete_timer(b);
    }

    #[test]
    fn wait_returns_once_timeout_elapses() {
        let buffer = SimpleEventBuffer::new();
        let start = Instant::now();
        buffer.wait_for_event(Some(Duration::from_millis(20)));
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn wait_wakes_on_submission() {
        let buffer = Arc::new(SimpleEventBuffer::new());
        let producer = {
            let buffer = buffer.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(10));
                assert!(buffer.add_event(42));
            })
        };

        // An already-pending event returns without blocking; otherwise this
        // wakes when the producer submits.
        buffer.wait_for_event(Some(Duration::from_secs(5)));
        producer.join().expect("producer thread panicked");
        assert!(!buffer.is_empty());
    }
}

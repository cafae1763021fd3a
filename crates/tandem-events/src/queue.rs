use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use tandem_time::{HostClock, StdHostClock, Stopwatch};

use crate::buffer::{EventQueueBuffer, Fetched, SimpleEventBuffer};
use crate::event::{Event, EventType, Target};
use crate::handler::{EventHandler, HandlerTable};
use crate::interrupt;
use crate::registry::TypeRegistry;
use crate::store::EventStore;
use crate::timer::{TimerHeap, TimerId};

/// Process-wide instance register. The interrupt callback takes no context,
/// so it resolves the live queue through here.
static INSTANCE: Mutex<Option<Weak<EventQueue>>> = Mutex::new(None);

fn instance_slot() -> MutexGuard<'static, Option<Weak<EventQueue>>> {
    match INSTANCE.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Everything guarded by the queue's single internal mutex.
///
/// The mutex is held only across bounded in-memory work; in particular it is
/// never held across [`EventQueueBuffer::wait_for_event`].
struct Inner {
    buffer: Arc<dyn EventQueueBuffer>,
    store: EventStore,
    registry: TypeRegistry,
    handlers: HandlerTable,
    /// Live backend timer handles.
    timers: HashSet<TimerId>,
    timer_heap: TimerHeap,
    /// Elapsed time not yet folded into the timer heap; lapped by each sweep.
    sweep_watch: Stopwatch,
}

/// Process-wide, thread-safe multiplexer for user events, platform events,
/// and software timers.
///
/// Multiple producer threads may post events, manage timers and handlers,
/// and register types concurrently; a single consumer thread is expected to
/// drive [`get_event`](Self::get_event) /
/// [`dispatch_event`](Self::dispatch_event).
pub struct EventQueue {
    clock: Arc<dyn HostClock>,
    inner: Mutex<Inner>,
}

impl EventQueue {
    /// Creates the queue against the production clock.
    ///
    /// Registers the process-wide instance, installs the interrupt callback
    /// (which posts a `QUIT` event), and starts with a
    /// [`SimpleEventBuffer`]. Dropping the queue reverses those steps in the
    /// opposite order.
    ///
    /// # Panics
    ///
    /// Panics if another queue instance is still live; re-entrant
    /// construction is not supported.
    pub fn new() -> Arc<Self> {
        Self::with_clock(Arc::new(StdHostClock::new()))
    }

    /// Like [`new`](Self::new), but measuring time through `clock`.
    pub fn with_clock(clock: Arc<dyn HostClock>) -> Arc<Self> {
        let queue = Arc::new(EventQueue {
            inner: Mutex::new(Inner {
                buffer: Arc::new(SimpleEventBuffer::new()),
                store: EventStore::default(),
                registry: TypeRegistry::new(),
                handlers: HandlerTable::default(),
                timers: HashSet::new(),
                timer_heap: TimerHeap::new(),
                sweep_watch: Stopwatch::start(clock.clone()),
            }),
            clock,
        });

        let mut slot = instance_slot();
        assert!(
            slot.as_ref().and_then(Weak::upgrade).is_none(),
            "an EventQueue instance is already live"
        );
        *slot = Some(Arc::downgrade(&queue));
        drop(slot);

        interrupt::set_interrupt_handler(Some(Box::new(|| {
            if let Some(queue) = EventQueue::instance() {
                queue.add_event(Event::new(EventType::QUIT, Target::NONE));
            }
        })));

        queue
    }

    /// The live queue instance, if one exists.
    pub fn instance() -> Option<Arc<EventQueue>> {
        instance_slot().as_ref().and_then(Weak::upgrade)
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Allocates the next dynamic event type id and records its name.
    pub fn register_type(&self, name: &'static str) -> EventType {
        self.lock().registry.register(name)
    }

    /// Idempotent variant of [`register_type`](Self::register_type) for
    /// lazily initialized per-subsystem type slots: allocates a new id only
    /// if `slot` still holds `UNKNOWN`, storing the result back into it.
    ///
    /// The slot is read and written under the queue mutex; the atomic is
    /// what makes a `static` slot expressible, not a lock-free protocol.
    pub fn register_type_once(&self, slot: &AtomicU32, name: &'static str) -> EventType {
        let mut inner = self.lock();
        let current = slot.load(Ordering::Relaxed);
        if current == EventType::UNKNOWN.raw() {
            let ty = inner.registry.register(name);
            slot.store(ty.raw(), Ordering::Relaxed);
            ty
        } else {
            EventType::from_raw(current)
        }
    }

    /// The name `ty` was registered under; `"<unknown>"` for ids never
    /// registered, and the hard-wired names for the reserved types.
    pub fn type_name(&self, ty: EventType) -> &'static str {
        self.lock().registry.name(ty)
    }

    /// Replaces the backend buffer (`None` installs a fresh
    /// [`SimpleEventBuffer`]).
    ///
    /// Event ids are meaningful only relative to a specific buffer, so every
    /// saved user event is dropped and all ids are forgotten.
    pub fn adopt_buffer(&self, buffer: Option<Box<dyn EventQueueBuffer>>) {
        let mut inner = self.lock();
        inner.buffer = match buffer {
            Some(buffer) => Arc::from(buffer),
            None => Arc::new(SimpleEventBuffer::new()),
        };
        inner.store.clear();
        tracing::debug!("adopted event buffer; saved events flushed");
    }

    /// Posts an event to the queue.
    ///
    /// `UNKNOWN`, `SYSTEM`, and `TIMER` are produced only by the queue
    /// itself; events carrying them are silently discarded. If the buffer
    /// refuses the submission the event is dropped and its id reclaimed.
    pub fn add_event(&self, event: Event) {
        let ty = event.event_type();
        if ty.is_queue_internal() {
            tracing::debug!(ty = ty.raw(), "discarding event with queue-internal type");
            return;
        }

        let mut inner = self.lock();
        let id = inner.store.save(event);
        if !inner.buffer.add_event(id) {
            tracing::debug!(id, "buffer refused event; dropping payload");
            let _rejected = inner.store.remove(id);
        }
    }

    /// Waits up to `timeout` (`None` waits indefinitely) for the next event.
    ///
    /// Due timers are delivered before the consumer blocks; buffer waits are
    /// shortened so the earliest timer deadline is honored. Returns `None`
    /// once the timeout is spent with nothing to deliver.
    pub fn get_event(&self, timeout: Option<Duration>) -> Option<Event> {
        let watch = Stopwatch::start(self.clock.clone());
        loop {
            // No buffered events: deliver due timers, then wait.
            let buffer = loop {
                let buffer = self.lock().buffer.clone();
                if !buffer.is_empty() {
                    break buffer;
                }

                if let Some(event) = self.fire_due_timer() {
                    return Some(event);
                }

                let mut wait = match timeout {
                    Some(cap) => {
                        let left = cap.saturating_sub(watch.elapsed());
                        if left.is_zero() {
                            return None;
                        }
                        Some(left)
                    }
                    None => None,
                };

                // If a timer expires before the caller's deadline, wait only
                // that long.
                let timer_timeout = self.lock().timer_heap.next_timeout();
                wait = match (wait, timer_timeout) {
                    (None, timer) => timer,
                    (Some(left), Some(timer)) if timer < left => Some(timer),
                    (some, _) => some,
                };

                buffer.wait_for_event(wait);
            };

            match buffer.fetch() {
                Fetched::None => {
                    // Spurious wake. With an infinite or already-spent budget,
                    // take another turn through the loop; otherwise report the
                    // timeout to the caller.
                    match timeout {
                        None => continue,
                        Some(cap) if cap <= watch.elapsed() => continue,
                        Some(_) => return None,
                    }
                }
                Fetched::System(event) => return Some(event),
                Fetched::User(id) => return Some(self.lock().store.remove(id)),
            }
        }
    }

    /// Delivers a due timer as an event, if any.
    ///
    /// Folds the elapsed time since the last sweep into the timer heap, pops
    /// the earliest due record, and reinserts it when periodic.
    fn fire_due_timer(&self) -> Option<Event> {
        let mut inner = self.lock();
        let inner = &mut *inner;
        if inner.timer_heap.is_empty() {
            return None;
        }

        let dt = inner.sweep_watch.lap();
        inner.timer_heap.advance(dt);

        let (target, fire) = inner.timer_heap.pop_due()?;
        Some(Event::with_data(EventType::TIMER, target, fire))
    }

    /// Routes `event` to its handler: exact `(type, target)` first, then the
    /// target's wildcard slot. Returns `false` when no handler is installed.
    ///
    /// The handler is looked up under the mutex but invoked outside it, so
    /// handlers may freely call back into the queue.
    pub fn dispatch_event(&self, event: &Event) -> bool {
        let handler = self
            .lock()
            .handlers
            .lookup(event.event_type(), event.target());
        match handler {
            Some(handler) => {
                handler.handle(event);
                true
            }
            None => false,
        }
    }

    /// True when the buffer holds nothing and no timer is currently due.
    pub fn is_empty(&self) -> bool {
        let mut inner = self.lock();
        let buffer = inner.buffer.clone();
        buffer.is_empty() && inner.timer_heap.next_timeout() != Some(Duration::ZERO)
    }

    /// Creates a periodic timer firing every `duration`.
    ///
    /// When `target` is `None` the timer's own handle routes its events.
    ///
    /// # Panics
    ///
    /// Panics if `duration` is zero.
    pub fn new_timer(&self, duration: Duration, target: Option<Target>) -> TimerId {
        self.create_timer(duration, target, false)
    }

    /// Creates a timer that fires once after `duration` and is then gone.
    /// The backend timer handle must still be released with
    /// [`delete_timer`](Self::delete_timer).
    ///
    /// # Panics
    ///
    /// Panics if `duration` is zero.
    pub fn new_one_shot_timer(&self, duration: Duration, target: Option<Target>) -> TimerId {
        self.create_timer(duration, target, true)
    }

    fn create_timer(&self, duration: Duration, target: Option<Target>, one_shot: bool) -> TimerId {
        assert!(duration > Duration::ZERO, "timer duration must be positive");

        let mut inner = self.lock();
        let timer = inner.buffer.new_timer(duration, one_shot);
        let target = target.unwrap_or_else(|| Target::from(timer));
        // Time already on the sweep stopwatch will be folded into the heap by
        // the next sweep; the new record has to absorb it up front.
        let lead = inner.sweep_watch.elapsed();
        inner.timers.insert(timer);
        inner
            .timer_heap
            .insert(timer, duration, lead, target, one_shot);
        tracing::trace!(timer = timer.raw(), ?duration, one_shot, "created timer");
        timer
    }

    /// Cancels `timer` and releases its backend handle. Deleting an unknown
    /// or already-deleted timer is a no-op.
    pub fn delete_timer(&self, timer: TimerId) {
        let mut inner = self.lock();
        inner.timer_heap.cancel(timer);
        if inner.timers.remove(&timer) {
            inner.buffer.delete_timer(timer);
            tracing::trace!(timer = timer.raw(), "deleted timer");
        }
    }

    /// Installs the wildcard handler for `target`: it receives every event
    /// routed to `target` that has no exact-type handler.
    pub fn adopt_handler(&self, target: Target, handler: Arc<dyn EventHandler>) {
        self.lock()
            .handlers
            .adopt(EventType::UNKNOWN, target, handler);
    }

    /// Installs the handler for events of exactly `(ty, target)`, replacing
    /// (and dropping) any previous handler at that key.
    ///
    /// # Panics
    ///
    /// Panics if `ty` is `UNKNOWN`; use
    /// [`adopt_handler`](Self::adopt_handler) for the wildcard slot.
    pub fn adopt_handler_for(&self, ty: EventType, target: Target, handler: Arc<dyn EventHandler>) {
        assert!(
            ty != EventType::UNKNOWN,
            "UNKNOWN is the wildcard slot; use adopt_handler"
        );
        self.lock().handlers.adopt(ty, target, handler);
    }

    /// Removes and returns the wildcard handler for `target`.
    pub fn orphan_handler(&self, target: Target) -> Option<Arc<dyn EventHandler>> {
        self.lock().handlers.orphan(EventType::UNKNOWN, target)
    }

    /// Removes and returns the handler at `(ty, target)`.
    ///
    /// # Panics
    ///
    /// Panics if `ty` is `UNKNOWN`; use
    /// [`orphan_handler`](Self::orphan_handler) for the wildcard slot.
    pub fn orphan_handler_for(&self, ty: EventType, target: Target) -> Option<Arc<dyn EventHandler>> {
        assert!(
            ty != EventType::UNKNOWN,
            "UNKNOWN is the wildcard slot; use orphan_handler"
        );
        self.lock().handlers.orphan(ty, target)
    }

    /// Removes and drops the wildcard handler for `target`.
    pub fn remove_handler(&self, target: Target) {
        drop(self.orphan_handler(target));
    }

    /// Removes and drops the handler at `(ty, target)`.
    pub fn remove_handler_for(&self, ty: EventType, target: Target) {
        drop(self.orphan_handler_for(ty, target));
    }
}

impl Drop for EventQueue {
    fn drop(&mut self) {
        // A queue that failed the liveness assert in `with_clock` never owned
        // the process-wide state; tearing it down would clobber the live
        // instance's registration.
        let mut slot = instance_slot();
        let registered = slot
            .as_ref()
            .is_some_and(|weak| std::ptr::eq(weak.as_ptr(), self));
        if registered {
            *slot = None;
            drop(slot);
            interrupt::set_interrupt_handler(None);
        }
    }
}

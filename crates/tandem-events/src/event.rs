use std::any::Any;
use std::fmt;

use crate::timer::TimerId;

/// Identifies what kind of work an [`Event`] carries.
///
/// The values below [`EventType::first_user`] are reserved by the queue
/// itself; application types are handed out by
/// [`EventQueue::register_type`](crate::EventQueue::register_type).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventType(u32);

impl EventType {
    /// No type. Also the wildcard slot in the handler table; never a real
    /// event type on the wire.
    pub const UNKNOWN: EventType = EventType(0);
    /// The consumer should leave its dispatch loop. Posted by the interrupt
    /// callback on termination signals.
    pub const QUIT: EventType = EventType(1);
    /// A platform event delivered directly by the backend buffer.
    pub const SYSTEM: EventType = EventType(2);
    /// A timer fired; the payload is a [`TimerFire`](crate::TimerFire).
    pub const TIMER: EventType = EventType(3);

    /// First dynamically allocatable type id.
    pub(crate) const fn first_user() -> u32 {
        4
    }

    pub const fn from_raw(raw: u32) -> Self {
        EventType(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    /// True for the types the public enqueue path must never accept:
    /// `UNKNOWN`, `SYSTEM`, and `TIMER` are produced only by the queue and
    /// its backend. (`QUIT` is deliberately not in this set.)
    pub(crate) fn is_queue_internal(self) -> bool {
        matches!(self, Self::UNKNOWN | Self::SYSTEM | Self::TIMER)
    }
}

/// Opaque identity routing an event to a specific handler.
///
/// The queue never interprets targets; it only compares them. Applications
/// mint them from any stable `u64` handle. A timer created without an
/// explicit target uses its own [`TimerId`] as the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Target(u64);

impl Target {
    /// The "no particular recipient" target (used by `QUIT`).
    pub const NONE: Target = Target(0);

    pub const fn from_raw(raw: u64) -> Self {
        Target(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl From<TimerId> for Target {
    fn from(timer: TimerId) -> Self {
        Target(timer.raw())
    }
}

/// Flag bits carried through the queue untouched; their meaning belongs to
/// the application.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct EventFlags(u32);

impl EventFlags {
    pub const NONE: EventFlags = EventFlags(0);

    pub const fn from_raw(raw: u32) -> Self {
        EventFlags(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }
}

/// A typed, targeted, optionally-payloaded unit of asynchronous work.
///
/// The payload is type-erased; it is released by its own destructor whenever
/// the queue discards an event (reserved-type drops, backpressure, buffer
/// swaps). Handlers downcast with [`Event::data`].
pub struct Event {
    event_type: EventType,
    target: Target,
    data: Option<Box<dyn Any + Send>>,
    flags: EventFlags,
}

impl Event {
    /// An event with no payload.
    pub fn new(event_type: EventType, target: Target) -> Self {
        Self {
            event_type,
            target,
            data: None,
            flags: EventFlags::NONE,
        }
    }

    /// An event carrying `data` as its payload.
    pub fn with_data<T: Any + Send>(event_type: EventType, target: Target, data: T) -> Self {
        Self {
            event_type,
            target,
            data: Some(Box::new(data)),
            flags: EventFlags::NONE,
        }
    }

    pub fn with_flags(mut self, flags: EventFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn event_type(&self) -> EventType {
        self.event_type
    }

    pub fn target(&self) -> Target {
        self.target
    }

    pub fn flags(&self) -> EventFlags {
        self.flags
    }

    /// The payload, if present and of type `T`.
    pub fn data<T: Any>(&self) -> Option<&T> {
        self.data.as_ref()?.downcast_ref()
    }

    /// Consumes the event, returning the payload if it is of type `T`.
    pub fn into_data<T: Any>(self) -> Option<Box<T>> {
        self.data?.downcast().ok()
    }
}

impl Default for Event {
    /// The neutral event: `UNKNOWN` type, no target, no payload. Returned by
    /// the queue when a buffer yields an id whose payload is gone.
    fn default() -> Self {
        Event::new(EventType::UNKNOWN, Target::NONE)
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("event_type", &self.event_type)
            .field("target", &self.target)
            .field("has_data", &self.data.is_some())
            .field("flags", &self.flags)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_internal_types_exclude_quit() {
        assert!(EventType::UNKNOWN.is_queue_internal());
        assert!(EventType::SYSTEM.is_queue_internal());
        assert!(EventType::TIMER.is_queue_internal());
        assert!(!EventType::QUIT.is_queue_internal());
        assert!(!EventType::from_raw(EventType::first_user()).is_queue_internal());
    }

    #[test]
    fn payload_downcasts_by_type() {
        let ty = EventType::from_raw(EventType::first_user());
        let event = Event::with_data(ty, Target::from_raw(7), 42u32);

        assert_eq!(event.data::<u32>(), Some(&42));
        assert_eq!(event.data::<String>(), None);
        assert_eq!(*event.into_data::<u32>().expect("payload is a u32"), 42);
    }

    #[test]
    fn flags_pass_through_opaquely() {
        let ty = EventType::from_raw(EventType::first_user());
        let event = Event::new(ty, Target::NONE).with_flags(EventFlags::from_raw(0x5));
        assert_eq!(event.flags().raw(), 0x5);
    }
}

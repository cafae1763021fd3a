#![forbid(unsafe_code)]

//! Process-wide event queue for the tandem input-sharing core.
//!
//! The queue multiplexes three sources of asynchronous work behind one
//! consumer loop:
//!
//! - **user events** posted by any thread via [`EventQueue::add_event`],
//! - **platform events** delivered by a pluggable [`EventQueueBuffer`]
//!   backend,
//! - **software timers** ([`EventQueue::new_timer`] /
//!   [`EventQueue::new_one_shot_timer`]).
//!
//! A single consumer thread drives [`EventQueue::get_event`] and
//! [`EventQueue::dispatch_event`]; dispatch routes on `(type, target)` with
//! a per-target wildcard fallback. Termination signals reach the loop as a
//! `QUIT` event posted by the interrupt callback installed at construction.

mod buffer;
mod event;
mod handler;
mod interrupt;
mod queue;
mod registry;
mod store;
mod timer;

pub use buffer::{EventId, EventQueueBuffer, Fetched, SimpleEventBuffer, MAX_PENDING_EVENTS};
pub use event::{Event, EventFlags, EventType, Target};
pub use handler::EventHandler;
pub use interrupt::raise_interrupt;
pub use queue::EventQueue;
pub use timer::{TimerFire, TimerId};

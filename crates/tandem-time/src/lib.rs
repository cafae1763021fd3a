#![forbid(unsafe_code)]

//! Monotonic time primitives for the event core.
//!
//! All consumers measure time through the [`HostClock`] seam: production code
//! uses [`StdHostClock`] (backed by `std::time::Instant`), while unit tests
//! drive the system deterministically via [`FakeHostClock`]. [`Stopwatch`]
//! layers elapsed-since-reset semantics on top of a shared clock.

mod clock;

pub use clock::{FakeHostClock, HostClock, StdHostClock, Stopwatch};

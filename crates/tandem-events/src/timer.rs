use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};
use std::time::Duration;

use crate::event::Target;

/// Handle for a timer allocated by an
/// [`EventQueueBuffer`](crate::EventQueueBuffer).
///
/// The handle doubles as the default [`Target`](crate::Target) for the
/// timer's events when the creator supplies none.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

impl TimerId {
    pub const fn from_raw(raw: u64) -> Self {
        TimerId(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

/// Payload of a `TIMER` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerFire {
    pub timer: TimerId,
    /// Number of firings this event represents, computed at expiry as
    /// `(period - remaining) / period`. A fire processed on time yields 1;
    /// the count grows when the consumer falls behind by whole periods.
    pub count: u32,
}

/// One scheduled timer. Deadlines are offsets from the owning heap's
/// virtual-now base, so the expiry sweep advances a single counter instead
/// of rewriting every record.
#[derive(Debug)]
struct TimerRecord {
    timer: TimerId,
    /// Original period.
    timeout_ns: i64,
    /// Fires when `deadline_ns <= heap.now_ns`.
    deadline_ns: i64,
    target: Target,
    one_shot: bool,
    /// Creation order; breaks ties between equal deadlines.
    seq: u64,
}

impl PartialEq for TimerRecord {
    fn eq(&self, other: &Self) -> bool {
        self.deadline_ns == other.deadline_ns && self.seq == other.seq
    }
}

impl Eq for TimerRecord {}

impl Ord for TimerRecord {
    fn cmp(&self, other: &Self) -> Ordering {
        // Inverted so the std max-heap pops the earliest deadline.
        other
            .deadline_ns
            .cmp(&self.deadline_ns)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for TimerRecord {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn duration_to_ns(d: Duration) -> i64 {
    d.as_nanos()
        .try_into()
        .expect("duration exceeds i64 nanoseconds")
}

/// Deadline-ordered collection of [`TimerRecord`]s.
///
/// Cancellation is a tombstone pruned lazily at the heap top; inserting a
/// timer id clears any stale tombstone so a backend that reuses handles
/// cannot cancel a fresh timer.
pub(crate) struct TimerHeap {
    /// Virtual now. Advanced by each sweep's stopwatch lap.
    now_ns: i64,
    heap: BinaryHeap<TimerRecord>,
    canceled: HashSet<TimerId>,
    next_seq: u64,
}

impl TimerHeap {
    pub fn new() -> Self {
        Self {
            now_ns: 0,
            heap: BinaryHeap::new(),
            canceled: HashSet::new(),
            next_seq: 0,
        }
    }

    fn prune_canceled(&mut self) {
        while let Some(top) = self.heap.peek() {
            if self.canceled.remove(&top.timer) {
                self.heap.pop();
                continue;
            }
            break;
        }
    }

    pub fn is_empty(&mut self) -> bool {
        self.prune_canceled();
        self.heap.is_empty()
    }

    /// Schedules `timer` to first fire `timeout` from now.
    ///
    /// `lead` is the sweep stopwatch's current reading: time that has
    /// already passed but has not yet been folded into the virtual-now base.
    /// Adding it keeps "fires `timeout` after creation" true regardless of
    /// when the next sweep runs.
    pub fn insert(
        &mut self,
        timer: TimerId,
        timeout: Duration,
        lead: Duration,
        target: Target,
        one_shot: bool,
    ) {
        self.canceled.remove(&timer);
        let timeout_ns = duration_to_ns(timeout);
        let deadline_ns = self
            .now_ns
            .checked_add(timeout_ns)
            .and_then(|ns| ns.checked_add(duration_to_ns(lead)))
            .expect("timer deadline overflowed i64 nanoseconds");
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(TimerRecord {
            timer,
            timeout_ns,
            deadline_ns,
            target,
            one_shot,
            seq,
        });
    }

    pub fn cancel(&mut self, timer: TimerId) {
        self.canceled.insert(timer);
    }

    /// Folds elapsed time into the virtual-now base.
    pub fn advance(&mut self, dt: Duration) {
        self.now_ns = self
            .now_ns
            .checked_add(duration_to_ns(dt))
            .expect("timer virtual clock overflowed i64 nanoseconds");
    }

    /// Time until the earliest record expires: `None` when no records,
    /// `Some(ZERO)` when one is already due.
    ///
    /// Like the rest of the heap this reads the virtual-now base, which is
    /// only as fresh as the last sweep.
    pub fn next_timeout(&mut self) -> Option<Duration> {
        self.prune_canceled();
        let top = self.heap.peek()?;
        let remaining_ns = top.deadline_ns - self.now_ns;
        if remaining_ns <= 0 {
            Some(Duration::ZERO)
        } else {
            Some(Duration::from_nanos(remaining_ns as u64))
        }
    }

    /// Pops the earliest record if it is due, yielding its target and fire
    /// payload. Periodic records are reset to a full period and reinserted;
    /// one-shots are gone after this returns them.
    pub fn pop_due(&mut self) -> Option<(Target, TimerFire)> {
        self.prune_canceled();
        {
            let top = self.heap.peek()?;
            if top.deadline_ns > self.now_ns {
                return None;
            }
        }
        let mut record = self.heap.pop().expect("peeked record vanished");

        let remaining_ns = record.deadline_ns - self.now_ns;
        debug_assert!(remaining_ns <= 0);
        let count = ((record.timeout_ns - remaining_ns) / record.timeout_ns) as u32;
        let fire = TimerFire {
            timer: record.timer,
            count,
        };
        let target = record.target;

        if !record.one_shot {
            // Reset: the next fire is one full period from now.
            record.deadline_ns = self
                .now_ns
                .checked_add(record.timeout_ns)
                .expect("timer deadline overflowed i64 nanoseconds");
            self.heap.push(record);
        }

        Some((target, fire))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const MS: Duration = Duration::from_millis(1);

    fn timer(raw: u64) -> TimerId {
        TimerId::from_raw(raw)
    }

    fn drain_due(heap: &mut TimerHeap) -> Vec<TimerId> {
        let mut fired = Vec::new();
        while let Some((_, fire)) = heap.pop_due() {
            fired.push(fire.timer);
        }
        fired
    }

    #[test]
    fn fires_in_deadline_order_regardless_of_insertion() {
        let mut heap = TimerHeap::new();
        heap.insert(timer(3), 30 * MS, Duration::ZERO, Target::NONE, true);
        heap.insert(timer(1), 10 * MS, Duration::ZERO, Target::NONE, true);
        heap.insert(timer(2), 20 * MS, Duration::ZERO, Target::NONE, true);

        heap.advance(35 * MS);
        assert_eq!(drain_due(&mut heap), vec![timer(1), timer(2), timer(3)]);
        assert!(heap.is_empty());
    }

    #[test]
    fn one_shot_is_absent_after_firing() {
        let mut heap = TimerHeap::new();
        heap.insert(timer(1), 10 * MS, Duration::ZERO, Target::NONE, true);

        heap.advance(10 * MS);
        assert!(heap.pop_due().is_some());
        assert!(heap.pop_due().is_none());
        assert_eq!(heap.next_timeout(), None);
    }

    #[test]
    fn periodic_timer_reinserts_a_full_period_out() {
        let mut heap = TimerHeap::new();
        heap.insert(timer(1), 10 * MS, Duration::ZERO, Target::NONE, false);

        heap.advance(10 * MS);
        assert!(heap.pop_due().is_some());
        assert_eq!(heap.next_timeout(), Some(10 * MS));

        heap.advance(10 * MS);
        assert!(heap.pop_due().is_some());
    }

    #[test]
    fn overshoot_is_counted_in_whole_periods() {
        let mut heap = TimerHeap::new();
        heap.insert(timer(1), 10 * MS, Duration::ZERO, Target::NONE, false);

        // 35ms late against a 10ms period: remaining is -25ms, so the fire
        // accounts for (10 - (-25)) / 10 = 3 periods.
        heap.advance(35 * MS);
        let (_, fire) = heap.pop_due().expect("timer is due");
        assert_eq!(fire.count, 3);

        // An exactly-on-time fire reads as one period.
        heap.advance(10 * MS);
        let (_, fire) = heap.pop_due().expect("timer is due again");
        assert_eq!(fire.count, 1);
    }

    #[test]
    fn lead_time_delays_the_first_fire() {
        let mut heap = TimerHeap::new();
        // 5ms already on the sweep stopwatch when the timer is created: the
        // next sweep will fold those 5ms in, so the deadline must absorb them.
        heap.insert(timer(1), 10 * MS, 5 * MS, Target::NONE, true);

        heap.advance(10 * MS);
        assert!(heap.pop_due().is_none());
        heap.advance(5 * MS);
        assert!(heap.pop_due().is_some());
    }

    #[test]
    fn default_target_is_the_timer_handle() {
        let mut heap = TimerHeap::new();
        heap.insert(timer(7), MS, Duration::ZERO, Target::from(timer(7)), true);

        heap.advance(MS);
        let (target, fire) = heap.pop_due().expect("timer is due");
        assert_eq!(target, Target::from(fire.timer));
    }

    #[test]
    fn cancel_suppresses_pending_record() {
        let mut heap = TimerHeap::new();
        heap.insert(timer(1), 10 * MS, Duration::ZERO, Target::NONE, false);
        heap.insert(timer(2), 20 * MS, Duration::ZERO, Target::NONE, false);
        heap.cancel(timer(1));

        assert_eq!(heap.next_timeout(), Some(20 * MS));
        heap.advance(25 * MS);
        assert_eq!(drain_due(&mut heap), vec![timer(2)]);
    }

    #[test]
    fn reinserting_a_canceled_id_revives_it() {
        let mut heap = TimerHeap::new();
        heap.insert(timer(1), 10 * MS, Duration::ZERO, Target::NONE, true);
        heap.cancel(timer(1));

        // A backend may hand the same id out again; the stale tombstone must
        // not swallow the new timer.
        heap.insert(timer(1), 10 * MS, Duration::ZERO, Target::NONE, true);
        heap.advance(10 * MS);
        assert_eq!(drain_due(&mut heap), vec![timer(1)]);
    }

    #[test]
    fn equal_deadlines_fire_in_creation_order() {
        let mut heap = TimerHeap::new();
        heap.insert(timer(5), 10 * MS, Duration::ZERO, Target::NONE, true);
        heap.insert(timer(4), 10 * MS, Duration::ZERO, Target::NONE, true);

        heap.advance(10 * MS);
        assert_eq!(drain_due(&mut heap), vec![timer(5), timer(4)]);
    }
}

use std::collections::HashMap;
use std::sync::Arc;

use crate::event::{Event, EventType, Target};

/// Receives events from the dispatch loop.
///
/// Handlers are shared (`Arc`) so the queue can look one up under its lock
/// and invoke it after releasing the lock; a handler may therefore still run
/// once after being orphaned. Closures implement this trait directly.
pub trait EventHandler: Send + Sync {
    fn handle(&self, event: &Event);
}

impl<F> EventHandler for F
where
    F: Fn(&Event) + Send + Sync,
{
    fn handle(&self, event: &Event) {
        self(event)
    }
}

/// `(type, target)` to handler mapping with a wildcard fallback per target.
///
/// The `UNKNOWN` type is legal only as the wildcard slot; callers enforce
/// that before insertion.
#[derive(Default)]
pub(crate) struct HandlerTable {
    handlers: HashMap<(EventType, Target), Arc<dyn EventHandler>>,
}

impl HandlerTable {
    /// Installs `handler`, dropping any previous handler at the same key.
    pub fn adopt(&mut self, ty: EventType, target: Target, handler: Arc<dyn EventHandler>) {
        self.handlers.insert((ty, target), handler);
    }

    /// Removes and returns the handler at the key, if any.
    pub fn orphan(&mut self, ty: EventType, target: Target) -> Option<Arc<dyn EventHandler>> {
        self.handlers.remove(&(ty, target))
    }

    /// Exact `(type, target)` match first, then the target's wildcard slot.
    pub fn lookup(&self, ty: EventType, target: Target) -> Option<Arc<dyn EventHandler>> {
        self.handlers
            .get(&(ty, target))
            .or_else(|| self.handlers.get(&(EventType::UNKNOWN, target)))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_handler(hits: Arc<AtomicUsize>) -> Arc<dyn EventHandler> {
        Arc::new(move |_: &Event| {
            hits.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn exact_match_wins_over_wildcard() {
        let mut table = HandlerTable::default();
        let target = Target::from_raw(1);
        let ty = EventType::from_raw(10);

        let exact_hits = Arc::new(AtomicUsize::new(0));
        let wildcard_hits = Arc::new(AtomicUsize::new(0));
        table.adopt(ty, target, counting_handler(exact_hits.clone()));
        table.adopt(
            EventType::UNKNOWN,
            target,
            counting_handler(wildcard_hits.clone()),
        );

        let event = Event::new(ty, target);
        table
            .lookup(ty, target)
            .expect("exact handler installed")
            .handle(&event);
        assert_eq!(exact_hits.load(Ordering::SeqCst), 1);
        assert_eq!(wildcard_hits.load(Ordering::SeqCst), 0);

        // A different type on the same target falls back to the wildcard.
        let other = EventType::from_raw(11);
        table
            .lookup(other, target)
            .expect("wildcard handler installed")
            .handle(&Event::new(other, target));
        assert_eq!(wildcard_hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn lookup_misses_other_targets() {
        let mut table = HandlerTable::default();
        let ty = EventType::from_raw(10);
        table.adopt(ty, Target::from_raw(1), Arc::new(|_: &Event| {}));

        assert!(table.lookup(ty, Target::from_raw(2)).is_none());
    }

    #[test]
    fn adopt_replaces_and_orphan_removes() {
        let mut table = HandlerTable::default();
        let target = Target::from_raw(1);
        let ty = EventType::from_raw(10);

        let first = Arc::new(|_: &Event| {});
        table.adopt(ty, target, first.clone());
        assert_eq!(Arc::strong_count(&first), 2);

        // Overwriting releases the previous handler.
        table.adopt(ty, target, Arc::new(|_: &Event| {}));
        assert_eq!(Arc::strong_count(&first), 1);

        assert!(table.orphan(ty, target).is_some());
        assert!(table.orphan(ty, target).is_none());
        assert!(table.lookup(ty, target).is_none());
    }
}

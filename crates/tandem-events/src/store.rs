use std::collections::HashMap;

use crate::buffer::EventId;
use crate::event::Event;

/// Saved payloads of enqueued user events, keyed by the dense id handed to
/// the backend buffer.
///
/// Ids are reused: freeing pushes onto a stack, allocating pops it, and only
/// when the stack is empty does the next integer get minted. At all times
/// the ids in the table and the ids on the free stack are disjoint and their
/// union is `0..high_water`.
#[derive(Default)]
pub(crate) struct EventStore {
    events: HashMap<EventId, Event>,
    free_ids: Vec<EventId>,
}

impl EventStore {
    /// Stores `event` and returns the id under which it can be fetched back.
    pub fn save(&mut self, event: Event) -> EventId {
        let id = match self.free_ids.pop() {
            Some(id) => id,
            None => self.events.len() as EventId,
        };
        self.events.insert(id, event);
        id
    }

    /// Removes and returns the event stored under `id`, releasing the id for
    /// reuse. An unknown id yields the neutral event.
    pub fn remove(&mut self, id: EventId) -> Event {
        match self.events.remove(&id) {
            Some(event) => {
                self.free_ids.push(id);
                event
            }
            None => Event::default(),
        }
    }

    /// Drops every stored event and forgets all ids.
    ///
    /// Ids are meaningful only relative to the buffer they were submitted
    /// to; the queue calls this when swapping buffers.
    pub fn clear(&mut self) {
        self.events.clear();
        self.free_ids.clear();
    }

}

// Test-only introspection of the id accounting.
#[cfg(test)]
impl EventStore {
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn free_count(&self) -> usize {
        self.free_ids.len()
    }

    /// Number of distinct ids ever minted.
    pub fn high_water(&self) -> usize {
        self.events.len() + self.free_ids.len()
    }
}

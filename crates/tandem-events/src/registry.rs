use std::collections::HashMap;

use crate::event::EventType;

/// Allocator and name table for dynamically registered event types.
pub(crate) struct TypeRegistry {
    next: u32,
    names: HashMap<u32, &'static str>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self {
            next: EventType::first_user(),
            names: HashMap::new(),
        }
    }

    pub fn register(&mut self, name: &'static str) -> EventType {
        let ty = EventType::from_raw(self.next);
        self.next += 1;
        self.names.insert(ty.raw(), name);
        tracing::debug!(name, id = ty.raw(), "registered event type");
        ty
    }

    pub fn name(&self, ty: EventType) -> &'static str {
        match ty {
            EventType::UNKNOWN => "nil",
            EventType::QUIT => "quit",
            EventType::SYSTEM => "system",
            EventType::TIMER => "timer",
            _ => self.names.get(&ty.raw()).copied().unwrap_or("<unknown>"),
        }
    }
}

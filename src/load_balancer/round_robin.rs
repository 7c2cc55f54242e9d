//! Round-robin load balancing strategy.

use std::sync::Arc;

use crate::load_balancer::{DerivedState, Selector, Server};

/// Round-robin selector.
/// Stores an internal counter to rotate through healthy servers.
#[derive(Debug, Default)]
pub struct RoundRobin {
    cursor: usize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Selector for RoundRobin {
    fn next_server(&mut self, derived: &DerivedState) -> Option<Arc<Server>> {
        // Advances even when nothing can be returned
        let cursor = self.cursor;
        self.cursor = self.cursor.wrapping_add(1);

        let healthy = derived.healthy();
        if healthy.is_empty() {
            return None;
        }
        Some(healthy[cursor % healthy.len()].clone())
    }
}

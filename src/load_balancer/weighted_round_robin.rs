//! Smooth weighted round-robin load balancing strategy.
//!
//! Every call adds each healthy server's effective weight to its current weight,
//! picks the largest current weight, then subtracts the round's total from the
//! winner. Over `sum(weights)` calls each server is picked `weight` times, and
//! picks of heavy servers are spread out instead of bunched together.

use std::sync::Arc;

use crate::load_balancer::{DerivedState, Selector, Server};

/// Smooth weighted round-robin selector.
#[derive(Debug, Default)]
pub struct WeightedRoundRobin;

impl WeightedRoundRobin {
    pub fn new() -> Self {
        Self
    }
}

impl Selector for WeightedRoundRobin {
    fn next_server(&mut self, derived: &DerivedState) -> Option<Arc<Server>> {
        let mut total = 0;
        let mut best: Option<&Arc<Server>> = None;

        for server in derived.healthy() {
            let current = server.current_weight() + server.effective_weight();
            server.set_current_weight(current);
            total += server.effective_weight();

            // Strictly greater: the first of equal candidates keeps the slot
            if best.map_or(true, |b| current > b.current_weight()) {
                best = Some(server);
            }
        }

        let best = best?;
        best.set_current_weight(best.current_weight() - total);
        Some(best.clone())
    }
}

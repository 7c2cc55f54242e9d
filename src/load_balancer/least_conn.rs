//! Least Connections load balancing strategy.

use std::sync::Arc;

use crate::load_balancer::{DerivedState, Selector, Server};

/// Least connections selector.
/// Selects the healthy server with the minimum number of active connections.
#[derive(Debug, Default)]
pub struct LeastConnections;

impl LeastConnections {
    pub fn new() -> Self {
        Self
    }
}

impl Selector for LeastConnections {
    fn next_server(&mut self, derived: &DerivedState) -> Option<Arc<Server>> {
        // In case of tie, the first one is selected (stability)
        derived
            .healthy()
            .iter()
            .min_by_key(|s| s.active_connections())
            .cloned()
    }
}

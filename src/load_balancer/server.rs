//! Backend server abstraction.
//!
//! # Responsibilities
//! - Represent a single origin server and its static weight
//! - Track active connections (for Least Connections LB)
//! - Hold the smooth weighted round-robin accumulators
//! - Track health (externally set)

use std::ops::Deref;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;

/// A single backend server.
///
/// `current_weight` and `effective_weight` are only written while the owning
/// balancer's selection lock is held. Connection counting and health are
/// independent atomics.
#[derive(Debug)]
pub struct Server {
    name: String,
    weight: u32,
    effective_weight: AtomicI64,
    current_weight: AtomicI64,
    active_connections: AtomicUsize,
    healthy: AtomicBool,
}

impl Server {
    /// Create a healthy server. A weight of 0 is raised to 1.
    pub fn new(name: impl Into<String>, weight: u32) -> Self {
        let weight = weight.max(1);
        Self {
            name: name.into(),
            weight,
            effective_weight: AtomicI64::new(i64::from(weight)),
            current_weight: AtomicI64::new(0),
            active_connections: AtomicUsize::new(0),
            healthy: AtomicBool::new(true),
        }
    }

    /// Server identifier (`host:port`).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Static configured weight.
    pub fn weight(&self) -> u32 {
        self.weight
    }

    /// Weight consumed by smooth weighted round-robin.
    pub fn effective_weight(&self) -> i64 {
        self.effective_weight.load(Ordering::Relaxed)
    }

    /// Smooth weighted round-robin accumulator.
    pub fn current_weight(&self) -> i64 {
        self.current_weight.load(Ordering::Relaxed)
    }

    pub(crate) fn set_current_weight(&self, value: i64) {
        self.current_weight.store(value, Ordering::Relaxed);
    }

    /// Get the current number of active connections.
    pub fn active_connections(&self) -> usize {
        self.active_connections.load(Ordering::Relaxed)
    }

    /// Increment active connection count.
    pub fn increment_connections(&self) {
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    /// Decrement active connection count. No-op at zero.
    pub fn decrement_connections(&self) {
        let _ = self
            .active_connections
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }

    /// Count one in-flight request until the guard is dropped.
    pub fn connection_guard(self: &Arc<Self>) -> ConnectionGuard {
        self.increment_connections();
        ConnectionGuard {
            server: self.clone(),
        }
    }

    /// Whether the server may be selected.
    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Acquire)
    }

    /// Set health, returning the previous value.
    ///
    /// Prefer [`LoadBalancer::set_server_health`](crate::load_balancer::LoadBalancer::set_server_health),
    /// which also refreshes the balancer's derived weights.
    pub fn set_healthy(&self, healthy: bool) -> bool {
        self.healthy.swap(healthy, Ordering::AcqRel)
    }
}

/// A RAII guard that manages the active connection count.
#[derive(Debug)]
pub struct ConnectionGuard {
    server: Arc<Server>,
}

impl ConnectionGuard {
    /// The server this guard counts against.
    pub fn server(&self) -> &Arc<Server> {
        &self.server
    }
}

impl Deref for ConnectionGuard {
    type Target = Server;
    fn deref(&self) -> &Self::Target {
        &self.server
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.server.decrement_connections();
    }
}

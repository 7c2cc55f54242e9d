//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Cache miss
//!     → LoadBalancer::next_server()
//!         → lock selection state
//!         → verify derived weights match live health (recompute if not)
//!         → Apply the configured algorithm:
//!             - round_robin.rs (rotate through healthy servers)
//!             - weighted_round_robin.rs (smooth weighted rotation)
//!             - random.rs (uniform / prefix-sum weighted draw)
//!             - least_conn.rs (pick server with fewest connections)
//!     → server.rs (caller holds a ConnectionGuard around the upstream call)
//! ```
//!
//! # Design Decisions
//! - Strategy fixed per balancer instance
//! - One critical section per selection; connection counters stay lock-free
//! - Total and cumulative weights are always recomputed, never patched
//! - Unhealthy servers excluded from selection

pub mod least_conn;
pub mod random;
pub mod round_robin;
pub mod server;
pub mod weighted_round_robin;

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::config::LoadBalancerConfig;
use crate::observability::metrics;

pub use self::server::{ConnectionGuard, Server};

/// A selection algorithm.
///
/// Called with the balancer's lock held, so implementations may keep mutable state.
pub trait Selector: Send + fmt::Debug {
    /// Pick the next server from the healthy set, or `None` if it is empty.
    fn next_server(&mut self, derived: &DerivedState) -> Option<Arc<Server>>;
}

/// Available selection algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    RoundRobin,
    #[default]
    WeightedRoundRobin,
    Random,
    WeightedRandom,
    LeastConnections,
}

impl Strategy {
    /// Every strategy, in configuration order.
    pub const ALL: [Strategy; 5] = [
        Strategy::RoundRobin,
        Strategy::WeightedRoundRobin,
        Strategy::Random,
        Strategy::WeightedRandom,
        Strategy::LeastConnections,
    ];

    /// Configuration name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::RoundRobin => "round-robin",
            Strategy::WeightedRoundRobin => "weighted-round-robin",
            Strategy::Random => "random",
            Strategy::WeightedRandom => "weighted-random",
            Strategy::LeastConnections => "least-connections",
        }
    }

    fn selector(&self, rng: StdRng) -> Box<dyn Selector> {
        match self {
            Strategy::RoundRobin => Box::new(round_robin::RoundRobin::new()),
            Strategy::WeightedRoundRobin => Box::new(weighted_round_robin::WeightedRoundRobin::new()),
            Strategy::Random => Box::new(random::Random::new(rng)),
            Strategy::WeightedRandom => Box::new(random::WeightedRandom::new(rng)),
            Strategy::LeastConnections => Box::new(least_conn::LeastConnections::new()),
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Strategy::ALL
            .into_iter()
            .find(|strategy| strategy.as_str() == s)
            .ok_or_else(|| {
                let names: Vec<&str> = Strategy::ALL.iter().map(Strategy::as_str).collect();
                format!("unknown strategy '{}', expected one of: {}", s, names.join(", "))
            })
    }
}

/// Healthy subset and the weights derived from it.
///
/// `cumulative_weights[i]` is the sum of `weight` over `healthy[0..=i]`.
#[derive(Debug, Clone, Default)]
pub struct DerivedState {
    healthy: Vec<Arc<Server>>,
    cumulative_weights: Vec<u64>,
    total_weight: u64,
}

impl DerivedState {
    /// Recompute from scratch over the currently healthy servers, in stored order.
    pub fn compute(servers: &[Arc<Server>]) -> Self {
        let healthy: Vec<Arc<Server>> = servers.iter().filter(|s| s.is_healthy()).cloned().collect();

        let mut total_weight = 0;
        let cumulative_weights = healthy
            .iter()
            .map(|s| {
                total_weight += u64::from(s.weight());
                total_weight
            })
            .collect();

        Self {
            healthy,
            cumulative_weights,
            total_weight,
        }
    }

    /// Whether this state was computed against the servers' current health.
    pub fn is_current(&self, servers: &[Arc<Server>]) -> bool {
        let mut live = servers.iter().filter(|s| s.is_healthy());
        let mut snapshot = self.healthy.iter();
        loop {
            match (live.next(), snapshot.next()) {
                (None, None) => return true,
                (Some(a), Some(b)) if Arc::ptr_eq(a, b) => continue,
                _ => return false,
            }
        }
    }

    /// Healthy servers in stored order.
    pub fn healthy(&self) -> &[Arc<Server>] {
        &self.healthy
    }

    /// Prefix sums of healthy weights.
    pub fn cumulative_weights(&self) -> &[u64] {
        &self.cumulative_weights
    }

    /// Sum of healthy weights.
    pub fn total_weight(&self) -> u64 {
        self.total_weight
    }
}

#[derive(Debug)]
struct SelectionState {
    selector: Box<dyn Selector>,
    derived: DerivedState,
}

/// Chooses which server handles a cache miss.
#[derive(Debug)]
pub struct LoadBalancer {
    servers: Vec<Arc<Server>>,
    strategy: Strategy,
    state: Mutex<SelectionState>,
}

impl LoadBalancer {
    /// Create a balancer over `servers` using `strategy`.
    pub fn new(servers: Vec<Server>, strategy: Strategy) -> Self {
        Self::with_rng(servers, strategy, StdRng::from_entropy())
    }

    /// Create a balancer whose random draws are reproducible.
    pub fn with_seed(servers: Vec<Server>, strategy: Strategy, seed: u64) -> Self {
        Self::with_rng(servers, strategy, StdRng::seed_from_u64(seed))
    }

    fn with_rng(servers: Vec<Server>, strategy: Strategy, rng: StdRng) -> Self {
        let servers: Vec<Arc<Server>> = servers.into_iter().map(Arc::new).collect();
        let derived = DerivedState::compute(&servers);

        tracing::info!(
            strategy = %strategy,
            servers = servers.len(),
            total_weight = derived.total_weight(),
            "Load balancer configured"
        );

        Self {
            state: Mutex::new(SelectionState {
                selector: strategy.selector(rng),
                derived,
            }),
            servers,
            strategy,
        }
    }

    /// Build from configuration.
    pub fn from_config(config: &LoadBalancerConfig) -> Self {
        let servers = config
            .servers
            .iter()
            .map(|s| Server::new(s.name.clone(), s.weight))
            .collect();
        Self::new(servers, config.strategy)
    }

    /// Select the server for the next request. `None` when no server is healthy.
    pub fn next_server(&self) -> Option<Arc<Server>> {
        let mut state = self.state.lock().expect("load balancer mutex poisoned");

        if !state.derived.is_current(&self.servers) {
            tracing::debug!("Server health changed, recomputing weights");
            state.derived = DerivedState::compute(&self.servers);
        }

        let SelectionState { selector, derived } = &mut *state;
        let picked = selector.next_server(derived);

        match &picked {
            Some(server) => {
                tracing::debug!(server = %server.name(), strategy = %self.strategy, "Selected server");
            }
            None => {
                tracing::warn!(
                    strategy = %self.strategy,
                    servers = self.servers.len(),
                    "No healthy servers available"
                );
            }
        }
        picked
    }

    /// Recompute total and cumulative weights over the current healthy set.
    pub fn refresh_derived_state(&self) {
        let mut state = self.state.lock().expect("load balancer mutex poisoned");
        state.derived = DerivedState::compute(&self.servers);
    }

    /// Set a server's health and refresh derived weights in one critical section.
    ///
    /// Returns the previous health, or `None` if no server has that name.
    pub fn set_server_health(&self, name: &str, healthy: bool) -> Option<bool> {
        let server = self.server(name)?;
        let mut state = self.state.lock().expect("load balancer mutex poisoned");
        let previous = server.set_healthy(healthy);
        state.derived = DerivedState::compute(&self.servers);
        drop(state);

        if previous != healthy {
            tracing::info!(server = %name, healthy, "Server health changed");
        }
        metrics::record_backend_health(name, healthy);
        Some(previous)
    }

    /// All configured servers, healthy or not.
    pub fn servers(&self) -> &[Arc<Server>] {
        &self.servers
    }

    /// Look up a server by name.
    pub fn server(&self, name: &str) -> Option<&Arc<Server>> {
        self.servers.iter().find(|s| s.name() == name)
    }

    /// Configured strategy.
    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// Sum of healthy weights.
    pub fn total_weight(&self) -> u64 {
        self.state.lock().expect("load balancer mutex poisoned").derived.total_weight()
    }

    /// Prefix sums of healthy weights.
    pub fn cumulative_weights(&self) -> Vec<u64> {
        self.state
            .lock()
            .expect("load balancer mutex poisoned")
            .derived
            .cumulative_weights()
            .to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn servers(weights: &[u32]) -> Vec<Server> {
        weights
            .iter()
            .enumerate()
            .map(|(i, w)| Server::new(format!("127.0.0.1:{}", 8001 + i), *w))
            .collect()
    }

    fn tally(lb: &LoadBalancer, calls: usize) -> HashMap<String, usize> {
        let mut counts = HashMap::new();
        for _ in 0..calls {
            let s = lb.next_server().unwrap();
            *counts.entry(s.name().to_string()).or_insert(0) += 1;
        }
        counts
    }

    #[test]
    fn test_strategy_names_round_trip() {
        for strategy in Strategy::ALL {
            assert_eq!(strategy.as_str().parse::<Strategy>().unwrap(), strategy);
        }
        assert!("fastest".parse::<Strategy>().is_err());
        assert_eq!(Strategy::default(), Strategy::WeightedRoundRobin);
    }

    #[test]
    fn test_derived_state() {
        let lb = LoadBalancer::new(servers(&[5, 3, 2]), Strategy::WeightedRandom);
        assert_eq!(lb.total_weight(), 10);
        assert_eq!(lb.cumulative_weights(), vec![5, 8, 10]);

        lb.set_server_health("127.0.0.1:8002", false);
        assert_eq!(lb.total_weight(), 7);
        assert_eq!(lb.cumulative_weights(), vec![5, 7]);

        lb.set_server_health("127.0.0.1:8002", true);
        assert_eq!(lb.cumulative_weights(), vec![5, 8, 10]);
    }

    #[test]
    fn test_direct_health_flip_recomputed_before_selection() {
        let lb = LoadBalancer::with_seed(servers(&[5, 3]), Strategy::WeightedRandom, 7);
        lb.servers()[0].set_healthy(false);

        for _ in 0..50 {
            assert_eq!(lb.next_server().unwrap().name(), "127.0.0.1:8002");
        }
        assert_eq!(lb.cumulative_weights(), vec![3]);
    }

    #[test]
    fn test_refresh_after_direct_health_flips() {
        for strategy in Strategy::ALL {
            let lb = LoadBalancer::with_seed(servers(&[5, 3, 2]), strategy, 11);
            let middle = lb.server("127.0.0.1:8002").unwrap().clone();

            middle.set_healthy(false);
            lb.refresh_derived_state();
            assert_eq!(lb.total_weight(), 7);
            assert_eq!(lb.cumulative_weights(), vec![5, 7]);
            let counts = tally(&lb, 100);
            assert!(!counts.contains_key("127.0.0.1:8002"), "{strategy} picked unhealthy server");

            middle.set_healthy(true);
            lb.refresh_derived_state();
            assert_eq!(lb.total_weight(), 10);
            assert_eq!(lb.cumulative_weights(), vec![5, 8, 10]);

            lb.server("127.0.0.1:8001").unwrap().set_healthy(false);
            lb.server("127.0.0.1:8003").unwrap().set_healthy(false);
            lb.refresh_derived_state();
            assert_eq!(lb.cumulative_weights(), vec![3]);
            let counts = tally(&lb, 20);
            assert_eq!(counts.get("127.0.0.1:8002"), Some(&20), "{strategy} ignored restored server");
        }
    }

    #[test]
    fn test_unknown_server_health() {
        let lb = LoadBalancer::new(servers(&[1]), Strategy::RoundRobin);
        assert_eq!(lb.set_server_health("nope", false), None);
        assert_eq!(lb.set_server_health("127.0.0.1:8001", false), Some(true));
    }

    #[test]
    fn test_round_robin_visits_each_once() {
        let lb = LoadBalancer::new(servers(&[1, 1, 1, 1]), Strategy::RoundRobin);
        let counts = tally(&lb, 4);
        assert_eq!(counts.len(), 4);
        assert!(counts.values().all(|&c| c == 1));
    }

    #[test]
    fn test_round_robin_concurrent_callers() {
        let lb = Arc::new(LoadBalancer::new(servers(&[1, 1, 1]), Strategy::RoundRobin));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let lb = lb.clone();
                std::thread::spawn(move || {
                    (0..300)
                        .map(|_| lb.next_server().unwrap().name().to_string())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut counts: HashMap<String, usize> = HashMap::new();
        for h in handles {
            for name in h.join().unwrap() {
                *counts.entry(name).or_insert(0) += 1;
            }
        }
        assert_eq!(counts.len(), 3);
        assert!(counts.values().all(|&c| c == 400));
    }

    #[test]
    fn test_weighted_round_robin_ratio() {
        let lb = LoadBalancer::new(servers(&[5, 3]), Strategy::WeightedRoundRobin);
        let counts = tally(&lb, 800);
        assert_eq!(counts["127.0.0.1:8001"], 500);
        assert_eq!(counts["127.0.0.1:8002"], 300);
    }

    #[test]
    fn test_weighted_random_ratio() {
        let lb = LoadBalancer::with_seed(servers(&[5, 3]), Strategy::WeightedRandom, 42);
        let counts = tally(&lb, 8000);
        let first = counts["127.0.0.1:8001"] as f64 / 8000.0;
        assert!((first - 0.625).abs() < 0.03, "share was {first}");
    }

    #[test]
    fn test_random_covers_all() {
        let lb = LoadBalancer::with_seed(servers(&[1, 1, 1]), Strategy::Random, 1);
        let counts = tally(&lb, 3000);
        assert_eq!(counts.len(), 3);
        assert!(counts.values().all(|&c| c > 800));
    }

    #[test]
    fn test_least_connections_follows_load() {
        let lb = LoadBalancer::new(servers(&[1, 1]), Strategy::LeastConnections);
        let first = lb.next_server().unwrap();
        assert_eq!(first.name(), "127.0.0.1:8001");

        let _g1 = first.connection_guard();
        let second = lb.next_server().unwrap();
        assert_eq!(second.name(), "127.0.0.1:8002");

        let _g2 = second.connection_guard();
        let _g3 = second.connection_guard();
        assert_eq!(lb.next_server().unwrap().name(), "127.0.0.1:8001");
    }

    #[test]
    fn test_unhealthy_server_excluded_by_every_strategy() {
        for strategy in Strategy::ALL {
            let lb = LoadBalancer::with_seed(servers(&[5, 3, 2]), strategy, 3);
            lb.set_server_health("127.0.0.1:8002", false);

            let counts = tally(&lb, 200);
            assert!(!counts.contains_key("127.0.0.1:8002"), "{strategy} picked unhealthy server");

            lb.set_server_health("127.0.0.1:8002", true);
            lb.set_server_health("127.0.0.1:8001", false);
            lb.set_server_health("127.0.0.1:8003", false);
            let counts = tally(&lb, 20);
            assert_eq!(counts.get("127.0.0.1:8002"), Some(&20), "{strategy} ignored restored server");
        }
    }

    #[test]
    fn test_all_unhealthy_yields_none() {
        for strategy in Strategy::ALL {
            let lb = LoadBalancer::new(servers(&[2, 1]), strategy);
            lb.set_server_health("127.0.0.1:8001", false);
            lb.set_server_health("127.0.0.1:8002", false);
            assert!(lb.next_server().is_none(), "{strategy} returned a server");
        }
    }

    #[test]
    fn test_empty_balancer_yields_none() {
        for strategy in Strategy::ALL {
            let lb = LoadBalancer::new(Vec::new(), strategy);
            assert!(lb.next_server().is_none());
            assert_eq!(lb.total_weight(), 0);
        }
    }
}

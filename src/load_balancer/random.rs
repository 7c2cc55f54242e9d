//! Random and weighted random load balancing strategies.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::Rng;

use crate::load_balancer::{DerivedState, Selector, Server};

/// Uniform pick among healthy servers.
#[derive(Debug)]
pub struct Random {
    rng: StdRng,
}

impl Random {
    pub fn new(rng: StdRng) -> Self {
        Self { rng }
    }
}

impl Selector for Random {
    fn next_server(&mut self, derived: &DerivedState) -> Option<Arc<Server>> {
        let healthy = derived.healthy();
        if healthy.is_empty() {
            return None;
        }
        Some(healthy[self.rng.gen_range(0..healthy.len())].clone())
    }
}

/// Weight-proportional pick using the cumulative weight table.
#[derive(Debug)]
pub struct WeightedRandom {
    rng: StdRng,
}

impl WeightedRandom {
    pub fn new(rng: StdRng) -> Self {
        Self { rng }
    }
}

impl Selector for WeightedRandom {
    fn next_server(&mut self, derived: &DerivedState) -> Option<Arc<Server>> {
        let healthy = derived.healthy();
        let total = derived.total_weight();
        if healthy.is_empty() || total == 0 {
            return None;
        }

        let draw = self.rng.gen_range(0..total);
        let index = index_for_draw(derived.cumulative_weights(), draw);
        healthy.get(index).or_else(|| healthy.last()).cloned()
    }
}

/// Position of the first cumulative weight strictly greater than `draw`.
///
/// Returns `cumulative.len()` when the draw lies past the last boundary.
pub(crate) fn index_for_draw(cumulative: &[u64], draw: u64) -> usize {
    cumulative.partition_point(|&boundary| boundary <= draw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_draw_boundaries() {
        let cumulative = [5, 8];
        for draw in 0..5 {
            assert_eq!(index_for_draw(&cumulative, draw), 0, "draw {draw}");
        }
        for draw in 5..8 {
            assert_eq!(index_for_draw(&cumulative, draw), 1, "draw {draw}");
        }
        assert_eq!(index_for_draw(&cumulative, 8), 2);
    }

    #[test]
    fn test_seeded_draws_are_reproducible() {
        let servers: Vec<Arc<Server>> = [("a", 5), ("b", 3)]
            .iter()
            .map(|(n, w)| Arc::new(Server::new(*n, *w)))
            .collect();
        let derived = DerivedState::compute(&servers);

        let run = |seed| {
            let mut lb = WeightedRandom::new(StdRng::seed_from_u64(seed));
            (0..32)
                .map(|_| lb.next_server(&derived).unwrap().name().to_string())
                .collect::<Vec<_>>()
        };
        assert_eq!(run(9), run(9));
    }

    #[test]
    fn test_empty_sets() {
        let mut random = Random::new(StdRng::seed_from_u64(0));
        let mut weighted = WeightedRandom::new(StdRng::seed_from_u64(0));
        let empty = DerivedState::default();
        assert!(random.next_server(&empty).is_none());
        assert!(weighted.next_server(&empty).is_none());
    }
}

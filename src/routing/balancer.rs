/// Backend selection for commands with no affinity
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Mutex;

/// Load balancing algorithm trait
pub trait LoadBalancingAlgorithm: Send + Sync {
    /// Select a position in a pool of `count` backends
    fn select_backend(&self, count: usize) -> Option<usize>;
}

/// Uniform random selection
pub struct UniformRandom {
    rng: Mutex<StdRng>,
}

impl UniformRandom {
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Reproducible selection sequence
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl Default for UniformRandom {
    fn default() -> Self {
        Self::new()
    }
}

impl LoadBalancingAlgorithm for UniformRandom {
    fn select_backend(&self, count: usize) -> Option<usize> {
        if count == 0 {
            return None;
        }

        let mut rng = match self.rng.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Some(rng.gen_range(0..count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_random_empty_pool() {
        let balancer = UniformRandom::new();
        assert_eq!(balancer.select_backend(0), None);
        assert_eq!(balancer.select_backend(1), Some(0));
    }

    #[test]
    fn test_uniform_random_covers_pool() {
        let balancer = UniformRandom::seeded(42);
        let mut counts = [0usize; 3];
        for _ in 0..300 {
            counts[balancer.select_backend(3).unwrap()] += 1;
        }

        // Every backend should be chosen a reasonable number of times
        assert!(counts.iter().all(|&c| c > 50), "skewed counts: {counts:?}");
    }

    #[test]
    fn test_seeded_is_reproducible() {
        let a = UniformRandom::seeded(9);
        let b = UniformRandom::seeded(9);
        let left: Vec<_> = (0..20).map(|_| a.select_backend(5)).collect();
        let right: Vec<_> = (0..20).map(|_| b.select_backend(5)).collect();
        assert_eq!(left, right);
    }
}

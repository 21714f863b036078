//! Seeded random sampling for audits.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Mutex;

/// Draws random-audit samples from a seeded generator.
///
/// The same seed and the same sequence of draws select the same claims.
pub struct AuditSampler {
    rate: f64,
    seed: u64,
    rng: Mutex<StdRng>,
}

impl AuditSampler {
    /// Create a sampler. Without a seed one is drawn from the thread RNG.
    pub fn new(rate: f64, seed: Option<u64>) -> Self {
        let seed = seed.unwrap_or_else(rand::random);
        Self {
            rate: rate.clamp(0.0, 1.0),
            seed,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Seed in use, for reproducing a run.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Whether the next item is sampled.
    pub fn draw(&self) -> bool {
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        rng.gen::<f64>() < self.rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_seed_same_draws() {
        let a = AuditSampler::new(0.1, Some(7));
        let b = AuditSampler::new(0.1, Some(7));
        let draws_a: Vec<bool> = (0..200).map(|_| a.draw()).collect();
        let draws_b: Vec<bool> = (0..200).map(|_| b.draw()).collect();
        assert_eq!(draws_a, draws_b);
    }

    #[test]
    fn test_rate_roughly_honoured() {
        let sampler = AuditSampler::new(0.1, Some(42));
        let hits = (0..10_000).filter(|_| sampler.draw()).count();
        assert!((800..1200).contains(&hits), "hits = {}", hits);
    }

    #[test]
    fn test_edge_rates() {
        let never = AuditSampler::new(0.0, Some(1));
        let always = AuditSampler::new(1.0, Some(1));
        assert!((0..100).all(|_| !never.draw()));
        assert!((0..100).all(|_| always.draw()));
    }
}

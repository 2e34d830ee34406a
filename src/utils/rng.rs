//! Simple random number generator for reproducibility.
//!
//! A lightweight xorshift-based PRNG used for weight initialization and
//! mini-batch shuffling, so that a fixed seed reproduces a training run.

use std::time::{SystemTime, UNIX_EPOCH};

const FALLBACK_SEED: u64 = 0x9e3779b97f4a7c15;

/// Xorshift RNG (not cryptographic).
#[derive(Debug, Clone)]
pub struct SimpleRng {
    state: u64,
    spare_gaussian: Option<f64>,
}

impl SimpleRng {
    /// Create a new RNG with explicit seed (if zero, use a fixed value).
    pub fn new(seed: u64) -> Self {
        let state = if seed == 0 { FALLBACK_SEED } else { seed };
        Self {
            state,
            spare_gaussian: None,
        }
    }

    /// Create an RNG seeded from the current time.
    pub fn from_time() -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos() as u64;
        Self::new(nanos)
    }

    /// Basic xorshift to generate u32.
    pub fn next_u32(&mut self) -> u32 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        (x >> 32) as u32
    }

    /// Uniform sample in [0, 1).
    pub fn next_f64(&mut self) -> f64 {
        self.next_u32() as f64 / (u32::MAX as f64 + 1.0)
    }

    /// Standard normal sample (Box-Muller, caching the second value).
    pub fn next_gaussian(&mut self) -> f64 {
        if let Some(z) = self.spare_gaussian.take() {
            return z;
        }
        // 1 - u keeps the log argument in (0, 1].
        let u1 = 1.0 - self.next_f64();
        let u2 = self.next_f64();
        let radius = (-2.0 * u1.ln()).sqrt();
        let theta = 2.0 * std::f64::consts::PI * u2;
        self.spare_gaussian = Some(radius * theta.sin());
        radius * theta.cos()
    }

    /// Integer sample in [0, upper).
    pub fn gen_usize(&mut self, upper: usize) -> usize {
        if upper == 0 {
            0
        } else {
            (self.next_u32() as usize) % upper
        }
    }

    /// Fisher-Yates shuffle for usize slices.
    pub fn shuffle_usize(&mut self, data: &mut [usize]) {
        if data.len() <= 1 {
            return;
        }
        for i in (1..data.len()).rev() {
            let j = self.gen_usize(i + 1);
            data.swap(i, j);
        }
    }

    /// Returns `0..n` in shuffled order.
    pub fn permutation(&mut self, n: usize) -> Vec<usize> {
        let mut index: Vec<usize> = (0..n).collect();
        self.shuffle_usize(&mut index);
        index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rng_deterministic() {
        let mut rng1 = SimpleRng::new(42);
        let mut rng2 = SimpleRng::new(42);

        for _ in 0..100 {
            assert_eq!(rng1.next_u32(), rng2.next_u32());
        }
    }

    #[test]
    fn test_rng_next_f64_range() {
        let mut rng = SimpleRng::new(12345);

        for _ in 0..1000 {
            let val = rng.next_f64();
            assert!((0.0..1.0).contains(&val));
        }
    }

    #[test]
    fn test_gaussian_moments() {
        let mut rng = SimpleRng::new(2024);
        let samples: Vec<f64> = (0..20_000).map(|_| rng.next_gaussian()).collect();
        let mean = samples.iter().sum::<f64>() / samples.len() as f64;
        let var = samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / samples.len() as f64;

        assert!(mean.abs() < 0.05, "mean {mean}");
        assert!((var - 1.0).abs() < 0.05, "variance {var}");
        assert!(samples.iter().all(|x| x.is_finite()));
    }

    #[test]
    fn test_rng_gen_usize_zero() {
        let mut rng = SimpleRng::new(22222);
        assert_eq!(rng.gen_usize(0), 0);
    }

    #[test]
    fn test_shuffle_usize() {
        let mut rng = SimpleRng::new(33333);
        let mut data = vec![0, 1, 2, 3, 4, 5, 6, 7, 8, 9];
        let original = data.clone();

        rng.shuffle_usize(&mut data);

        // Should contain same elements
        let mut sorted = data.clone();
        sorted.sort();
        assert_eq!(sorted, original);

        // Very unlikely to be in same order
        assert_ne!(data, original);
    }

    #[test]
    fn test_permutation_covers_range() {
        let mut rng = SimpleRng::new(55555);
        let mut perm = rng.permutation(300);
        perm.sort_unstable();
        assert_eq!(perm, (0..300).collect::<Vec<_>>());
    }
}

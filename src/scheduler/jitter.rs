use crate::error::ConfigurationError;
use rand::rngs::{OsRng, StdRng};
use rand::{Rng, SeedableRng, TryRngCore};
use std::time::Duration;

/// Start-up stagger drawn uniformly from `[0, max]`
#[derive(Debug)]
pub struct Jitter {
    rng: StdRng,
    max: Duration,
}

impl Jitter {
    /// Seed the generator from the operating system's entropy source
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError::Entropy` if the OS cannot provide a seed.
    pub fn from_entropy(max: Duration) -> Result<Self, ConfigurationError> {
        let mut seed = <StdRng as SeedableRng>::Seed::default();
        OsRng
            .try_fill_bytes(&mut seed)
            .map_err(|e| ConfigurationError::Entropy(e.to_string()))?;

        Ok(Self {
            rng: StdRng::from_seed(seed),
            max,
        })
    }

    /// Deterministic jitter for tests and reproducible runs
    pub fn seeded(seed: u64, max: Duration) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            max,
        }
    }

    /// Jitter that always yields zero
    pub fn disabled() -> Self {
        Self::seeded(0, Duration::ZERO)
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    pub fn sample(&mut self) -> Duration {
        if self.max.is_zero() {
            return Duration::ZERO;
        }
        let max_nanos = u64::try_from(self.max.as_nanos()).unwrap_or(u64::MAX);
        Duration::from_nanos(self.rng.random_range(0..=max_nanos))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_jitter_is_zero() {
        let mut jitter = Jitter::disabled();
        assert!((0..100).all(|_| jitter.sample() == Duration::ZERO));
    }

    #[test]
    fn test_seeded_jitter_is_reproducible() {
        let max = Duration::from_secs(2);
        let mut a = Jitter::seeded(42, max);
        let mut b = Jitter::seeded(42, max);
        for _ in 0..20 {
            assert_eq!(a.sample(), b.sample());
        }
    }

    #[test]
    fn test_entropy_seeding() {
        let jitter = Jitter::from_entropy(Duration::from_millis(500)).unwrap();
        assert_eq!(jitter.max(), Duration::from_millis(500));
    }
}

// 🎲 Jitter sources for callback scheduling
//
// Fire time = now + callback_time_ms + jitter, jitter in [0, max_ms].
// Tests inject FixedJitter so fire times are exact.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub const DEFAULT_MAX_JITTER_MS: u64 = 1000;

pub trait JitterSource: Send {
    /// Next offset in milliseconds, within `[0, max_ms]`
    fn next_jitter_ms(&mut self, max_ms: u64) -> u64;
}

/// Uniform random jitter
pub struct RandomJitter {
    rng: StdRng,
}

impl RandomJitter {
    pub fn from_entropy() -> Self {
        RandomJitter {
            rng: StdRng::from_entropy(),
        }
    }

    /// Reproducible sequence for a given seed
    pub fn seeded(seed: u64) -> Self {
        RandomJitter {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl JitterSource for RandomJitter {
    fn next_jitter_ms(&mut self, max_ms: u64) -> u64 {
        self.rng.gen_range(0..=max_ms)
    }
}

/// Always the same offset, clamped to the allowed range
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedJitter(pub u64);

impl JitterSource for FixedJitter {
    fn next_jitter_ms(&mut self, max_ms: u64) -> u64 {
        self.0.min(max_ms)
    }
}

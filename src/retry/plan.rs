use std::str::FromStr;
use std::time::Duration;

use rand::Rng;

use crate::errors::Error;

/// Largest retry budget a plan accepts; per-request overrides are clamped to it.
pub const MAX_RETRY_BUDGET: u8 = 16;

/// Strategy for adding randomness to delay calculations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JitterStrategy {
    None,
    Full,
    Decorrelated,
}

/// Backoff configuration for transport-level retries.
///
/// The delay before retry `k` (counting from 0) is `unit * multiplier^k`,
/// so the default plan waits 1s, 2s and 4s before giving up.
#[derive(Clone, Debug)]
pub struct RetryPlan {
    /// Retries allowed after the initial attempt.
    pub max_retries: u8,
    pub unit: Duration,
    pub multiplier: f64,
    pub jitter: JitterStrategy,
}

impl RetryPlan {
    pub fn new(max_retries: u8, unit: Duration, multiplier: f64, jitter: JitterStrategy) -> Self {
        Self {
            max_retries,
            unit,
            multiplier,
            jitter,
        }
    }

    pub fn default_plan() -> Self {
        Self {
            max_retries: 3,
            unit: Duration::from_secs(1),
            multiplier: 2.0,
            jitter: JitterStrategy::None,
        }
    }

    /// Same plan with a different retry budget, capped at [`MAX_RETRY_BUDGET`].
    pub fn with_max_retries(&self, max_retries: u8) -> Self {
        Self {
            max_retries: max_retries.min(MAX_RETRY_BUDGET),
            ..self.clone()
        }
    }

    pub fn delay_for_attempt(&self, attempt: u8, rng: &mut impl Rng) -> Duration {
        let exp = self.multiplier.powi(attempt as i32);
        let delay = Duration::try_from_secs_f64(self.unit.as_secs_f64() * exp).unwrap_or(Duration::MAX);
        match self.jitter {
            JitterStrategy::None => delay,
            JitterStrategy::Full => scale(delay, rng.gen_range(0.0..1.0)),
            JitterStrategy::Decorrelated => scale(delay, rng.gen_range(0.5..1.5)),
        }
    }
}

fn scale(delay: Duration, factor: f64) -> Duration {
    Duration::try_from_secs_f64(delay.as_secs_f64() * factor).unwrap_or(Duration::MAX)
}

impl Default for RetryPlan {
    fn default() -> Self {
        Self::default_plan()
    }
}

impl FromStr for JitterStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(JitterStrategy::None),
            "full" => Ok(JitterStrategy::Full),
            "decorrelated" => Ok(JitterStrategy::Decorrelated),
            other => Err(Error::Config(format!(
                "Unknown jitter strategy '{}'; expected 'none', 'full' or 'decorrelated'",
                other
            ))),
        }
    }
}

//! Acquisition retry policy
//!
//! `Fixed` sleeps one lease duration between attempts. `ExponentialJitter`
//! grows the ceiling geometrically and sleeps a uniform random delay below
//! it, which spreads out nodes that started waiting at the same moment.

use std::time::Duration;

use rand::Rng;

use crate::error::LockError;

#[derive(Clone, Debug, Default, PartialEq)]
pub enum RetryPolicy {
    /// Sleep exactly the lease duration of the lock's interval class
    #[default]
    Fixed,
    ExponentialJitter {
        initial: Duration,
        max: Duration,
        multiplier: f64,
    },
}

impl RetryPolicy {
    pub fn validate(&self) -> Result<(), LockError> {
        if let RetryPolicy::ExponentialJitter {
            initial,
            max,
            multiplier,
        } = self
        {
            if initial.is_zero() {
                return Err(LockError::InvalidOption(
                    "retry initial delay must be positive".to_string(),
                ));
            }
            if max < initial {
                return Err(LockError::InvalidOption(format!(
                    "retry max delay {:?} is below initial delay {:?}",
                    max, initial
                )));
            }
            if !multiplier.is_finite() || *multiplier < 1.0 {
                return Err(LockError::InvalidOption(format!(
                    "retry multiplier must be a finite number >= 1, got {}",
                    multiplier
                )));
            }
        }
        Ok(())
    }

    /// Delay sequence for one acquisition loop
    pub fn backoff(&self, lease: Duration) -> Backoff {
        Backoff {
            policy: self.clone(),
            lease,
            attempt: 0,
        }
    }
}

/// Stateful delay generator
#[derive(Clone, Debug)]
pub struct Backoff {
    policy: RetryPolicy,
    lease: Duration,
    attempt: u32,
}

impl Backoff {
    /// Upper bound of the next delay
    pub fn ceiling(&self) -> Duration {
        match &self.policy {
            RetryPolicy::Fixed => self.lease,
            RetryPolicy::ExponentialJitter {
                initial,
                max,
                multiplier,
            } => {
                let exp = self.attempt.min(64) as i32;
                let secs = (initial.as_secs_f64() * multiplier.powi(exp)).min(max.as_secs_f64());
                Duration::try_from_secs_f64(secs).unwrap_or(*max)
            }
        }
    }

    pub fn next_delay(&mut self) -> Duration {
        let ceiling = self.ceiling();
        self.attempt = self.attempt.saturating_add(1);
        match self.policy {
            RetryPolicy::Fixed => ceiling,
            RetryPolicy::ExponentialJitter { .. } => {
                let ceiling_ms = u64::try_from(ceiling.as_millis()).unwrap_or(u64::MAX);
                Duration::from_millis(rand::rng().random_range(0..=ceiling_ms))
            }
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempt
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

//! # Jitter policy for restart delays.
//!
//! [`JitterPolicy`] randomizes backoff delays so that services which crash together
//! (typically because a shared dependency went away) do not relaunch in lockstep.
//!
//! - [`JitterPolicy::None`] exact backoff delay (default, predictable)
//! - [`JitterPolicy::Full`] random delay in `[0, delay]`
//! - [`JitterPolicy::Equal`] `delay/2 + random[0, delay/2]`
//! - [`JitterPolicy::Decorrelated`] random in `[base, delay × 3]`, capped at max

use std::time::Duration;

use rand::Rng;
use serde::Deserialize;

/// Policy controlling randomization of restart delays.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JitterPolicy {
    /// No jitter: use the exact backoff delay.
    #[default]
    None,
    /// Random delay in `[0, delay]`.
    Full,
    /// `delay/2 + random[0, delay/2]`.
    Equal,
    /// Random delay in `[base, delay × 3]`, capped at the backoff maximum.
    ///
    /// Needs extra context, see [`apply_decorrelated`](Self::apply_decorrelated).
    Decorrelated,
}

impl JitterPolicy {
    /// Applies jitter to `delay`.
    ///
    /// `Decorrelated` returns the input unchanged here.
    pub fn apply(&self, delay: Duration) -> Duration {
        match self {
            JitterPolicy::None | JitterPolicy::Decorrelated => delay,
            JitterPolicy::Full => full(delay),
            JitterPolicy::Equal => equal(delay),
        }
    }

    /// Applies decorrelated jitter given the floor (`base`), the current exponential
    /// delay and the cap.
    ///
    /// Falls back to [`apply`](Self::apply) for the other variants.
    pub fn apply_decorrelated(&self, base: Duration, delay: Duration, max: Duration) -> Duration {
        if !matches!(self, JitterPolicy::Decorrelated) {
            return self.apply(delay);
        }

        let base_ms = millis(base);
        let upper = millis(delay).saturating_mul(3).min(millis(max)).max(base_ms);
        if base_ms >= upper {
            return base;
        }
        Duration::from_millis(rand::rng().random_range(base_ms..=upper))
    }
}

fn millis(d: Duration) -> u64 {
    d.as_millis().min(u128::from(u64::MAX)) as u64
}

fn full(delay: Duration) -> Duration {
    let ms = millis(delay);
    if ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::rng().random_range(0..=ms))
}

fn equal(delay: Duration) -> Duration {
    let half = millis(delay) / 2;
    if half == 0 {
        return delay;
    }
    Duration::from_millis(half + rand::rng().random_range(0..=half))
}

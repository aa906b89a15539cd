//! # Backoff policy between restarts.
//!
//! [`BackoffPolicy`] controls how long a service waits before it is relaunched.
//! The delay before restart `n` (0-indexed) is `first × factor^n`, clamped to `max`,
//! then jitter is applied. The base is derived from the restart number alone, so
//! jitter never feeds back into later delays.
//!
//! The default doubles from 500ms up to 30s, which is what a service stack wants
//! while a database is still coming up.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use stackvisor::{BackoffPolicy, JitterPolicy};
//!
//! let backoff = BackoffPolicy {
//!     first: Duration::from_millis(100),
//!     max: Duration::from_secs(1),
//!     factor: 2.0,
//!     jitter: JitterPolicy::None,
//! };
//!
//! assert_eq!(backoff.next(0), Duration::from_millis(100));
//! assert_eq!(backoff.next(3), Duration::from_millis(800));
//! assert_eq!(backoff.next(4), Duration::from_secs(1));
//! ```

use std::time::Duration;

use serde::Deserialize;

use crate::policies::jitter::JitterPolicy;

/// Restart backoff policy.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BackoffPolicy {
    /// Delay before the first restart.
    pub first: Duration,
    /// Upper bound for any delay.
    pub max: Duration,
    /// Multiplicative growth factor (`2.0` doubles each restart).
    pub factor: f64,
    /// Randomization applied on top of the exponential delay.
    pub jitter: JitterPolicy,
}

impl Default for BackoffPolicy {
    /// `first = 500ms`, `factor = 2.0`, `max = 30s`, no jitter.
    fn default() -> Self {
        Self {
            first: Duration::from_millis(500),
            max: Duration::from_secs(30),
            factor: 2.0,
            jitter: JitterPolicy::None,
        }
    }
}

impl BackoffPolicy {
    /// Computes the delay before restart number `restart` (0-indexed).
    ///
    /// Non-finite or negative intermediate values clamp to [`BackoffPolicy::max`].
    pub fn next(&self, restart: u32) -> Duration {
        let exp = restart.min(i32::MAX as u32) as i32;
        let secs = self.first.as_secs_f64() * self.factor.powi(exp);

        let base = if !secs.is_finite() || secs < 0.0 || secs > self.max.as_secs_f64() {
            self.max
        } else {
            Duration::from_secs_f64(secs)
        };

        match self.jitter {
            JitterPolicy::Decorrelated => {
                self.jitter
                    .apply_decorrelated(self.first.min(self.max), base, self.max)
            }
            other => other.apply(base),
        }
    }
}

/// Manifest representation: `{ first_ms, max_ms, factor, jitter }`, every field optional.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackoffSettings {
    pub first_ms: Option<u64>,
    pub max_ms: Option<u64>,
    pub factor: Option<f64>,
    pub jitter: Option<JitterPolicy>,
}

impl BackoffSettings {
    /// Overlays the set fields on top of `base`.
    pub fn apply_to(&self, base: BackoffPolicy) -> BackoffPolicy {
        BackoffPolicy {
            first: self.first_ms.map(Duration::from_millis).unwrap_or(base.first),
            max: self.max_ms.map(Duration::from_millis).unwrap_or(base.max),
            factor: self.factor.unwrap_or(base.factor),
            jitter: self.jitter.unwrap_or(base.jitter),
        }
    }
}

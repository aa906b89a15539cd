//! # Global runtime configuration.
//!
//! [`Config`] centralizes the orchestrator settings and the per-service defaults.
//!
//! Config is used in two ways:
//! 1. **Orchestrator creation**: `Orchestrator::builder(config, registry)`
//! 2. **Service defaults**: `max_restarts`, `backoff` and `grace` apply to every
//!    [`ServiceSpec`](crate::ServiceSpec) that does not override them.
//!
//! ## Sentinel values
//! - `grace = 0s` → no graceful window, kill right after SIGTERM
//! - `probe_attempts = 0` → treated as 1 (at least one probe)

use std::time::Duration;

use serde::Deserialize;

use crate::policies::{BackoffPolicy, BackoffSettings};
use crate::services::ServiceSpec;

/// Global configuration for the orchestrator runtime.
#[derive(Clone, Debug)]
pub struct Config {
    /// Default time between SIGTERM and force kill when stopping a service.
    pub grace: Duration,

    /// Interval between readiness probes while a service is `Starting`.
    ///
    /// The first probe runs one interval after launch.
    pub probe_interval: Duration,

    /// Upper bound for a single readiness probe.
    pub probe_timeout: Duration,

    /// Consecutive failed probes after which the launch attempt counts as failed.
    pub probe_attempts: u32,

    /// Default restart budget per lifecycle.
    pub max_restarts: u32,

    /// Default backoff between restarts.
    pub backoff: BackoffPolicy,

    /// Capacity of the event bus ring buffer (min 1).
    pub bus_capacity: usize,
}

impl Config {
    /// Probe attempts, at least 1.
    #[inline]
    pub fn probe_attempts_clamped(&self) -> u32 {
        self.probe_attempts.max(1)
    }

    /// Bus capacity, at least 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }

    /// Stop grace for `spec`: its own override or the global default.
    #[inline]
    pub fn grace_for(&self, spec: &ServiceSpec) -> Duration {
        spec.stop_grace().unwrap_or(self.grace)
    }

    /// Restart budget for `spec`.
    #[inline]
    pub fn max_restarts_for(&self, spec: &ServiceSpec) -> u32 {
        spec.max_restarts().unwrap_or(self.max_restarts)
    }

    /// Backoff for `spec`.
    #[inline]
    pub fn backoff_for(&self, spec: &ServiceSpec) -> BackoffPolicy {
        spec.backoff().unwrap_or(self.backoff)
    }

    /// Returns a copy with the manifest's `[orchestrator]` settings applied.
    pub fn with_settings(mut self, s: &ConfigSettings) -> Self {
        if let Some(v) = s.stop_grace_secs {
            self.grace = Duration::from_secs(v);
        }
        if let Some(v) = s.probe_interval_ms {
            self.probe_interval = Duration::from_millis(v);
        }
        if let Some(v) = s.probe_timeout_ms {
            self.probe_timeout = Duration::from_millis(v);
        }
        if let Some(v) = s.probe_attempts {
            self.probe_attempts = v;
        }
        if let Some(v) = s.max_restarts {
            self.max_restarts = v;
        }
        if let Some(v) = s.bus_capacity {
            self.bus_capacity = v;
        }
        if let Some(b) = &s.backoff {
            self.backoff = b.apply_to(self.backoff);
        }
        self
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `grace = 10s`
    /// - `probe_interval = 500ms`, `probe_timeout = 2s`, `probe_attempts = 60`
    ///   (roughly half a minute to become ready)
    /// - `max_restarts = 5`
    /// - `backoff = BackoffPolicy::default()` (500ms doubling up to 30s)
    /// - `bus_capacity = 1024`
    fn default() -> Self {
        Self {
            grace: Duration::from_secs(10),
            probe_interval: Duration::from_millis(500),
            probe_timeout: Duration::from_secs(2),
            probe_attempts: 60,
            max_restarts: 5,
            backoff: BackoffPolicy::default(),
            bus_capacity: 1024,
        }
    }
}

/// Manifest `[orchestrator]` table; every field optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigSettings {
    pub stop_grace_secs: Option<u64>,
    pub probe_interval_ms: Option<u64>,
    pub probe_timeout_ms: Option<u64>,
    pub probe_attempts: Option<u32>,
    pub max_restarts: Option<u32>,
    pub bus_capacity: Option<usize>,
    pub backoff: Option<BackoffSettings>,
}

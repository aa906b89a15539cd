//! Restart and backoff policies.
//!
//! This module groups the knobs that control **if** a service is relaunched after
//! its instance exits and **how long** to wait before doing so.
//!
//! ## Contents
//! - [`RestartPolicy`] when to restart (never / on-failure / always)
//! - [`BackoffPolicy`] how restart delays evolve (first / factor / max + jitter)
//! - [`JitterPolicy`]  randomization of those delays
//!
//! ## Quick wiring
//! ```text
//! ServiceSpec { restart, max_restarts, backoff }
//!      └─► core::actor::ServiceActor::on_exit(code):
//!           - restart.allows_restart(code) && restart_count < max_restarts
//!           - backoff.next(restart_count) to schedule the relaunch
//! ```
//!
//! ## Defaults
//! - `RestartPolicy::OnFailure`.
//! - `BackoffPolicy::default()` → first=500ms, factor=2.0, max=30s, jitter=None.

mod backoff;
mod jitter;
mod restart;

pub use backoff::{BackoffPolicy, BackoffSettings};
pub use jitter::JitterPolicy;
pub use restart::RestartPolicy;

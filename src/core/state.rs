//! # Per-service runtime state.
//!
//! Each [`ServiceSupervisor`](crate::ServiceSupervisor) owns one [`RuntimeState`]
//! behind a `tokio::sync::watch` channel. Only the supervisor's task writes it;
//! everyone else reads whole snapshots, so a reader never sees a phase from one
//! transition paired with a counter from another.
//!
//! ```text
//! Pending ──start()──► Starting ──probe ok──► Ready
//!                        │  ▲                   │
//!        probe exhausted │  │ policy allows     │ unexpected exit
//!        / launch error  │  │ & budget left     │
//!                        ▼  │                   ▼
//!                      (on_exit) ◄──────────────┘
//!                        │
//!                        └── otherwise ──► Failed
//!
//! any ──stop()──► Stopped ──start()──► Starting (fresh lifecycle)
//! ```

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle phase of one service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Declared, never started (or not yet reached by `start_all`).
    #[default]
    Pending,
    /// An instance is launching or being probed, or a relaunch is scheduled.
    Starting,
    /// The readiness probe succeeded and the instance is running.
    Ready,
    /// Out of restarts; terminal until a fresh `start()`.
    Failed,
    /// Stopped on request; terminal until a fresh `start()`.
    Stopped,
}

impl Phase {
    /// True once `start_all` may move on: `Ready`, `Failed` or `Stopped`.
    #[inline]
    pub fn is_settled(&self) -> bool {
        matches!(self, Phase::Ready | Phase::Failed | Phase::Stopped)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Pending => "pending",
            Phase::Starting => "starting",
            Phase::Ready => "ready",
            Phase::Failed => "failed",
            Phase::Stopped => "stopped",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of one service's runtime state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeState {
    /// Current phase.
    pub phase: Phase,
    /// Restarts performed in the current lifecycle.
    pub restart_count: u32,
    /// Most recent failure, kept across restarts until the next `Ready`.
    pub last_error: Option<Arc<str>>,
    /// OS pid of the live instance, if any.
    pub pid: Option<u32>,
    /// When `phase` was last entered.
    pub since: DateTime<Utc>,
}

impl RuntimeState {
    pub fn pending() -> Self {
        Self {
            phase: Phase::Pending,
            restart_count: 0,
            last_error: None,
            pid: None,
            since: Utc::now(),
        }
    }

    /// Moves to `phase`, stamping `since` only if the phase actually changed.
    pub(crate) fn enter(&mut self, phase: Phase) {
        if self.phase != phase {
            self.phase = phase;
            self.since = Utc::now();
        }
    }
}

impl Default for RuntimeState {
    fn default() -> Self {
        Self::pending()
    }
}

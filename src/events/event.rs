//! # Runtime events emitted by the orchestrator and the service actors.
//!
//! [`EventKind`] classifies events in three groups:
//! - **Service lifecycle**: starting, probe failures, ready, exits, restarts, failures, stop
//! - **Orchestration**: startup aborted, shutdown requested, teardown finished
//! - **Subscriber health**: overflow and panics in subscriber workers
//!
//! [`Event`] carries the metadata (service name, attempt, delay, exit code, reason).
//!
//! ## Ordering guarantees
//! Every event gets a process-wide monotonic sequence number (`seq`), so consumers
//! can restore the exact order across services.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use stackvisor::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::BackoffScheduled)
//!     .with_service("promscale")
//!     .with_attempt(2)
//!     .with_delay(Duration::from_secs(1))
//!     .with_reason("exited with code 1");
//!
//! assert_eq!(ev.service.as_deref(), Some("promscale"));
//! assert_eq!(ev.delay_ms, Some(1000));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    // === Service lifecycle ===
    /// An instance is being launched (phase `Starting`).
    ///
    /// Sets `service`, `attempt` (1-based within the lifecycle).
    ServiceStarting,

    /// A readiness probe failed; the actor will probe again or give up.
    ///
    /// Sets `service`, `attempt` (probe number), `reason`.
    ProbeFailed,

    /// The readiness probe succeeded (phase `Ready`).
    ///
    /// Sets `service`, `attempt`, `pid` if known.
    ServiceReady,

    /// The instance exited on its own.
    ///
    /// Sets `service`, `exit_code`.
    ServiceExited,

    /// A relaunch is scheduled after a failure.
    ///
    /// Sets `service`, `attempt` (the restart number), `delay_ms`, `reason`.
    BackoffScheduled,

    /// The service is `Failed` and will not be restarted.
    ///
    /// Sets `service`, `reason`.
    ServiceFailed,

    /// Graceful termination of the instance started.
    ///
    /// Sets `service`.
    ServiceStopping,

    /// The instance did not exit within the grace period and was killed.
    ///
    /// Sets `service`, `timeout_ms` (the grace period).
    GraceExceeded,

    /// The service reached `Stopped`.
    ///
    /// Sets `service`, `reason` when teardown reported an error.
    ServiceStopped,

    // === Orchestration ===
    /// `start_all` gave up because a service failed.
    ///
    /// Sets `service` (the failed one), `reason`.
    StartupAborted,

    /// A shutdown signal (or token cancellation) was observed.
    ShutdownRequested,

    /// `stop_all` finished.
    ///
    /// Sets `reason` with the failure summary when teardown had errors.
    TeardownComplete,

    // === Subscriber health ===
    /// A subscriber dropped an event (queue full or worker gone).
    ///
    /// Sets `service` (subscriber name), `reason`.
    SubscriberOverflow,

    /// A subscriber panicked while handling an event.
    ///
    /// Sets `service` (subscriber name), `reason`.
    SubscriberPanicked,
}

impl EventKind {
    /// True for events that change some service's phase.
    #[inline]
    pub fn changes_phase(&self) -> bool {
        matches!(
            self,
            EventKind::ServiceStarting
                | EventKind::ServiceReady
                | EventKind::BackoffScheduled
                | EventKind::ServiceFailed
                | EventKind::ServiceStopped
        )
    }
}

/// Runtime event with optional metadata.
#[derive(Debug, Clone)]
pub struct Event {
    /// Process-wide monotonic sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,
    /// Service (or subscriber) name, if applicable.
    pub service: Option<Arc<str>>,
    /// Attempt / restart / probe number depending on the kind.
    pub attempt: Option<u32>,
    /// Delay before the next launch in milliseconds.
    pub delay_ms: Option<u32>,
    /// Timeout or grace period in milliseconds.
    pub timeout_ms: Option<u32>,
    /// Exit code of the instance.
    pub exit_code: Option<i32>,
    /// OS process id of the instance.
    pub pid: Option<u32>,
    /// Human-readable reason (errors, overflow details, ...).
    pub reason: Option<Arc<str>>,
}

impl Event {
    /// Creates an event of the given kind with the current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            service: None,
            attempt: None,
            delay_ms: None,
            timeout_ms: None,
            exit_code: None,
            pid: None,
            reason: None,
        }
    }

    #[inline]
    pub fn with_service(mut self, name: impl Into<Arc<str>>) -> Self {
        self.service = Some(name.into());
        self
    }

    #[inline]
    pub fn with_attempt(mut self, n: u32) -> Self {
        self.attempt = Some(n);
        self
    }

    /// Attaches a delay (stored as milliseconds, saturating).
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        self.delay_ms = Some(compact_ms(d));
        self
    }

    /// Attaches a timeout (stored as milliseconds, saturating).
    #[inline]
    pub fn with_timeout(mut self, d: Duration) -> Self {
        self.timeout_ms = Some(compact_ms(d));
        self
    }

    #[inline]
    pub fn with_exit_code(mut self, code: i32) -> Self {
        self.exit_code = Some(code);
        self
    }

    #[inline]
    pub fn with_pid(mut self, pid: Option<u32>) -> Self {
        self.pid = pid;
        self
    }

    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Creates a subscriber overflow event.
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_service(subscriber)
            .with_reason(reason)
    }

    /// Creates a subscriber panic event.
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_service(subscriber)
            .with_reason(info)
    }

    /// True for events about subscriber workers themselves.
    #[inline]
    pub fn is_subscriber_health(&self) -> bool {
        matches!(
            self.kind,
            EventKind::SubscriberOverflow | EventKind::SubscriberPanicked
        )
    }
}

fn compact_ms(d: Duration) -> u32 {
    d.as_millis().min(u128::from(u32::MAX)) as u32
}

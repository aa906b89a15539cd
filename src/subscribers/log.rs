//! # LogWriter: events as structured `tracing` records
//!
//! Turns every [`Event`] into one `tracing` record under the `stackvisor::events`
//! target, with the service name and metadata as fields.
//!
//! ## Example output (compact fmt layer)
//! ```text
//!  INFO stackvisor::events: starting service="db" attempt=1
//!  WARN stackvisor::events: probe failed service="db" attempt=3 reason="unreachable: connection refused"
//!  INFO stackvisor::events: ready service="db" pid=4242
//!  WARN stackvisor::events: restart scheduled service="web" restart=1 delay_ms=500 reason="exited with code 1"
//! ERROR stackvisor::events: failed service="web" reason="exited with code 1"
//! ```

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let service = e.service.as_deref().unwrap_or("-");
        let reason = e.reason.as_deref().unwrap_or("");
        match e.kind {
            EventKind::ServiceStarting => {
                info!(target: "stackvisor::events", service, attempt = e.attempt, "starting");
            }
            EventKind::ProbeFailed => {
                warn!(target: "stackvisor::events", service, attempt = e.attempt, reason, "probe failed");
            }
            EventKind::ServiceReady => {
                info!(target: "stackvisor::events", service, pid = e.pid, "ready");
            }
            EventKind::ServiceExited => {
                warn!(target: "stackvisor::events", service, exit_code = e.exit_code, "exited");
            }
            EventKind::BackoffScheduled => {
                warn!(
                    target: "stackvisor::events",
                    service,
                    restart = e.attempt,
                    delay_ms = e.delay_ms,
                    reason,
                    "restart scheduled"
                );
            }
            EventKind::ServiceFailed => {
                error!(target: "stackvisor::events", service, reason, "failed");
            }
            EventKind::ServiceStopping => {
                info!(target: "stackvisor::events", service, "stopping");
            }
            EventKind::GraceExceeded => {
                warn!(target: "stackvisor::events", service, grace_ms = e.timeout_ms, "grace exceeded, killed");
            }
            EventKind::ServiceStopped => {
                info!(target: "stackvisor::events", service, reason, "stopped");
            }
            EventKind::StartupAborted => {
                error!(target: "stackvisor::events", service, reason, "startup aborted");
            }
            EventKind::ShutdownRequested => {
                info!(target: "stackvisor::events", "shutdown requested");
            }
            EventKind::TeardownComplete => {
                info!(target: "stackvisor::events", reason, "teardown complete");
            }
            EventKind::SubscriberOverflow | EventKind::SubscriberPanicked => {
                warn!(target: "stackvisor::events", subscriber = service, reason, "subscriber trouble");
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}

//! # ServiceSupervisor: lifecycle handle of one service.
//!
//! Owns the service's [`RuntimeState`] (a `watch` channel) and at most one running
//! [`ServiceActor`] task.
//!
//! ```text
//! start(parent) ──► state := Starting (fresh lifecycle)
//!                   spawn ServiceActor::run(parent.child_token())
//!                          └─ launch / probe / on_exit / backoff (writes state)
//!
//! stop() ──► cancel child token ──► actor: SIGTERM → grace → kill → Stopped
//!            join the task, report its teardown error
//!
//! disable_restarts() ──► cancel restart token ──► actor: no further relaunch;
//!                        a pending backoff or the next exit ends in Stopped
//! ```
//!
//! ## Rules
//! - `start()` never blocks; readiness is observed through [`ServiceSupervisor::subscribe`]
//!   or [`ServiceSupervisor::wait_settled`].
//! - `start()` while the actor is still running is a no-op.
//! - `stop()` is idempotent and leaves the service `Stopped` whatever its phase was.
//! - `disable_restarts()` leaves a live instance running; it only holds for the
//!   current lifecycle, the next `start()` restores restarts.
//! - A panicking actor is caught and leaves the service `Failed`.

use std::sync::Arc;

use futures::FutureExt;
use tokio::{sync::watch, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::{
    config::Config,
    core::actor::{ActorParams, ServiceActor, probe_once},
    core::state::{Phase, RuntimeState},
    error::{ProbeError, ServiceError},
    events::{Bus, Event, EventKind},
    launch::LauncherRef,
    probe::ProbeRef,
    services::ServiceSpec,
};

struct Running {
    cancel: CancellationToken,
    restarts: CancellationToken,
    join: JoinHandle<Result<(), ServiceError>>,
}

/// Supervises one service: start, readiness, restart policy and stop.
pub struct ServiceSupervisor {
    spec: Arc<ServiceSpec>,
    launcher: LauncherRef,
    probe: ProbeRef,
    params: ActorParams,
    bus: Bus,
    state: Arc<watch::Sender<RuntimeState>>,
    running: Option<Running>,
}

impl ServiceSupervisor {
    /// Creates a supervisor in `Pending`. Nothing runs until [`start`](Self::start).
    pub fn new(
        spec: Arc<ServiceSpec>,
        cfg: &Config,
        launcher: LauncherRef,
        probe: ProbeRef,
        bus: Bus,
    ) -> Self {
        let params = ActorParams::resolve(cfg, &spec);
        let (tx, _rx) = watch::channel(RuntimeState::pending());
        Self {
            spec,
            launcher,
            probe,
            params,
            bus,
            state: Arc::new(tx),
            running: None,
        }
    }

    pub fn name(&self) -> &str {
        self.spec.name()
    }

    pub fn spec(&self) -> &Arc<ServiceSpec> {
        &self.spec
    }

    /// Begins a lifecycle and returns immediately.
    ///
    /// The service is `Starting` when this returns. The lifecycle task runs on a
    /// child of `parent`, so cancelling `parent` stops it too.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&mut self, parent: &CancellationToken) {
        if self.is_running() {
            debug!(service = self.name(), "start ignored, already running");
            return;
        }
        self.running = None;

        self.state.send_modify(|st| {
            *st = RuntimeState::pending();
            st.enter(Phase::Starting);
        });

        let cancel = parent.child_token();
        let actor = ServiceActor::new(
            Arc::clone(&self.spec),
            Arc::clone(&self.launcher),
            Arc::clone(&self.probe),
            self.params.clone(),
            self.bus.clone(),
            Arc::clone(&self.state),
        );
        let state = Arc::clone(&self.state);
        let bus = self.bus.clone();
        let name = Arc::clone(&self.spec);
        let token = cancel.clone();
        let restarts = CancellationToken::new();
        let no_restart = restarts.clone();

        let join = tokio::spawn(async move {
            match std::panic::AssertUnwindSafe(actor.run(token, no_restart))
                .catch_unwind()
                .await
            {
                Ok(res) => res,
                Err(_panic) => {
                    let err = ServiceError::Panicked;
                    error!(service = name.name(), "service actor panicked");
                    state.send_modify(|st| {
                        st.last_error = Some(Arc::from(err.to_string()));
                        st.pid = None;
                        st.enter(Phase::Failed);
                    });
                    bus.publish(
                        Event::new(EventKind::ServiceFailed)
                            .with_service(name.name())
                            .with_reason(err.to_string()),
                    );
                    Err(err)
                }
            }
        });

        self.running = Some(Running {
            cancel,
            restarts,
            join,
        });
    }

    /// Suppresses relaunches for the current lifecycle without stopping the instance.
    ///
    /// A pending backoff is cancelled and the next exit moves the service to
    /// `Stopped` instead of scheduling a restart. No-op when nothing is running.
    pub fn disable_restarts(&self) {
        if let Some(r) = &self.running {
            r.restarts.cancel();
        }
    }

    /// One readiness check against the service, bounded by the probe timeout.
    ///
    /// The lifecycle task calls this every probe interval while `Starting`; calling it
    /// directly does not change the state.
    pub async fn probe(&self) -> Result<(), ProbeError> {
        probe_once(self.probe.as_ref(), self.params.probe_timeout).await
    }

    /// Stops the service: cancels any pending backoff, sends SIGTERM, waits up to the
    /// grace period, then kills. Always ends in `Stopped`.
    ///
    /// Returns the error of a failed termination; calling it again returns `Ok(())`.
    pub async fn stop(&mut self) -> Result<(), ServiceError> {
        let res = match self.running.take() {
            Some(Running { cancel, join, .. }) => {
                cancel.cancel();
                match join.await {
                    Ok(res) => res,
                    Err(e) => {
                        error!(service = self.name(), error = %e, "service task aborted");
                        Err(ServiceError::Panicked)
                    }
                }
            }
            None => Ok(()),
        };

        if self.state.borrow().phase != Phase::Stopped {
            self.state.send_modify(|st| {
                st.pid = None;
                st.enter(Phase::Stopped);
            });
            self.bus
                .publish(Event::new(EventKind::ServiceStopped).with_service(self.name()));
        }
        res
    }

    /// True while the lifecycle task has not finished (`Starting`/`Ready`, or backing off).
    pub fn is_running(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|r| !r.join.is_finished())
    }

    /// Current state snapshot. Never blocks on the lifecycle task.
    pub fn state(&self) -> RuntimeState {
        self.state.borrow().clone()
    }

    pub fn phase(&self) -> Phase {
        self.state.borrow().phase
    }

    /// Read-only view of the state that outlives borrows of the supervisor.
    pub fn subscribe(&self) -> watch::Receiver<RuntimeState> {
        self.state.subscribe()
    }

    /// Waits until the service is `Ready`, `Failed` or `Stopped` and returns that state.
    ///
    /// Waits forever on a supervisor that was never started.
    pub async fn wait_settled(&self) -> RuntimeState {
        let mut rx = self.state.subscribe();
        match rx.wait_for(|st| st.phase.is_settled()).await {
            Ok(st) => st.clone(),
            Err(_closed) => self.state(),
        }
    }
}

impl Drop for ServiceSupervisor {
    fn drop(&mut self) {
        if let Some(r) = &self.running {
            r.cancel.cancel();
        }
    }
}

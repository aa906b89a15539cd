//! # ServiceActor: the lifecycle task of one service.
//!
//! Owns the running [`Instance`] and is the only writer of the service's
//! [`RuntimeState`]. One actor runs per `start()`; `stop()` cancels its token.
//!
//! ## Event flow
//! ```text
//! ServiceStarting → launch → [probe every interval] → ServiceReady → [wait for exit]
//!                     │              │                                     │
//!                     │      ProbeFailed × probe_attempts                  │
//!                     ▼              ▼                                     ▼
//!                 launch error   probe exhausted                      ServiceExited
//!                     └──────────────┴──────────────► on_exit(code) ◄──────┘
//!                                                       ├─ BackoffScheduled → sleep → next attempt
//!                                                       └─ ServiceFailed (task ends)
//!
//! cancellation (any point) → ServiceStopping → SIGTERM → [grace] → GraceExceeded? → ServiceStopped
//! restarts disabled → no on_exit after the next failure, pending backoff ends → ServiceStopped
//! ```
//!
//! ## Rules
//! - Attempts run sequentially; at most one instance is alive per actor.
//! - Every suspension point (launch, probe, exit wait, backoff) is raced against
//!   the cancellation token. The reap of a failed attempt runs to completion; a stop
//!   seen after it goes straight to `Stopped` without consulting the restart policy.
//! - Once restarts are disabled no new attempt is launched.
//! - While a relaunch is pending the phase stays `Starting` with `last_error` set,
//!   so `Failed` is only ever observed once the restart budget is spent.

use std::sync::Arc;
use std::time::Duration;

use tokio::{select, sync::watch, time};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::{
    config::Config,
    core::state::{Phase, RuntimeState},
    error::{ProbeError, ServiceError},
    events::{Bus, Event, EventKind},
    launch::{Instance, LauncherRef},
    policies::{BackoffPolicy, RestartPolicy},
    probe::{Probe, ProbeRef},
    services::ServiceSpec,
};

/// Supervision parameters of one service, resolved from its spec and the global config.
#[derive(Clone, Debug)]
pub(crate) struct ActorParams {
    pub restart: RestartPolicy,
    pub backoff: BackoffPolicy,
    pub max_restarts: u32,
    pub probe_interval: Duration,
    pub probe_timeout: Duration,
    pub probe_attempts: u32,
    pub grace: Duration,
}

impl ActorParams {
    /// Spec overrides on top of the global defaults.
    pub(crate) fn resolve(cfg: &Config, spec: &ServiceSpec) -> Self {
        Self {
            restart: spec.restart(),
            backoff: cfg.backoff_for(spec),
            max_restarts: cfg.max_restarts_for(spec),
            probe_interval: cfg.probe_interval,
            probe_timeout: cfg.probe_timeout,
            probe_attempts: cfg.probe_attempts_clamped(),
            grace: cfg.grace_for(spec),
        }
    }
}

/// A single readiness check bounded by `timeout`.
pub(crate) async fn probe_once(probe: &dyn Probe, timeout: Duration) -> Result<(), ProbeError> {
    match time::timeout(timeout, probe.check()).await {
        Ok(res) => res,
        Err(_elapsed) => Err(ProbeError::Timeout { timeout }),
    }
}

/// How one launch attempt ended.
enum Outcome {
    /// The token was cancelled; the instance (if any) is still in `self.instance`.
    Cancelled,
    /// The attempt failed; feed it to the restart policy.
    Failed(ServiceError),
}

enum Step {
    Cancelled,
    Exited(Result<i32, ServiceError>),
    Probe,
}

pub(crate) struct ServiceActor {
    spec: Arc<ServiceSpec>,
    launcher: LauncherRef,
    probe: ProbeRef,
    params: ActorParams,
    bus: Bus,
    state: Arc<watch::Sender<RuntimeState>>,
    instance: Option<Box<dyn Instance>>,
}

impl ServiceActor {
    pub(crate) fn new(
        spec: Arc<ServiceSpec>,
        launcher: LauncherRef,
        probe: ProbeRef,
        params: ActorParams,
        bus: Bus,
        state: Arc<watch::Sender<RuntimeState>>,
    ) -> Self {
        Self {
            spec,
            launcher,
            probe,
            params,
            bus,
            state,
            instance: None,
        }
    }

    /// Runs the lifecycle until the service is `Failed` or the token is cancelled.
    ///
    /// Cancelling `restarts` lets the live instance run on but ends the lifecycle in
    /// `Stopped` at the next failure or pending backoff.
    ///
    /// Returns the teardown error of a cancelled run, if stopping the instance failed.
    pub(crate) async fn run(
        mut self,
        token: CancellationToken,
        restarts: CancellationToken,
    ) -> Result<(), ServiceError> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let err = match self.attempt(attempt, &token).await {
                Outcome::Cancelled => return self.shutdown().await,
                Outcome::Failed(err) => err,
            };

            if let Some(inst) = self.instance.take() {
                if let Err(e) = self.reap(inst).await {
                    warn!(service = self.name(), error = %e, "failed to reap instance");
                }
            }
            if token.is_cancelled() {
                return self.shutdown().await;
            }
            if restarts.is_cancelled() {
                debug!(service = self.name(), error = %err, "restarts disabled, not relaunching");
                self.update(|st| st.last_error = Some(Arc::from(err.to_string())));
                return self.shutdown().await;
            }

            let Some(delay) = self.on_exit(err) else {
                return Ok(());
            };
            select! {
                biased;
                _ = token.cancelled() => return self.shutdown().await,
                _ = restarts.cancelled() => {
                    debug!(service = self.name(), "restarts disabled, backoff dropped");
                    return self.shutdown().await;
                }
                _ = time::sleep(delay) => {}
            }
        }
    }

    fn name(&self) -> &str {
        self.spec.name()
    }

    fn update(&self, f: impl FnOnce(&mut RuntimeState)) {
        self.state.send_modify(f);
    }

    /// One launch: start the instance, probe it to `Ready`, then watch it until it exits.
    async fn attempt(&mut self, attempt: u32, token: &CancellationToken) -> Outcome {
        self.update(|st| {
            st.enter(Phase::Starting);
            st.pid = None;
        });
        self.bus.publish(
            Event::new(EventKind::ServiceStarting)
                .with_service(self.name())
                .with_attempt(attempt),
        );
        debug!(service = self.name(), attempt, launch = %self.spec.launch(), "launching");

        let launched = select! {
            res = self.launcher.launch(&self.spec) => res,
            _ = token.cancelled() => return Outcome::Cancelled,
        };
        let inst = match launched {
            Ok(inst) => inst,
            Err(e) => return Outcome::Failed(e),
        };
        let pid = inst.pid();
        self.instance = Some(inst);
        self.update(|st| st.pid = pid);

        if let Some(outcome) = self.await_ready(token).await {
            return outcome;
        }

        self.update(|st| {
            st.enter(Phase::Ready);
            st.last_error = None;
        });
        self.bus.publish(
            Event::new(EventKind::ServiceReady)
                .with_service(self.name())
                .with_attempt(attempt)
                .with_pid(pid),
        );
        debug!(service = self.name(), ?pid, "ready");

        let step = match self.instance.as_mut() {
            Some(inst) => select! {
                biased;
                _ = token.cancelled() => Step::Cancelled,
                res = inst.wait() => Step::Exited(res),
            },
            None => return Outcome::Failed(ServiceError::Exited { code: -1 }),
        };
        match step {
            Step::Exited(res) => Outcome::Failed(self.exited(res)),
            _ => Outcome::Cancelled,
        }
    }

    /// Probes until ready. `None` means ready; `Some` ends the attempt.
    async fn await_ready(&mut self, token: &CancellationToken) -> Option<Outcome> {
        let max_attempts = self.params.probe_attempts.max(1);
        let mut failures: u32 = 0;

        loop {
            let step = match self.instance.as_mut() {
                Some(inst) => select! {
                    biased;
                    _ = token.cancelled() => Step::Cancelled,
                    res = inst.wait() => Step::Exited(res),
                    _ = time::sleep(self.params.probe_interval) => Step::Probe,
                },
                None => return Some(Outcome::Failed(ServiceError::Exited { code: -1 })),
            };
            match step {
                Step::Cancelled => return Some(Outcome::Cancelled),
                Step::Exited(res) => return Some(Outcome::Failed(self.exited(res))),
                Step::Probe => {}
            }

            let res = select! {
                res = probe_once(self.probe.as_ref(), self.params.probe_timeout) => res,
                _ = token.cancelled() => return Some(Outcome::Cancelled),
            };
            let Err(e) = res else {
                return None;
            };

            failures += 1;
            warn!(service = self.name(), attempt = failures, error = %e, "probe failed");
            self.bus.publish(
                Event::new(EventKind::ProbeFailed)
                    .with_service(self.name())
                    .with_attempt(failures)
                    .with_reason(e.to_string()),
            );
            if failures >= max_attempts {
                return Some(Outcome::Failed(ServiceError::ProbeExhausted {
                    attempts: failures,
                    last: e.to_string(),
                }));
            }
        }
    }

    /// Records an unexpected exit of the live instance.
    fn exited(&mut self, res: Result<i32, ServiceError>) -> ServiceError {
        self.instance = None;
        self.update(|st| st.pid = None);
        match res {
            Ok(code) => {
                self.bus.publish(
                    Event::new(EventKind::ServiceExited)
                        .with_service(self.name())
                        .with_exit_code(code),
                );
                debug!(service = self.name(), code, "instance exited");
                ServiceError::Exited { code }
            }
            Err(e) => e,
        }
    }

    /// Applies the restart policy to a failed attempt.
    ///
    /// Returns the backoff delay when a relaunch is scheduled; otherwise moves the
    /// service to `Failed`.
    fn on_exit(&mut self, err: ServiceError) -> Option<Duration> {
        let code = err.exit_code();
        let reason: Arc<str> = Arc::from(err.to_string());
        let done = self.state.borrow().restart_count;

        if self.params.restart.allows_restart(code) && done < self.params.max_restarts {
            let delay = self.params.backoff.next(done);
            let restart = done + 1;
            self.update(|st| {
                st.restart_count = restart;
                st.last_error = Some(Arc::clone(&reason));
                st.pid = None;
                st.enter(Phase::Starting);
            });
            self.bus.publish(
                Event::new(EventKind::BackoffScheduled)
                    .with_service(self.name())
                    .with_attempt(restart)
                    .with_delay(delay)
                    .with_reason(Arc::clone(&reason)),
            );
            warn!(
                service = self.name(),
                restart,
                max = self.params.max_restarts,
                ?delay,
                error = %reason,
                "restart scheduled"
            );
            return Some(delay);
        }

        self.update(|st| {
            st.last_error = Some(Arc::clone(&reason));
            st.pid = None;
            st.enter(Phase::Failed);
        });
        self.bus.publish(
            Event::new(EventKind::ServiceFailed)
                .with_service(self.name())
                .with_exit_code(code)
                .with_reason(Arc::clone(&reason)),
        );
        error!(
            service = self.name(),
            restarts = done,
            policy = %self.params.restart,
            error = %reason,
            "service failed"
        );
        None
    }

    /// Stops the live instance (if any) and moves to `Stopped`.
    async fn shutdown(&mut self) -> Result<(), ServiceError> {
        let res = match self.instance.take() {
            Some(inst) => {
                self.bus
                    .publish(Event::new(EventKind::ServiceStopping).with_service(self.name()));
                self.reap(inst).await
            }
            None => Ok(()),
        };

        self.update(|st| {
            st.pid = None;
            st.enter(Phase::Stopped);
        });
        let mut ev = Event::new(EventKind::ServiceStopped).with_service(self.name());
        if let Err(e) = &res {
            ev = ev.with_reason(e.to_string());
        }
        self.bus.publish(ev);
        debug!(service = self.name(), "stopped");
        res
    }

    /// SIGTERM, wait up to the grace period, then force kill.
    async fn reap(&mut self, mut inst: Box<dyn Instance>) -> Result<(), ServiceError> {
        let grace = self.params.grace;
        if let Err(e) = inst.terminate() {
            warn!(service = self.name(), error = %e, "SIGTERM failed, killing");
            return inst.kill().await;
        }

        match time::timeout(grace, inst.wait()).await {
            Ok(Ok(code)) => {
                debug!(service = self.name(), code, "exited after SIGTERM");
                Ok(())
            }
            Ok(Err(e)) => {
                warn!(service = self.name(), error = %e, "wait after SIGTERM failed, killing");
                inst.kill().await.and(Err(e))
            }
            Err(_elapsed) => {
                warn!(service = self.name(), ?grace, "grace period exceeded, killing");
                self.bus.publish(
                    Event::new(EventKind::GraceExceeded)
                        .with_service(self.name())
                        .with_timeout(grace),
                );
                inst.kill().await
            }
        }
    }
}

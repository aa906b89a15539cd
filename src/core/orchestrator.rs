//! # Orchestrator: dependency-ordered startup, status and ordered teardown.
//!
//! The [`Orchestrator`] owns one [`ServiceSupervisor`] per declared service, the
//! event [`Bus`] and the subscriber fan-out.
//!
//! ## High-level architecture
//! ```text
//! Registry ──► resolve() ──► order = [db, prom, web]
//!
//! start_all():
//!   for name in order:
//!     supervisor[name].start(runtime_token)
//!     wait_settled()  ── Ready  → next
//!                     ── Failed → StartupAborted { name }   (earlier services keep running)
//!     shutdown_token cancelled  → Interrupted
//!
//! stop_all():
//!   for every supervisor: disable_restarts()            (no relaunch during teardown)
//!   for name in order.rev(): supervisor[name].stop()   (best effort)
//!   ──► TeardownErrors (empty = clean)
//!
//! Event flow:
//!   ServiceActor ── publish(Event) ──► Bus ──► listener ──► SubscriberSet::emit(&Event)
//!                                                            ├─► [queue S1] ─► worker S1
//!                                                            └─► [queue SN] ─► worker SN
//!
//! run():
//!   signal watcher (SIGINT/SIGTERM/SIGQUIT) ──► shutdown_token.cancel()
//!   start_all() ──► wait for shutdown_token ──► ShutdownRequested ──► stop_all()
//! ```
//!
//! ## Rules
//! - The orchestrator never writes a [`RuntimeState`]; it only starts, stops and reads.
//! - A service is started only after every service before it in the order is `Ready`,
//!   which covers all of its dependencies.
//! - After startup a `Failed` service shows up in [`status`](Orchestrator::status) but
//!   does not affect its siblings.
//! - Dropping the orchestrator cancels every lifecycle task.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tokio::{select, sync::watch, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    config::Config,
    core::{
        shutdown,
        state::{Phase, RuntimeState},
        supervisor::ServiceSupervisor,
    },
    error::{RuntimeError, SpecError, TeardownErrors},
    events::{Bus, Event, EventKind},
    services::{Registry, resolve},
    subscribers::SubscriberSet,
};

use super::builder::OrchestratorBuilder;

/// Drives a set of services through startup and teardown.
pub struct Orchestrator {
    cfg: Config,
    registry: Arc<Registry>,
    order: Vec<String>,
    supervisors: HashMap<String, ServiceSupervisor>,
    bus: Bus,
    subs: Option<Arc<SubscriberSet>>,
    listener: Option<JoinHandle<()>>,
    runtime_token: CancellationToken,
    shutdown_token: CancellationToken,
}

impl Orchestrator {
    /// Returns a builder for an orchestrator over `registry`.
    pub fn builder(cfg: Config, registry: Registry) -> OrchestratorBuilder {
        OrchestratorBuilder::new(cfg, registry)
    }

    pub(crate) fn new_internal(
        cfg: Config,
        registry: Arc<Registry>,
        order: Vec<String>,
        supervisors: HashMap<String, ServiceSupervisor>,
        bus: Bus,
        subs: Arc<SubscriberSet>,
        runtime_token: CancellationToken,
    ) -> Self {
        let listener = subscriber_listener(&bus, Arc::clone(&subs), runtime_token.clone());
        Self {
            cfg,
            registry,
            order,
            supervisors,
            bus,
            subs: Some(subs),
            listener: Some(listener),
            runtime_token,
            shutdown_token: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// The resolved start order.
    pub fn order(&self) -> &[String] {
        &self.order
    }

    /// Event bus; subscribe for a live feed of lifecycle events.
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Token that interrupts `start_all` and ends `run`. Cancel it to request shutdown.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    pub fn supervisor(&self, name: &str) -> Result<&ServiceSupervisor, SpecError> {
        self.supervisors.get(name).ok_or_else(|| SpecError::NotFound {
            name: name.to_string(),
        })
    }

    /// Starts every service in dependency order, waiting for each to become `Ready`
    /// before starting the next.
    ///
    /// # Errors
    /// - [`RuntimeError::Spec`] if the registry does not resolve (nothing is started).
    /// - [`RuntimeError::StartupAborted`] naming the first service that ended `Failed`;
    ///   services started before it keep running.
    /// - [`RuntimeError::Interrupted`] if the shutdown token is cancelled meanwhile.
    pub async fn start_all(&mut self) -> Result<(), RuntimeError> {
        self.order = resolve(&self.registry)?;
        info!(order = ?self.order, "starting services");

        for name in &self.order {
            if self.shutdown_token.is_cancelled() {
                return Err(RuntimeError::Interrupted);
            }
            let sup = self
                .supervisors
                .get_mut(name)
                .ok_or_else(|| SpecError::NotFound { name: name.clone() })?;

            sup.start(&self.runtime_token);
            let settled = select! {
                st = sup.wait_settled() => st,
                _ = self.shutdown_token.cancelled() => return Err(RuntimeError::Interrupted),
            };

            if settled.phase == Phase::Ready {
                debug!(service = %name, "ready, moving on");
                continue;
            }
            let reason = settled
                .last_error
                .as_deref()
                .unwrap_or("stopped during startup")
                .to_string();
            error!(service = %name, %reason, "startup aborted");
            self.bus.publish(
                Event::new(EventKind::StartupAborted)
                    .with_service(name.as_str())
                    .with_reason(reason.as_str()),
            );
            return Err(RuntimeError::StartupAborted {
                service: name.clone(),
                reason,
            });
        }

        info!(services = self.order.len(), "all services ready");
        Ok(())
    }

    /// Stops every service in reverse start order, whatever its phase.
    ///
    /// Restarts are disabled for all services before the first one is stopped, so a
    /// service that exits while waiting its turn is not relaunched. Keeps going past
    /// individual failures and reports them together.
    pub async fn stop_all(&mut self) -> Result<(), TeardownErrors> {
        let mut errors = TeardownErrors::default();
        self.disable_restarts();

        for name in self.order.iter().rev() {
            let Some(sup) = self.supervisors.get_mut(name) else {
                continue;
            };
            debug!(service = %name, phase = %sup.phase(), "stopping");
            if let Err(e) = sup.stop().await {
                warn!(service = %name, error = %e, "stop failed");
                errors.push(name.as_str(), e);
            }
        }

        let mut ev = Event::new(EventKind::TeardownComplete);
        if !errors.is_empty() {
            ev = ev.with_reason(errors.to_string());
        }
        self.bus.publish(ev);
        info!(failures = errors.len(), "teardown complete");
        errors.into_result()
    }

    /// Stops every supervisor from relaunching its service. Running instances are
    /// left alone.
    pub fn disable_restarts(&self) {
        for sup in self.supervisors.values() {
            sup.disable_restarts();
        }
    }

    /// Snapshot of every service's phase. Never blocks.
    pub fn status(&self) -> BTreeMap<String, Phase> {
        self.supervisors
            .iter()
            .map(|(name, sup)| (name.clone(), sup.phase()))
            .collect()
    }

    /// A detached, cloneable view of full runtime states in start order.
    pub fn status_board(&self) -> StatusBoard {
        let entries = self
            .order
            .iter()
            .filter_map(|name| {
                self.supervisors
                    .get(name)
                    .map(|sup| (name.clone(), sup.subscribe()))
            })
            .collect();
        StatusBoard { entries }
    }

    /// Runs the stack in the foreground.
    ///
    /// Starts all services, then waits for SIGINT/SIGTERM/SIGQUIT (or the shutdown
    /// token) and stops all of them. A failed startup tears down what was started
    /// and returns the startup error.
    pub async fn run(&mut self) -> Result<(), RuntimeError> {
        let watcher = signal_watcher(self.shutdown_token.clone());

        if let Err(e) = self.start_all().await {
            if self.shutdown_token.is_cancelled() {
                self.bus.publish(Event::new(EventKind::ShutdownRequested));
            }
            if let Err(teardown) = self.stop_all().await {
                warn!(error = %teardown, "teardown after failed startup had errors");
            }
            watcher.abort();
            return Err(e);
        }

        self.shutdown_token.cancelled().await;
        self.bus.publish(Event::new(EventKind::ShutdownRequested));
        info!("shutdown requested, stopping services");

        let res = self.stop_all().await;
        watcher.abort();
        res.map_err(RuntimeError::from)
    }

    /// Cancels all lifecycle tasks and waits for subscribers to drain queued events.
    pub async fn close(mut self) {
        self.runtime_token.cancel();
        if let Some(listener) = self.listener.take() {
            let _ = listener.await;
        }
        if let Some(subs) = self.subs.take() {
            match Arc::try_unwrap(subs) {
                Ok(set) => set.shutdown().await,
                Err(_shared) => debug!("subscriber set still shared, not draining"),
            }
        }
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        self.runtime_token.cancel();
    }
}

/// Read-only view over every service's [`RuntimeState`], in start order.
///
/// Reading never blocks on, or interferes with, the lifecycle tasks.
#[derive(Clone)]
pub struct StatusBoard {
    entries: Vec<(String, watch::Receiver<RuntimeState>)>,
}

impl StatusBoard {
    /// Full state per service.
    pub fn snapshot(&self) -> Vec<(String, RuntimeState)> {
        self.entries
            .iter()
            .map(|(name, rx)| (name.clone(), rx.borrow().clone()))
            .collect()
    }

    /// Phase per service.
    pub fn phases(&self) -> BTreeMap<String, Phase> {
        self.entries
            .iter()
            .map(|(name, rx)| (name.clone(), rx.borrow().phase))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Forwards bus events to the subscriber set until the runtime token is cancelled,
/// then drains what is already queued.
fn subscriber_listener(
    bus: &Bus,
    set: Arc<SubscriberSet>,
    token: CancellationToken,
) -> JoinHandle<()> {
    use tokio::sync::broadcast::error::RecvError;

    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            select! {
                biased;
                msg = rx.recv() => match msg {
                    Ok(ev) => set.emit(&ev),
                    Err(RecvError::Lagged(missed)) => {
                        warn!(missed, "subscriber listener lagged behind the bus");
                    }
                    Err(RecvError::Closed) => break,
                },
                _ = token.cancelled() => {
                    while let Ok(ev) = rx.try_recv() {
                        set.emit(&ev);
                    }
                    break;
                }
            }
        }
    })
}

fn signal_watcher(token: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        match shutdown::wait_for_shutdown_signal().await {
            Ok(signal) => {
                info!(signal, "received shutdown signal");
                token.cancel();
            }
            Err(e) => warn!(error = %e, "cannot listen for shutdown signals"),
        }
    })
}

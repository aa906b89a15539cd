use std::collections::HashMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::{
    config::Config,
    error::SpecError,
    events::Bus,
    launch::{CommandLauncher, LauncherRef},
    probe::{self, ProbeRef},
    services::{Registry, resolve},
    subscribers::{Subscribe, SubscriberSet},
};

use super::{orchestrator::Orchestrator, supervisor::ServiceSupervisor};

/// Builder for an [`Orchestrator`].
pub struct OrchestratorBuilder {
    cfg: Config,
    registry: Registry,
    subscribers: Vec<Arc<dyn Subscribe>>,
    launcher: Option<LauncherRef>,
    probes: HashMap<String, ProbeRef>,
}

impl OrchestratorBuilder {
    /// Creates a new builder with the given configuration and services.
    pub fn new(cfg: Config, registry: Registry) -> Self {
        Self {
            cfg,
            registry,
            subscribers: Vec::new(),
            launcher: None,
            probes: HashMap::new(),
        }
    }

    /// Sets event subscribers.
    ///
    /// Subscribers receive lifecycle events through dedicated workers with bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Replaces the default [`CommandLauncher`].
    pub fn with_launcher(mut self, launcher: LauncherRef) -> Self {
        self.launcher = Some(launcher);
        self
    }

    /// Overrides the readiness probe of one service (instead of its declared check).
    pub fn with_probe(mut self, service: impl Into<String>, probe: ProbeRef) -> Self {
        self.probes.insert(service.into(), probe);
        self
    }

    /// Validates the registry, resolves the start order and creates one supervisor
    /// per service, all `Pending`.
    ///
    /// Must be called from within a Tokio runtime (subscriber workers are spawned here).
    ///
    /// # Errors
    /// Any structural [`SpecError`]: unknown dependency, cycle, or a probe override
    /// for an unregistered service.
    pub fn build(self) -> Result<Orchestrator, SpecError> {
        let order = resolve(&self.registry)?;
        if let Some(name) = self.probes.keys().find(|n| !self.registry.contains(n)) {
            return Err(SpecError::NotFound { name: name.clone() });
        }

        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let subs = Arc::new(SubscriberSet::new(self.subscribers, bus.clone()));
        let runtime_token = CancellationToken::new();
        let launcher = self
            .launcher
            .unwrap_or_else(|| Arc::new(CommandLauncher::default()));

        let mut probes = self.probes;
        let supervisors = self
            .registry
            .iter()
            .map(|spec| {
                let probe = probes
                    .remove(spec.name())
                    .unwrap_or_else(|| probe::from_check(spec.readiness()));
                let sup = ServiceSupervisor::new(
                    Arc::clone(spec),
                    &self.cfg,
                    Arc::clone(&launcher),
                    probe,
                    bus.clone(),
                );
                (spec.name().to_string(), sup)
            })
            .collect();

        Ok(Orchestrator::new_internal(
            self.cfg,
            Arc::new(self.registry),
            order,
            supervisors,
            bus,
            subs,
            runtime_token,
        ))
    }
}

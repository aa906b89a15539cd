//! # Service registry.
//!
//! [`Registry`] maps names to [`ServiceSpec`]s. It is populated once, validated with
//! [`Registry::validate`], and then shared read-only (`Arc<Registry>`) by the
//! resolver and the orchestrator.
//!
//! ## Rules
//! - Names are unique; a second `register` with the same name fails.
//! - Dependencies are checked by `validate`, after all registrations, so services
//!   may be registered in any order.
//! - Iteration is in name order (`BTreeMap`), which keeps every consumer deterministic.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::SpecError;
use crate::services::spec::ServiceSpec;

/// Name → spec mapping.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    services: BTreeMap<String, Arc<ServiceSpec>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds and validates a registry in one go.
    pub fn from_specs(specs: impl IntoIterator<Item = ServiceSpec>) -> Result<Self, SpecError> {
        let mut registry = Self::new();
        for spec in specs {
            registry.register(spec)?;
        }
        registry.validate()?;
        Ok(registry)
    }

    /// Adds a spec; fails with [`SpecError::DuplicateName`] if the name is taken.
    pub fn register(&mut self, spec: ServiceSpec) -> Result<(), SpecError> {
        if self.services.contains_key(spec.name()) {
            return Err(SpecError::DuplicateName {
                name: spec.name().to_string(),
            });
        }
        self.services
            .insert(spec.name().to_string(), Arc::new(spec));
        Ok(())
    }

    /// Checks that every `depends_on` entry names a registered service.
    ///
    /// Reports the first offender in name order.
    pub fn validate(&self) -> Result<(), SpecError> {
        for spec in self.services.values() {
            if let Some(dep) = spec
                .depends_on()
                .iter()
                .find(|d| !self.services.contains_key(d.as_str()))
            {
                return Err(SpecError::UnknownDependency {
                    service: spec.name().to_string(),
                    dependency: dep.clone(),
                });
            }
        }
        Ok(())
    }

    /// Looks a spec up by name.
    pub fn get(&self, name: &str) -> Result<&Arc<ServiceSpec>, SpecError> {
        self.services.get(name).ok_or_else(|| SpecError::NotFound {
            name: name.to_string(),
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.services.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.services.keys().cloned().collect()
    }

    /// Specs in name order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<ServiceSpec>> {
        self.services.values()
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

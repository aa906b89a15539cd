//! # Dependency resolver.
//!
//! Computes the start order of a [`Registry`] with Kahn's algorithm. Among the
//! services whose dependencies are all placed, the lexicographically smallest name
//! goes first, so the order is a pure function of the registry.
//!
//! ```text
//! indegree(s) = |s.depends_on|
//! ready       = { s | indegree(s) = 0 }      (ordered set)
//! while ready ≠ ∅:
//!     s = pop_min(ready); order.push(s)
//!     for d in dependents(s): indegree(d) -= 1; if 0 → ready.insert(d)
//! leftover nodes ⇒ CyclicDependency
//! ```
//!
//! On a cycle the leftover set also contains services that merely depend on the
//! cycle; those are peeled off (repeatedly dropping leftovers no other leftover
//! depends on) so the error names the cycle members only.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::SpecError;
use crate::services::registry::Registry;

/// Returns the start order of `registry`: each service after all its dependencies.
///
/// Fails with [`SpecError::CyclicDependency`] (never a partial order) if the graph
/// has a cycle, and with [`SpecError::UnknownDependency`] if the registry was not
/// validated.
///
/// # Example
/// ```
/// use stackvisor::{LaunchTarget, Registry, ServiceSpec, resolve};
///
/// let reg = Registry::from_specs([
///     ServiceSpec::new("a", LaunchTarget::image("a")),
///     ServiceSpec::new("c", LaunchTarget::image("c")).with_depends_on(["a"]),
///     ServiceSpec::new("b", LaunchTarget::image("b")).with_depends_on(["a"]),
/// ]).unwrap();
///
/// assert_eq!(resolve(&reg).unwrap(), ["a", "b", "c"]);
/// ```
pub fn resolve(registry: &Registry) -> Result<Vec<String>, SpecError> {
    registry.validate()?;

    let mut indegree: BTreeMap<&str, usize> = BTreeMap::new();
    let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();

    for spec in registry.iter() {
        indegree.insert(spec.name(), spec.depends_on().len());
        for dep in spec.depends_on() {
            dependents
                .entry(dep.as_str())
                .or_default()
                .push(spec.name());
        }
    }

    let mut ready: BTreeSet<&str> = indegree
        .iter()
        .filter(|(_, d)| **d == 0)
        .map(|(n, _)| *n)
        .collect();
    let mut order = Vec::with_capacity(indegree.len());

    while let Some(name) = ready.pop_first() {
        order.push(name.to_string());
        for dependent in dependents.get(name).into_iter().flatten() {
            if let Some(d) = indegree.get_mut(dependent) {
                *d -= 1;
                if *d == 0 {
                    ready.insert(*dependent);
                }
            }
        }
    }

    if order.len() == indegree.len() {
        return Ok(order);
    }

    let leftover: BTreeSet<&str> = indegree
        .into_iter()
        .filter(|(_, d)| *d > 0)
        .map(|(n, _)| n)
        .collect();
    Err(SpecError::CyclicDependency {
        members: cycle_members(registry, leftover),
    })
}

/// Peels off leftover services that no other leftover depends on; what remains
/// lies on a cycle (or between cycles).
fn cycle_members(registry: &Registry, mut leftover: BTreeSet<&str>) -> Vec<String> {
    loop {
        let needed: BTreeSet<&str> = leftover
            .iter()
            .filter_map(|n| registry.get(n).ok())
            .flat_map(|spec| spec.depends_on().iter().map(String::as_str))
            .filter(|d| leftover.contains(d))
            .collect();

        let before = leftover.len();
        leftover.retain(|n| needed.contains(n));
        if leftover.len() == before {
            break;
        }
    }
    leftover.into_iter().map(str::to_string).collect()
}

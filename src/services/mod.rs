//! # Service declarations, registry and dependency resolution.
//!
//! - [`ServiceSpec`] immutable declaration of one service (launch target, ports,
//!   env, volumes, dependencies, restart/backoff/readiness settings)
//! - [`Registry`] validated name → spec mapping, read-only after construction
//! - [`resolve`] deterministic topological start order

mod registry;
mod resolver;
mod spec;

pub use registry::Registry;
pub use resolver::resolve;
pub use spec::{LaunchTarget, PortMapping, Protocol, ReadinessCheck, ServiceSpec, VolumeMount};

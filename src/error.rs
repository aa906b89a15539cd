//! Error types used by the stackvisor runtime, its services and probes.
//!
//! This module defines the error enums of the orchestrator:
//!
//! - [`SpecError`] structural problems in the declared service set (fail fast, before any launch).
//! - [`ServiceError`] failures of one supervised service instance (handled by the restart policy).
//! - [`ProbeError`] a single failed readiness check.
//! - [`RuntimeError`] errors surfaced by the [`Orchestrator`](crate::Orchestrator) itself.
//! - [`TeardownErrors`] the aggregated, best-effort report of `stop_all`.
//! - [`ManifestError`] problems loading a TOML manifest.
//!
//! All of them provide `as_label` (short snake_case label for logs/metrics).

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// # Structural errors of the declared service set.
///
/// Raised by the [`Registry`](crate::Registry) and the dependency resolver.
/// None of them can happen once the orchestrator has been built.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SpecError {
    /// A service with the same name was already registered.
    #[error("service '{name}' is already registered")]
    DuplicateName {
        /// The offending service name.
        name: String,
    },

    /// `depends_on` references a name that is not registered.
    #[error("service '{service}' depends on unknown service '{dependency}'")]
    UnknownDependency {
        /// Service declaring the dependency.
        service: String,
        /// The missing dependency.
        dependency: String,
    },

    /// Lookup of an unregistered service.
    #[error("service '{name}' not found")]
    NotFound {
        /// The requested name.
        name: String,
    },

    /// The dependency graph contains at least one cycle.
    #[error("dependency cycle between services: {}", members.join(", "))]
    CyclicDependency {
        /// Names of the services on the cycle(s), sorted.
        members: Vec<String>,
    },
}

impl SpecError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use stackvisor::SpecError;
    ///
    /// let err = SpecError::NotFound { name: "db".into() };
    /// assert_eq!(err.as_label(), "spec_not_found");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            SpecError::DuplicateName { .. } => "spec_duplicate_name",
            SpecError::UnknownDependency { .. } => "spec_unknown_dependency",
            SpecError::NotFound { .. } => "spec_not_found",
            SpecError::CyclicDependency { .. } => "spec_cyclic_dependency",
        }
    }
}

/// # Errors produced while supervising one service.
///
/// Every variant except [`ServiceError::Signal`] (raised by `stop`) is fed into the
/// restart policy; once attempts are exhausted the error text ends up in
/// [`RuntimeState::last_error`](crate::RuntimeState::last_error).
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// The instance could not be launched at all.
    #[error("launch failed: {reason}")]
    Launch {
        /// Underlying error message.
        reason: String,
    },

    /// Delivering a termination signal (or force kill) failed.
    #[error("signal delivery failed: {reason}")]
    Signal {
        /// Underlying error message.
        reason: String,
    },

    /// Waiting for the instance to exit failed.
    #[error("wait failed: {reason}")]
    Wait {
        /// Underlying error message.
        reason: String,
    },

    /// The readiness probe failed too many times in a row.
    #[error("not ready after {attempts} probe attempts: {last}")]
    ProbeExhausted {
        /// Number of consecutive failed probes.
        attempts: u32,
        /// Last probe failure.
        last: String,
    },

    /// The instance exited.
    #[error("exited with code {code}")]
    Exited {
        /// Exit code (`128 + signal` when terminated by a signal).
        code: i32,
    },

    /// The supervising task panicked.
    #[error("supervisor task panicked")]
    Panicked,
}

impl ServiceError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ServiceError::Launch { .. } => "service_launch_failed",
            ServiceError::Signal { .. } => "service_signal_failed",
            ServiceError::Wait { .. } => "service_wait_failed",
            ServiceError::ProbeExhausted { .. } => "service_probe_exhausted",
            ServiceError::Exited { .. } => "service_exited",
            ServiceError::Panicked => "service_panicked",
        }
    }

    /// Exit code used to evaluate the restart policy.
    ///
    /// Failures that are not process exits count as a non-zero exit (`-1`).
    pub fn exit_code(&self) -> i32 {
        match self {
            ServiceError::Exited { code } => *code,
            _ => -1,
        }
    }
}

/// # A single failed readiness check.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    /// The check did not complete within the probe timeout.
    #[error("probe timed out after {timeout:?}")]
    Timeout {
        /// The configured per-probe timeout.
        timeout: Duration,
    },

    /// The target could not be reached (connection refused, DNS, ...).
    #[error("unreachable: {reason}")]
    Unreachable {
        /// Underlying error message.
        reason: String,
    },

    /// The target answered but reported itself unhealthy.
    #[error("unhealthy: {reason}")]
    Unhealthy {
        /// Status or body summary.
        reason: String,
    },
}

impl ProbeError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ProbeError::Timeout { .. } => "probe_timeout",
            ProbeError::Unreachable { .. } => "probe_unreachable",
            ProbeError::Unhealthy { .. } => "probe_unhealthy",
        }
    }
}

/// # Aggregated failures of a best-effort teardown.
///
/// `stop_all` keeps going past individual `stop` errors; this collects them in
/// teardown order.
#[derive(Error, Debug, Default, Clone, PartialEq, Eq)]
pub struct TeardownErrors {
    /// `(service name, error)` in the order the services were stopped.
    pub failures: Vec<(String, ServiceError)>,
}

impl TeardownErrors {
    /// True if every service stopped cleanly.
    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    /// Number of services that failed to stop cleanly.
    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub(crate) fn push(&mut self, service: impl Into<String>, err: ServiceError) {
        self.failures.push((service.into(), err));
    }

    /// Converts an empty report into `Ok(())`.
    pub fn into_result(self) -> Result<(), TeardownErrors> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl fmt::Display for TeardownErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} service(s) failed to stop cleanly", self.failures.len())?;
        for (name, err) in &self.failures {
            write!(f, "; {name}: {err}")?;
        }
        Ok(())
    }
}

/// # Errors surfaced by the orchestrator.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Structural problem found before anything was launched.
    #[error(transparent)]
    Spec(#[from] SpecError),

    /// A service reached `Failed` during `start_all`; later services were not started.
    #[error("startup aborted: service '{service}' failed: {reason}")]
    StartupAborted {
        /// The service that failed.
        service: String,
        /// Its last error.
        reason: String,
    },

    /// `start_all` was interrupted by a shutdown request.
    #[error("startup interrupted by shutdown request")]
    Interrupted,

    /// Teardown completed with errors.
    #[error(transparent)]
    Teardown(#[from] TeardownErrors),
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use stackvisor::RuntimeError;
    ///
    /// let err = RuntimeError::StartupAborted { service: "db".into(), reason: "boom".into() };
    /// assert_eq!(err.as_label(), "runtime_startup_aborted");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::Spec(e) => e.as_label(),
            RuntimeError::StartupAborted { .. } => "runtime_startup_aborted",
            RuntimeError::Interrupted => "runtime_interrupted",
            RuntimeError::Teardown(_) => "runtime_teardown_errors",
        }
    }
}

/// # Errors loading a manifest.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ManifestError {
    /// The manifest file could not be read.
    #[error("cannot read manifest {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML is malformed or has unknown/mistyped keys.
    #[error("invalid manifest: {0}")]
    Parse(#[from] toml::de::Error),

    /// A `ports` entry does not parse.
    #[error("service '{service}': invalid port '{value}': {reason}")]
    InvalidPort {
        service: String,
        value: String,
        reason: String,
    },

    /// A `volumes` entry does not parse.
    #[error("service '{service}': invalid volume '{value}': {reason}")]
    InvalidVolume {
        service: String,
        value: String,
        reason: String,
    },

    /// Neither or both of `image` and `command`, or an empty command.
    #[error("service '{service}': {reason}")]
    InvalidLaunch { service: String, reason: String },

    /// The declared services do not form a valid registry.
    #[error(transparent)]
    Spec(#[from] SpecError),
}

impl ManifestError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ManifestError::Io { .. } => "manifest_io",
            ManifestError::Parse(_) => "manifest_parse",
            ManifestError::InvalidPort { .. } => "manifest_invalid_port",
            ManifestError::InvalidVolume { .. } => "manifest_invalid_volume",
            ManifestError::InvalidLaunch { .. } => "manifest_invalid_launch",
            ManifestError::Spec(e) => e.as_label(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_message_lists_members() {
        let err = SpecError::CyclicDependency {
            members: vec!["a".into(), "b".into()],
        };
        assert_eq!(err.to_string(), "dependency cycle between services: a, b");
    }

    #[test]
    fn non_exit_failures_count_as_non_zero() {
        assert_eq!(ServiceError::Exited { code: 0 }.exit_code(), 0);
        assert_eq!(ServiceError::Exited { code: 3 }.exit_code(), 3);
        let probe = ServiceError::ProbeExhausted {
            attempts: 3,
            last: "refused".into(),
        };
        assert_eq!(probe.exit_code(), -1);
    }

    #[test]
    fn teardown_report_lists_every_failure() {
        let mut errs = TeardownErrors::default();
        assert!(errs.clone().into_result().is_ok());

        errs.push("db", ServiceError::Signal { reason: "EPERM".into() });
        errs.push("web", ServiceError::Panicked);
        assert_eq!(errs.len(), 2);
        assert_eq!(
            errs.to_string(),
            "2 service(s) failed to stop cleanly; db: signal delivery failed: EPERM; web: supervisor task panicked"
        );
    }
}

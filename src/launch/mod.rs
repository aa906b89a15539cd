//! # Launchers and running instances.
//!
//! The seam between a service actor and whatever it actually runs:
//!
//! ```text
//! ServiceActor ──► Launcher::launch(&ServiceSpec) ──► Box<dyn Instance>
//!                                                      ├─ wait()      exit code
//!                                                      ├─ terminate() SIGTERM
//!                                                      └─ kill()      force
//! ```
//!
//! [`CommandLauncher`] is the default: `LaunchTarget::Command` becomes a child
//! process, `LaunchTarget::Image` becomes a foreground `docker run` (or any
//! compatible CLI such as `podman`).

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ServiceError;
use crate::services::ServiceSpec;

mod process;

pub use process::{CommandLauncher, ProcessInstance};

/// Starts instances of services.
#[async_trait]
pub trait Launcher: Send + Sync + 'static {
    /// Launches one instance of `spec`. Returns once the instance exists; readiness
    /// is checked separately.
    async fn launch(&self, spec: &ServiceSpec) -> Result<Box<dyn Instance>, ServiceError>;
}

/// Shared launcher handle.
pub type LauncherRef = Arc<dyn Launcher>;

/// One running instance of a service.
#[async_trait]
pub trait Instance: Send + 'static {
    /// OS process id, if the instance is a process.
    fn pid(&self) -> Option<u32>;

    /// Waits for the instance to exit and returns its exit code
    /// (`128 + signal` when killed by a signal).
    ///
    /// Must be cancel safe: the actor races it against probes and cancellation.
    async fn wait(&mut self) -> Result<i32, ServiceError>;

    /// Requests graceful termination (SIGTERM on unix). Does not wait.
    fn terminate(&mut self) -> Result<(), ServiceError>;

    /// Forces termination and waits until the instance is gone.
    async fn kill(&mut self) -> Result<(), ServiceError>;
}

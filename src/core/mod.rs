//! Runtime core: per-service lifecycle and orchestration.
//!
//! Public API: [`Orchestrator`] (with [`OrchestratorBuilder`]), [`ServiceSupervisor`],
//! and the state types [`Phase`] / [`RuntimeState`].
//!
//! Internal modules:
//! - [`actor`]: the lifecycle task of one service (launch, probe, restart policy, backoff);
//! - [`supervisor`]: start/stop handle around one actor, owner of its state;
//! - [`orchestrator`]: ordered startup, status, ordered teardown;
//! - [`shutdown`]: OS signal handling.

mod actor;
mod builder;
mod orchestrator;
mod shutdown;
mod state;
mod supervisor;

pub use builder::OrchestratorBuilder;
pub use orchestrator::{Orchestrator, StatusBoard};
pub use shutdown::wait_for_shutdown_signal;
pub use state::{Phase, RuntimeState};
pub use supervisor::ServiceSupervisor;

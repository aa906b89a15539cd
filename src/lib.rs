//! # stackvisor
//!
//! **Stackvisor** runs a fixed set of interdependent long-running services on one
//! host: it starts them in dependency order, waits for each to be ready before
//! starting its dependents, restarts failed services under a policy, and tears the
//! whole stack down in reverse order.
//!
//! ## Architecture
//! ```text
//!   Manifest (TOML) ──► Registry ──► resolve() ──► start order
//!                                                     │
//! ┌───────────────────────────────────────────────────▼───────────────┐
//! │  Orchestrator                                                     │
//! │  - start_all / stop_all / status / run                            │
//! │  - Bus (broadcast events) + SubscriberSet (per-subscriber queues) │
//! └──────┬──────────────────────┬──────────────────────┬──────────────┘
//!        ▼                      ▼                      ▼
//! ┌─────────────────┐    ┌─────────────────┐    ┌─────────────────┐
//! │ServiceSupervisor│    │ServiceSupervisor│    │ServiceSupervisor│
//! │ RuntimeState    │    │ RuntimeState    │    │ RuntimeState    │
//! │ (watch channel) │    │ (watch channel) │    │ (watch channel) │
//! └──────┬──────────┘    └──────┬──────────┘    └──────┬──────────┘
//!        ▼                      ▼                      ▼
//!   ServiceActor           ServiceActor           ServiceActor
//!   launch → probe → Ready → wait exit → on_exit → backoff → launch ...
//!        │
//!        ├─► Launcher::launch ──► Instance (child process / `docker run`)
//!        └─► Probe::check     ──► none / tcp / http
//! ```
//!
//! ### Lifecycle of one service
//! ```text
//! Pending ─start()─► Starting ─probe ok─► Ready ─exit─┐
//!                       │  ▲                          │
//!                       │  └── restart allowed ◄──────┤
//!                       └── probe exhausted ──────────┤
//!                                                     └─► Failed (budget spent)
//! any ─stop()─► Stopped
//! ```
//!
//! ## Example
//! ```no_run
//! use std::sync::Arc;
//! use stackvisor::{
//!     Config, LaunchTarget, LogWriter, Orchestrator, ReadinessCheck, Registry, ServiceSpec,
//!     Subscribe,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let registry = Registry::from_specs([
//!         ServiceSpec::new("db", LaunchTarget::image("timescale/timescaledb:2.9.1-pg14"))
//!             .with_port("5432:5432".parse().unwrap())
//!             .with_readiness(ReadinessCheck::Tcp("127.0.0.1:5432".into())),
//!         ServiceSpec::new("web", LaunchTarget::command("./demo", ["--port", "8080"]))
//!             .with_depends_on(["db"]),
//!     ])?;
//!
//!     let log: Arc<dyn Subscribe> = Arc::new(LogWriter::new());
//!     let mut orch = Orchestrator::builder(Config::default(), registry)
//!         .with_subscribers(vec![log])
//!         .build()?;
//!
//!     orch.run().await?;
//!     Ok(())
//! }
//! ```

mod config;
mod core;
mod error;
mod policies;
mod services;

pub mod events;
pub mod launch;
pub mod manifest;
pub mod probe;
pub mod status_file;
pub mod subscribers;

// ---- Public re-exports ----

pub use config::{Config, ConfigSettings};
pub use core::{
    Orchestrator, OrchestratorBuilder, Phase, RuntimeState, ServiceSupervisor, StatusBoard,
    wait_for_shutdown_signal,
};
pub use error::{ManifestError, ProbeError, RuntimeError, ServiceError, SpecError, TeardownErrors};
pub use events::{Bus, Event, EventKind};
pub use launch::{CommandLauncher, Instance, Launcher, LauncherRef};
pub use manifest::Manifest;
pub use policies::{BackoffPolicy, BackoffSettings, JitterPolicy, RestartPolicy};
pub use probe::{Probe, ProbeRef};
pub use services::{
    LaunchTarget, PortMapping, Protocol, ReadinessCheck, Registry, ServiceSpec, VolumeMount,
    resolve,
};
pub use subscribers::{LogWriter, Subscribe, SubscriberSet};

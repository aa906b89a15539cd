//! Runtime events: types and broadcast bus.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `ServiceActor` (lifecycle), `Orchestrator` (startup abort,
//!   shutdown, teardown), `SubscriberSet` workers (overflow/panic).
//! - **Consumers**: the orchestrator's listener (fans out to `SubscriberSet`) and the
//!   status-file writer.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};

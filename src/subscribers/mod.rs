//! # Event subscribers
//!
//! [`Subscribe`] is the hook for reacting to runtime events; [`SubscriberSet`] fans
//! events out to many subscribers through per-subscriber bounded queues.
//!
//! ```text
//! ServiceActor ── publish(Event) ──► Bus ──► orchestrator listener ──► SubscriberSet::emit
//!                                                                      ├──► LogWriter
//!                                                                      └──► custom ...
//! ```
//!
//! Built-in: [`LogWriter`] (structured `tracing` output).

mod log;
mod set;
mod subscribe;

pub use log::LogWriter;
pub use set::SubscriberSet;
pub use subscribe::Subscribe;

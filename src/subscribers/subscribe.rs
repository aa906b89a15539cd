//! # Core subscriber trait
//!
//! `Subscribe` is the extension point for plugging custom event handlers into the
//! orchestrator. Each subscriber is driven by a dedicated worker loop fed by a bounded
//! queue owned by the [`SubscriberSet`](crate::SubscriberSet).
//!
//! ## Contract
//! - Implementations may be slow (I/O, batching); they block neither the publisher
//!   nor other subscribers.
//! - On queue overflow, events for that subscriber are **dropped** and a
//!   `SubscriberOverflow` event is published.
//!
//! ## Example
//! ```rust
//! use stackvisor::{Event, EventKind, Subscribe};
//!
//! struct FailureCounter(std::sync::atomic::AtomicUsize);
//!
//! #[async_trait::async_trait]
//! impl Subscribe for FailureCounter {
//!     async fn on_event(&self, ev: &Event) {
//!         if ev.kind == EventKind::ServiceFailed {
//!             self.0.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
//!         }
//!     }
//!     fn name(&self) -> &'static str { "failure-counter" }
//! }
//! ```

use async_trait::async_trait;

use crate::events::Event;

/// Contract for event subscribers.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Handle a single event.
    async fn on_event(&self, event: &Event);

    /// Human-readable name (for logs).
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Preferred capacity of this subscriber's queue.
    fn queue_capacity(&self) -> usize {
        1024
    }
}

//! # Event bus for broadcasting runtime events.
//!
//! [`Bus`] is a thin wrapper around [`tokio::sync::broadcast`]. Service actors and the
//! orchestrator publish; the orchestrator's listener fans events out to the
//! [`SubscriberSet`](crate::SubscriberSet), and the status-file writer keeps its own
//! receiver.
//!
//! ```text
//!   Actor db  ──┐
//!   Actor web ──┼──► Bus ──► listener ──► SubscriberSet ──► LogWriter, ...
//!   Orchestr. ──┘     └────► status file writer
//! ```
//!
//! ## Rules
//! - `publish()` never blocks.
//! - Bounded ring buffer shared by all receivers; slow receivers get
//!   `RecvError::Lagged(n)` and skip the `n` oldest events.
//! - Events published while nobody listens are dropped.

use tokio::sync::broadcast;

use super::event::Event;

/// Broadcast channel for runtime events. Cheap to clone.
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a new bus; capacity is clamped to at least 1.
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel::<Event>(capacity.max(1));
        Self { tx }
    }

    /// Publishes an event to all current receivers.
    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// Creates an independent receiver for events sent from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;

    #[tokio::test]
    async fn receivers_only_see_later_events() {
        let bus = Bus::new(0);
        bus.publish(Event::new(EventKind::ShutdownRequested));

        let mut rx = bus.subscribe();
        bus.publish(Event::new(EventKind::TeardownComplete));

        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.kind, EventKind::TeardownComplete);
    }
}

//! Typed broadcast event bus.
//!
//! Each component owns an [`EventBus`] for its own event enum and hands
//! out [`Subscription`]s. Dropping (or calling
//! [`Subscription::unsubscribe`] on) a subscription detaches it; there is
//! no registry of callbacks to null out on teardown.
//!
//! Emitting never blocks and never fails: with no subscribers the event
//! is simply discarded. A subscriber that falls more than `capacity`
//! events behind skips the oldest ones and logs how many it lost.

use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tracing::warn;

const DEFAULT_CAPACITY: usize = 256;

/// Broadcast-based event bus for one component's events.
#[derive(Debug, Clone)]
pub struct EventBus<T> {
    tx: broadcast::Sender<T>,
}

impl<T: Clone + Send + 'static> EventBus<T> {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Broadcast an event to all subscribers. Returns the number of receivers.
    pub fn emit(&self, event: T) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    /// Subscribe to events emitted from now on.
    pub fn subscribe(&self) -> Subscription<T> {
        Subscription {
            rx: self.tx.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl<T: Clone + Send + 'static> Default for EventBus<T> {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// A handle receiving events from an [`EventBus`].
#[derive(Debug)]
pub struct Subscription<T> {
    rx: broadcast::Receiver<T>,
}

impl<T: Clone + Send + 'static> Subscription<T> {
    /// Wait for the next event. `None` once every bus handle is dropped.
    pub async fn recv(&mut self) -> Option<T> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(missed)) => {
                    warn!(missed, "event subscriber lagged, oldest events dropped");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// The next already-emitted event, if any.
    pub fn try_recv(&mut self) -> Option<T> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(TryRecvError::Lagged(missed)) => {
                    warn!(missed, "event subscriber lagged, oldest events dropped");
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => return None,
            }
        }
    }

    /// Every already-emitted event, oldest first.
    pub fn drain(&mut self) -> Vec<T> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }

    /// Detach from the bus.
    pub fn unsubscribe(self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    enum Ping {
        A,
        B(u32),
    }

    #[tokio::test]
    async fn test_emit_delivers_to_every_subscriber() {
        let bus = EventBus::default();
        let mut s1 = bus.subscribe();
        let mut s2 = bus.subscribe();

        assert_eq!(bus.emit(Ping::B(7)), 2);
        assert_eq!(s1.recv().await, Some(Ping::B(7)));
        assert_eq!(s2.recv().await, Some(Ping::B(7)));
    }

    #[test]
    fn test_emit_without_subscribers_returns_zero() {
        let bus: EventBus<Ping> = EventBus::default();
        assert_eq!(bus.emit(Ping::A), 0);
    }

    #[test]
    fn test_unsubscribe_detaches_receiver() {
        let bus = EventBus::default();
        let sub = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);
        sub.unsubscribe();
        assert_eq!(bus.subscriber_count(), 0);
        assert_eq!(bus.emit(Ping::A), 0);
    }

    #[test]
    fn test_drain_skips_lagged_events() {
        let bus = EventBus::new(2);
        let mut sub = bus.subscribe();
        for n in 0..5 {
            bus.emit(Ping::B(n));
        }
        assert_eq!(sub.drain(), vec![Ping::B(3), Ping::B(4)]);
        assert!(sub.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_recv_after_bus_dropped_returns_none() {
        let bus: EventBus<Ping> = EventBus::default();
        let mut sub = bus.subscribe();
        drop(bus);
        assert_eq!(sub.recv().await, None);
    }
}

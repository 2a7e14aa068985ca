//! Broadcast channel for domain events and store change notifications.
//!
//! [`EventBus`] wraps a [`tokio::sync::broadcast`] channel. The service layer
//! publishes a [`super::MarketEvent`] after every committed mutation, and
//! record stores publish a [`crate::store::StoreChange`] per written record.

use tokio::sync::broadcast;

use super::MarketEvent;

/// Broadcast bus for cloneable events. Defaults to [`MarketEvent`].
///
/// Backed by a `tokio::broadcast` channel with a configurable capacity.
/// When the ring buffer is full, the oldest events are dropped for lagging
/// receivers.
#[derive(Debug)]
pub struct EventBus<E = MarketEvent> {
    sender: broadcast::Sender<E>,
}

impl<E> Clone for EventBus<E> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl<E: Clone> EventBus<E> {
    /// Creates a new `EventBus` with the given channel capacity.
    ///
    /// A capacity of zero is raised to one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of receivers that received the event.
    /// If there are no active receivers, the event is silently dropped.
    pub fn publish(&self, event: E) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    /// Creates a new receiver that will receive all future events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<E> {
        self.sender.subscribe()
    }

    /// Returns the current number of active receivers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::JobId;
    use crate::store::StoreChange;
    use chrono::Utc;

    #[test]
    fn events_without_listeners_are_dropped() {
        let bus: EventBus = EventBus::new(8);
        let delivered = bus.publish(MarketEvent::JobPaid {
            job_id: JobId::new(),
            timestamp: Utc::now(),
        });
        assert_eq!(delivered, 0);
    }

    #[tokio::test]
    async fn clones_share_one_channel() {
        let bus: EventBus<StoreChange> = EventBus::new(8);
        let publisher = bus.clone();
        let mut first = bus.subscribe();
        let mut second = publisher.subscribe();

        let job_id = JobId::new();
        assert_eq!(publisher.publish(StoreChange::Job(job_id)), 2);

        for rx in [&mut first, &mut second] {
            let Ok(change) = rx.recv().await else {
                panic!("change delivered");
            };
            assert_eq!(change.job_id(), job_id);
        }
    }

    #[tokio::test]
    async fn slow_receiver_sees_lag() {
        let bus: EventBus<u32> = EventBus::new(0);
        let mut rx = bus.subscribe();
        bus.publish(1);
        bus.publish(2);

        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Lagged(1))
        ));
        assert!(matches!(rx.recv().await, Ok(2)));
    }

    #[test]
    fn receiver_count_tracks_subscribers() {
        let bus: EventBus<u32> = EventBus::new(4);
        let rx = bus.subscribe();
        assert_eq!(bus.receiver_count(), 1);
        drop(rx);
        assert_eq!(bus.receiver_count(), 0);
    }
}

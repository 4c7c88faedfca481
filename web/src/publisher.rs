//! Fan-out of committed [`LotEvent`]s to WebSocket subscribers.

use lotkeeper_core::{EventPublisher, LotEvent, PublishError};
use tokio::sync::broadcast;

/// [`EventPublisher`] backed by a `tokio` broadcast channel.
///
/// Publishing never blocks. Subscribers that fall more than the channel
/// capacity behind skip the events they missed.
#[derive(Clone, Debug)]
pub struct BroadcastPublisher {
    sender: broadcast::Sender<LotEvent>,
}

impl BroadcastPublisher {
    /// Creates a channel holding up to `capacity` undelivered events per subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// A new subscription, receiving events published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<LotEvent> {
        self.sender.subscribe()
    }

    /// Connected subscribers.
    #[must_use]
    pub fn subscribers(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl EventPublisher for BroadcastPublisher {
    fn publish(&self, event: LotEvent) -> Result<(), PublishError> {
        let name = event.name();
        if self.sender.send(event).is_err() {
            // No subscribers; nothing to deliver.
            tracing::trace!(event = name, "No event subscribers");
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use lotkeeper_core::{OccupancyState, ReservationClass, Space, SpaceId, SpaceLabel};

    fn event() -> LotEvent {
        LotEvent::SpaceUpdated(Space {
            id: SpaceId::new(1),
            label: SpaceLabel::numbered(1, 2),
            state: OccupancyState::Occupied,
            class: ReservationClass::Open,
        })
    }

    #[tokio::test]
    async fn delivers_to_every_subscriber() {
        let publisher = BroadcastPublisher::new(8);
        let mut first = publisher.subscribe();
        let mut second = publisher.subscribe();
        assert_eq!(publisher.subscribers(), 2);

        publisher.publish(event()).unwrap();
        assert_eq!(first.recv().await.unwrap(), event());
        assert_eq!(second.recv().await.unwrap(), event());
    }

    #[test]
    fn publishing_without_subscribers_succeeds() {
        let publisher = BroadcastPublisher::new(8);
        assert!(publisher.publish(event()).is_ok());
    }
}

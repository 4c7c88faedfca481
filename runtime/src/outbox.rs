//! Commit-then-publish.
//!
//! Events leave the process only after their transaction committed, exactly
//! once, and in the order the commits happened. The commit-order mutex is held
//! across the commit and the publish calls, so two operations can never
//! interleave their events.

use crate::metrics;
use lotkeeper_core::{EventPublisher, LotEvent, LotTransaction, StoreError};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Commits transactions and publishes their events in commit order.
#[derive(Clone)]
pub struct EventOutbox {
    publisher: Arc<dyn EventPublisher>,
    order: Arc<Mutex<()>>,
}

impl EventOutbox {
    /// Creates an outbox publishing through `publisher`.
    #[must_use]
    pub fn new(publisher: Arc<dyn EventPublisher>) -> Self {
        Self {
            publisher,
            order: Arc::new(Mutex::new(())),
        }
    }

    /// Commits `tx`, then publishes `events` in order.
    ///
    /// Publisher failures are logged and counted; the change is committed
    /// regardless.
    ///
    /// # Errors
    ///
    /// Returns the commit failure. Nothing is published then.
    pub async fn commit(
        &self,
        tx: Box<dyn LotTransaction>,
        events: Vec<LotEvent>,
    ) -> Result<(), StoreError> {
        let _order = self.order.lock().await;
        tx.commit().await?;

        for event in events {
            let name = event.name();
            if let Err(error) = self.publisher.publish(event) {
                tracing::warn!(event = name, error = %error, "Failed to publish committed event");
                metrics::record_publish_failure(name);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use lotkeeper_core::{LotStore, ReservationClass};
    use lotkeeper_testing::{InMemoryLotStore, RecordingPublisher, StoreOp};

    async fn claim_event(store: &InMemoryLotStore) -> (Box<dyn LotTransaction>, LotEvent) {
        let mut tx = store.begin().await.unwrap();
        let space = tx
            .claim_free_space(ReservationClass::Open)
            .await
            .unwrap()
            .unwrap();
        (tx, LotEvent::SpaceUpdated(space))
    }

    #[tokio::test]
    async fn publishes_after_commit_in_order() {
        let store = InMemoryLotStore::with_spaces(2, 0);
        let publisher = Arc::new(RecordingPublisher::new());
        let outbox = EventOutbox::new(publisher.clone());

        let (tx, event) = claim_event(&store).await;
        outbox.commit(tx, vec![event.clone(), event]).await.unwrap();

        assert_eq!(publisher.names(), ["space_updated", "space_updated"]);
    }

    #[tokio::test]
    async fn failed_commit_publishes_nothing() {
        let store = InMemoryLotStore::with_spaces(1, 0);
        let publisher = Arc::new(RecordingPublisher::new());
        let outbox = EventOutbox::new(publisher.clone());

        store.fail_next(StoreOp::Commit);
        let (tx, event) = claim_event(&store).await;
        assert!(outbox.commit(tx, vec![event]).await.is_err());

        assert!(publisher.events().is_empty());
        assert_eq!(store.occupancy().await.unwrap().open_occupied, 0);
    }

    #[tokio::test]
    async fn publisher_failure_does_not_fail_commit() {
        let store = InMemoryLotStore::with_spaces(1, 0);
        let publisher = Arc::new(RecordingPublisher::refusing());
        let outbox = EventOutbox::new(publisher.clone());

        let (tx, event) = claim_event(&store).await;
        outbox.commit(tx, vec![event]).await.unwrap();

        assert_eq!(store.occupancy().await.unwrap().open_occupied, 1);
    }
}

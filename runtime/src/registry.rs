//! Space registry: the only code that flips a space between Free and Occupied.
//!
//! Claims are serialized per reservation class. A caller first takes the
//! class's [`ClassPermit`] and only then may call
//! [`SpaceRegistry::find_and_claim`], which demands the permit by reference.
//! The store claims the row atomically as well, so a second process sharing
//! the database cannot double-book either.

use lotkeeper_core::{
    LotError, LotStore, LotTransaction, OccupancyState, ReservationClass, Space, SpaceFilter,
    SpaceId, SpaceRelease, StoreError,
};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Exclusive claim rights for one reservation class.
///
/// Released on drop.
#[derive(Debug)]
pub struct ClassPermit {
    class: ReservationClass,
    _guard: OwnedMutexGuard<()>,
}

impl ClassPermit {
    /// The class this permit covers.
    #[must_use]
    pub const fn class(&self) -> ReservationClass {
        self.class
    }
}

/// Claims, frees and reads spaces.
#[derive(Clone)]
pub struct SpaceRegistry {
    store: Arc<dyn LotStore>,
    reserved: Arc<Mutex<()>>,
    open: Arc<Mutex<()>>,
}

impl SpaceRegistry {
    /// Creates a registry over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn LotStore>) -> Self {
        Self {
            store,
            reserved: Arc::new(Mutex::new(())),
            open: Arc::new(Mutex::new(())),
        }
    }

    /// Waits for the claim permit of `class`.
    pub async fn permit(&self, class: ReservationClass) -> ClassPermit {
        let lock = match class {
            ReservationClass::Reserved => &self.reserved,
            ReservationClass::Open => &self.open,
        };
        ClassPermit {
            class,
            _guard: Arc::clone(lock).lock_owned().await,
        }
    }

    /// Takes both permits, Reserved first, as the class override needs.
    pub async fn permit_all(&self) -> [ClassPermit; 2] {
        let reserved = self.permit(ReservationClass::Reserved).await;
        let open = self.permit(ReservationClass::Open).await;
        [reserved, open]
    }

    /// Claims the Free space of the permit's class with the lowest label.
    ///
    /// Returns `None` when the class has no Free space. The claim becomes
    /// visible only when `tx` commits.
    ///
    /// # Errors
    ///
    /// Store failures; `tx` must then be dropped.
    pub async fn find_and_claim(
        &self,
        tx: &mut dyn LotTransaction,
        permit: &ClassPermit,
    ) -> Result<Option<Space>, StoreError> {
        let claimed = tx.claim_free_space(permit.class()).await?;
        match &claimed {
            Some(space) => tracing::debug!(
                space_id = %space.id,
                label = %space.label,
                class = %permit.class(),
                "Claimed space"
            ),
            None => tracing::debug!(class = %permit.class(), "No free space in class"),
        }
        Ok(claimed)
    }

    /// Sets a space Free. Idempotent; `None` when the space does not exist.
    ///
    /// # Errors
    ///
    /// Store failures; `tx` must then be dropped.
    pub async fn release(
        &self,
        tx: &mut dyn LotTransaction,
        id: SpaceId,
    ) -> Result<Option<SpaceRelease>, StoreError> {
        let release = tx.release_space(id).await?;
        if let Some(release) = &release {
            tracing::debug!(space_id = %id, changed = release.changed, "Released space");
        }
        Ok(release)
    }

    /// Looks up a space.
    ///
    /// # Errors
    ///
    /// [`LotError::SpaceNotFound`] or a store failure.
    pub async fn get(&self, id: SpaceId) -> Result<Space, LotError> {
        self.store
            .space(id)
            .await?
            .ok_or(LotError::SpaceNotFound(id))
    }

    /// Spaces matching `filter`, by label.
    ///
    /// # Errors
    ///
    /// Store failures.
    pub async fn list(&self, filter: SpaceFilter) -> Result<Vec<Space>, LotError> {
        Ok(self.store.spaces(filter).await?)
    }

    /// Spaces in `state`, by label.
    ///
    /// # Errors
    ///
    /// Store failures.
    pub async fn list_by_state(&self, state: OccupancyState) -> Result<Vec<Space>, LotError> {
        self.list(SpaceFilter::by_state(state)).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use lotkeeper_testing::InMemoryLotStore;
    use std::time::Duration;

    #[tokio::test]
    async fn permits_are_exclusive_per_class() {
        let registry = SpaceRegistry::new(Arc::new(InMemoryLotStore::new()));
        let open = registry.permit(ReservationClass::Open).await;

        // The other class is unaffected.
        let reserved = registry.permit(ReservationClass::Reserved).await;
        assert_eq!(reserved.class(), ReservationClass::Reserved);

        let second = tokio::time::timeout(
            Duration::from_millis(50),
            registry.permit(ReservationClass::Open),
        )
        .await;
        assert!(second.is_err(), "open permit must still be held");

        drop(open);
        let again = registry.permit(ReservationClass::Open).await;
        assert_eq!(again.class(), ReservationClass::Open);
    }

    #[tokio::test]
    async fn claim_then_release_round_trips_state() {
        let store = InMemoryLotStore::with_spaces(2, 1);
        let registry = SpaceRegistry::new(Arc::new(store.clone()));

        let permit = registry.permit(ReservationClass::Open).await;
        let mut tx = store.begin().await.unwrap();
        let space = registry
            .find_and_claim(tx.as_mut(), &permit)
            .await
            .unwrap()
            .unwrap();
        tx.commit().await.unwrap();
        drop(permit);

        assert_eq!(space.label.as_str(), "02");
        let occupied = registry.list_by_state(OccupancyState::Occupied).await.unwrap();
        assert_eq!(occupied, vec![space.clone()]);

        let mut tx = store.begin().await.unwrap();
        let release = registry.release(tx.as_mut(), space.id).await.unwrap().unwrap();
        tx.commit().await.unwrap();
        assert!(release.changed);
        assert!(registry.get(space.id).await.unwrap().is_free());
    }

    #[tokio::test]
    async fn listing_is_ordered_by_label() {
        let store = InMemoryLotStore::with_layout(&[
            ("B2", ReservationClass::Open),
            ("A1", ReservationClass::Open),
            ("A10", ReservationClass::Reserved),
        ]);
        let registry = SpaceRegistry::new(Arc::new(store));
        let labels: Vec<String> = registry
            .list(SpaceFilter::all())
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.label.to_string())
            .collect();
        assert_eq!(labels, ["A1", "A10", "B2"]);
        assert!(matches!(
            registry.get(SpaceId::new(99)).await,
            Err(LotError::SpaceNotFound(_))
        ));
    }
}

//! Administrative path: pool shape, reservation holders, staff incidents.
//!
//! This is the only place that creates spaces, changes a space's reservation
//! class, maintains the holder directory, and opens or resolves `Manual` and
//! `SensorFault` incidents. Pool changes finish with a monitor reconcile,
//! since adding or reclassifying an open space can fill or unfill the lot.

use crate::incidents::IncidentMonitor;
use crate::outbox::EventOutbox;
use crate::registry::SpaceRegistry;
use lotkeeper_core::environment::Clock;
use lotkeeper_core::{
    HolderKey, Incident, IncidentFilter, IncidentId, IncidentKind, LotError, LotEvent, LotStore,
    NewIncident, ReservationClass, ReservationHolder, Space, SpaceId, SpaceLabel, StoreError,
};
use std::sync::Arc;

/// Administrative operations.
#[derive(Clone)]
pub struct LotAdmin {
    store: Arc<dyn LotStore>,
    registry: SpaceRegistry,
    outbox: EventOutbox,
    monitor: IncidentMonitor,
    clock: Arc<dyn Clock>,
}

impl LotAdmin {
    /// Creates the admin path.
    #[must_use]
    pub fn new(
        store: Arc<dyn LotStore>,
        registry: SpaceRegistry,
        outbox: EventOutbox,
        monitor: IncidentMonitor,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            registry,
            outbox,
            monitor,
            clock,
        }
    }

    // ------------------------------------------------------------------
    // Spaces
    // ------------------------------------------------------------------

    /// Adds a Free space.
    ///
    /// # Errors
    ///
    /// [`LotError::InvalidLabel`], [`LotError::DuplicateLabel`] or a store failure.
    #[tracing::instrument(skip(self))]
    pub async fn create_space(
        &self,
        label: &str,
        class: ReservationClass,
    ) -> Result<Space, LotError> {
        let label = SpaceLabel::parse(label)?;
        let mut tx = self.store.begin().await?;
        let space = tx
            .insert_space(label.clone(), class)
            .await
            .map_err(|error| match error {
                StoreError::Conflict(_) => LotError::DuplicateLabel(label.to_string()),
                other => LotError::Store(other),
            })?;
        self.outbox
            .commit(tx, vec![LotEvent::SpaceUpdated(space.clone())])
            .await?;

        tracing::info!(space_id = %space.id, "Space created");
        self.monitor.reconcile().await;
        Ok(space)
    }

    /// Changes a space's reservation class.
    ///
    /// Holds both class permits so no claim runs against a half-moved pool.
    /// Setting the current class is a no-op. Only Free spaces move; an active
    /// assignment must match the class of its space.
    ///
    /// # Errors
    ///
    /// [`LotError::SpaceNotFound`], [`LotError::SpaceOccupied`] or a store failure.
    #[tracing::instrument(skip(self))]
    pub async fn set_reservation_class(
        &self,
        id: SpaceId,
        class: ReservationClass,
    ) -> Result<Space, LotError> {
        let permits = self.registry.permit_all().await;
        let mut tx = self.store.begin().await?;
        let current = tx.space(id).await?.ok_or(LotError::SpaceNotFound(id))?;
        if current.class == class {
            return Ok(current);
        }
        if !current.is_free() {
            return Err(LotError::SpaceOccupied(id));
        }

        let updated = tx
            .set_space_class(id, class)
            .await
            .map_err(|error| match error {
                StoreError::Conflict(_) => LotError::SpaceOccupied(id),
                other => LotError::Store(other),
            })?
            .ok_or(LotError::SpaceNotFound(id))?;
        self.outbox
            .commit(tx, vec![LotEvent::SpaceUpdated(updated.clone())])
            .await?;
        drop(permits);

        tracing::info!(from = %current.class, to = %class, "Reservation class changed");
        self.monitor.reconcile().await;
        Ok(updated)
    }

    // ------------------------------------------------------------------
    // Reservation holders
    // ------------------------------------------------------------------

    /// Registers a reservation holder.
    ///
    /// # Errors
    ///
    /// [`LotError::InvalidHolderName`], [`LotError::DuplicateHolder`] or a store failure.
    pub async fn register_holder(
        &self,
        key: HolderKey,
        name: &str,
    ) -> Result<ReservationHolder, LotError> {
        let holder = ReservationHolder::new(key, name)?;
        let mut tx = self.store.begin().await?;
        let holder = tx.insert_holder(holder).await.map_err(|error| match error {
            StoreError::Conflict(_) => LotError::DuplicateHolder(key),
            other => LotError::Store(other),
        })?;
        tx.commit().await?;
        tracing::info!(holder = %key, "Reservation holder registered");
        Ok(holder)
    }

    /// Renames a reservation holder.
    ///
    /// # Errors
    ///
    /// [`LotError::InvalidHolderName`], [`LotError::HolderNotFound`] or a store failure.
    pub async fn rename_holder(
        &self,
        key: HolderKey,
        name: &str,
    ) -> Result<ReservationHolder, LotError> {
        let validated = ReservationHolder::new(key, name)?;
        let mut tx = self.store.begin().await?;
        let holder = tx
            .rename_holder(key, validated.name)
            .await?
            .ok_or(LotError::HolderNotFound(key))?;
        tx.commit().await?;
        Ok(holder)
    }

    /// Removes a reservation holder. Past assignments keep the key.
    ///
    /// # Errors
    ///
    /// [`LotError::HolderNotFound`] or a store failure.
    pub async fn remove_holder(&self, key: HolderKey) -> Result<ReservationHolder, LotError> {
        let mut tx = self.store.begin().await?;
        let holder = tx
            .delete_holder(key)
            .await?
            .ok_or(LotError::HolderNotFound(key))?;
        tx.commit().await?;
        tracing::info!(holder = %key, "Reservation holder removed");
        Ok(holder)
    }

    /// Looks up a reservation holder.
    ///
    /// # Errors
    ///
    /// [`LotError::HolderNotFound`] or a store failure.
    pub async fn holder(&self, key: HolderKey) -> Result<ReservationHolder, LotError> {
        self.store
            .holder(key)
            .await?
            .ok_or(LotError::HolderNotFound(key))
    }

    /// Every reservation holder, by key.
    ///
    /// # Errors
    ///
    /// Store failures.
    pub async fn holders(&self) -> Result<Vec<ReservationHolder>, LotError> {
        Ok(self.store.holders().await?)
    }

    // ------------------------------------------------------------------
    // Incidents
    // ------------------------------------------------------------------

    /// Logs a staff-reported incident.
    ///
    /// # Errors
    ///
    /// - [`LotError::SystemManagedIncident`] for `LotFull` and `RequestRejected`
    /// - [`LotError::SpaceNotFound`] if `space_id` does not exist
    /// - a store failure
    #[tracing::instrument(skip(self, note))]
    pub async fn report_incident(
        &self,
        kind: IncidentKind,
        space_id: Option<SpaceId>,
        note: Option<String>,
    ) -> Result<Incident, LotError> {
        if kind.is_system_managed() {
            return Err(LotError::SystemManagedIncident(kind));
        }
        let mut tx = self.store.begin().await?;
        if let Some(id) = space_id {
            tx.space(id).await?.ok_or(LotError::SpaceNotFound(id))?;
        }
        let incident = tx
            .insert_incident(NewIncident {
                kind,
                space_id,
                opened_at: self.clock.now(),
                resolved_at: None,
                note,
            })
            .await?;
        self.outbox
            .commit(tx, vec![LotEvent::IncidentOpened(incident.clone())])
            .await?;
        tracing::info!(incident_id = %incident.id, "Incident reported");
        Ok(incident)
    }

    /// Resolves a staff-reported incident, replacing its note when one is given.
    ///
    /// # Errors
    ///
    /// - [`LotError::IncidentNotFound`]
    /// - [`LotError::SystemManagedIncident`] for `LotFull` and `RequestRejected`
    /// - [`LotError::IncidentAlreadyResolved`]
    /// - a store failure
    #[tracing::instrument(skip(self, note))]
    pub async fn resolve_incident(
        &self,
        id: IncidentId,
        note: Option<String>,
    ) -> Result<Incident, LotError> {
        let mut tx = self.store.begin().await?;
        let incident = tx.incident(id).await?.ok_or(LotError::IncidentNotFound(id))?;
        if incident.kind.is_system_managed() {
            return Err(LotError::SystemManagedIncident(incident.kind));
        }
        let resolved = tx
            .resolve_incident(id, self.clock.now(), note)
            .await?
            .ok_or(LotError::IncidentAlreadyResolved(id))?;
        self.outbox
            .commit(tx, vec![LotEvent::IncidentResolved(resolved.clone())])
            .await?;
        tracing::info!("Incident resolved");
        Ok(resolved)
    }

    /// Looks up an incident.
    ///
    /// # Errors
    ///
    /// [`LotError::IncidentNotFound`] or a store failure.
    pub async fn incident(&self, id: IncidentId) -> Result<Incident, LotError> {
        self.store
            .incident(id)
            .await?
            .ok_or(LotError::IncidentNotFound(id))
    }

    /// Incidents matching `filter`, oldest first.
    ///
    /// # Errors
    ///
    /// Store failures.
    pub async fn incidents(&self, filter: IncidentFilter) -> Result<Vec<Incident>, LotError> {
        Ok(self.store.incidents(filter).await?)
    }
}

//! Allocation engine: claims spaces for requests and gives them back.
//!
//! Each operation is one store transaction. A claim flips the space and
//! inserts the assignment together; a release closes the assignment and frees
//! the space together. Any failure before the commit drops the transaction,
//! which rolls both halves back.
//!
//! Incident bookkeeping runs afterwards, once the class permit is released.

use crate::incidents::IncidentMonitor;
use crate::metrics;
use crate::outbox::EventOutbox;
use crate::registry::SpaceRegistry;
use lotkeeper_core::environment::Clock;
use lotkeeper_core::{
    Assignment, AssignmentId, AssignmentRequest, LotError, LotEvent, LotStore, LotTransaction,
    NewAssignment, Space, SpaceId,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

/// Result of releasing an assignment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "assignment", rename_all = "snake_case")]
pub enum ReleaseOutcome {
    /// The assignment was active and is now closed.
    Released(Assignment),
    /// The assignment had been released before; nothing changed.
    AlreadyReleased(Assignment),
}

impl ReleaseOutcome {
    /// The assignment as stored after the call.
    #[must_use]
    pub const fn assignment(&self) -> &Assignment {
        match self {
            Self::Released(assignment) | Self::AlreadyReleased(assignment) => assignment,
        }
    }

    /// Whether this call did the release.
    #[must_use]
    pub const fn is_released(&self) -> bool {
        matches!(self, Self::Released(_))
    }
}

/// Claims and releases spaces.
#[derive(Clone)]
pub struct AllocationEngine {
    store: Arc<dyn LotStore>,
    registry: SpaceRegistry,
    outbox: EventOutbox,
    monitor: IncidentMonitor,
    clock: Arc<dyn Clock>,
}

impl AllocationEngine {
    /// Creates an engine.
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

    /// Claims the lowest-labelled free space of the request's class.
    ///
    /// Open requests draw from the open pool only, reserved requests from the
    /// reserved pool only. A rejection records one `RequestRejected` incident.
    ///
    /// # Errors
    ///
    /// - [`LotError::UnknownHolder`] if a reserved request names an unregistered holder
    /// - [`LotError::NoFreeSpace`] if the class is exhausted
    /// - [`LotError::Store`] on a store failure; nothing was claimed
    #[tracing::instrument(skip(self), fields(class = %request.class()))]
    pub async fn request_assignment(
        &self,
        request: AssignmentRequest,
    ) -> Result<Assignment, LotError> {
        let started = Instant::now();
        let result = self.claim(request).await;
        metrics::record_allocation_duration(started.elapsed());

        match &result {
            Ok(assignment) => {
                metrics::record_assignment_created(request.class());
                tracing::info!(
                    assignment_id = %assignment.id,
                    space_id = %assignment.space_id,
                    "Space assigned"
                );
                self.monitor.on_space_claimed().await;
            }
            Err(error) => {
                if let Some(reason) = error.rejection() {
                    metrics::record_rejection(reason);
                    tracing::warn!(reason = %reason, "Request rejected");
                    self.monitor.on_rejected(request, reason).await;
                } else {
                    tracing::error!(error = %error, "Assignment failed");
                }
            }
        }
        result
    }

    async fn claim(&self, request: AssignmentRequest) -> Result<Assignment, LotError> {
        let class = request.class();
        let permit = self.registry.permit(class).await;
        let mut tx = self.store.begin().await?;

        if let Some(holder) = request.holder() {
            if tx.holder(holder).await?.is_none() {
                return Err(LotError::UnknownHolder(holder));
            }
        }

        let Some(space) = self.registry.find_and_claim(tx.as_mut(), &permit).await? else {
            return Err(LotError::NoFreeSpace { class });
        };

        let assignment = tx
            .insert_assignment(NewAssignment {
                space_id: space.id,
                holder: request.holder(),
                assigned_at: self.clock.now(),
            })
            .await?;

        self.outbox
            .commit(
                tx,
                vec![
                    LotEvent::SpaceUpdated(space),
                    LotEvent::AssignmentCreated(assignment.clone()),
                ],
            )
            .await?;
        drop(permit);
        Ok(assignment)
    }

    /// Gives an assignment's space back.
    ///
    /// Releasing twice is harmless: the second call returns
    /// [`ReleaseOutcome::AlreadyReleased`] and publishes nothing.
    ///
    /// # Errors
    ///
    /// - [`LotError::AssignmentNotFound`] for an unknown id
    /// - [`LotError::Store`] on a store failure; nothing changed
    #[tracing::instrument(skip(self))]
    pub async fn release_assignment(&self, id: AssignmentId) -> Result<ReleaseOutcome, LotError> {
        let mut tx = self.store.begin().await?;
        let assignment = tx
            .assignment(id)
            .await?
            .ok_or(LotError::AssignmentNotFound(id))?;
        if !assignment.is_active() {
            tracing::debug!("Assignment already released");
            return Ok(ReleaseOutcome::AlreadyReleased(assignment));
        }

        let mut events = Vec::with_capacity(2);
        let Some(closed) = self.close(tx.as_mut(), &assignment, &mut events).await? else {
            return Ok(ReleaseOutcome::AlreadyReleased(assignment));
        };
        self.outbox.commit(tx, events).await?;

        metrics::record_assignment_released();
        tracing::info!(space_id = %closed.space_id, "Assignment released");
        self.monitor.on_space_released().await;
        Ok(ReleaseOutcome::Released(closed))
    }

    /// Exit-sensor path: frees a space, closing its active assignment if any.
    ///
    /// Freeing an already free space changes nothing and publishes nothing.
    ///
    /// # Errors
    ///
    /// - [`LotError::SpaceNotFound`] for an unknown id
    /// - [`LotError::Store`] on a store failure; nothing changed
    #[tracing::instrument(skip(self))]
    pub async fn release_space(&self, id: SpaceId) -> Result<Space, LotError> {
        let mut tx = self.store.begin().await?;
        if tx.space(id).await?.is_none() {
            return Err(LotError::SpaceNotFound(id));
        }

        let mut events = Vec::with_capacity(2);
        let closed = match tx.active_assignment_for_space(id).await? {
            Some(active) => self.close(tx.as_mut(), &active, &mut events).await?,
            None => None,
        };
        let release = self
            .registry
            .release(tx.as_mut(), id)
            .await?
            .ok_or(LotError::SpaceNotFound(id))?;
        if release.changed {
            events.push(LotEvent::SpaceUpdated(release.space.clone()));
        }

        let changed = !events.is_empty();
        self.outbox.commit(tx, events).await?;

        if closed.is_some() {
            metrics::record_assignment_released();
        }
        if changed {
            tracing::info!(closed_assignment = closed.is_some(), "Space released");
            self.monitor.on_space_released().await;
        }
        Ok(release.space)
    }

    /// Closes `assignment` and frees its space, queueing the matching events.
    async fn close(
        &self,
        tx: &mut dyn LotTransaction,
        assignment: &Assignment,
        events: &mut Vec<LotEvent>,
    ) -> Result<Option<Assignment>, LotError> {
        let Some(closed) = tx.close_assignment(assignment.id, self.clock.now()).await? else {
            return Ok(None);
        };
        events.push(LotEvent::AssignmentReleased(closed.clone()));

        let release = self
            .registry
            .release(tx, closed.space_id)
            .await?
            .ok_or(LotError::SpaceNotFound(closed.space_id))?;
        if release.changed {
            events.push(LotEvent::SpaceUpdated(release.space));
        }
        Ok(Some(closed))
    }

    /// Looks up an assignment.
    ///
    /// # Errors
    ///
    /// [`LotError::AssignmentNotFound`] or a store failure.
    pub async fn assignment(&self, id: AssignmentId) -> Result<Assignment, LotError> {
        self.store
            .assignment(id)
            .await?
            .ok_or(LotError::AssignmentNotFound(id))
    }

    /// Assignments still holding a space, oldest first.
    ///
    /// # Errors
    ///
    /// Store failures.
    pub async fn active_assignments(&self) -> Result<Vec<Assignment>, LotError> {
        Ok(self.store.active_assignments().await?)
    }
}

//! Store contracts for spaces, assignments, incidents and reservation holders.
//!
//! A [`LotStore`] serves plain reads and opens [`LotTransaction`]s. Every
//! mutation goes through a transaction; dropping one without calling
//! [`LotTransaction::commit`] rolls back everything it did. That is what keeps
//! a claimed space from being left Occupied without its assignment.
//!
//! # Implementations
//!
//! - `InMemoryLotStore` (in `lotkeeper-testing`): single-lock tables with an undo journal
//! - `PostgresLotStore` (in `lotkeeper-postgres`): `sqlx` transactions with row locks
//!
//! # Dyn Compatibility
//!
//! Methods return [`BoxFuture`] instead of using `async fn` so the engine can hold
//! `Arc<dyn LotStore>` and `Box<dyn LotTransaction>`.

use crate::error::StoreError;
use crate::types::{
    Assignment, AssignmentId, HolderKey, Incident, IncidentFilter, IncidentId, IncidentKind,
    NewAssignment, NewIncident, Occupancy, ReservationClass, ReservationHolder, Space, SpaceFilter,
    SpaceId, SpaceLabel, TimeRange,
};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::pin::Pin;

/// Boxed, sendable future returned by store methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Result alias for store methods.
pub type StoreResult<T> = Result<T, StoreError>;

/// Outcome of setting a space Free.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpaceRelease {
    /// The space after the call
    pub space: Space,
    /// `false` when the space was already Free
    pub changed: bool,
}

/// Read access and transaction factory.
pub trait LotStore: Send + Sync {
    /// Opens a transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the backend cannot start one.
    fn begin(&self) -> BoxFuture<'_, StoreResult<Box<dyn LotTransaction>>>;

    /// Looks up a space.
    ///
    /// # Errors
    ///
    /// Backend failures.
    fn space(&self, id: SpaceId) -> BoxFuture<'_, StoreResult<Option<Space>>>;

    /// Lists spaces matching `filter`, ordered by label.
    ///
    /// # Errors
    ///
    /// Backend failures.
    fn spaces(&self, filter: SpaceFilter) -> BoxFuture<'_, StoreResult<Vec<Space>>>;

    /// Looks up an assignment.
    ///
    /// # Errors
    ///
    /// Backend failures.
    fn assignment(&self, id: AssignmentId) -> BoxFuture<'_, StoreResult<Option<Assignment>>>;

    /// Lists assignments that have not been released, oldest first.
    ///
    /// # Errors
    ///
    /// Backend failures.
    fn active_assignments(&self) -> BoxFuture<'_, StoreResult<Vec<Assignment>>>;

    /// Lists assignments created within `range` (all when `None`), oldest first.
    ///
    /// # Errors
    ///
    /// Backend failures.
    fn assignments(&self, range: Option<TimeRange>) -> BoxFuture<'_, StoreResult<Vec<Assignment>>>;

    /// Looks up an incident.
    ///
    /// # Errors
    ///
    /// Backend failures.
    fn incident(&self, id: IncidentId) -> BoxFuture<'_, StoreResult<Option<Incident>>>;

    /// Lists incidents matching `filter`, oldest first.
    ///
    /// # Errors
    ///
    /// Backend failures.
    fn incidents(&self, filter: IncidentFilter) -> BoxFuture<'_, StoreResult<Vec<Incident>>>;

    /// Looks up a reservation holder.
    ///
    /// # Errors
    ///
    /// Backend failures.
    fn holder(&self, key: HolderKey) -> BoxFuture<'_, StoreResult<Option<ReservationHolder>>>;

    /// Lists reservation holders by key.
    ///
    /// # Errors
    ///
    /// Backend failures.
    fn holders(&self) -> BoxFuture<'_, StoreResult<Vec<ReservationHolder>>>;

    /// Current occupancy counters.
    ///
    /// # Errors
    ///
    /// Backend failures.
    fn occupancy(&self) -> BoxFuture<'_, StoreResult<Occupancy>>;
}

/// A unit of work. Dropping it without [`commit`](Self::commit) rolls it back.
///
/// Every method that changes a space keeps the [`Occupancy`] counters in step
/// within the same transaction.
pub trait LotTransaction: Send {
    /// Claims the Free space of `class` with the lowest label, flipping it to
    /// Occupied. `None` when the class has no Free space.
    ///
    /// # Errors
    ///
    /// Backend failures.
    fn claim_free_space(
        &mut self,
        class: ReservationClass,
    ) -> BoxFuture<'_, StoreResult<Option<Space>>>;

    /// Reads a space, locking it for the rest of the transaction where the backend can.
    ///
    /// # Errors
    ///
    /// Backend failures.
    fn space(&mut self, id: SpaceId) -> BoxFuture<'_, StoreResult<Option<Space>>>;

    /// Sets a space Free. Idempotent: an already Free space is returned unchanged.
    /// `None` when the space does not exist.
    ///
    /// # Errors
    ///
    /// Backend failures.
    fn release_space(&mut self, id: SpaceId) -> BoxFuture<'_, StoreResult<Option<SpaceRelease>>>;

    /// Creates a Free space.
    ///
    /// # Errors
    ///
    /// [`StoreError::Conflict`] when the label is taken; backend failures.
    fn insert_space(
        &mut self,
        label: SpaceLabel,
        class: ReservationClass,
    ) -> BoxFuture<'_, StoreResult<Space>>;

    /// Changes a space's reservation class. `None` when the space does not exist.
    ///
    /// # Errors
    ///
    /// Backend failures.
    fn set_space_class(
        &mut self,
        id: SpaceId,
        class: ReservationClass,
    ) -> BoxFuture<'_, StoreResult<Option<Space>>>;

    /// Records an assignment.
    ///
    /// # Errors
    ///
    /// [`StoreError::Conflict`] when the space already has an active assignment;
    /// backend failures.
    fn insert_assignment(
        &mut self,
        assignment: NewAssignment,
    ) -> BoxFuture<'_, StoreResult<Assignment>>;

    /// Reads an assignment, locking it where the backend can.
    ///
    /// # Errors
    ///
    /// Backend failures.
    fn assignment(&mut self, id: AssignmentId) -> BoxFuture<'_, StoreResult<Option<Assignment>>>;

    /// The active assignment on a space, if any.
    ///
    /// # Errors
    ///
    /// Backend failures.
    fn active_assignment_for_space(
        &mut self,
        space_id: SpaceId,
    ) -> BoxFuture<'_, StoreResult<Option<Assignment>>>;

    /// Sets the release time of an active assignment. `None` when the assignment
    /// does not exist or was already released.
    ///
    /// # Errors
    ///
    /// Backend failures.
    fn close_assignment(
        &mut self,
        id: AssignmentId,
        at: DateTime<Utc>,
    ) -> BoxFuture<'_, StoreResult<Option<Assignment>>>;

    /// Records an incident.
    ///
    /// # Errors
    ///
    /// [`StoreError::Conflict`] when it would be a second open lot-full incident;
    /// backend failures.
    fn insert_incident(&mut self, incident: NewIncident) -> BoxFuture<'_, StoreResult<Incident>>;

    /// Reads an incident, locking it where the backend can.
    ///
    /// # Errors
    ///
    /// Backend failures.
    fn incident(&mut self, id: IncidentId) -> BoxFuture<'_, StoreResult<Option<Incident>>>;

    /// The open incident of `kind` with the lowest id, if any.
    ///
    /// # Errors
    ///
    /// Backend failures.
    fn open_incident(&mut self, kind: IncidentKind) -> BoxFuture<'_, StoreResult<Option<Incident>>>;

    /// Resolves an open incident, replacing its note when `note` is given.
    /// `None` when the incident does not exist or is already resolved.
    ///
    /// # Errors
    ///
    /// Backend failures.
    fn resolve_incident(
        &mut self,
        id: IncidentId,
        at: DateTime<Utc>,
        note: Option<String>,
    ) -> BoxFuture<'_, StoreResult<Option<Incident>>>;

    /// Looks up a reservation holder.
    ///
    /// # Errors
    ///
    /// Backend failures.
    fn holder(&mut self, key: HolderKey) -> BoxFuture<'_, StoreResult<Option<ReservationHolder>>>;

    /// Registers a holder.
    ///
    /// # Errors
    ///
    /// [`StoreError::Conflict`] when the key exists; backend failures.
    fn insert_holder(
        &mut self,
        holder: ReservationHolder,
    ) -> BoxFuture<'_, StoreResult<ReservationHolder>>;

    /// Renames a holder. `None` when the key is unknown.
    ///
    /// # Errors
    ///
    /// Backend failures.
    fn rename_holder(
        &mut self,
        key: HolderKey,
        name: String,
    ) -> BoxFuture<'_, StoreResult<Option<ReservationHolder>>>;

    /// Removes a holder. `None` when the key is unknown.
    ///
    /// # Errors
    ///
    /// Backend failures.
    fn delete_holder(
        &mut self,
        key: HolderKey,
    ) -> BoxFuture<'_, StoreResult<Option<ReservationHolder>>>;

    /// Occupancy counters as seen by this transaction.
    ///
    /// # Errors
    ///
    /// Backend failures.
    fn occupancy(&mut self) -> BoxFuture<'_, StoreResult<Occupancy>>;

    /// Makes every change durable and visible.
    ///
    /// # Errors
    ///
    /// Backend failures; the transaction is rolled back.
    fn commit(self: Box<Self>) -> BoxFuture<'static, StoreResult<()>>;

    /// Discards every change. Dropping the transaction does the same.
    ///
    /// # Errors
    ///
    /// Backend failures.
    fn rollback(self: Box<Self>) -> BoxFuture<'static, StoreResult<()>>;
}

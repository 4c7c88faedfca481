//! In-memory lot store for fast, deterministic tests.
//!
//! All tables live behind one async mutex. A transaction owns that lock for its
//! whole lifetime, so transactions are fully serialized and plain reads wait for
//! the running transaction to finish. Every write records the previous row in
//! an undo journal; dropping the transaction without committing replays the
//! journal backwards. Id counters are not rolled back, matching database
//! sequences.
//!
//! The server also uses this store when no database is configured.

use lotkeeper_core::store::{BoxFuture, LotStore, LotTransaction, SpaceRelease, StoreResult};
use lotkeeper_core::{
    Assignment, AssignmentId, HolderKey, Incident, IncidentFilter, IncidentId, IncidentKind,
    NewAssignment, NewIncident, Occupancy, OccupancyState, ReservationClass, ReservationHolder,
    Space, SpaceFilter, SpaceId, SpaceLabel, StoreError, TimeRange,
};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Operations that can be made to fail once with [`InMemoryLotStore::fail_next`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreOp {
    /// Opening a transaction
    Begin,
    /// Claiming a free space
    ClaimFreeSpace,
    /// Freeing a space
    ReleaseSpace,
    /// Creating a space
    InsertSpace,
    /// Recording an assignment
    InsertAssignment,
    /// Setting an assignment's release time
    CloseAssignment,
    /// Recording an incident
    InsertIncident,
    /// Resolving an incident
    ResolveIncident,
    /// Committing
    Commit,
}

#[derive(Debug, Default)]
struct Faults(std::sync::Mutex<Vec<StoreOp>>);

impl Faults {
    fn push(&self, op: StoreOp) {
        if let Ok(mut pending) = self.0.lock() {
            pending.push(op);
        }
    }

    fn check(&self, op: StoreOp) -> StoreResult<()> {
        let Ok(mut pending) = self.0.lock() else {
            return Ok(());
        };
        if let Some(index) = pending.iter().position(|p| *p == op) {
            pending.remove(index);
            return Err(StoreError::Database(format!("injected failure: {op:?}")));
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct Tables {
    spaces: BTreeMap<SpaceId, Space>,
    labels: HashMap<SpaceLabel, SpaceId>,
    free: HashMap<ReservationClass, BTreeSet<(SpaceLabel, SpaceId)>>,
    assignments: BTreeMap<AssignmentId, Assignment>,
    active_by_space: HashMap<SpaceId, AssignmentId>,
    incidents: BTreeMap<IncidentId, Incident>,
    holders: BTreeMap<HolderKey, ReservationHolder>,
    occupancy: Occupancy,
    next_space: i64,
    next_assignment: i64,
    next_incident: i64,
}

impl Tables {
    /// Replaces a space row, keeping the label, free and occupancy indexes in step.
    fn put_space(&mut self, id: SpaceId, space: Option<Space>) -> Option<Space> {
        let previous = self.spaces.remove(&id);
        if let Some(old) = &previous {
            self.labels.remove(&old.label);
            if old.is_free() {
                if let Some(free) = self.free.get_mut(&old.class) {
                    free.remove(&(old.label.clone(), id));
                }
            }
            self.occupancy.remove(old);
        }
        if let Some(new) = space {
            self.labels.insert(new.label.clone(), id);
            if new.is_free() {
                self.free
                    .entry(new.class)
                    .or_default()
                    .insert((new.label.clone(), id));
            }
            self.occupancy.add(&new);
            self.spaces.insert(id, new);
        }
        previous
    }

    fn put_assignment(
        &mut self,
        id: AssignmentId,
        assignment: Option<Assignment>,
    ) -> Option<Assignment> {
        let previous = self.assignments.remove(&id);
        if let Some(old) = previous.as_ref().filter(|old| old.is_active()) {
            self.active_by_space.remove(&old.space_id);
        }
        if let Some(new) = assignment {
            if new.is_active() {
                self.active_by_space.insert(new.space_id, id);
            }
            self.assignments.insert(id, new);
        }
        previous
    }

    fn put_incident(&mut self, id: IncidentId, incident: Option<Incident>) -> Option<Incident> {
        match incident {
            Some(incident) => self.incidents.insert(id, incident),
            None => self.incidents.remove(&id),
        }
    }

    fn put_holder(
        &mut self,
        key: HolderKey,
        holder: Option<ReservationHolder>,
    ) -> Option<ReservationHolder> {
        match holder {
            Some(holder) => self.holders.insert(key, holder),
            None => self.holders.remove(&key),
        }
    }

    fn new_space(&mut self, label: SpaceLabel, class: ReservationClass) -> Space {
        self.next_space += 1;
        let space = Space {
            id: SpaceId::new(self.next_space),
            label,
            state: OccupancyState::Free,
            class,
        };
        self.put_space(space.id, Some(space.clone()));
        space
    }

    fn spaces_by_label(&self, filter: SpaceFilter) -> Vec<Space> {
        let mut spaces: Vec<Space> = self
            .spaces
            .values()
            .filter(|space| filter.matches(space))
            .cloned()
            .collect();
        spaces.sort_by(|a, b| a.label.cmp(&b.label));
        spaces
    }

    fn open_incident(&self, kind: IncidentKind) -> Option<Incident> {
        self.incidents
            .values()
            .find(|incident| incident.kind == kind && incident.is_open())
            .cloned()
    }
}

#[derive(Debug)]
enum Undo {
    Space(SpaceId, Option<Space>),
    Assignment(AssignmentId, Option<Assignment>),
    Incident(IncidentId, Option<Incident>),
    Holder(HolderKey, Option<ReservationHolder>),
}

impl Undo {
    fn apply(self, tables: &mut Tables) {
        match self {
            Self::Space(id, row) => {
                tables.put_space(id, row);
            }
            Self::Assignment(id, row) => {
                tables.put_assignment(id, row);
            }
            Self::Incident(id, row) => {
                tables.put_incident(id, row);
            }
            Self::Holder(key, row) => {
                tables.put_holder(key, row);
            }
        }
    }
}

/// In-memory [`LotStore`].
///
/// Cloning shares the same tables.
///
/// # Example
///
/// ```
/// use lotkeeper_testing::InMemoryLotStore;
/// use lotkeeper_core::{LotStore, LotTransaction, ReservationClass};
///
/// # async fn example() -> Result<(), lotkeeper_core::StoreError> {
/// let store = InMemoryLotStore::with_spaces(3, 2);
/// let mut tx = store.begin().await?;
/// let space = tx.claim_free_space(ReservationClass::Open).await?;
/// assert_eq!(space.map(|s| s.label.to_string()), Some("03".to_string()));
/// tx.commit().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemoryLotStore {
    tables: Arc<Mutex<Tables>>,
    faults: Arc<Faults>,
}

impl InMemoryLotStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A store with `reserved` Reserved spaces followed by `open` Open spaces,
    /// labeled `01`, `02`, ... in that order.
    #[must_use]
    pub fn with_spaces(open: u32, reserved: u32) -> Self {
        let total = open + reserved;
        let width = total.to_string().len().max(2);
        let mut tables = Tables::default();
        for number in 1..=total {
            let class = if number <= reserved {
                ReservationClass::Reserved
            } else {
                ReservationClass::Open
            };
            tables.new_space(SpaceLabel::numbered(number, width), class);
        }
        Self::from_tables(tables)
    }

    /// A store with the given labels and classes, created in order.
    ///
    /// # Panics
    ///
    /// Panics on an invalid or duplicate label.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn with_layout(layout: &[(&str, ReservationClass)]) -> Self {
        let mut tables = Tables::default();
        for (label, class) in layout {
            let label = SpaceLabel::parse(*label).expect("layout labels must be valid");
            assert!(!tables.labels.contains_key(&label), "duplicate layout label {label}");
            tables.new_space(label, *class);
        }
        Self::from_tables(tables)
    }

    fn from_tables(tables: Tables) -> Self {
        Self {
            tables: Arc::new(Mutex::new(tables)),
            faults: Arc::default(),
        }
    }

    /// Registers a reservation holder directly, bypassing transactions.
    ///
    /// # Panics
    ///
    /// Panics if the key or name is invalid.
    #[allow(clippy::expect_used)]
    pub async fn add_holder(&self, key: i64, name: &str) -> ReservationHolder {
        let holder = ReservationHolder::new(HolderKey::new(key), name)
            .expect("test holder must be valid");
        self.tables
            .lock()
            .await
            .put_holder(holder.key, Some(holder.clone()));
        holder
    }

    /// Makes the next call of `op` fail with [`StoreError::Database`].
    ///
    /// Faults queue up; each one fires once.
    pub fn fail_next(&self, op: StoreOp) {
        self.faults.push(op);
    }

    /// Occupancy counted from scratch over every space row.
    ///
    /// Compare against [`LotStore::occupancy`] to check that the incremental
    /// counters never drift.
    pub async fn recount(&self) -> Occupancy {
        Occupancy::recount(self.tables.lock().await.spaces.values())
    }
}

fn ready<'a, T: Send + 'a>(value: T) -> BoxFuture<'a, T> {
    Box::pin(std::future::ready(value))
}

impl LotStore for InMemoryLotStore {
    fn begin(&self) -> BoxFuture<'_, StoreResult<Box<dyn LotTransaction>>> {
        Box::pin(async move {
            self.faults.check(StoreOp::Begin)?;
            let tables = Arc::clone(&self.tables).lock_owned().await;
            let tx: Box<dyn LotTransaction> = Box::new(InMemoryTransaction {
                tables,
                journal: Vec::new(),
                faults: Arc::clone(&self.faults),
                committed: false,
            });
            Ok(tx)
        })
    }

    fn space(&self, id: SpaceId) -> BoxFuture<'_, StoreResult<Option<Space>>> {
        Box::pin(async move { Ok(self.tables.lock().await.spaces.get(&id).cloned()) })
    }

    fn spaces(&self, filter: SpaceFilter) -> BoxFuture<'_, StoreResult<Vec<Space>>> {
        Box::pin(async move { Ok(self.tables.lock().await.spaces_by_label(filter)) })
    }

    fn assignment(&self, id: AssignmentId) -> BoxFuture<'_, StoreResult<Option<Assignment>>> {
        Box::pin(async move { Ok(self.tables.lock().await.assignments.get(&id).cloned()) })
    }

    fn active_assignments(&self) -> BoxFuture<'_, StoreResult<Vec<Assignment>>> {
        Box::pin(async move {
            Ok(self
                .tables
                .lock()
                .await
                .assignments
                .values()
                .filter(|a| a.is_active())
                .cloned()
                .collect())
        })
    }

    fn assignments(&self, range: Option<TimeRange>) -> BoxFuture<'_, StoreResult<Vec<Assignment>>> {
        Box::pin(async move {
            Ok(self
                .tables
                .lock()
                .await
                .assignments
                .values()
                .filter(|a| range.is_none_or(|range| range.contains(a.assigned_at)))
                .cloned()
                .collect())
        })
    }

    fn incident(&self, id: IncidentId) -> BoxFuture<'_, StoreResult<Option<Incident>>> {
        Box::pin(async move { Ok(self.tables.lock().await.incidents.get(&id).cloned()) })
    }

    fn incidents(&self, filter: IncidentFilter) -> BoxFuture<'_, StoreResult<Vec<Incident>>> {
        Box::pin(async move {
            Ok(self
                .tables
                .lock()
                .await
                .incidents
                .values()
                .filter(|i| filter.matches(i))
                .cloned()
                .collect())
        })
    }

    fn holder(&self, key: HolderKey) -> BoxFuture<'_, StoreResult<Option<ReservationHolder>>> {
        Box::pin(async move { Ok(self.tables.lock().await.holders.get(&key).cloned()) })
    }

    fn holders(&self) -> BoxFuture<'_, StoreResult<Vec<ReservationHolder>>> {
        Box::pin(async move { Ok(self.tables.lock().await.holders.values().cloned().collect()) })
    }

    fn occupancy(&self) -> BoxFuture<'_, StoreResult<Occupancy>> {
        Box::pin(async move { Ok(self.tables.lock().await.occupancy) })
    }
}

struct InMemoryTransaction {
    tables: OwnedMutexGuard<Tables>,
    journal: Vec<Undo>,
    faults: Arc<Faults>,
    committed: bool,
}

impl InMemoryTransaction {
    fn write_space(&mut self, id: SpaceId, space: Space) {
        let previous = self.tables.put_space(id, Some(space));
        self.journal.push(Undo::Space(id, previous));
    }

    fn write_assignment(&mut self, id: AssignmentId, assignment: Assignment) {
        let previous = self.tables.put_assignment(id, Some(assignment));
        self.journal.push(Undo::Assignment(id, previous));
    }

    fn write_incident(&mut self, id: IncidentId, incident: Incident) {
        let previous = self.tables.put_incident(id, Some(incident));
        self.journal.push(Undo::Incident(id, previous));
    }

    fn write_holder(&mut self, key: HolderKey, holder: Option<ReservationHolder>) {
        let previous = self.tables.put_holder(key, holder);
        self.journal.push(Undo::Holder(key, previous));
    }

    fn claim(&mut self, class: ReservationClass) -> Option<Space> {
        let (_, id) = self.tables.free.get(&class)?.first()?.clone();
        let mut space = self.tables.spaces.get(&id)?.clone();
        space.state = OccupancyState::Occupied;
        self.write_space(id, space.clone());
        Some(space)
    }

    fn release(&mut self, id: SpaceId) -> Option<SpaceRelease> {
        let space = self.tables.spaces.get(&id)?.clone();
        if space.is_free() {
            return Some(SpaceRelease {
                space,
                changed: false,
            });
        }
        let freed = Space {
            state: OccupancyState::Free,
            ..space
        };
        self.write_space(id, freed.clone());
        Some(SpaceRelease {
            space: freed,
            changed: true,
        })
    }

    fn add_space(&mut self, label: SpaceLabel, class: ReservationClass) -> StoreResult<Space> {
        if self.tables.labels.contains_key(&label) {
            return Err(StoreError::Conflict(format!(
                "space label '{label}' already exists"
            )));
        }
        let space = self.tables.new_space(label, class);
        self.journal.push(Undo::Space(space.id, None));
        Ok(space)
    }

    fn add_assignment(&mut self, new: NewAssignment) -> StoreResult<Assignment> {
        if !self.tables.spaces.contains_key(&new.space_id) {
            return Err(StoreError::Conflict(format!(
                "space {} does not exist",
                new.space_id
            )));
        }
        if self.tables.active_by_space.contains_key(&new.space_id) {
            return Err(StoreError::Conflict(format!(
                "space {} already has an active assignment",
                new.space_id
            )));
        }
        self.tables.next_assignment += 1;
        let assignment = Assignment {
            id: AssignmentId::new(self.tables.next_assignment),
            space_id: new.space_id,
            holder: new.holder,
            assigned_at: new.assigned_at,
            released_at: None,
        };
        self.write_assignment(assignment.id, assignment.clone());
        Ok(assignment)
    }

    fn close(&mut self, id: AssignmentId, at: DateTime<Utc>) -> Option<Assignment> {
        let assignment = self.tables.assignments.get(&id)?;
        if !assignment.is_active() {
            return None;
        }
        let closed = Assignment {
            released_at: Some(at),
            ..assignment.clone()
        };
        self.write_assignment(id, closed.clone());
        Some(closed)
    }

    fn add_incident(&mut self, new: NewIncident) -> StoreResult<Incident> {
        if new.kind == IncidentKind::LotFull
            && new.resolved_at.is_none()
            && self.tables.open_incident(IncidentKind::LotFull).is_some()
        {
            return Err(StoreError::Conflict(
                "a lot_full incident is already open".to_string(),
            ));
        }
        self.tables.next_incident += 1;
        let incident = Incident {
            id: IncidentId::new(self.tables.next_incident),
            kind: new.kind,
            space_id: new.space_id,
            opened_at: new.opened_at,
            resolved_at: new.resolved_at,
            note: new.note,
        };
        self.write_incident(incident.id, incident.clone());
        Ok(incident)
    }

    fn resolve(
        &mut self,
        id: IncidentId,
        at: DateTime<Utc>,
        note: Option<String>,
    ) -> Option<Incident> {
        let incident = self.tables.incidents.get(&id)?;
        if !incident.is_open() {
            return None;
        }
        let resolved = Incident {
            resolved_at: Some(at),
            note: note.or_else(|| incident.note.clone()),
            ..incident.clone()
        };
        self.write_incident(id, resolved.clone());
        Some(resolved)
    }

    fn add_holder(&mut self, holder: ReservationHolder) -> StoreResult<ReservationHolder> {
        if self.tables.holders.contains_key(&holder.key) {
            return Err(StoreError::Conflict(format!(
                "reservation holder {} already exists",
                holder.key
            )));
        }
        self.write_holder(holder.key, Some(holder.clone()));
        Ok(holder)
    }

    fn rename(&mut self, key: HolderKey, name: String) -> Option<ReservationHolder> {
        let renamed = ReservationHolder {
            name,
            ..self.tables.holders.get(&key)?.clone()
        };
        self.write_holder(key, Some(renamed.clone()));
        Some(renamed)
    }

    fn remove_holder(&mut self, key: HolderKey) -> Option<ReservationHolder> {
        let holder = self.tables.holders.get(&key)?.clone();
        self.write_holder(key, None);
        Some(holder)
    }

    fn roll_back(&mut self) {
        while let Some(entry) = self.journal.pop() {
            entry.apply(&mut self.tables);
        }
    }
}

impl Drop for InMemoryTransaction {
    fn drop(&mut self) {
        if !self.committed {
            self.roll_back();
        }
    }
}

impl LotTransaction for InMemoryTransaction {
    fn claim_free_space(
        &mut self,
        class: ReservationClass,
    ) -> BoxFuture<'_, StoreResult<Option<Space>>> {
        ready(
            self.faults
                .check(StoreOp::ClaimFreeSpace)
                .map(|()| self.claim(class)),
        )
    }

    fn space(&mut self, id: SpaceId) -> BoxFuture<'_, StoreResult<Option<Space>>> {
        ready(Ok(self.tables.spaces.get(&id).cloned()))
    }

    fn release_space(&mut self, id: SpaceId) -> BoxFuture<'_, StoreResult<Option<SpaceRelease>>> {
        ready(
            self.faults
                .check(StoreOp::ReleaseSpace)
                .map(|()| self.release(id)),
        )
    }

    fn insert_space(
        &mut self,
        label: SpaceLabel,
        class: ReservationClass,
    ) -> BoxFuture<'_, StoreResult<Space>> {
        ready(
            self.faults
                .check(StoreOp::InsertSpace)
                .and_then(|()| self.add_space(label, class)),
        )
    }

    fn set_space_class(
        &mut self,
        id: SpaceId,
        class: ReservationClass,
    ) -> BoxFuture<'_, StoreResult<Option<Space>>> {
        let Some(space) = self.tables.spaces.get(&id).cloned() else {
            return ready(Ok(None));
        };
        if space.class == class {
            return ready(Ok(Some(space)));
        }
        if !space.is_free() {
            return ready(Err(StoreError::Conflict(format!("space {id} is occupied"))));
        }
        let space = Space { class, ..space };
        self.write_space(id, space.clone());
        ready(Ok(Some(space)))
    }

    fn insert_assignment(
        &mut self,
        assignment: NewAssignment,
    ) -> BoxFuture<'_, StoreResult<Assignment>> {
        ready(
            self.faults
                .check(StoreOp::InsertAssignment)
                .and_then(|()| self.add_assignment(assignment)),
        )
    }

    fn assignment(&mut self, id: AssignmentId) -> BoxFuture<'_, StoreResult<Option<Assignment>>> {
        ready(Ok(self.tables.assignments.get(&id).cloned()))
    }

    fn active_assignment_for_space(
        &mut self,
        space_id: SpaceId,
    ) -> BoxFuture<'_, StoreResult<Option<Assignment>>> {
        let active = self
            .tables
            .active_by_space
            .get(&space_id)
            .and_then(|id| self.tables.assignments.get(id))
            .cloned();
        ready(Ok(active))
    }

    fn close_assignment(
        &mut self,
        id: AssignmentId,
        at: DateTime<Utc>,
    ) -> BoxFuture<'_, StoreResult<Option<Assignment>>> {
        ready(
            self.faults
                .check(StoreOp::CloseAssignment)
                .map(|()| self.close(id, at)),
        )
    }

    fn insert_incident(&mut self, incident: NewIncident) -> BoxFuture<'_, StoreResult<Incident>> {
        ready(
            self.faults
                .check(StoreOp::InsertIncident)
                .and_then(|()| self.add_incident(incident)),
        )
    }

    fn incident(&mut self, id: IncidentId) -> BoxFuture<'_, StoreResult<Option<Incident>>> {
        ready(Ok(self.tables.incidents.get(&id).cloned()))
    }

    fn open_incident(
        &mut self,
        kind: IncidentKind,
    ) -> BoxFuture<'_, StoreResult<Option<Incident>>> {
        ready(Ok(self.tables.open_incident(kind)))
    }

    fn resolve_incident(
        &mut self,
        id: IncidentId,
        at: DateTime<Utc>,
        note: Option<String>,
    ) -> BoxFuture<'_, StoreResult<Option<Incident>>> {
        ready(
            self.faults
                .check(StoreOp::ResolveIncident)
                .map(|()| self.resolve(id, at, note)),
        )
    }

    fn holder(&mut self, key: HolderKey) -> BoxFuture<'_, StoreResult<Option<ReservationHolder>>> {
        ready(Ok(self.tables.holders.get(&key).cloned()))
    }

    fn insert_holder(
        &mut self,
        holder: ReservationHolder,
    ) -> BoxFuture<'_, StoreResult<ReservationHolder>> {
        ready(self.add_holder(holder))
    }

    fn rename_holder(
        &mut self,
        key: HolderKey,
        name: String,
    ) -> BoxFuture<'_, StoreResult<Option<ReservationHolder>>> {
        ready(Ok(self.rename(key, name)))
    }

    fn delete_holder(
        &mut self,
        key: HolderKey,
    ) -> BoxFuture<'_, StoreResult<Option<ReservationHolder>>> {
        ready(Ok(self.remove_holder(key)))
    }

    fn occupancy(&mut self) -> BoxFuture<'_, StoreResult<Occupancy>> {
        ready(Ok(self.tables.occupancy))
    }

    fn commit(mut self: Box<Self>) -> BoxFuture<'static, StoreResult<()>> {
        let result = self.faults.check(StoreOp::Commit);
        if result.is_ok() {
            self.committed = true;
            self.journal.clear();
        }
        ready(result)
    }

    fn rollback(self: Box<Self>) -> BoxFuture<'static, StoreResult<()>> {
        drop(self);
        ready(Ok(()))
    }
}

//! [`LotTransaction`] over a `sqlx` transaction.
//!
//! Rows touched inside a transaction are locked with `FOR UPDATE`; the claim
//! query skips rows another transaction already holds. The `lot_occupancy`
//! counters are updated by the same statements' transaction, always in
//! reserved-then-open order.

use crate::rows::{
    assignment_from_row, constrained, database, holder_from_row, incident_from_row,
    occupancy_from_rows, space_from_row,
};
use lotkeeper_core::{
    Assignment, AssignmentId, BoxFuture, DateTime, HolderKey, Incident, IncidentId, IncidentKind,
    LotTransaction, NewAssignment, NewIncident, Occupancy, ReservationClass, ReservationHolder,
    Space, SpaceId, SpaceLabel, SpaceRelease, StoreError, StoreResult, Utc,
};
use sqlx::{Postgres, Transaction};

/// An open database transaction. Dropping it rolls back.
pub struct PgTransaction {
    tx: Transaction<'static, Postgres>,
}

impl PgTransaction {
    pub(crate) const fn new(tx: Transaction<'static, Postgres>) -> Self {
        Self { tx }
    }

    async fn adjust(
        &mut self,
        class: ReservationClass,
        total: i32,
        occupied: i32,
    ) -> StoreResult<()> {
        sqlx::query(
            r"
            UPDATE lot_occupancy
            SET total = total + $2, occupied = occupied + $3
            WHERE class = $1
            ",
        )
        .bind(class.as_str())
        .bind(total)
        .bind(occupied)
        .execute(&mut *self.tx)
        .await
        .map_err(database("update occupancy"))?;
        Ok(())
    }

    async fn locked_space(&mut self, id: SpaceId) -> StoreResult<Option<Space>> {
        sqlx::query("SELECT id, label, state, class FROM spaces WHERE id = $1 FOR UPDATE")
            .bind(id.get())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(database("load space"))?
            .as_ref()
            .map(space_from_row)
            .transpose()
    }
}

impl LotTransaction for PgTransaction {
    fn claim_free_space(
        &mut self,
        class: ReservationClass,
    ) -> BoxFuture<'_, StoreResult<Option<Space>>> {
        Box::pin(async move {
            let row = sqlx::query(
                r#"
                UPDATE spaces SET state = 'occupied'
                WHERE id = (
                    SELECT id FROM spaces
                    WHERE state = 'free' AND class = $1
                    ORDER BY label COLLATE "C"
                    LIMIT 1
                    FOR UPDATE SKIP LOCKED
                )
                RETURNING id, label, state, class
                "#,
            )
            .bind(class.as_str())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(database("claim space"))?;

            let Some(row) = row else {
                return Ok(None);
            };
            let space = space_from_row(&row)?;
            self.adjust(class, 0, 1).await?;
            Ok(Some(space))
        })
    }

    fn space(&mut self, id: SpaceId) -> BoxFuture<'_, StoreResult<Option<Space>>> {
        Box::pin(self.locked_space(id))
    }

    fn release_space(&mut self, id: SpaceId) -> BoxFuture<'_, StoreResult<Option<SpaceRelease>>> {
        Box::pin(async move {
            let Some(space) = self.locked_space(id).await? else {
                return Ok(None);
            };
            if space.is_free() {
                return Ok(Some(SpaceRelease {
                    space,
                    changed: false,
                }));
            }

            let row = sqlx::query(
                "UPDATE spaces SET state = 'free' WHERE id = $1 RETURNING id, label, state, class",
            )
            .bind(id.get())
            .fetch_one(&mut *self.tx)
            .await
            .map_err(database("release space"))?;
            let space = space_from_row(&row)?;
            self.adjust(space.class, 0, -1).await?;
            Ok(Some(SpaceRelease {
                space,
                changed: true,
            }))
        })
    }

    fn insert_space(
        &mut self,
        label: SpaceLabel,
        class: ReservationClass,
    ) -> BoxFuture<'_, StoreResult<Space>> {
        Box::pin(async move {
            let row = sqlx::query(
                r"
                INSERT INTO spaces (label, state, class)
                VALUES ($1, 'free', $2)
                RETURNING id, label, state, class
                ",
            )
            .bind(label.as_str())
            .bind(class.as_str())
            .fetch_one(&mut *self.tx)
            .await
            .map_err(constrained("insert space"))?;
            let space = space_from_row(&row)?;
            self.adjust(class, 1, 0).await?;
            Ok(space)
        })
    }

    fn set_space_class(
        &mut self,
        id: SpaceId,
        class: ReservationClass,
    ) -> BoxFuture<'_, StoreResult<Option<Space>>> {
        Box::pin(async move {
            let Some(before) = self.locked_space(id).await? else {
                return Ok(None);
            };
            if before.class == class {
                return Ok(Some(before));
            }

            let row = sqlx::query(
                r"
                UPDATE spaces SET class = $2
                WHERE id = $1 AND state = 'free'
                RETURNING id, label, state, class
                ",
            )
            .bind(id.get())
            .bind(class.as_str())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(database("reclassify space"))?
            .ok_or_else(|| StoreError::Conflict(format!("space {id} is occupied")))?;
            let after = space_from_row(&row)?;

            for pool in ReservationClass::ALL {
                if pool == before.class {
                    self.adjust(pool, -1, 0).await?;
                } else if pool == after.class {
                    self.adjust(pool, 1, 0).await?;
                }
            }
            Ok(Some(after))
        })
    }

    fn insert_assignment(
        &mut self,
        assignment: NewAssignment,
    ) -> BoxFuture<'_, StoreResult<Assignment>> {
        Box::pin(async move {
            let row = sqlx::query(
                r"
                INSERT INTO assignments (space_id, holder, assigned_at)
                VALUES ($1, $2, $3)
                RETURNING id, space_id, holder, assigned_at, released_at
                ",
            )
            .bind(assignment.space_id.get())
            .bind(assignment.holder.map(HolderKey::get))
            .bind(assignment.assigned_at)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(constrained("insert assignment"))?;
            assignment_from_row(&row)
        })
    }

    fn assignment(&mut self, id: AssignmentId) -> BoxFuture<'_, StoreResult<Option<Assignment>>> {
        Box::pin(async move {
            sqlx::query(
                r"
                SELECT id, space_id, holder, assigned_at, released_at
                FROM assignments WHERE id = $1 FOR UPDATE
                ",
            )
            .bind(id.get())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(database("load assignment"))?
            .as_ref()
            .map(assignment_from_row)
            .transpose()
        })
    }

    fn active_assignment_for_space(
        &mut self,
        space_id: SpaceId,
    ) -> BoxFuture<'_, StoreResult<Option<Assignment>>> {
        Box::pin(async move {
            sqlx::query(
                r"
                SELECT id, space_id, holder, assigned_at, released_at
                FROM assignments WHERE space_id = $1 AND released_at IS NULL
                FOR UPDATE
                ",
            )
            .bind(space_id.get())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(database("load active assignment"))?
            .as_ref()
            .map(assignment_from_row)
            .transpose()
        })
    }

    fn close_assignment(
        &mut self,
        id: AssignmentId,
        at: DateTime<Utc>,
    ) -> BoxFuture<'_, StoreResult<Option<Assignment>>> {
        Box::pin(async move {
            sqlx::query(
                r"
                UPDATE assignments SET released_at = $2
                WHERE id = $1 AND released_at IS NULL
                RETURNING id, space_id, holder, assigned_at, released_at
                ",
            )
            .bind(id.get())
            .bind(at)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(database("close assignment"))?
            .as_ref()
            .map(assignment_from_row)
            .transpose()
        })
    }

    fn insert_incident(&mut self, incident: NewIncident) -> BoxFuture<'_, StoreResult<Incident>> {
        Box::pin(async move {
            let row = sqlx::query(
                r"
                INSERT INTO incidents (kind, space_id, opened_at, resolved_at, note)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING id, kind, space_id, opened_at, resolved_at, note
                ",
            )
            .bind(incident.kind.as_str())
            .bind(incident.space_id.map(SpaceId::get))
            .bind(incident.opened_at)
            .bind(incident.resolved_at)
            .bind(incident.note)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(constrained("insert incident"))?;
            incident_from_row(&row)
        })
    }

    fn incident(&mut self, id: IncidentId) -> BoxFuture<'_, StoreResult<Option<Incident>>> {
        Box::pin(async move {
            sqlx::query(
                r"
                SELECT id, kind, space_id, opened_at, resolved_at, note
                FROM incidents WHERE id = $1 FOR UPDATE
                ",
            )
            .bind(id.get())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(database("load incident"))?
            .as_ref()
            .map(incident_from_row)
            .transpose()
        })
    }

    fn open_incident(
        &mut self,
        kind: IncidentKind,
    ) -> BoxFuture<'_, StoreResult<Option<Incident>>> {
        Box::pin(async move {
            sqlx::query(
                r"
                SELECT id, kind, space_id, opened_at, resolved_at, note
                FROM incidents WHERE kind = $1 AND resolved_at IS NULL
                ORDER BY id
                LIMIT 1
                FOR UPDATE
                ",
            )
            .bind(kind.as_str())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(database("load open incident"))?
            .as_ref()
            .map(incident_from_row)
            .transpose()
        })
    }

    fn resolve_incident(
        &mut self,
        id: IncidentId,
        at: DateTime<Utc>,
        note: Option<String>,
    ) -> BoxFuture<'_, StoreResult<Option<Incident>>> {
        Box::pin(async move {
            sqlx::query(
                r"
                UPDATE incidents SET resolved_at = $2, note = COALESCE($3, note)
                WHERE id = $1 AND resolved_at IS NULL
                RETURNING id, kind, space_id, opened_at, resolved_at, note
                ",
            )
            .bind(id.get())
            .bind(at)
            .bind(note)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(database("resolve incident"))?
            .as_ref()
            .map(incident_from_row)
            .transpose()
        })
    }

    fn holder(&mut self, key: HolderKey) -> BoxFuture<'_, StoreResult<Option<ReservationHolder>>> {
        Box::pin(async move {
            sqlx::query("SELECT holder_key, name FROM reservation_holders WHERE holder_key = $1")
                .bind(key.get())
                .fetch_optional(&mut *self.tx)
                .await
                .map_err(database("load holder"))?
                .as_ref()
                .map(holder_from_row)
                .transpose()
        })
    }

    fn insert_holder(
        &mut self,
        holder: ReservationHolder,
    ) -> BoxFuture<'_, StoreResult<ReservationHolder>> {
        Box::pin(async move {
            let row = sqlx::query(
                r"
                INSERT INTO reservation_holders (holder_key, name)
                VALUES ($1, $2)
                RETURNING holder_key, name
                ",
            )
            .bind(holder.key.get())
            .bind(holder.name)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(constrained("insert holder"))?;
            holder_from_row(&row)
        })
    }

    fn rename_holder(
        &mut self,
        key: HolderKey,
        name: String,
    ) -> BoxFuture<'_, StoreResult<Option<ReservationHolder>>> {
        Box::pin(async move {
            sqlx::query(
                r"
                UPDATE reservation_holders SET name = $2
                WHERE holder_key = $1
                RETURNING holder_key, name
                ",
            )
            .bind(key.get())
            .bind(name)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(database("rename holder"))?
            .as_ref()
            .map(holder_from_row)
            .transpose()
        })
    }

    fn delete_holder(
        &mut self,
        key: HolderKey,
    ) -> BoxFuture<'_, StoreResult<Option<ReservationHolder>>> {
        Box::pin(async move {
            sqlx::query(
                "DELETE FROM reservation_holders WHERE holder_key = $1 RETURNING holder_key, name",
            )
            .bind(key.get())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(database("delete holder"))?
            .as_ref()
            .map(holder_from_row)
            .transpose()
        })
    }

    fn occupancy(&mut self) -> BoxFuture<'_, StoreResult<Occupancy>> {
        Box::pin(async move {
            let rows = sqlx::query("SELECT class, total, occupied FROM lot_occupancy")
                .fetch_all(&mut *self.tx)
                .await
                .map_err(database("load occupancy"))?;
            occupancy_from_rows(&rows)
        })
    }

    fn commit(self: Box<Self>) -> BoxFuture<'static, StoreResult<()>> {
        Box::pin(async move {
            self.tx.commit().await.map_err(database("commit transaction"))
        })
    }

    fn rollback(self: Box<Self>) -> BoxFuture<'static, StoreResult<()>> {
        Box::pin(async move {
            self.tx
                .rollback()
                .await
                .map_err(database("roll back transaction"))
        })
    }
}

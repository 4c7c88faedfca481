//! `PostgreSQL` lot store for Lotkeeper.
//!
//! Implements [`LotStore`] and [`LotTransaction`] from `lotkeeper-core` on top of
//! `sqlx`:
//!
//! - Claims pick the lowest free label with `FOR UPDATE SKIP LOCKED`
//! - Occupancy counters live in `lot_occupancy` and change in the same transaction
//!   as the spaces they count
//! - Partial unique indexes back "one active assignment per space" and
//!   "one open lot-full incident"
//!
//! # Example
//!
//! ```ignore
//! use lotkeeper_postgres::PostgresLotStore;
//!
//! let store = PostgresLotStore::connect("postgres://localhost/lotkeeper", 10).await?;
//! store.migrate().await?;
//! ```

#![forbid(unsafe_code)]

mod rows;
mod transaction;

pub use transaction::PgTransaction;

use lotkeeper_core::{
    Assignment, AssignmentId, BoxFuture, HolderKey, Incident, IncidentFilter, IncidentId,
    IncidentKind, LotStore, LotTransaction, Occupancy, OccupancyState, ReservationClass,
    ReservationHolder, Space, SpaceFilter, SpaceId, StoreError, StoreResult, TimeRange,
};
use rows::{
    all, assignment_from_row, database, holder_from_row, incident_from_row, occupancy_from_rows,
    space_from_row,
};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

/// `PostgreSQL`-backed [`LotStore`].
#[derive(Clone, Debug)]
pub struct PostgresLotStore {
    pool: PgPool,
}

impl PostgresLotStore {
    /// Wraps an existing pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a connection pool.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the database cannot be reached.
    pub async fn connect(database_url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| StoreError::Database(format!("Failed to connect: {e}")))?;

        tracing::info!(max_connections, "Connected to PostgreSQL");
        Ok(Self::from_pool(pool))
    }

    /// Creates or upgrades the schema.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if a migration fails.
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(format!("Migration failed: {e}")))?;
        Ok(())
    }

    /// The underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl LotStore for PostgresLotStore {
    fn begin(&self) -> BoxFuture<'_, StoreResult<Box<dyn LotTransaction>>> {
        Box::pin(async move {
            let tx = self
                .pool
                .begin()
                .await
                .map_err(database("begin transaction"))?;
            Ok(Box::new(PgTransaction::new(tx)) as Box<dyn LotTransaction>)
        })
    }

    fn space(&self, id: SpaceId) -> BoxFuture<'_, StoreResult<Option<Space>>> {
        Box::pin(async move {
            sqlx::query("SELECT id, label, state, class FROM spaces WHERE id = $1")
                .bind(id.get())
                .fetch_optional(&self.pool)
                .await
                .map_err(database("load space"))?
                .as_ref()
                .map(space_from_row)
                .transpose()
        })
    }

    fn spaces(&self, filter: SpaceFilter) -> BoxFuture<'_, StoreResult<Vec<Space>>> {
        Box::pin(async move {
            let rows = sqlx::query(
                r#"
                SELECT id, label, state, class FROM spaces
                WHERE ($1::TEXT IS NULL OR state = $1)
                  AND ($2::TEXT IS NULL OR class = $2)
                ORDER BY label COLLATE "C"
                "#,
            )
            .bind(filter.state.map(OccupancyState::as_str))
            .bind(filter.class.map(ReservationClass::as_str))
            .fetch_all(&self.pool)
            .await
            .map_err(database("list spaces"))?;
            all(&rows, space_from_row)
        })
    }

    fn assignment(&self, id: AssignmentId) -> BoxFuture<'_, StoreResult<Option<Assignment>>> {
        Box::pin(async move {
            sqlx::query(
                r"
                SELECT id, space_id, holder, assigned_at, released_at
                FROM assignments WHERE id = $1
                ",
            )
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(database("load assignment"))?
            .as_ref()
            .map(assignment_from_row)
            .transpose()
        })
    }

    fn active_assignments(&self) -> BoxFuture<'_, StoreResult<Vec<Assignment>>> {
        Box::pin(async move {
            let rows = sqlx::query(
                r"
                SELECT id, space_id, holder, assigned_at, released_at FROM assignments
                WHERE released_at IS NULL
                ORDER BY id
                ",
            )
            .fetch_all(&self.pool)
            .await
            .map_err(database("list active assignments"))?;
            all(&rows, assignment_from_row)
        })
    }

    fn assignments(&self, range: Option<TimeRange>) -> BoxFuture<'_, StoreResult<Vec<Assignment>>> {
        Box::pin(async move {
            let rows = sqlx::query(
                r"
                SELECT id, space_id, holder, assigned_at, released_at FROM assignments
                WHERE ($1::TIMESTAMPTZ IS NULL OR assigned_at >= $1)
                  AND ($2::TIMESTAMPTZ IS NULL OR assigned_at <= $2)
                ORDER BY id
                ",
            )
            .bind(range.map(|r| r.from))
            .bind(range.map(|r| r.to))
            .fetch_all(&self.pool)
            .await
            .map_err(database("list assignments"))?;
            all(&rows, assignment_from_row)
        })
    }

    fn incident(&self, id: IncidentId) -> BoxFuture<'_, StoreResult<Option<Incident>>> {
        Box::pin(async move {
            sqlx::query(
                r"
                SELECT id, kind, space_id, opened_at, resolved_at, note
                FROM incidents WHERE id = $1
                ",
            )
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(database("load incident"))?
            .as_ref()
            .map(incident_from_row)
            .transpose()
        })
    }

    fn incidents(&self, filter: IncidentFilter) -> BoxFuture<'_, StoreResult<Vec<Incident>>> {
        Box::pin(async move {
            let rows = sqlx::query(
                r"
                SELECT id, kind, space_id, opened_at, resolved_at, note FROM incidents
                WHERE (NOT $1::BOOLEAN OR resolved_at IS NULL)
                  AND ($2::TEXT IS NULL OR kind = $2)
                  AND ($3::TIMESTAMPTZ IS NULL OR opened_at >= $3)
                  AND ($4::TIMESTAMPTZ IS NULL OR opened_at <= $4)
                ORDER BY id
                ",
            )
            .bind(filter.open_only)
            .bind(filter.kind.map(IncidentKind::as_str))
            .bind(filter.range.map(|r| r.from))
            .bind(filter.range.map(|r| r.to))
            .fetch_all(&self.pool)
            .await
            .map_err(database("list incidents"))?;
            all(&rows, incident_from_row)
        })
    }

    fn holder(&self, key: HolderKey) -> BoxFuture<'_, StoreResult<Option<ReservationHolder>>> {
        Box::pin(async move {
            sqlx::query("SELECT holder_key, name FROM reservation_holders WHERE holder_key = $1")
                .bind(key.get())
                .fetch_optional(&self.pool)
                .await
                .map_err(database("load holder"))?
                .as_ref()
                .map(holder_from_row)
                .transpose()
        })
    }

    fn holders(&self) -> BoxFuture<'_, StoreResult<Vec<ReservationHolder>>> {
        Box::pin(async move {
            let rows =
                sqlx::query("SELECT holder_key, name FROM reservation_holders ORDER BY holder_key")
                    .fetch_all(&self.pool)
                    .await
                    .map_err(database("list holders"))?;
            all(&rows, holder_from_row)
        })
    }

    fn occupancy(&self) -> BoxFuture<'_, StoreResult<Occupancy>> {
        Box::pin(async move {
            let rows = sqlx::query("SELECT class, total, occupied FROM lot_occupancy")
                .fetch_all(&self.pool)
                .await
                .map_err(database("load occupancy"))?;
            occupancy_from_rows(&rows)
        })
    }
}

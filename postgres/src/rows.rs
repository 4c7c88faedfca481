//! Row mapping and error translation.

use lotkeeper_core::{
    Assignment, AssignmentId, HolderKey, Incident, IncidentId, Occupancy, ReservationClass,
    ReservationHolder, Space, SpaceId, SpaceLabel, StoreError,
};
use sqlx::Row;
use sqlx::postgres::PgRow;
use std::str::FromStr;

/// Maps a driver error to [`StoreError::Database`].
pub(crate) fn database(context: &'static str) -> impl Fn(sqlx::Error) -> StoreError {
    move |e| StoreError::Database(format!("Failed to {context}: {e}"))
}

/// Like [`database`], but unique and foreign-key violations become
/// [`StoreError::Conflict`].
pub(crate) fn constrained(context: &'static str) -> impl Fn(sqlx::Error) -> StoreError {
    move |e| match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() || db.is_foreign_key_violation() => {
            StoreError::Conflict(format!("Failed to {context}: {}", db.message()))
        }
        _ => StoreError::Database(format!("Failed to {context}: {e}")),
    }
}

fn column<'r, T>(row: &'r PgRow, name: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(name)
        .map_err(|e| StoreError::Corrupt(format!("column {name}: {e}")))
}

fn parsed<T: FromStr<Err = String>>(row: &PgRow, name: &str) -> Result<T, StoreError> {
    let text: String = column(row, name)?;
    text.parse().map_err(StoreError::Corrupt)
}

fn count(row: &PgRow, name: &str) -> Result<u32, StoreError> {
    let value: i32 = column(row, name)?;
    u32::try_from(value).map_err(|_| StoreError::Corrupt(format!("negative {name}: {value}")))
}

pub(crate) fn space_from_row(row: &PgRow) -> Result<Space, StoreError> {
    let label: String = column(row, "label")?;
    Ok(Space {
        id: SpaceId::new(column(row, "id")?),
        label: SpaceLabel::parse(label).map_err(|e| StoreError::Corrupt(e.to_string()))?,
        state: parsed(row, "state")?,
        class: parsed(row, "class")?,
    })
}

pub(crate) fn assignment_from_row(row: &PgRow) -> Result<Assignment, StoreError> {
    let holder: Option<i64> = column(row, "holder")?;
    Ok(Assignment {
        id: AssignmentId::new(column(row, "id")?),
        space_id: SpaceId::new(column(row, "space_id")?),
        holder: holder.map(HolderKey::new),
        assigned_at: column(row, "assigned_at")?,
        released_at: column(row, "released_at")?,
    })
}

pub(crate) fn incident_from_row(row: &PgRow) -> Result<Incident, StoreError> {
    let space_id: Option<i64> = column(row, "space_id")?;
    Ok(Incident {
        id: IncidentId::new(column(row, "id")?),
        kind: parsed(row, "kind")?,
        space_id: space_id.map(SpaceId::new),
        opened_at: column(row, "opened_at")?,
        resolved_at: column(row, "resolved_at")?,
        note: column(row, "note")?,
    })
}

pub(crate) fn holder_from_row(row: &PgRow) -> Result<ReservationHolder, StoreError> {
    Ok(ReservationHolder {
        key: HolderKey::new(column(row, "holder_key")?),
        name: column(row, "name")?,
    })
}

pub(crate) fn occupancy_from_rows(rows: &[PgRow]) -> Result<Occupancy, StoreError> {
    let mut occupancy = Occupancy::default();
    for row in rows {
        let total = count(row, "total")?;
        let occupied = count(row, "occupied")?;
        match parsed::<ReservationClass>(row, "class")? {
            ReservationClass::Open => {
                occupancy.open_total = total;
                occupancy.open_occupied = occupied;
            }
            ReservationClass::Reserved => {
                occupancy.reserved_total = total;
                occupancy.reserved_occupied = occupied;
            }
        }
    }
    Ok(occupancy)
}

pub(crate) fn all<T>(
    rows: &[PgRow],
    map: impl Fn(&PgRow) -> Result<T, StoreError>,
) -> Result<Vec<T>, StoreError> {
    rows.iter().map(map).collect()
}

//! Change notifications published after every committed state change.
//!
//! The engine hands each [`LotEvent`] to an [`EventPublisher`] exactly once, in
//! commit order. Fan-out to observers (WebSocket clients, audit sinks) is the
//! publisher's business.
//!
//! # Wire format
//!
//! ```json
//! { "type": "assignment_created", "data": { "id": 7, "space_id": 3, ... } }
//! ```

use crate::types::{Assignment, Incident, Space};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A committed change, carrying the changed entity's current snapshot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum LotEvent {
    /// A space changed occupancy or class, or was created.
    SpaceUpdated(Space),
    /// A space was claimed.
    AssignmentCreated(Assignment),
    /// A space was given back.
    AssignmentReleased(Assignment),
    /// An incident was logged.
    IncidentOpened(Incident),
    /// An open incident was resolved.
    IncidentResolved(Incident),
}

impl LotEvent {
    /// Stable event name, identical to the serialized `type` tag.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::SpaceUpdated(_) => "space_updated",
            Self::AssignmentCreated(_) => "assignment_created",
            Self::AssignmentReleased(_) => "assignment_released",
            Self::IncidentOpened(_) => "incident_opened",
            Self::IncidentResolved(_) => "incident_resolved",
        }
    }

    /// Serializes the event to its JSON wire form.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Errors that can occur while publishing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PublishError {
    /// The channel is gone.
    #[error("Event channel closed")]
    Closed,

    /// The sink refused the event.
    #[error("Publish failed for '{event}': {reason}")]
    Rejected {
        /// Event name
        event: &'static str,
        /// Why
        reason: String,
    },
}

/// One-way sink for [`LotEvent`]s.
///
/// Called while the commit-order lock is held, so implementations must not
/// block: hand the event to a channel or buffer and return.
pub trait EventPublisher: Send + Sync {
    /// Publishes one event.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError`] if the sink cannot take the event. The change it
    /// describes is already committed either way.
    fn publish(&self, event: LotEvent) -> Result<(), PublishError>;
}

/// Publisher that drops everything. Useful for tools and tests that do not observe events.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopPublisher;

impl EventPublisher for NoopPublisher {
    fn publish(&self, _event: LotEvent) -> Result<(), PublishError> {
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::{OccupancyState, ReservationClass, SpaceId, SpaceLabel};

    #[test]
    fn wire_format_is_type_and_data() {
        let event = LotEvent::SpaceUpdated(Space {
            id: SpaceId::new(3),
            label: SpaceLabel::parse("03").unwrap(),
            state: OccupancyState::Occupied,
            class: ReservationClass::Open,
        });
        let json: serde_json::Value = serde_json::from_str(&event.to_json().unwrap()).unwrap();
        assert_eq!(json["type"], event.name());
        assert_eq!(json["data"]["label"], "03");
        assert_eq!(json["data"]["state"], "occupied");
        assert_eq!(json["data"]["class"], "open");
    }
}

//! Error types for the allocation engine and its stores.

use crate::types::{
    AssignmentId, HolderKey, IncidentId, IncidentKind, RejectReason, ReservationClass, SpaceId,
};
use thiserror::Error;

/// Errors raised by a store implementation.
///
/// Any of these inside a claim or release transaction aborts and rolls back the
/// whole operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The backend failed (connection, query, commit).
    #[error("Database error: {0}")]
    Database(String),

    /// A uniqueness constraint was violated.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A stored row could not be mapped back to the domain model.
    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

/// Errors returned by lot operations.
///
/// Rejections (`NoFreeSpace`, `UnknownHolder`) and lookups that miss are typed
/// results for the caller; only `Store` signals an internal failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LotError {
    /// No free space of the requested class.
    #[error("No free {class} space available")]
    NoFreeSpace {
        /// The class that was exhausted
        class: ReservationClass,
    },

    /// A reserved request named an unregistered holder.
    #[error("Unknown reservation holder {0}")]
    UnknownHolder(HolderKey),

    /// No such space.
    #[error("Space {0} not found")]
    SpaceNotFound(SpaceId),

    /// No such assignment.
    #[error("Assignment {0} not found")]
    AssignmentNotFound(AssignmentId),

    /// No such incident.
    #[error("Incident {0} not found")]
    IncidentNotFound(IncidentId),

    /// No such reservation holder.
    #[error("Reservation holder {0} not found")]
    HolderNotFound(HolderKey),

    /// The space is occupied and cannot change reservation class.
    #[error("Space {0} is occupied")]
    SpaceOccupied(SpaceId),

    /// Another space already uses the label.
    #[error("Space label '{0}' is already in use")]
    DuplicateLabel(String),

    /// The holder key is already registered.
    #[error("Reservation holder {0} already exists")]
    DuplicateHolder(HolderKey),

    /// The label is empty or too long.
    #[error("Invalid space label '{0}'")]
    InvalidLabel(String),

    /// The holder key or name is invalid.
    #[error("Invalid reservation holder name '{0}'")]
    InvalidHolderName(String),

    /// Only the incident monitor creates or resolves this kind.
    #[error("Incidents of kind '{0}' are managed automatically")]
    SystemManagedIncident(IncidentKind),

    /// The incident was already resolved.
    #[error("Incident {0} is already resolved")]
    IncidentAlreadyResolved(IncidentId),

    /// Internal store failure; the operation was rolled back.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl LotError {
    /// The rejection reason, for the two rejection variants.
    #[must_use]
    pub const fn rejection(&self) -> Option<RejectReason> {
        match self {
            Self::NoFreeSpace { .. } => Some(RejectReason::NoFreeSpace),
            Self::UnknownHolder(_) => Some(RejectReason::UnknownHolder),
            _ => None,
        }
    }

    /// Whether the error references something that does not exist.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::SpaceNotFound(_)
                | Self::AssignmentNotFound(_)
                | Self::IncidentNotFound(_)
                | Self::HolderNotFound(_)
        )
    }
}

/// Result alias for lot operations.
pub type Result<T> = std::result::Result<T, LotError>;

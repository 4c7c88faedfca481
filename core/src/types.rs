//! Domain types for the parking lot.
//!
//! Identifiers, the three persisted entities (spaces, assignments, incidents),
//! the reservation-holder directory entry, and the occupancy counters that the
//! stores maintain alongside every space mutation.

use crate::error::LotError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Wraps a raw database identifier.
            #[must_use]
            pub const fn new(value: i64) -> Self {
                Self(value)
            }

            /// Returns the raw identifier.
            #[must_use]
            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_type!(
    /// Identifier of a parking space.
    SpaceId
);
id_type!(
    /// Identifier of an assignment.
    AssignmentId
);
id_type!(
    /// Identifier of an incident.
    IncidentId
);
id_type!(
    /// Identity key of a reservation holder (national ID number).
    HolderKey
);

// ============================================================================
// Space
// ============================================================================

/// Maximum length of a space label, in characters.
pub const MAX_LABEL_LEN: usize = 16;

/// Human-assigned, unique display label of a space.
///
/// Labels order byte-wise, which is the order used to pick the next free space.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SpaceLabel(String);

impl SpaceLabel {
    /// Validates and wraps a label.
    ///
    /// # Errors
    ///
    /// Returns [`LotError::InvalidLabel`] when the trimmed label is empty or longer
    /// than [`MAX_LABEL_LEN`].
    pub fn parse(label: impl Into<String>) -> Result<Self, LotError> {
        let label = label.into();
        let trimmed = label.trim();
        if trimmed.is_empty() || trimmed.chars().count() > MAX_LABEL_LEN {
            return Err(LotError::InvalidLabel(label));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Zero-padded numeric label, e.g. `numbered(7, 2)` is `"07"`.
    #[must_use]
    pub fn numbered(number: u32, width: usize) -> Self {
        Self(format!("{number:0width$}"))
    }

    /// Borrow the label text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for SpaceLabel {
    type Error = LotError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<SpaceLabel> for String {
    fn from(label: SpaceLabel) -> Self {
        label.0
    }
}

impl fmt::Display for SpaceLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Occupancy state of a space.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OccupancyState {
    /// Nobody is parked.
    Free,
    /// Held by an active assignment.
    Occupied,
}

impl OccupancyState {
    /// Storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Occupied => "occupied",
        }
    }
}

impl FromStr for OccupancyState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "free" => Ok(Self::Free),
            "occupied" => Ok(Self::Occupied),
            other => Err(format!("unknown occupancy state '{other}'")),
        }
    }
}

impl fmt::Display for OccupancyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reservation class of a space.
///
/// Fixed at creation; only the administrative path may change it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationClass {
    /// Only for registered reservation holders.
    Reserved,
    /// For any requester.
    Open,
}

impl ReservationClass {
    /// Both classes, in permit-acquisition order.
    pub const ALL: [Self; 2] = [Self::Reserved, Self::Open];

    /// Storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Reserved => "reserved",
            Self::Open => "open",
        }
    }
}

impl FromStr for ReservationClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reserved" => Ok(Self::Reserved),
            "open" => Ok(Self::Open),
            other => Err(format!("unknown reservation class '{other}'")),
        }
    }
}

impl fmt::Display for ReservationClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One physical parking slot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Space {
    /// Identifier
    pub id: SpaceId,
    /// Display label
    pub label: SpaceLabel,
    /// Current occupancy
    pub state: OccupancyState,
    /// Reservation class
    pub class: ReservationClass,
}

impl Space {
    /// Whether the space can be claimed.
    #[must_use]
    pub fn is_free(&self) -> bool {
        self.state == OccupancyState::Free
    }
}

/// Filter for space listings. `None` fields match everything.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpaceFilter {
    /// Match this occupancy state only
    pub state: Option<OccupancyState>,
    /// Match this reservation class only
    pub class: Option<ReservationClass>,
}

impl SpaceFilter {
    /// Matches every space.
    #[must_use]
    pub const fn all() -> Self {
        Self {
            state: None,
            class: None,
        }
    }

    /// Matches spaces in `state`.
    #[must_use]
    pub const fn by_state(state: OccupancyState) -> Self {
        Self {
            state: Some(state),
            class: None,
        }
    }

    /// Whether `space` passes the filter.
    #[must_use]
    pub fn matches(&self, space: &Space) -> bool {
        self.state.is_none_or(|state| space.state == state)
            && self.class.is_none_or(|class| space.class == class)
    }
}

// ============================================================================
// Requests
// ============================================================================

/// An incoming request for a space.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "class", rename_all = "snake_case")]
pub enum AssignmentRequest {
    /// Any requester, served from the open pool.
    Open,
    /// A registered holder, served from the reserved pool.
    Reserved {
        /// Who is asking
        holder: HolderKey,
    },
}

impl AssignmentRequest {
    /// The class of space this request draws from.
    #[must_use]
    pub const fn class(&self) -> ReservationClass {
        match self {
            Self::Open => ReservationClass::Open,
            Self::Reserved { .. } => ReservationClass::Reserved,
        }
    }

    /// The requester identity, present only for reserved requests.
    #[must_use]
    pub const fn holder(&self) -> Option<HolderKey> {
        match self {
            Self::Open => None,
            Self::Reserved { holder } => Some(*holder),
        }
    }
}

impl From<Option<HolderKey>> for AssignmentRequest {
    fn from(holder: Option<HolderKey>) -> Self {
        holder.map_or(Self::Open, |holder| Self::Reserved { holder })
    }
}

/// Why a request was turned away.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// No free space of the requested class
    NoFreeSpace,
    /// The reserved request named an unregistered holder
    UnknownHolder,
}

impl RejectReason {
    /// Metric label and wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NoFreeSpace => "no_free_space",
            Self::UnknownHolder => "unknown_holder",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoFreeSpace => f.write_str("no free space"),
            Self::UnknownHolder => f.write_str("unknown holder"),
        }
    }
}

// ============================================================================
// Assignment
// ============================================================================

/// Binds an occupied space to a point in time and optionally to a holder.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    /// Identifier
    pub id: AssignmentId,
    /// Space it occupies
    pub space_id: SpaceId,
    /// Holder, for reserved claims only
    pub holder: Option<HolderKey>,
    /// When the space was claimed
    pub assigned_at: DateTime<Utc>,
    /// When the space was given back; `None` while active
    pub released_at: Option<DateTime<Utc>>,
}

impl Assignment {
    /// Whether the assignment still holds its space.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.released_at.is_none()
    }

    /// Hours between claim and release, for completed assignments.
    #[must_use]
    #[allow(clippy::cast_precision_loss)] // Sub-millisecond precision is irrelevant for hours
    pub fn occupied_hours(&self) -> Option<f64> {
        self.released_at
            .map(|released| (released - self.assigned_at).num_milliseconds() as f64 / 3_600_000.0)
    }
}

/// Insert payload for an assignment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewAssignment {
    /// Claimed space
    pub space_id: SpaceId,
    /// Holder, for reserved claims only
    pub holder: Option<HolderKey>,
    /// Claim time
    pub assigned_at: DateTime<Utc>,
}

// ============================================================================
// Incident
// ============================================================================

/// Kind of logged condition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentKind {
    /// Every open space is occupied
    LotFull,
    /// A request was turned away
    RequestRejected,
    /// Reported by staff
    Manual,
    /// A sensor misbehaved
    SensorFault,
}

impl IncidentKind {
    /// Storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LotFull => "lot_full",
            Self::RequestRejected => "request_rejected",
            Self::Manual => "manual",
            Self::SensorFault => "sensor_fault",
        }
    }

    /// Kinds only the incident monitor may create or resolve.
    #[must_use]
    pub const fn is_system_managed(self) -> bool {
        matches!(self, Self::LotFull | Self::RequestRejected)
    }
}

impl FromStr for IncidentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lot_full" => Ok(Self::LotFull),
            "request_rejected" => Ok(Self::RequestRejected),
            "manual" => Ok(Self::Manual),
            "sensor_fault" => Ok(Self::SensorFault),
            other => Err(format!("unknown incident kind '{other}'")),
        }
    }
}

impl fmt::Display for IncidentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A logged exceptional condition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Incident {
    /// Identifier
    pub id: IncidentId,
    /// What happened
    pub kind: IncidentKind,
    /// Affected space; `None` for lot-wide incidents
    pub space_id: Option<SpaceId>,
    /// When it was logged
    pub opened_at: DateTime<Utc>,
    /// When it was resolved; `None` while open
    pub resolved_at: Option<DateTime<Utc>>,
    /// Free text
    pub note: Option<String>,
}

impl Incident {
    /// Whether the condition is still ongoing.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.resolved_at.is_none()
    }
}

/// Insert payload for an incident.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewIncident {
    /// What happened
    pub kind: IncidentKind,
    /// Affected space
    pub space_id: Option<SpaceId>,
    /// When it was logged
    pub opened_at: DateTime<Utc>,
    /// Set for incidents created already resolved
    pub resolved_at: Option<DateTime<Utc>>,
    /// Free text
    pub note: Option<String>,
}

impl NewIncident {
    /// An open lot-wide incident.
    #[must_use]
    pub const fn open(kind: IncidentKind, at: DateTime<Utc>, note: String) -> Self {
        Self {
            kind,
            space_id: None,
            opened_at: at,
            resolved_at: None,
            note: Some(note),
        }
    }

    /// A rejection record: opened and resolved at the same instant.
    #[must_use]
    pub const fn instantaneous(kind: IncidentKind, at: DateTime<Utc>, note: String) -> Self {
        Self {
            kind,
            space_id: None,
            opened_at: at,
            resolved_at: Some(at),
            note: Some(note),
        }
    }
}

/// Filter for incident listings.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncidentFilter {
    /// Unresolved incidents only
    pub open_only: bool,
    /// Match this kind only
    pub kind: Option<IncidentKind>,
    /// Opened within this range only
    pub range: Option<TimeRange>,
}

impl IncidentFilter {
    /// Whether `incident` passes the filter.
    #[must_use]
    pub fn matches(&self, incident: &Incident) -> bool {
        (!self.open_only || incident.is_open())
            && self.kind.is_none_or(|kind| incident.kind == kind)
            && self
                .range
                .is_none_or(|range| range.contains(incident.opened_at))
    }
}

// ============================================================================
// Reservation holders
// ============================================================================

/// Maximum length of a holder name.
pub const MAX_HOLDER_NAME_LEN: usize = 100;

/// A registered identity with rights to the reserved pool.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationHolder {
    /// Identity key
    pub key: HolderKey,
    /// Display name
    pub name: String,
}

impl ReservationHolder {
    /// Validates the name and builds a holder.
    ///
    /// # Errors
    ///
    /// Returns [`LotError::InvalidHolderName`] for non-positive keys and for empty or
    /// overlong names.
    pub fn new(key: HolderKey, name: impl Into<String>) -> Result<Self, LotError> {
        let name = name.into();
        let trimmed = name.trim();
        if key.get() <= 0 || trimmed.is_empty() || trimmed.chars().count() > MAX_HOLDER_NAME_LEN {
            return Err(LotError::InvalidHolderName(name));
        }
        Ok(Self {
            key,
            name: trimmed.to_string(),
        })
    }
}

// ============================================================================
// Occupancy counters
// ============================================================================

/// Per-class space counts, maintained incrementally by the stores.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occupancy {
    /// Open-class spaces
    pub open_total: u32,
    /// Occupied open-class spaces
    pub open_occupied: u32,
    /// Reserved-class spaces
    pub reserved_total: u32,
    /// Occupied reserved-class spaces
    pub reserved_occupied: u32,
}

impl Occupancy {
    /// Counts a full set of spaces from scratch.
    #[must_use]
    pub fn recount<'a>(spaces: impl IntoIterator<Item = &'a Space>) -> Self {
        let mut occupancy = Self::default();
        for space in spaces {
            occupancy.add(space);
        }
        occupancy
    }

    /// Every open space is occupied. A lot without open spaces is never full.
    #[must_use]
    pub const fn is_lot_full(&self) -> bool {
        self.open_total > 0 && self.open_occupied >= self.open_total
    }

    /// Free open-class spaces.
    #[must_use]
    pub const fn open_free(&self) -> u32 {
        self.open_total.saturating_sub(self.open_occupied)
    }

    /// Free reserved-class spaces.
    #[must_use]
    pub const fn reserved_free(&self) -> u32 {
        self.reserved_total.saturating_sub(self.reserved_occupied)
    }

    /// Counts `space` in.
    pub fn add(&mut self, space: &Space) {
        let (total, occupied) = self.slots_mut(space.class);
        *total += 1;
        if space.state == OccupancyState::Occupied {
            *occupied += 1;
        }
    }

    /// Counts `space` out.
    pub fn remove(&mut self, space: &Space) {
        let (total, occupied) = self.slots_mut(space.class);
        *total = total.saturating_sub(1);
        if space.state == OccupancyState::Occupied {
            *occupied = occupied.saturating_sub(1);
        }
    }

    /// Replaces the counted version of a space with its new version.
    pub fn replace(&mut self, before: &Space, after: &Space) {
        self.remove(before);
        self.add(after);
    }

    fn slots_mut(&mut self, class: ReservationClass) -> (&mut u32, &mut u32) {
        match class {
            ReservationClass::Open => (&mut self.open_total, &mut self.open_occupied),
            ReservationClass::Reserved => (&mut self.reserved_total, &mut self.reserved_occupied),
        }
    }
}

// ============================================================================
// Time ranges
// ============================================================================

/// Inclusive time window.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    /// Start, inclusive
    pub from: DateTime<Utc>,
    /// End, inclusive
    pub to: DateTime<Utc>,
}

impl TimeRange {
    /// Builds a range; `from` after `to` yields an empty range.
    #[must_use]
    pub const fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self { from, to }
    }

    /// Whether `at` falls inside.
    #[must_use]
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.from <= at && at <= self.to
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn space(label: &str, state: OccupancyState, class: ReservationClass) -> Space {
        Space {
            id: SpaceId::new(1),
            label: SpaceLabel::parse(label).unwrap(),
            state,
            class,
        }
    }

    #[test]
    fn labels_are_trimmed_and_bounded() {
        assert_eq!(SpaceLabel::parse(" 07 ").unwrap().as_str(), "07");
        assert!(SpaceLabel::parse("   ").is_err());
        assert!(SpaceLabel::parse("x".repeat(MAX_LABEL_LEN + 1)).is_err());
        let accented = "Ñ".repeat(MAX_LABEL_LEN);
        assert_eq!(SpaceLabel::parse(accented.as_str()).unwrap().as_str(), accented);
        assert_eq!(SpaceLabel::numbered(3, 2).as_str(), "03");
        assert!(SpaceLabel::numbered(2, 2) < SpaceLabel::numbered(10, 2));
    }

    #[test]
    fn request_class_follows_holder_presence() {
        assert_eq!(AssignmentRequest::from(None), AssignmentRequest::Open);
        let reserved = AssignmentRequest::from(Some(HolderKey::new(42)));
        assert_eq!(reserved.class(), ReservationClass::Reserved);
        assert_eq!(reserved.holder(), Some(HolderKey::new(42)));
    }

    #[test]
    fn occupancy_tracks_flips_and_class_changes() {
        let free_open = space("01", OccupancyState::Free, ReservationClass::Open);
        let taken_open = space("01", OccupancyState::Occupied, ReservationClass::Open);
        let taken_reserved = space("01", OccupancyState::Occupied, ReservationClass::Reserved);

        let mut occupancy = Occupancy::default();
        occupancy.add(&free_open);
        assert!(!occupancy.is_lot_full());

        occupancy.replace(&free_open, &taken_open);
        assert!(occupancy.is_lot_full());
        assert_eq!(occupancy.open_free(), 0);

        occupancy.replace(&taken_open, &taken_reserved);
        assert_eq!(occupancy.open_total, 0);
        assert_eq!(occupancy.reserved_occupied, 1);
        assert!(!occupancy.is_lot_full(), "a lot without open spaces is never full");
    }

    #[test]
    fn reserved_spaces_never_count_toward_fullness() {
        let spaces = [
            space("01", OccupancyState::Occupied, ReservationClass::Reserved),
            space("02", OccupancyState::Free, ReservationClass::Open),
        ];
        let occupancy = Occupancy::recount(&spaces);
        assert_eq!(occupancy.reserved_occupied, 1);
        assert!(!occupancy.is_lot_full());
    }

    #[test]
    fn incident_filter_combines_criteria() {
        let at = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();
        let incident = Incident {
            id: IncidentId::new(1),
            kind: IncidentKind::RequestRejected,
            space_id: None,
            opened_at: at,
            resolved_at: Some(at),
            note: None,
        };
        assert!(IncidentFilter::default().matches(&incident));
        let open_only = IncidentFilter {
            open_only: true,
            ..IncidentFilter::default()
        };
        assert!(!open_only.matches(&incident));
        let outside = TimeRange::new(
            at + chrono::Duration::hours(1),
            at + chrono::Duration::hours(2),
        );
        let elsewhere = IncidentFilter {
            range: Some(outside),
            ..IncidentFilter::default()
        };
        assert!(!elsewhere.matches(&incident));
    }

    #[test]
    fn enums_round_trip_through_storage_strings() {
        for kind in [
            IncidentKind::LotFull,
            IncidentKind::RequestRejected,
            IncidentKind::Manual,
            IncidentKind::SensorFault,
        ] {
            assert_eq!(kind.as_str().parse::<IncidentKind>().unwrap(), kind);
        }
        assert!("si".parse::<ReservationClass>().is_err());
    }

    #[test]
    fn holder_names_are_validated() {
        assert!(ReservationHolder::new(HolderKey::new(1), "  ").is_err());
        assert!(ReservationHolder::new(HolderKey::new(0), "Ana").is_err());
        assert_eq!(ReservationHolder::new(HolderKey::new(1), " Ana ").unwrap().name, "Ana");
    }
}

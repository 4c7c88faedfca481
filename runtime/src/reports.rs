//! Read-only lot statistics.

use lotkeeper_core::{
    Assignment, Incident, IncidentFilter, LotError, LotStore, OccupancyState, ReservationClass,
    Space, SpaceFilter, TimeRange,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Snapshot of the lot plus counts over an optional time range.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LotStatistics {
    /// Every space
    pub total_spaces: usize,
    /// Free spaces
    pub free_spaces: usize,
    /// Occupied spaces
    pub occupied_spaces: usize,
    /// Spaces in the reserved class
    pub reserved_spaces: usize,
    /// Spaces in the open class
    pub open_spaces: usize,
    /// Assignments created in range
    pub total_assignments: usize,
    /// Of those, still active
    pub active_assignments: usize,
    /// Incidents opened in range
    pub total_incidents: usize,
    /// Of those, still open
    pub open_incidents: usize,
    /// Incidents in range, per kind
    pub incidents_by_kind: BTreeMap<String, usize>,
    /// Mean hours of completed assignments in range, two decimals; 0.0 when none
    pub average_occupancy_hours: f64,
}

/// Computes statistics over already range-filtered records.
#[must_use]
#[allow(clippy::cast_precision_loss)] // Counts stay far below 2^52
pub fn summarize(
    spaces: &[Space],
    assignments: &[Assignment],
    incidents: &[Incident],
) -> LotStatistics {
    let count_state = |state: OccupancyState| spaces.iter().filter(|s| s.state == state).count();
    let count_class = |class: ReservationClass| spaces.iter().filter(|s| s.class == class).count();

    let hours: Vec<f64> = assignments.iter().filter_map(Assignment::occupied_hours).collect();
    let average_occupancy_hours = if hours.is_empty() {
        0.0
    } else {
        let mean = hours.iter().sum::<f64>() / hours.len() as f64;
        (mean * 100.0).round() / 100.0
    };

    let mut incidents_by_kind = BTreeMap::new();
    for incident in incidents {
        *incidents_by_kind
            .entry(incident.kind.as_str().to_string())
            .or_insert(0) += 1;
    }

    LotStatistics {
        total_spaces: spaces.len(),
        free_spaces: count_state(OccupancyState::Free),
        occupied_spaces: count_state(OccupancyState::Occupied),
        reserved_spaces: count_class(ReservationClass::Reserved),
        open_spaces: count_class(ReservationClass::Open),
        total_assignments: assignments.len(),
        active_assignments: assignments.iter().filter(|a| a.is_active()).count(),
        total_incidents: incidents.len(),
        open_incidents: incidents.iter().filter(|i| i.is_open()).count(),
        incidents_by_kind,
        average_occupancy_hours,
    }
}

/// Reads the store and summarizes it.
#[derive(Clone)]
pub struct ReportAggregator {
    store: Arc<dyn LotStore>,
}

impl ReportAggregator {
    /// Creates an aggregator.
    #[must_use]
    pub fn new(store: Arc<dyn LotStore>) -> Self {
        Self { store }
    }

    /// Statistics for assignments and incidents within `range` (all time when `None`).
    ///
    /// Space counts always describe the lot as it is now.
    ///
    /// # Errors
    ///
    /// Store failures.
    pub async fn statistics(&self, range: Option<TimeRange>) -> Result<LotStatistics, LotError> {
        let spaces = self.store.spaces(SpaceFilter::all()).await?;
        let assignments = self.store.assignments(range).await?;
        let incidents = self
            .store
            .incidents(IncidentFilter {
                range,
                ..IncidentFilter::default()
            })
            .await?;
        Ok(summarize(&spaces, &assignments, &incidents))
    }
}

//! Incident monitor: opens and resolves the automatic lot-full incident and
//! records rejected requests.
//!
//! Every decision is made by [`evaluate`], a pure function of the occupancy
//! counters, the currently open lot-full incident and what triggered the
//! check. The monitor runs it under a transition mutex, inside its own store
//! transaction, after the triggering change has committed.
//!
//! Incident bookkeeping must never undo or fail an allocation that already
//! happened, so store errors here are logged, counted and swallowed.

use crate::metrics;
use crate::outbox::EventOutbox;
use lotkeeper_core::environment::Clock;
use lotkeeper_core::{
    AssignmentRequest, Incident, IncidentFilter, IncidentKind, LotError, LotEvent, LotStore,
    NewIncident, Occupancy, RejectReason,
};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;

/// What prompted a check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Trigger {
    /// A space was claimed
    Claimed,
    /// A space was freed
    Released,
    /// The pool changed shape (space added, class overridden)
    Reconcile,
}

/// Outcome of [`evaluate`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Transition {
    /// Nothing to do
    Stay,
    /// Open a lot-full incident
    Open,
    /// Resolve this lot-full incident
    Resolve(Incident),
}

/// Lot-full state as seen by the monitor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "incident", rename_all = "snake_case")]
pub enum MonitorState {
    /// No lot-full incident is open
    Idle,
    /// This lot-full incident is open
    Full(Incident),
}

/// Decides the lot-full transition.
///
/// A claim can only open, a release can only resolve, a reconcile can do either.
#[must_use]
pub fn evaluate(occupancy: Occupancy, open: Option<&Incident>, trigger: Trigger) -> Transition {
    let full = occupancy.is_lot_full();
    match (trigger, full, open) {
        (Trigger::Claimed | Trigger::Reconcile, true, None) => Transition::Open,
        (Trigger::Released | Trigger::Reconcile, false, Some(incident)) => {
            Transition::Resolve(incident.clone())
        }
        _ => Transition::Stay,
    }
}

fn full_note(occupancy: &Occupancy) -> String {
    format!(
        "Lot full: {}/{} open spaces occupied",
        occupancy.open_occupied, occupancy.open_total
    )
}

fn resolved_note(previous: Option<&str>, occupancy: &Occupancy) -> String {
    let resolution = format!(
        "Auto-resolved: {}/{} open spaces occupied",
        occupancy.open_occupied, occupancy.open_total
    );
    match previous {
        Some(previous) if !previous.is_empty() => format!("{previous}\n{resolution}"),
        _ => resolution,
    }
}

fn rejection_note(request: AssignmentRequest, reason: RejectReason) -> String {
    match request {
        AssignmentRequest::Open => format!("Request rejected ({reason}): open class"),
        AssignmentRequest::Reserved { holder } => {
            format!("Request rejected ({reason}): reserved class, holder {holder}")
        }
    }
}

/// Maintains lot-full and rejection incidents.
#[derive(Clone)]
pub struct IncidentMonitor {
    store: Arc<dyn LotStore>,
    outbox: EventOutbox,
    clock: Arc<dyn Clock>,
    transitions: Arc<Mutex<()>>,
}

impl IncidentMonitor {
    /// Creates a monitor.
    #[must_use]
    pub fn new(store: Arc<dyn LotStore>, outbox: EventOutbox, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            outbox,
            clock,
            transitions: Arc::new(Mutex::new(())),
        }
    }

    /// Opens a lot-full incident if the last claim filled the open pool.
    pub async fn on_space_claimed(&self) -> Option<Incident> {
        self.check(Trigger::Claimed).await
    }

    /// Resolves the lot-full incident if a release freed an open space.
    pub async fn on_space_released(&self) -> Option<Incident> {
        self.check(Trigger::Released).await
    }

    /// Brings the lot-full incident in line with the counters either way.
    pub async fn reconcile(&self) -> Option<Incident> {
        self.check(Trigger::Reconcile).await
    }

    /// Records one already-resolved rejection incident.
    pub async fn on_rejected(
        &self,
        request: AssignmentRequest,
        reason: RejectReason,
    ) -> Option<Incident> {
        match self.record_rejection(request, reason).await {
            Ok(incident) => Some(incident),
            Err(error) => {
                tracing::error!(
                    error = %error,
                    reason = %reason,
                    "Failed to record rejection incident"
                );
                metrics::record_bookkeeping_failure();
                None
            }
        }
    }

    /// The current lot-full state.
    ///
    /// # Errors
    ///
    /// Store failures.
    pub async fn state(&self) -> Result<MonitorState, LotError> {
        let open = self
            .store
            .incidents(IncidentFilter {
                open_only: true,
                kind: Some(IncidentKind::LotFull),
                range: None,
            })
            .await?;
        Ok(open
            .into_iter()
            .next()
            .map_or(MonitorState::Idle, MonitorState::Full))
    }

    async fn check(&self, trigger: Trigger) -> Option<Incident> {
        let _transition = self.transitions.lock().await;
        match self.transition(trigger).await {
            Ok(changed) => changed,
            Err(error) => {
                tracing::error!(error = %error, ?trigger, "Lot-full bookkeeping failed");
                metrics::record_bookkeeping_failure();
                None
            }
        }
    }

    async fn transition(&self, trigger: Trigger) -> Result<Option<Incident>, LotError> {
        let mut tx = self.store.begin().await?;
        let occupancy = tx.occupancy().await?;
        let open = tx.open_incident(IncidentKind::LotFull).await?;
        metrics::record_occupancy(&occupancy);

        match evaluate(occupancy, open.as_ref(), trigger) {
            Transition::Stay => Ok(None),
            Transition::Open => {
                let incident = tx
                    .insert_incident(NewIncident::open(
                        IncidentKind::LotFull,
                        self.clock.now(),
                        full_note(&occupancy),
                    ))
                    .await?;
                self.outbox
                    .commit(tx, vec![LotEvent::IncidentOpened(incident.clone())])
                    .await?;
                metrics::record_lot_full();
                tracing::info!(
                    incident_id = %incident.id,
                    occupied = occupancy.open_occupied,
                    total = occupancy.open_total,
                    "Lot full"
                );
                Ok(Some(incident))
            }
            Transition::Resolve(incident) => {
                let note = resolved_note(incident.note.as_deref(), &occupancy);
                let Some(resolved) = tx
                    .resolve_incident(incident.id, self.clock.now(), Some(note))
                    .await?
                else {
                    return Ok(None);
                };
                self.outbox
                    .commit(tx, vec![LotEvent::IncidentResolved(resolved.clone())])
                    .await?;
                tracing::info!(
                    incident_id = %resolved.id,
                    occupied = occupancy.open_occupied,
                    total = occupancy.open_total,
                    "Lot no longer full"
                );
                Ok(Some(resolved))
            }
        }
    }

    async fn record_rejection(
        &self,
        request: AssignmentRequest,
        reason: RejectReason,
    ) -> Result<Incident, LotError> {
        let mut tx = self.store.begin().await?;
        let incident = tx
            .insert_incident(NewIncident::instantaneous(
                IncidentKind::RequestRejected,
                self.clock.now(),
                rejection_note(request, reason),
            ))
            .await?;
        self.outbox
            .commit(tx, vec![LotEvent::IncidentOpened(incident.clone())])
            .await?;
        Ok(incident)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use lotkeeper_core::{HolderKey, IncidentId, LotTransaction, ReservationClass};
    use lotkeeper_testing::{InMemoryLotStore, RecordingPublisher, StoreOp, test_clock};
    use proptest::prelude::*;

    fn occupancy(open_occupied: u32, open_total: u32) -> Occupancy {
        Occupancy {
            open_total,
            open_occupied,
            reserved_total: 5,
            reserved_occupied: 5,
        }
    }

    fn lot_full_incident() -> Incident {
        Incident {
            id: IncidentId::new(1),
            kind: IncidentKind::LotFull,
            space_id: None,
            opened_at: test_clock().now(),
            resolved_at: None,
            note: Some("Lot full: 3/3 open spaces occupied".into()),
        }
    }

    fn monitor(store: &InMemoryLotStore, publisher: &Arc<RecordingPublisher>) -> IncidentMonitor {
        IncidentMonitor::new(
            Arc::new(store.clone()),
            EventOutbox::new(publisher.clone()),
            Arc::new(test_clock()),
        )
    }

    async fn fill_open(store: &InMemoryLotStore) {
        let mut tx = store.begin().await.unwrap();
        while tx
            .claim_free_space(ReservationClass::Open)
            .await
            .unwrap()
            .is_some()
        {}
        tx.commit().await.unwrap();
    }

    #[test]
    fn evaluate_follows_the_trigger() {
        let incident = lot_full_incident();
        assert_eq!(evaluate(occupancy(3, 3), None, Trigger::Claimed), Transition::Open);
        assert_eq!(evaluate(occupancy(2, 3), None, Trigger::Claimed), Transition::Stay);
        assert_eq!(
            evaluate(occupancy(3, 3), Some(&incident), Trigger::Claimed),
            Transition::Stay
        );
        assert_eq!(
            evaluate(occupancy(2, 3), Some(&incident), Trigger::Released),
            Transition::Resolve(incident.clone())
        );
        assert_eq!(evaluate(occupancy(3, 3), None, Trigger::Released), Transition::Stay);
        assert_eq!(evaluate(occupancy(3, 3), None, Trigger::Reconcile), Transition::Open);
        assert_eq!(evaluate(occupancy(0, 0), None, Trigger::Reconcile), Transition::Stay);
    }

    #[test]
    fn notes_carry_counts() {
        assert_eq!(full_note(&occupancy(3, 3)), "Lot full: 3/3 open spaces occupied");
        assert_eq!(
            resolved_note(Some("Lot full: 3/3 open spaces occupied"), &occupancy(2, 3)),
            "Lot full: 3/3 open spaces occupied\nAuto-resolved: 2/3 open spaces occupied"
        );
        let note = rejection_note(
            AssignmentRequest::Reserved {
                holder: HolderKey::new(12_345_678),
            },
            RejectReason::UnknownHolder,
        );
        assert!(note.contains("unknown holder"));
        assert!(note.contains("12345678"));
    }

    proptest! {
        #[test]
        fn never_opens_a_second_incident(occupied in 0u32..10, total in 0u32..10) {
            let incident = lot_full_incident();
            for trigger in [Trigger::Claimed, Trigger::Released, Trigger::Reconcile] {
                let transition = evaluate(
                    occupancy(occupied.min(total), total),
                    Some(&incident),
                    trigger,
                );
                prop_assert_ne!(transition, Transition::Open);
            }
        }

        #[test]
        fn opens_only_when_full(occupied in 0u32..10, total in 0u32..10) {
            let counters = occupancy(occupied.min(total), total);
            let opened = evaluate(counters, None, Trigger::Claimed) == Transition::Open;
            prop_assert_eq!(opened, total > 0 && occupied >= total);
        }
    }

    #[tokio::test]
    async fn opens_once_and_resolves_on_release() {
        let store = InMemoryLotStore::with_spaces(2, 1);
        let publisher = Arc::new(RecordingPublisher::new());
        let monitor = monitor(&store, &publisher);

        assert_eq!(monitor.on_space_claimed().await, None);
        fill_open(&store).await;

        let opened = monitor.on_space_claimed().await.unwrap();
        assert_eq!(opened.note.as_deref(), Some("Lot full: 2/2 open spaces occupied"));
        assert_eq!(monitor.on_space_claimed().await, None);
        assert_eq!(monitor.state().await.unwrap(), MonitorState::Full(opened.clone()));

        let mut tx = store.begin().await.unwrap();
        tx.release_space(lotkeeper_core::SpaceId::new(2)).await.unwrap();
        tx.commit().await.unwrap();

        let resolved = monitor.on_space_released().await.unwrap();
        assert_eq!(resolved.id, opened.id);
        assert!(resolved.note.unwrap().ends_with("Auto-resolved: 1/2 open spaces occupied"));
        assert_eq!(monitor.state().await.unwrap(), MonitorState::Idle);
        assert_eq!(publisher.names(), ["incident_opened", "incident_resolved"]);
    }

    #[tokio::test]
    async fn store_failures_are_swallowed() {
        let store = InMemoryLotStore::with_spaces(1, 0);
        let publisher = Arc::new(RecordingPublisher::new());
        let monitor = monitor(&store, &publisher);
        fill_open(&store).await;

        store.fail_next(StoreOp::InsertIncident);
        assert_eq!(monitor.on_space_claimed().await, None);
        assert!(publisher.events().is_empty());

        // The next trigger catches up.
        assert!(monitor.on_space_claimed().await.is_some());
    }

    #[tokio::test]
    async fn rejections_are_born_resolved() {
        let store = InMemoryLotStore::new();
        let publisher = Arc::new(RecordingPublisher::new());
        let monitor = monitor(&store, &publisher);

        let incident = monitor
            .on_rejected(AssignmentRequest::Open, RejectReason::NoFreeSpace)
            .await
            .unwrap();
        assert_eq!(incident.kind, IncidentKind::RequestRejected);
        assert_eq!(incident.resolved_at, Some(incident.opened_at));
        assert_eq!(publisher.names(), ["incident_opened"]);
    }
}

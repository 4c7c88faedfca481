//! End-to-end allocation behaviour over the in-memory store.

#![allow(clippy::unwrap_used, clippy::panic)]

use futures::future::join_all;
use lotkeeper_core::{
    AssignmentRequest, HolderKey, IncidentFilter, IncidentKind, LotError, LotEvent, LotStore,
    OccupancyState, ReservationClass, SpaceFilter, SpaceId,
};
use lotkeeper_runtime::{Lot, LotEnvironment, MonitorState, ReleaseOutcome};
use lotkeeper_testing::helpers::init_tracing;
use lotkeeper_testing::{InMemoryLotStore, RecordingPublisher, StoreOp, test_clock};
use std::collections::HashSet;
use std::sync::Arc;

struct Harness {
    store: InMemoryLotStore,
    publisher: Arc<RecordingPublisher>,
    lot: Lot,
}

fn harness(store: InMemoryLotStore) -> Harness {
    init_tracing();
    let publisher = Arc::new(RecordingPublisher::new());
    let lot = Lot::new(LotEnvironment::new(
        Arc::new(store.clone()),
        publisher.clone(),
        Arc::new(test_clock()),
    ));
    Harness {
        store,
        publisher,
        lot,
    }
}

async fn rejection_incidents(store: &InMemoryLotStore) -> usize {
    store
        .incidents(IncidentFilter {
            kind: Some(IncidentKind::RequestRejected),
            ..IncidentFilter::default()
        })
        .await
        .unwrap()
        .len()
}

async fn assert_counters_consistent(store: &InMemoryLotStore) {
    let occupancy = store.occupancy().await.unwrap();
    assert_eq!(occupancy, store.recount().await, "counters drifted");

    let active = store.active_assignments().await.unwrap();
    let spaces: HashSet<SpaceId> = active.iter().map(|a| a.space_id).collect();
    assert_eq!(spaces.len(), active.len(), "space double-booked");

    let occupied = store
        .spaces(SpaceFilter::by_state(OccupancyState::Occupied))
        .await
        .unwrap();
    assert_eq!(occupied.len(), active.len());
    assert!(occupied.iter().all(|s| spaces.contains(&s.id)));
}

#[tokio::test]
async fn three_space_scenario() {
    let h = harness(InMemoryLotStore::with_spaces(3, 0));
    let engine = h.lot.engine();

    let mut labels = Vec::new();
    for _ in 0..3 {
        let assignment = engine.request_assignment(AssignmentRequest::Open).await.unwrap();
        let space = h.lot.registry().get(assignment.space_id).await.unwrap();
        labels.push(space.label.to_string());
    }
    assert_eq!(labels, ["01", "02", "03"]);

    let MonitorState::Full(lot_full) = h.lot.monitor().state().await.unwrap() else {
        panic!("lot should be full");
    };
    assert_eq!(lot_full.note.as_deref(), Some("Lot full: 3/3 open spaces occupied"));

    let fourth = engine.request_assignment(AssignmentRequest::Open).await;
    assert_eq!(
        fourth,
        Err(LotError::NoFreeSpace {
            class: ReservationClass::Open
        })
    );
    assert_eq!(rejection_incidents(&h.store).await, 1);

    let active = engine.active_assignments().await.unwrap();
    let second = active.iter().find(|a| a.space_id == SpaceId::new(2)).unwrap();
    let outcome = engine.release_assignment(second.id).await.unwrap();
    assert!(outcome.is_released());
    assert_eq!(h.lot.monitor().state().await.unwrap(), MonitorState::Idle);

    let next = engine.request_assignment(AssignmentRequest::Open).await.unwrap();
    assert_eq!(next.space_id, SpaceId::new(2));
    assert_counters_consistent(&h.store).await;
}

#[tokio::test]
async fn events_follow_commit_order() {
    let h = harness(InMemoryLotStore::with_spaces(1, 0));
    let engine = h.lot.engine();

    let assignment = engine.request_assignment(AssignmentRequest::Open).await.unwrap();
    assert_eq!(
        h.publisher.names(),
        ["space_updated", "assignment_created", "incident_opened"]
    );

    h.publisher.clear();
    let _ = engine.request_assignment(AssignmentRequest::Open).await;
    let events = h.publisher.events();
    assert_eq!(events.len(), 1, "a rejection announces only its incident");
    let LotEvent::IncidentOpened(incident) = &events[0] else {
        panic!("expected incident_opened");
    };
    assert_eq!(incident.kind, IncidentKind::RequestRejected);
    assert_eq!(incident.resolved_at, Some(incident.opened_at));

    h.publisher.clear();
    engine.release_assignment(assignment.id).await.unwrap();
    assert_eq!(
        h.publisher.names(),
        ["assignment_released", "space_updated", "incident_resolved"]
    );
}

#[tokio::test]
async fn concurrent_requests_never_double_book() {
    const FREE: usize = 5;
    const REQUESTS: usize = 20;

    let h = harness(InMemoryLotStore::with_spaces(5, 2));
    let tasks = (0..REQUESTS).map(|_| {
        let engine = h.lot.engine().clone();
        tokio::spawn(async move { engine.request_assignment(AssignmentRequest::Open).await })
    });
    let results: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(Result::unwrap)
        .collect();

    let granted: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    let spaces: HashSet<SpaceId> = granted.iter().map(|a| a.space_id).collect();
    assert_eq!(granted.len(), FREE);
    assert_eq!(spaces.len(), FREE);
    assert!(
        results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, LotError::NoFreeSpace { .. }))
    );

    assert_eq!(rejection_incidents(&h.store).await, REQUESTS - FREE);
    let lot_full = h
        .store
        .incidents(IncidentFilter {
            kind: Some(IncidentKind::LotFull),
            ..IncidentFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(lot_full.len(), 1);

    let occupancy = h.store.occupancy().await.unwrap();
    assert_eq!(occupancy.reserved_occupied, 0, "open requests stay out of the reserved pool");
    assert_counters_consistent(&h.store).await;
}

#[tokio::test]
async fn failed_insert_leaves_space_free() {
    let h = harness(InMemoryLotStore::with_spaces(2, 0));
    h.store.fail_next(StoreOp::InsertAssignment);

    let result = h.lot.engine().request_assignment(AssignmentRequest::Open).await;
    assert!(matches!(result, Err(LotError::Store(_))));
    assert!(h.publisher.events().is_empty());
    assert_eq!(h.store.occupancy().await.unwrap().open_occupied, 0);
    assert_eq!(rejection_incidents(&h.store).await, 0);

    let next = h.lot.engine().request_assignment(AssignmentRequest::Open).await.unwrap();
    assert_eq!(next.space_id, SpaceId::new(1), "the rolled-back space is claimable again");
    assert_counters_consistent(&h.store).await;
}

#[tokio::test]
async fn failed_commit_leaves_space_free() {
    let h = harness(InMemoryLotStore::with_spaces(1, 0));
    h.store.fail_next(StoreOp::Commit);

    let result = h.lot.engine().request_assignment(AssignmentRequest::Open).await;
    assert!(matches!(result, Err(LotError::Store(_))));
    assert!(h.publisher.events().is_empty());
    assert!(h.store.active_assignments().await.unwrap().is_empty());
    assert!(h.lot.registry().get(SpaceId::new(1)).await.unwrap().is_free());
}

#[tokio::test]
async fn release_twice_is_already_released() {
    let h = harness(InMemoryLotStore::with_spaces(2, 0));
    let engine = h.lot.engine();
    let assignment = engine.request_assignment(AssignmentRequest::Open).await.unwrap();

    let first = engine.release_assignment(assignment.id).await.unwrap();
    h.publisher.clear();
    let second = engine.release_assignment(assignment.id).await.unwrap();

    assert!(matches!(first, ReleaseOutcome::Released(_)));
    let ReleaseOutcome::AlreadyReleased(stored) = second else {
        panic!("second release must report AlreadyReleased");
    };
    assert_eq!(stored.released_at, first.assignment().released_at);
    assert!(h.publisher.events().is_empty());
    assert!(h.lot.registry().get(assignment.space_id).await.unwrap().is_free());

    let missing = engine
        .release_assignment(lotkeeper_core::AssignmentId::new(99))
        .await;
    assert!(matches!(missing, Err(LotError::AssignmentNotFound(_))));
}

#[tokio::test]
async fn reserved_requests_need_a_known_holder() {
    let h = harness(InMemoryLotStore::with_spaces(3, 1));
    h.store.add_holder(12_345_678, "Juan Pérez").await;
    let engine = h.lot.engine();

    let unknown = engine
        .request_assignment(AssignmentRequest::Reserved {
            holder: HolderKey::new(1),
        })
        .await;
    assert_eq!(unknown, Err(LotError::UnknownHolder(HolderKey::new(1))));
    assert_eq!(rejection_incidents(&h.store).await, 1);

    let known = AssignmentRequest::Reserved {
        holder: HolderKey::new(12_345_678),
    };
    let assignment = engine.request_assignment(known).await.unwrap();
    assert_eq!(assignment.space_id, SpaceId::new(1));
    assert_eq!(assignment.holder, Some(HolderKey::new(12_345_678)));

    // The reserved pool is exhausted even though open spaces remain.
    assert_eq!(
        engine.request_assignment(known).await,
        Err(LotError::NoFreeSpace {
            class: ReservationClass::Reserved
        })
    );
    assert_eq!(rejection_incidents(&h.store).await, 2);
    assert_eq!(h.store.occupancy().await.unwrap().open_occupied, 0);
}

#[tokio::test]
async fn reserved_occupancy_never_fills_the_lot() {
    let h = harness(InMemoryLotStore::with_spaces(1, 2));
    h.store.add_holder(87_654_321, "María Gómez").await;
    let request = AssignmentRequest::Reserved {
        holder: HolderKey::new(87_654_321),
    };
    h.lot.engine().request_assignment(request).await.unwrap();
    h.lot.engine().request_assignment(request).await.unwrap();

    assert_eq!(h.lot.monitor().state().await.unwrap(), MonitorState::Idle);
}

#[tokio::test]
async fn sensor_release_closes_the_active_assignment() {
    let h = harness(InMemoryLotStore::with_spaces(2, 0));
    let engine = h.lot.engine();
    let assignment = engine.request_assignment(AssignmentRequest::Open).await.unwrap();

    h.publisher.clear();
    let space = engine.release_space(assignment.space_id).await.unwrap();
    assert!(space.is_free());
    assert_eq!(h.publisher.names(), ["assignment_released", "space_updated"]);

    let stored = engine.assignment(assignment.id).await.unwrap();
    assert!(!stored.is_active());

    h.publisher.clear();
    engine.release_space(assignment.space_id).await.unwrap();
    assert!(h.publisher.events().is_empty(), "freeing a free space is silent");

    assert!(matches!(
        engine.release_space(SpaceId::new(42)).await,
        Err(LotError::SpaceNotFound(_))
    ));
}

#[tokio::test]
async fn failed_release_rolls_back() {
    let h = harness(InMemoryLotStore::with_spaces(1, 0));
    let engine = h.lot.engine();
    let assignment = engine.request_assignment(AssignmentRequest::Open).await.unwrap();

    h.store.fail_next(StoreOp::ReleaseSpace);
    assert!(matches!(
        engine.release_assignment(assignment.id).await,
        Err(LotError::Store(_))
    ));
    assert!(engine.assignment(assignment.id).await.unwrap().is_active());
    assert_counters_consistent(&h.store).await;

    assert!(engine.release_assignment(assignment.id).await.unwrap().is_released());
}

#[tokio::test]
async fn monitor_failure_does_not_fail_the_claim() {
    let h = harness(InMemoryLotStore::with_spaces(1, 0));
    // Claim commits; the lot-full insert that follows fails.
    h.store.fail_next(StoreOp::InsertIncident);

    let assignment = h.lot.engine().request_assignment(AssignmentRequest::Open).await;
    assert!(assignment.is_ok());
    assert_eq!(h.lot.monitor().state().await.unwrap(), MonitorState::Idle);

    assert!(h.lot.monitor().reconcile().await.is_some());
    assert!(matches!(
        h.lot.monitor().state().await.unwrap(),
        MonitorState::Full(_)
    ));
}

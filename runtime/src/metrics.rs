//! Prometheus metrics for the allocation engine.
//!
//! This module provides metric collection for:
//! - Assignment creation and release
//! - Rejected requests, by reason
//! - Lot-full incidents and swallowed monitor failures
//! - Allocation latency
//! - Occupancy gauges
//!
//! # Example
//!
//! ```rust,no_run
//! use lotkeeper_runtime::metrics::install_prometheus;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let handle = install_prometheus()?;
//! println!("{}", handle.render());
//! # Ok(())
//! # }
//! ```

use lotkeeper_core::{Occupancy, RejectReason, ReservationClass};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;
use thiserror::Error;

/// Errors from metrics setup.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Registers descriptions and installs the global Prometheus recorder.
///
/// # Errors
///
/// Returns an error if the exporter cannot be built or a recorder is already
/// installed.
pub fn install_prometheus() -> Result<PrometheusHandle, MetricsError> {
    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Suffix("duration_seconds".to_string()),
            &[
                0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
            ],
        )
        .map_err(|e| MetricsError::Build(e.to_string()))?
        .install_recorder()
        .map_err(|e| MetricsError::Install(e.to_string()))?;

    register_metrics();
    tracing::info!("Prometheus recorder installed");
    Ok(handle)
}

/// Register all metric descriptions.
pub fn register_metrics() {
    describe_counter!(
        "lotkeeper_assignments_created_total",
        "Total number of spaces claimed, by reservation class"
    );
    describe_counter!(
        "lotkeeper_requests_rejected_total",
        "Total number of rejected assignment requests, by reason"
    );
    describe_counter!(
        "lotkeeper_assignments_released_total",
        "Total number of assignments released"
    );
    describe_counter!(
        "lotkeeper_lot_full_incidents_total",
        "Total number of lot-full incidents opened"
    );
    describe_counter!(
        "lotkeeper_incident_bookkeeping_failures_total",
        "Incident monitor failures that were logged and swallowed"
    );
    describe_counter!(
        "lotkeeper_event_publish_failures_total",
        "Committed events the publisher refused, by event"
    );
    describe_histogram!(
        "lotkeeper_allocation_duration_seconds",
        "Time to serve an assignment request, including rejections"
    );
    describe_gauge!(
        "lotkeeper_open_spaces_occupied",
        "Occupied open-class spaces"
    );
    describe_gauge!("lotkeeper_open_spaces_total", "Open-class spaces");
    describe_gauge!(
        "lotkeeper_reserved_spaces_occupied",
        "Occupied reserved-class spaces"
    );
}

/// A space of `class` was claimed.
pub fn record_assignment_created(class: ReservationClass) {
    counter!("lotkeeper_assignments_created_total", "class" => class.as_str()).increment(1);
}

/// A request was turned away.
pub fn record_rejection(reason: RejectReason) {
    counter!("lotkeeper_requests_rejected_total", "reason" => reason.as_str()).increment(1);
}

/// An assignment was released.
pub fn record_assignment_released() {
    counter!("lotkeeper_assignments_released_total").increment(1);
}

/// A lot-full incident was opened.
pub fn record_lot_full() {
    counter!("lotkeeper_lot_full_incidents_total").increment(1);
}

/// The monitor swallowed an error.
pub fn record_bookkeeping_failure() {
    counter!("lotkeeper_incident_bookkeeping_failures_total").increment(1);
}

/// The publisher refused a committed event.
pub fn record_publish_failure(event: &'static str) {
    counter!("lotkeeper_event_publish_failures_total", "event" => event).increment(1);
}

/// Time spent in one assignment request.
pub fn record_allocation_duration(elapsed: Duration) {
    histogram!("lotkeeper_allocation_duration_seconds").record(elapsed.as_secs_f64());
}

/// Latest occupancy counters.
pub fn record_occupancy(occupancy: &Occupancy) {
    gauge!("lotkeeper_open_spaces_occupied").set(f64::from(occupancy.open_occupied));
    gauge!("lotkeeper_open_spaces_total").set(f64::from(occupancy.open_total));
    gauge!("lotkeeper_reserved_spaces_occupied").set(f64::from(occupancy.reserved_occupied));
}

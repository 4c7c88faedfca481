//! Application state shared across handlers.

use crate::publisher::BroadcastPublisher;
use lotkeeper_core::LotStore;
use lotkeeper_core::environment::Clock;
use lotkeeper_runtime::{Lot, LotEnvironment};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

/// Everything a handler needs: the wired lot, the event fan-out and the
/// metrics renderer.
#[derive(Clone)]
pub struct AppState {
    /// Allocation engine and friends
    pub lot: Lot,
    /// Store, for readiness probes
    pub store: Arc<dyn LotStore>,
    /// WebSocket event source
    pub events: BroadcastPublisher,
    /// Prometheus renderer, when metrics are enabled
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// Wires a lot over `store`, publishing into `events`.
    #[must_use]
    pub fn new(
        store: Arc<dyn LotStore>,
        events: BroadcastPublisher,
        clock: Arc<dyn Clock>,
        metrics: Option<PrometheusHandle>,
    ) -> Self {
        let lot = Lot::new(LotEnvironment::new(
            Arc::clone(&store),
            Arc::new(events.clone()),
            clock,
        ));
        Self {
            lot,
            store,
            events,
            metrics,
        }
    }
}

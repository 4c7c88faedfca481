//! # Lotkeeper Runtime
//!
//! The allocation engine and everything that runs around it.
//!
//! ## Core Components
//!
//! - **[`SpaceRegistry`]**: claims and frees spaces under per-class permits
//! - **[`AllocationEngine`]**: serves assignment requests and releases
//! - **[`IncidentMonitor`]**: keeps the lot-full incident in line with occupancy
//! - **[`EventOutbox`]**: commits, then publishes events in commit order
//! - **[`LotAdmin`]**: pool shape, holder directory, staff incidents
//! - **[`ReportAggregator`]**: read-only statistics
//!
//! ## Lock order
//!
//! Class permits, then the store transaction, then the outbox's commit-order
//! mutex. The monitor takes its transition mutex before its own transaction
//! and never while a class permit is held.
//!
//! ## Example
//!
//! ```ignore
//! use lotkeeper_runtime::{Lot, LotEnvironment};
//!
//! let lot = Lot::new(LotEnvironment::new(store, publisher, clock));
//! let assignment = lot.engine().request_assignment(AssignmentRequest::Open).await?;
//! lot.engine().release_assignment(assignment.id).await?;
//! ```

pub mod admin;
pub mod allocation;
pub mod incidents;
pub mod metrics;
pub mod outbox;
pub mod registry;
pub mod reports;

pub use admin::LotAdmin;
pub use allocation::{AllocationEngine, ReleaseOutcome};
pub use incidents::{IncidentMonitor, MonitorState};
pub use outbox::EventOutbox;
pub use registry::{ClassPermit, SpaceRegistry};
pub use reports::{LotStatistics, ReportAggregator};

use lotkeeper_core::environment::Clock;
use lotkeeper_core::{EventPublisher, LotStore};
use std::sync::Arc;

/// Injected dependencies.
#[derive(Clone)]
pub struct LotEnvironment {
    /// Persistence
    pub store: Arc<dyn LotStore>,
    /// Where committed events go
    pub publisher: Arc<dyn EventPublisher>,
    /// Time source
    pub clock: Arc<dyn Clock>,
}

impl LotEnvironment {
    /// Bundles the dependencies.
    #[must_use]
    pub fn new(
        store: Arc<dyn LotStore>,
        publisher: Arc<dyn EventPublisher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            publisher,
            clock,
        }
    }
}

/// A wired-up lot: every component sharing one store, outbox and monitor.
#[derive(Clone)]
pub struct Lot {
    registry: SpaceRegistry,
    engine: AllocationEngine,
    monitor: IncidentMonitor,
    admin: LotAdmin,
    reports: ReportAggregator,
}

impl Lot {
    /// Wires the components.
    #[must_use]
    pub fn new(env: LotEnvironment) -> Self {
        let registry = SpaceRegistry::new(Arc::clone(&env.store));
        let outbox = EventOutbox::new(env.publisher);
        let monitor = IncidentMonitor::new(
            Arc::clone(&env.store),
            outbox.clone(),
            Arc::clone(&env.clock),
        );
        let engine = AllocationEngine::new(
            Arc::clone(&env.store),
            registry.clone(),
            outbox.clone(),
            monitor.clone(),
            Arc::clone(&env.clock),
        );
        let admin = LotAdmin::new(
            Arc::clone(&env.store),
            registry.clone(),
            outbox,
            monitor.clone(),
            env.clock,
        );
        let reports = ReportAggregator::new(env.store);
        Self {
            registry,
            engine,
            monitor,
            admin,
            reports,
        }
    }

    /// Space reads.
    #[must_use]
    pub const fn registry(&self) -> &SpaceRegistry {
        &self.registry
    }

    /// Claims and releases.
    #[must_use]
    pub const fn engine(&self) -> &AllocationEngine {
        &self.engine
    }

    /// Lot-full state.
    #[must_use]
    pub const fn monitor(&self) -> &IncidentMonitor {
        &self.monitor
    }

    /// Administrative operations.
    #[must_use]
    pub const fn admin(&self) -> &LotAdmin {
        &self.admin
    }

    /// Statistics.
    #[must_use]
    pub const fn reports(&self) -> &ReportAggregator {
        &self.reports
    }
}

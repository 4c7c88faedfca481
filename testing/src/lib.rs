//! # Lotkeeper Testing
//!
//! Testing utilities for the Lotkeeper allocation engine.
//!
//! This crate provides:
//! - [`InMemoryLotStore`]: a transactional store with fault injection
//! - Mock implementations of environment traits (clocks, publishers)
//! - Builders for common lot layouts
//! - proptest strategies for operation sequences
//!
//! ## Example
//!
//! ```ignore
//! use lotkeeper_testing::{InMemoryLotStore, RecordingPublisher, test_clock};
//!
//! #[tokio::test]
//! async fn claims_lowest_label() {
//!     let store = InMemoryLotStore::with_spaces(3, 0);
//!     let lot = Lot::new(LotEnvironment::new(store, publisher, test_clock()));
//!
//!     let assignment = lot.engine().request_assignment(AssignmentRequest::Open).await?;
//!     assert_eq!(assignment.space_id, SpaceId::new(1));
//! }
//! ```

pub mod in_memory;

pub use in_memory::{InMemoryLotStore, StoreOp};

use chrono::{DateTime, Utc};
use lotkeeper_core::environment::Clock;

/// Mock implementations for testing.
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use lotkeeper_core::{EventPublisher, LotEvent, PublishError};
    use std::sync::Mutex;

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use lotkeeper_testing::mocks::FixedClock;
    /// use lotkeeper_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2026-03-02 08:00:00 UTC)
    ///
    /// # Panics
    ///
    /// Panics if the hardcoded timestamp fails to parse, which cannot happen.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2026-03-02T08:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }

    /// Clock that only moves when told to.
    ///
    /// Used where durations matter, e.g. average occupancy hours.
    #[derive(Debug)]
    pub struct ManualClock {
        time: Mutex<DateTime<Utc>>,
    }

    impl ManualClock {
        /// Starts at `time`.
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Mutex::new(time),
            }
        }

        /// Moves the clock forward.
        pub fn advance(&self, by: chrono::Duration) {
            if let Ok(mut time) = self.time.lock() {
                *time += by;
            }
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
                .lock()
                .map_or_else(|poisoned| *poisoned.into_inner(), |time| *time)
        }
    }

    /// Publisher that records every event, optionally refusing them all.
    #[derive(Debug, Default)]
    pub struct RecordingPublisher {
        events: Mutex<Vec<LotEvent>>,
        refuse: bool,
    }

    impl RecordingPublisher {
        /// Records and accepts.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Records, then reports every publish as failed.
        #[must_use]
        pub fn refusing() -> Self {
            Self {
                events: Mutex::new(Vec::new()),
                refuse: true,
            }
        }

        /// Everything published so far, in order.
        #[must_use]
        pub fn events(&self) -> Vec<LotEvent> {
            self.events.lock().map(|e| e.clone()).unwrap_or_default()
        }

        /// Event names published so far, in order.
        #[must_use]
        pub fn names(&self) -> Vec<&'static str> {
            self.events().iter().map(LotEvent::name).collect()
        }

        /// Forgets recorded events.
        pub fn clear(&self) {
            if let Ok(mut events) = self.events.lock() {
                events.clear();
            }
        }
    }

    impl EventPublisher for RecordingPublisher {
        fn publish(&self, event: LotEvent) -> Result<(), PublishError> {
            let name = event.name();
            if let Ok(mut events) = self.events.lock() {
                events.push(event);
            }
            if self.refuse {
                return Err(PublishError::Rejected {
                    event: name,
                    reason: "refusing publisher".to_string(),
                });
            }
            Ok(())
        }
    }
}

/// Test helpers and utilities.
#[cfg(feature = "test-helpers")]
pub mod helpers {
    /// Installs a test-friendly `tracing` subscriber once per process.
    ///
    /// Honors `RUST_LOG`; later calls are no-ops.
    pub fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "warn".into()),
            )
            .with_test_writer()
            .try_init();
    }
}

/// Property-based testing utilities using proptest.
#[cfg(feature = "test-helpers")]
pub mod properties {
    use lotkeeper_core::{AssignmentRequest, HolderKey};
    use proptest::prelude::*;

    /// One step of a random lot workload.
    ///
    /// Release indices pick among the currently known assignments or spaces,
    /// modulo their count.
    #[derive(Clone, Debug)]
    pub enum LotOp {
        /// Ask for a space
        Request(AssignmentRequest),
        /// Give back the n-th known assignment
        ReleaseAssignment(usize),
        /// Fire the exit sensor of the n-th space
        ReleaseSpace(usize),
    }

    /// Requests drawn from the open class and from `holders` (plus one unknown key).
    pub fn arb_request(holders: Vec<i64>) -> impl Strategy<Value = AssignmentRequest> {
        let mut keys = holders;
        keys.push(999_999_999);
        prop_oneof![
            2 => Just(AssignmentRequest::Open),
            1 => proptest::sample::select(keys).prop_map(|key| AssignmentRequest::Reserved {
                holder: HolderKey::new(key),
            }),
        ]
    }

    /// A single workload step.
    pub fn arb_op(holders: Vec<i64>) -> impl Strategy<Value = LotOp> {
        prop_oneof![
            3 => arb_request(holders).prop_map(LotOp::Request),
            2 => any::<usize>().prop_map(LotOp::ReleaseAssignment),
            1 => any::<usize>().prop_map(LotOp::ReleaseSpace),
        ]
    }

    /// A workload of up to `max_len` steps.
    pub fn arb_ops(holders: Vec<i64>, max_len: usize) -> impl Strategy<Value = Vec<LotOp>> {
        proptest::collection::vec(arb_op(holders), 1..=max_len)
    }
}

// Re-export commonly used items
pub use mocks::{FixedClock, ManualClock, RecordingPublisher, test_clock};

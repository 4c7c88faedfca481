//! # Lotkeeper Core
//!
//! Domain model and contracts for the Lotkeeper parking allocation engine.
//!
//! This crate holds no I/O. It defines:
//!
//! - **Types**: spaces, assignments, incidents, reservation holders, occupancy counters
//! - **Errors**: [`LotError`] for callers, [`StoreError`] for store backends
//! - **Events**: [`LotEvent`] snapshots and the one-way [`EventPublisher`] sink
//! - **Store**: [`LotStore`] reads and [`LotTransaction`] units of work
//! - **Environment**: the injected [`Clock`](environment::Clock)
//!
//! The engine that drives these contracts lives in `lotkeeper-runtime`.

pub mod error;
pub mod event;
pub mod store;
pub mod types;

pub use chrono::{DateTime, Utc};
pub use error::{LotError, StoreError};
pub use event::{EventPublisher, LotEvent, NoopPublisher, PublishError};
pub use store::{BoxFuture, LotStore, LotTransaction, SpaceRelease, StoreResult};
pub use types::*;

/// Environment module - injected dependencies.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time for testability
    ///
    /// # Examples
    ///
    /// ```
    /// use lotkeeper_core::environment::{Clock, SystemClock};
    ///
    /// let clock = SystemClock;
    /// assert!(clock.now() <= chrono::Utc::now());
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Wall-clock time.
    #[derive(Clone, Copy, Debug, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}

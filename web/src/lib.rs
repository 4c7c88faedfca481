//! HTTP and WebSocket shell for the Lotkeeper allocation engine.
//!
//! # Request Flow
//!
//! 1. **HTTP request** arrives at an axum handler
//! 2. **Extract** path, query and JSON body
//! 3. **Call** the engine, admin path or report aggregator on [`AppState::lot`]
//! 4. **Map** the result, or the [`LotError`](lotkeeper_core::LotError) through [`AppError`]
//!
//! Committed changes fan out to WebSocket clients through [`BroadcastPublisher`].
//!
//! # Example
//!
//! ```ignore
//! use lotkeeper_web::{AppState, BroadcastPublisher, build_router};
//!
//! let events = BroadcastPublisher::new(256);
//! let state = AppState::new(store, events, Arc::new(SystemClock), None);
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//! axum::serve(listener, build_router(state, &["*".to_string()])).await?;
//! ```

#![forbid(unsafe_code)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod handlers;
pub mod publisher;
pub mod routes;
pub mod seed;
pub mod state;
pub mod telemetry;

pub use config::{Config, ConfigError, DatabaseConfig, SeedConfig, ServerConfig};
pub use error::AppError;
pub use publisher::BroadcastPublisher;
pub use routes::build_router;
pub use seed::{SeedReport, seed_lot};
pub use state::AppState;

/// Result type alias for web handlers.
pub type WebResult<T> = Result<T, AppError>;

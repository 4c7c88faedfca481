//! Tracing and metrics bootstrap for the server binary.

use lotkeeper_runtime::metrics::{MetricsError, install_prometheus};
use metrics_exporter_prometheus::PrometheusHandle;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Installs the global `tracing` subscriber.
///
/// `RUST_LOG` wins over `directives` when set.
///
/// # Errors
///
/// Fails if a global subscriber is already installed.
pub fn init_tracing(directives: &str) -> Result<(), tracing_subscriber::util::TryInitError> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directives)))
        .with(tracing_subscriber::fmt::layer())
        .try_init()
}

/// Installs the Prometheus recorder when `enabled`.
///
/// # Errors
///
/// Returns [`MetricsError`] if the recorder cannot be installed.
pub fn init_metrics(enabled: bool) -> Result<Option<PrometheusHandle>, MetricsError> {
    if !enabled {
        tracing::info!("Metrics disabled");
        return Ok(None);
    }
    let handle = install_prometheus()?;
    tracing::info!("Prometheus recorder installed");
    Ok(Some(handle))
}

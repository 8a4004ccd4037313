//! # Telemetry
//!
//! Process-wide log subscriber setup and the component span handed to each
//! store at construction.

use crate::infrastructure::config::{LogFormat, LoggingConfig};
use crate::infrastructure::namespace::TenantNamespace;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::util::TryInitError;

/// Installs the global subscriber.
///
/// `RUST_LOG` takes precedence over the configured level.
///
/// # Errors
///
/// Returns `TryInitError` if a global subscriber is already installed.
pub fn init_tracing(config: &LoggingConfig) -> Result<(), TryInitError> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(filter);
    match config.format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(true))
            .try_init(),
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().pretty())
            .try_init(),
        LogFormat::Compact => registry
            .with(tracing_subscriber::fmt::layer().compact())
            .try_init(),
    }
}

/// Span carrying the tenant identity, used as the parent of every event a
/// component emits.
#[must_use]
pub fn component_span(component: &'static str, namespace: &TenantNamespace) -> tracing::Span {
    tracing::info_span!(
        "exchange_data_adapter",
        component,
        schema = namespace.schema(),
        namespace = namespace.cache_namespace(),
    )
}

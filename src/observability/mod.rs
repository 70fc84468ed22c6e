use thiserror::Error;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Error)]
pub enum ObservabilityError {
    #[error("Failed to initialize tracing subscriber: {0}")]
    TracingInit(String),
}

/// Initialize structured logging. The filter honors RUST_LOG and falls back
/// to the configured level for this crate plus info for the HTTP stack.
pub fn init_observability(
    service_name: &str,
    log_level: &str,
    enable_json_logging: bool,
) -> Result<(), ObservabilityError> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!(
            "{}={},tower_http=info,sqlx=warn",
            service_name.replace('-', "_"),
            log_level
        )
        .into()
    });

    let registry = tracing_subscriber::registry().with(env_filter);

    if enable_json_logging {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_target(false))
            .try_init()
            .map_err(|e| ObservabilityError::TracingInit(e.to_string()))?;
    } else {
        // Human-readable formatter for development
        registry
            .with(tracing_subscriber::fmt::layer())
            .try_init()
            .map_err(|e| ObservabilityError::TracingInit(e.to_string()))?;
    }

    info!("Observability initialized for {}", service_name);
    Ok(())
}

use autopatcher_service::config::{AutopatcherConfig, ObservabilityConfig};
use autopatcher_service::startup::Application;
use service_core::observability::{init_tracing, shutdown_tracing};

#[tokio::main]
async fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();

    // Tracing first so configuration problems are logged
    let observability = ObservabilityConfig::from_env();
    init_tracing(
        "autopatcher-service",
        &observability.log_level,
        observability.otlp_endpoint.as_deref(),
    );

    let config = AutopatcherConfig::load().map_err(|e| {
        tracing::error!("Failed to load configuration: {}", e);
        std::io::Error::other(format!("Configuration error: {}", e))
    })?;

    let application = Application::build(config).await.map_err(|e| {
        tracing::error!("Failed to build application: {}", e);
        std::io::Error::other(format!("Startup error: {}", e))
    })?;

    let result = application.run_until_stopped().await;
    if let Err(e) = &result {
        tracing::error!("Server error: {}", e);
    }

    shutdown_tracing();
    result
}
